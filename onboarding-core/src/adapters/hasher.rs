//! Argon2id password hashing

use std::sync::Arc;

use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::Argon2Params;
use crate::domain::result::{Error, Result};
use crate::domain::RandomSource;
use crate::ports::PasswordHasher;

/// Salt length in bytes
const SALT_LEN: usize = 16;

/// PHC-string Argon2id hasher; salts come from the injected randomness
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
    random: Arc<dyn RandomSource>,
}

impl Argon2Hasher {
    pub fn new(params: &Argon2Params, random: Arc<dyn RandomSource>) -> Result<Self> {
        let params = Params::new(
            params.memory_cost,
            params.time_cost,
            params.parallelism,
            Some(params.hash_len as usize),
        )
        .map_err(|e| Error::Hashing(format!("Failed to create argon2 params: {:?}", e)))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            random,
        })
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        self.random.fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| Error::Hashing(format!("Failed to encode salt: {:?}", e)))?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Hashing(format!("Failed to hash password: {:?}", e)))?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| Error::Hashing(format!("Malformed password hash: {:?}", e)))?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Hashing(format!("Failed to verify password: {:?}", e))),
        }
    }
}
