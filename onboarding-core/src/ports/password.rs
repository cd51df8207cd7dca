//! Password hashing port

use crate::domain::result::Result;

pub trait PasswordHasher: Send + Sync {
    /// Self-describing hash string (algorithm, params and salt included)
    fn hash(&self, password: &str) -> Result<String>;

    fn verify(&self, password: &str, hash: &str) -> Result<bool>;
}
