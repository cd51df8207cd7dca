//! Entity base contract
//!
//! Every domain entity embeds an [`EntityBase`] (identity, audit stamps,
//! concurrency token, soft-delete flag) and exposes it through the [`Entity`]
//! trait, which supplies the lifecycle operations shared by all of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::concurrency::{self, ConcurrencyToken};
use super::providers::Providers;
use super::result::ErrorAggregate;

/// Identifier of whoever performs an operation
pub type ActorId = Uuid;

/// Actor used for operations that happen before an account exists
pub const SYSTEM_ACTOR: ActorId = Uuid::nil();

/// Identity, audit and lifecycle fields shared by all entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityBase {
    /// Storage-assigned surrogate id; `None` until first persisted
    pub(crate) id: Option<i64>,
    pub(crate) guid: Uuid,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) created_by: ActorId,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) updated_by: Option<ActorId>,
    pub(crate) concurrency_token: Option<ConcurrencyToken>,
    pub(crate) is_active: bool,
}

impl EntityBase {
    /// Fresh, active, unpersisted base
    pub fn create(actor: ActorId, providers: &Providers) -> Self {
        Self {
            id: None,
            guid: providers.new_guid(),
            created_at: providers.now(),
            created_by: actor,
            updated_at: None,
            updated_by: None,
            concurrency_token: None,
            is_active: true,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> ActorId {
        self.created_by
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn updated_by(&self) -> Option<ActorId> {
        self.updated_by
    }

    pub fn concurrency_token(&self) -> Option<&ConcurrencyToken> {
        self.concurrency_token.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub(crate) fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Issue the first token right before the entity is persisted
    pub fn issue_initial_token(&mut self, providers: &Providers) {
        if self.concurrency_token.is_none() {
            self.concurrency_token = Some(ConcurrencyToken::generate(providers.random(), None));
        }
    }

    /// Stamp modification audit fields and rotate the token
    pub fn touch(&mut self, actor: ActorId, providers: &Providers) {
        self.updated_at = Some(providers.now());
        self.updated_by = Some(actor);
        self.concurrency_token = Some(ConcurrencyToken::generate(
            providers.random(),
            self.concurrency_token.as_ref(),
        ));
    }

    pub fn ensure_active(&self, entity: &str) -> Result<(), ErrorAggregate> {
        if self.is_active {
            Ok(())
        } else {
            Err(ErrorAggregate::inactive(entity))
        }
    }

    pub fn deactivate(
        &mut self,
        entity: &str,
        actor: ActorId,
        providers: &Providers,
    ) -> Result<(), ErrorAggregate> {
        self.ensure_active(entity)?;
        self.is_active = false;
        self.touch(actor, providers);
        Ok(())
    }

    /// Allowed regardless of the current flag
    pub fn reactivate(&mut self, actor: ActorId, providers: &Providers) {
        self.is_active = true;
        self.touch(actor, providers);
    }
}

/// Behaviour shared by every entity embedding an [`EntityBase`]
pub trait Entity {
    /// Name used as the `field` of lifecycle and concurrency errors
    fn entity_name(&self) -> &'static str;

    fn base(&self) -> &EntityBase;

    fn base_mut(&mut self) -> &mut EntityBase;

    fn ensure_active(&self) -> Result<(), ErrorAggregate> {
        self.base().ensure_active(self.entity_name())
    }

    /// Compare a presented wire token with the current one
    fn check_token(&self, presented: &str) -> Result<ConcurrencyToken, ErrorAggregate> {
        concurrency::check(
            self.entity_name(),
            self.base().concurrency_token(),
            presented,
        )
    }

    fn touch(&mut self, actor: ActorId, providers: &Providers) {
        self.base_mut().touch(actor, providers);
    }

    fn deactivate(&mut self, actor: ActorId, providers: &Providers) -> Result<(), ErrorAggregate> {
        let name = self.entity_name();
        self.base_mut().deactivate(name, actor, providers)
    }

    fn reactivate(&mut self, actor: ActorId, providers: &Providers) {
        self.base_mut().reactivate(actor, providers);
    }
}

/// Implement [`Entity`] for a struct with a `base: EntityBase` field
macro_rules! impl_entity {
    ($ty:ty, $name:literal) => {
        impl $crate::domain::entity::Entity for $ty {
            fn entity_name(&self) -> &'static str {
                $name
            }

            fn base(&self) -> &$crate::domain::entity::EntityBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut $crate::domain::entity::EntityBase {
                &mut self.base
            }
        }
    };
}

pub(crate) use impl_entity;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::system::{ManualClock, StdRandom};
    use crate::domain::result::ErrorCode;
    use chrono::TimeZone;
    use std::sync::Arc;

    struct Muestra {
        base: EntityBase,
    }

    impl_entity!(Muestra, "Muestra");

    fn providers() -> Providers {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        Providers::new(Arc::new(clock), Arc::new(StdRandom::seeded(42)))
    }

    fn persisted_muestra(p: &Providers) -> Muestra {
        let mut muestra = Muestra {
            base: EntityBase::create(SYSTEM_ACTOR, p),
        };
        muestra.base.issue_initial_token(p);
        muestra.base.assign_id(1);
        muestra
    }

    #[test]
    fn test_create_defaults() {
        let p = providers();
        let base = EntityBase::create(SYSTEM_ACTOR, &p);
        assert!(base.is_active());
        assert!(base.concurrency_token().is_none());
        assert!(base.id().is_none());
        assert!(base.updated_at().is_none());
        assert_eq!(base.created_at(), p.now());
    }

    #[test]
    fn test_touch_rotates_token() {
        let p = providers();
        let mut muestra = persisted_muestra(&p);
        let mut seen = vec![*muestra.base().concurrency_token().unwrap()];
        for _ in 0..20 {
            muestra.touch(SYSTEM_ACTOR, &p);
            let token = *muestra.base().concurrency_token().unwrap();
            assert_ne!(Some(&token), seen.last());
            seen.push(token);
        }
        assert!(muestra.base().updated_at().is_some());
    }

    #[test]
    fn test_latest_token_passes_earlier_fails() {
        let p = providers();
        let mut muestra = persisted_muestra(&p);
        let before = muestra.base().concurrency_token().unwrap().to_wire();
        muestra.touch(SYSTEM_ACTOR, &p);
        let after = muestra.base().concurrency_token().unwrap().to_wire();

        assert!(muestra.check_token(&after).is_ok());
        let err = muestra.check_token(&before).unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::ConcurrencyError]);
    }

    #[test]
    fn test_deactivate_then_gate() {
        let p = providers();
        let mut muestra = persisted_muestra(&p);
        muestra.deactivate(SYSTEM_ACTOR, &p).unwrap();
        assert!(!muestra.base().is_active());

        let err = muestra.ensure_active().unwrap_err();
        assert!(err.has("Muestra", ErrorCode::EntityInactive));

        let err = muestra.deactivate(SYSTEM_ACTOR, &p).unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::EntityInactive]);
    }

    #[test]
    fn test_reactivate_always_succeeds_on_inactive() {
        let p = providers();
        let mut muestra = persisted_muestra(&p);
        muestra.deactivate(SYSTEM_ACTOR, &p).unwrap();
        let token = *muestra.base().concurrency_token().unwrap();
        muestra.reactivate(SYSTEM_ACTOR, &p);
        assert!(muestra.base().is_active());
        assert_ne!(muestra.base().concurrency_token(), Some(&token));
    }
}
