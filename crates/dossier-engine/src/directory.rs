//! Actor role and language resolution.
//!
//! Roles are resolved against the store on every update, so a revocation
//! takes effect on the revoked actor's very next interaction.  There is
//! deliberately no cache here.

use dossier_shared::{ActorId, Lang, RoleTier};
use dossier_store::Database;

use crate::error::Result;

/// Resolves an actor's role tier and language.
#[derive(Debug, Clone)]
pub struct ActorDirectory {
    owner: ActorId,
    /// When set, every actor without an explicit role is `Allowed`
    /// instead of `Guest`.
    public_open: bool,
    default_lang: Lang,
}

impl ActorDirectory {
    pub fn new(owner: ActorId, public_open: bool, default_lang: Lang) -> Self {
        Self {
            owner,
            public_open,
            default_lang,
        }
    }

    pub fn owner(&self) -> ActorId {
        self.owner
    }

    /// Resolve the effective role tier, checked from most to least
    /// privileged.
    pub fn tier(&self, db: &Database, actor: ActorId) -> Result<RoleTier> {
        if actor == self.owner {
            return Ok(RoleTier::Owner);
        }
        if db.is_superadmin(actor)? {
            return Ok(RoleTier::Superadmin);
        }
        if db.is_admin(actor)? {
            return Ok(RoleTier::Admin);
        }
        if self.public_open || db.is_allowed(actor)? {
            return Ok(RoleTier::Allowed);
        }
        Ok(RoleTier::Guest)
    }

    /// The language to render replies in: the actor's stored preference
    /// or the instance default.
    pub fn lang(&self, db: &Database, actor: ActorId) -> Result<Lang> {
        Ok(db.get_lang(actor)?.unwrap_or(self.default_lang))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn tiers_resolve_most_privileged_first() {
        let db = db();
        let dir = ActorDirectory::new(ActorId(1), false, Lang::Ru);

        assert_eq!(dir.tier(&db, ActorId(1)).unwrap(), RoleTier::Owner);
        assert_eq!(dir.tier(&db, ActorId(2)).unwrap(), RoleTier::Guest);

        db.add_admin(ActorId(2)).unwrap();
        assert_eq!(dir.tier(&db, ActorId(2)).unwrap(), RoleTier::Admin);

        db.add_superadmin(ActorId(2)).unwrap();
        assert_eq!(dir.tier(&db, ActorId(2)).unwrap(), RoleTier::Superadmin);

        db.add_allowed(ActorId(3), ActorId(1)).unwrap();
        assert_eq!(dir.tier(&db, ActorId(3)).unwrap(), RoleTier::Allowed);
    }

    #[test]
    fn revocation_is_immediate() {
        let db = db();
        let dir = ActorDirectory::new(ActorId(1), false, Lang::Ru);

        db.add_allowed(ActorId(5), ActorId(1)).unwrap();
        assert_eq!(dir.tier(&db, ActorId(5)).unwrap(), RoleTier::Allowed);

        db.remove_allowed(ActorId(5)).unwrap();
        assert_eq!(dir.tier(&db, ActorId(5)).unwrap(), RoleTier::Guest);
    }

    #[test]
    fn public_open_grants_allowed_by_default() {
        let db = db();
        let dir = ActorDirectory::new(ActorId(1), true, Lang::Ru);
        assert_eq!(dir.tier(&db, ActorId(99)).unwrap(), RoleTier::Allowed);
    }

    #[test]
    fn lang_falls_back_to_instance_default() {
        let db = db();
        let dir = ActorDirectory::new(ActorId(1), false, Lang::Uk);
        assert_eq!(dir.lang(&db, ActorId(7)).unwrap(), Lang::Uk);

        db.set_lang(ActorId(7), Lang::Ru).unwrap();
        assert_eq!(dir.lang(&db, ActorId(7)).unwrap(), Lang::Ru);
    }
}
