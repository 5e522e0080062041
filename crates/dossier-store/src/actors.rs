//! Actor profiles and role-tier membership.
//!
//! An actor row is created on first contact and never deleted; role
//! changes only touch the `admins` / `allowed_actors` membership tables.

use chrono::{DateTime, Utc};
use dossier_shared::{ActorId, Lang};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::ActorProfile;

impl Database {
    /// Insert or refresh an actor's profile on contact.
    pub fn upsert_actor_profile(
        &self,
        actor: ActorId,
        first_name: Option<&str>,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO actors (actor_id, first_name, last_name, username, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(actor_id) DO UPDATE SET
                 first_name = excluded.first_name,
                 last_name  = excluded.last_name,
                 username   = excluded.username,
                 updated_at = excluded.updated_at",
            params![actor.0, first_name, last_name, username, now],
        )?;
        Ok(())
    }

    /// Store an explicit language preference.
    pub fn set_lang(&self, actor: ActorId, lang: Lang) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO actors (actor_id, lang, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(actor_id) DO UPDATE SET
                 lang = excluded.lang,
                 updated_at = excluded.updated_at",
            params![actor.0, lang.code(), now],
        )?;
        Ok(())
    }

    /// Profile row for an actor who has made contact before.
    pub fn get_actor_profile(&self, actor: ActorId) -> Result<Option<ActorProfile>> {
        let row = self.conn().query_row(
            "SELECT actor_id, first_name, last_name, username, lang, created_at
             FROM actors
             WHERE actor_id = ?1",
            params![actor.0],
            row_to_profile,
        );

        match row {
            Ok(profile) => Ok(Some(profile)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stored language preference, if the actor ever picked one.
    pub fn get_lang(&self, actor: ActorId) -> Result<Option<Lang>> {
        let row = self.conn().query_row(
            "SELECT lang FROM actors WHERE actor_id = ?1",
            params![actor.0],
            |row| row.get::<_, Option<String>>(0),
        );

        match row {
            Ok(code) => Ok(code.as_deref().and_then(Lang::from_code)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------
    // Admin roster
    // ------------------------------------------------------------------

    pub fn add_admin(&self, actor: ActorId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO admins (actor_id, role, added_at) VALUES (?1, 'admin', ?2)",
            params![actor.0, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Grant (or raise to) the superadmin role.
    pub fn add_superadmin(&self, actor: ActorId) -> Result<()> {
        self.conn().execute(
            "INSERT INTO admins (actor_id, role, added_at) VALUES (?1, 'superadmin', ?2)
             ON CONFLICT(actor_id) DO UPDATE SET role = 'superadmin'",
            params![actor.0, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn is_superadmin(&self, actor: ActorId) -> Result<bool> {
        let exists = self
            .conn()
            .query_row(
                "SELECT 1 FROM admins WHERE actor_id = ?1 AND role = 'superadmin'",
                params![actor.0],
                |_| Ok(()),
            )
            .is_ok();
        Ok(exists)
    }

    pub fn remove_admin(&self, actor: ActorId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM admins WHERE actor_id = ?1", params![actor.0])?;
        Ok(affected > 0)
    }

    pub fn is_admin(&self, actor: ActorId) -> Result<bool> {
        let exists = self
            .conn()
            .query_row(
                "SELECT 1 FROM admins WHERE actor_id = ?1",
                params![actor.0],
                |_| Ok(()),
            )
            .is_ok();
        Ok(exists)
    }

    pub fn list_admins(&self) -> Result<Vec<ActorId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT actor_id FROM admins ORDER BY actor_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut admins = Vec::new();
        for row in rows {
            admins.push(ActorId(row?));
        }
        Ok(admins)
    }

    // ------------------------------------------------------------------
    // Allow-list
    // ------------------------------------------------------------------

    pub fn add_allowed(&self, actor: ActorId, added_by: ActorId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO allowed_actors (actor_id, added_by, added_at)
             VALUES (?1, ?2, ?3)",
            params![actor.0, added_by.0, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn remove_allowed(&self, actor: ActorId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM allowed_actors WHERE actor_id = ?1",
            params![actor.0],
        )?;
        Ok(affected > 0)
    }

    pub fn is_allowed(&self, actor: ActorId) -> Result<bool> {
        let exists = self
            .conn()
            .query_row(
                "SELECT 1 FROM allowed_actors WHERE actor_id = ?1",
                params![actor.0],
                |_| Ok(()),
            )
            .is_ok();
        Ok(exists)
    }

    /// Allow-listed actors added by one admin, newest first.
    pub fn list_allowed_by(&self, admin: ActorId) -> Result<Vec<ActorId>> {
        let mut stmt = self.conn().prepare(
            "SELECT actor_id FROM allowed_actors
             WHERE added_by = ?1
             ORDER BY added_at DESC",
        )?;
        let rows = stmt.query_map(params![admin.0], |row| row.get::<_, i64>(0))?;

        let mut actors = Vec::new();
        for row in rows {
            actors.push(ActorId(row?));
        }
        Ok(actors)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActorProfile> {
    let ts_str: String = row.get(5)?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ActorProfile {
        actor_id: ActorId(row.get(0)?),
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        username: row.get(3)?,
        lang: row.get(4)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_membership_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let a = ActorId(42);

        assert!(!db.is_admin(a).unwrap());
        db.add_admin(a).unwrap();
        db.add_admin(a).unwrap(); // idempotent
        assert!(db.is_admin(a).unwrap());
        assert_eq!(db.list_admins().unwrap(), vec![a]);

        assert!(db.remove_admin(a).unwrap());
        assert!(!db.remove_admin(a).unwrap());
        assert!(!db.is_admin(a).unwrap());
    }

    #[test]
    fn superadmin_is_also_admin() {
        let db = Database::open_in_memory().unwrap();
        let a = ActorId(9);

        db.add_superadmin(a).unwrap();
        assert!(db.is_admin(a).unwrap());
        assert!(db.is_superadmin(a).unwrap());

        // A plain admin grant never lowers an existing superadmin.
        db.add_admin(a).unwrap();
        assert!(db.is_superadmin(a).unwrap());
    }

    #[test]
    fn allow_list_tracks_who_added() {
        let db = Database::open_in_memory().unwrap();
        let admin = ActorId(1);
        db.add_allowed(ActorId(10), admin).unwrap();
        db.add_allowed(ActorId(11), admin).unwrap();
        db.add_allowed(ActorId(12), ActorId(2)).unwrap();

        assert!(db.is_allowed(ActorId(10)).unwrap());
        assert_eq!(db.list_allowed_by(admin).unwrap().len(), 2);
    }

    #[test]
    fn lang_preference_survives_profile_refresh() {
        let db = Database::open_in_memory().unwrap();
        let a = ActorId(5);

        assert_eq!(db.get_lang(a).unwrap(), None);
        db.set_lang(a, Lang::Uk).unwrap();
        db.upsert_actor_profile(a, Some("Ivan"), None, Some("ivan"))
            .unwrap();
        assert_eq!(db.get_lang(a).unwrap(), Some(Lang::Uk));
    }

    #[test]
    fn profile_reads_back_after_contact() {
        let db = Database::open_in_memory().unwrap();
        let a = ActorId(5);

        assert!(db.get_actor_profile(a).unwrap().is_none());
        db.upsert_actor_profile(a, Some("Ivan"), Some("Petrov"), Some("ivan"))
            .unwrap();
        db.set_lang(a, Lang::Uk).unwrap();

        let profile = db.get_actor_profile(a).unwrap().unwrap();
        assert_eq!(profile.actor_id, a);
        assert_eq!(profile.first_name.as_deref(), Some("Ivan"));
        assert_eq!(profile.username.as_deref(), Some("ivan"));
        assert_eq!(profile.lang.as_deref(), Some("uk"));
    }
}
