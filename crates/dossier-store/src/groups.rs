//! CRUD operations for [`GroupRegistration`] records.

use chrono::{DateTime, Utc};
use dossier_shared::{ActorId, ChatId, SubjectGroupId};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::GroupRegistration;

impl Database {
    /// Register (or re-register) a chat under a subject-group id.
    ///
    /// Re-registering an existing chat replaces its row, refreshing the
    /// title and timestamp.
    pub fn register_group(
        &self,
        chat_id: ChatId,
        title: &str,
        subject_group_id: &SubjectGroupId,
        registered_by: ActorId,
        registered_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO group_registrations
                 (chat_id, title, subject_group_id, registered_by, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                chat_id.0,
                title,
                subject_group_id.as_str(),
                registered_by.0,
                registered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Drop a chat's registration.  Returns `true` if a row was removed.
    pub fn unregister_group(&self, chat_id: ChatId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM group_registrations WHERE chat_id = ?1",
            params![chat_id.0],
        )?;
        Ok(affected > 0)
    }

    /// Fetch the registration for a chat, if any.
    pub fn get_registration(&self, chat_id: ChatId) -> Result<Option<GroupRegistration>> {
        let row = self.conn().query_row(
            "SELECT chat_id, title, subject_group_id, registered_by, registered_at
             FROM group_registrations
             WHERE chat_id = ?1",
            params![chat_id.0],
            row_to_registration,
        );

        match row {
            Ok(reg) => Ok(Some(reg)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a subject-group id to its chat.
    ///
    /// Multiple registrations may share a subject-group id; the most
    /// recently registered chat wins.
    pub fn resolve_group(&self, subject_group_id: &SubjectGroupId) -> Result<GroupRegistration> {
        self.conn()
            .query_row(
                "SELECT chat_id, title, subject_group_id, registered_by, registered_at
                 FROM group_registrations
                 WHERE subject_group_id = ?1
                 ORDER BY registered_at DESC
                 LIMIT 1",
                params![subject_group_id.as_str()],
                row_to_registration,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all registrations, newest first.
    pub fn list_registrations(&self) -> Result<Vec<GroupRegistration>> {
        let mut stmt = self.conn().prepare(
            "SELECT chat_id, title, subject_group_id, registered_by, registered_at
             FROM group_registrations
             ORDER BY registered_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_registration)?;

        let mut regs = Vec::new();
        for row in rows {
            regs.push(row?);
        }
        Ok(regs)
    }

    /// List registrations made by one admin, newest first.
    pub fn list_registrations_by(&self, admin: ActorId) -> Result<Vec<GroupRegistration>> {
        let mut stmt = self.conn().prepare(
            "SELECT chat_id, title, subject_group_id, registered_by, registered_at
             FROM group_registrations
             WHERE registered_by = ?1
             ORDER BY registered_at DESC",
        )?;

        let rows = stmt.query_map(params![admin.0], row_to_registration)?;

        let mut regs = Vec::new();
        for row in rows {
            regs.push(row?);
        }
        Ok(regs)
    }
}

fn row_to_registration(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRegistration> {
    let group_str: String = row.get(2)?;
    let subject_group_id = group_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let ts_str: String = row.get(4)?;
    let registered_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(GroupRegistration {
        chat_id: ChatId(row.get(0)?),
        title: row.get(1)?,
        subject_group_id,
        registered_by: ActorId(row.get(3)?),
        registered_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn resolve_prefers_most_recent_registration() {
        let db = Database::open_in_memory().unwrap();
        let group: SubjectGroupId = "5550001234".parse().unwrap();
        let now = Utc::now();

        db.register_group(ChatId(1), "older", &group, ActorId(1), now - Duration::hours(1))
            .unwrap();
        db.register_group(ChatId(2), "newer", &group, ActorId(1), now)
            .unwrap();

        let resolved = db.resolve_group(&group).unwrap();
        assert_eq!(resolved.chat_id, ChatId(2));
        assert_eq!(resolved.title, "newer");
    }

    #[test]
    fn unknown_group_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let group: SubjectGroupId = "5550001234".parse().unwrap();
        assert!(matches!(db.resolve_group(&group), Err(StoreError::NotFound)));
        assert_eq!(db.get_registration(ChatId(1)).unwrap(), None);
    }

    #[test]
    fn unregister_reports_whether_row_existed() {
        let db = Database::open_in_memory().unwrap();
        let group: SubjectGroupId = "5550001234".parse().unwrap();
        db.register_group(ChatId(1), "g", &group, ActorId(1), Utc::now())
            .unwrap();

        assert!(db.unregister_group(ChatId(1)).unwrap());
        assert!(!db.unregister_group(ChatId(1)).unwrap());
    }
}
