//! Append-only audit trail for privileged and gated operations.

use chrono::Utc;
use dossier_shared::ActorId;
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn log_audit(&self, actor: ActorId, action: &str, target: &str, details: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO audit_log (actor_id, action, target, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![actor.0, action, target, details, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    #[cfg(test)]
    fn count_audit_entries(&self, action: &str) -> Result<u32> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM audit_log WHERE action = ?1",
            params![action],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_entries_accumulate() {
        let db = Database::open_in_memory().unwrap();
        db.log_audit(ActorId(1), "add_admin", "42", "").unwrap();
        db.log_audit(ActorId(1), "add_admin", "43", "by owner").unwrap();
        assert_eq!(db.count_audit_entries("add_admin").unwrap(), 2);
    }
}
