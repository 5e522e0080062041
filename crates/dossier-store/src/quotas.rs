//! Guard state: quota events, spacing stamps and temporary bans.
//!
//! Quota counters are logically windowed: nothing is ever expired, the
//! guard simply counts events with `created_at` inside the trailing
//! window.  The same rows double as the actor's query history.

use chrono::{DateTime, Utc};
use dossier_shared::{ActorId, QuotaKind};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::QuotaEvent;

impl Database {
    /// Record one gated action.
    pub fn record_quota_event(
        &self,
        actor: ActorId,
        kind: QuotaKind,
        detail: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO quota_events (actor_id, kind, detail, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![actor.0, kind.code(), detail, at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Count an actor's events of `kind` with timestamp at or after `since`.
    pub fn count_quota_events(
        &self,
        actor: ActorId,
        kind: QuotaKind,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM quota_events
             WHERE actor_id = ?1 AND kind = ?2 AND created_at >= ?3",
            params![actor.0, kind.code(), since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// The actor's most recent gated actions, newest first.
    pub fn recent_quota_events(&self, actor: ActorId, limit: u32) -> Result<Vec<QuotaEvent>> {
        let mut stmt = self.conn().prepare(
            "SELECT kind, detail, created_at FROM quota_events
             WHERE actor_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![actor.0, limit], |row| {
            let kind_code: String = row.get(0)?;
            let detail: Option<String> = row.get(1)?;
            let ts_str: String = row.get(2)?;
            Ok((kind_code, detail, ts_str))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (kind_code, detail, ts_str) = row?;
            let Some(kind) = QuotaKind::from_code(&kind_code) else {
                continue;
            };
            let created_at = DateTime::parse_from_rfc3339(&ts_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(crate::error::StoreError::ChronoParse)?;
            events.push(QuotaEvent {
                kind,
                detail,
                created_at,
            });
        }
        Ok(events)
    }

    // ------------------------------------------------------------------
    // Spacing stamps
    // ------------------------------------------------------------------

    /// Timestamp of the actor's last gated action of any kind.
    pub fn last_action_at(&self, actor: ActorId) -> Result<Option<DateTime<Utc>>> {
        let row = self.conn().query_row(
            "SELECT last_action_at FROM action_stamps WHERE actor_id = ?1",
            params![actor.0],
            |row| row.get::<_, String>(0),
        );

        match row {
            Ok(ts_str) => {
                let ts = DateTime::parse_from_rfc3339(&ts_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(crate::error::StoreError::ChronoParse)?;
                Ok(Some(ts))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn stamp_action(&self, actor: ActorId, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO action_stamps (actor_id, last_action_at)
             VALUES (?1, ?2)",
            params![actor.0, at.to_rfc3339()],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bans
    // ------------------------------------------------------------------

    /// The raw ban expiry, regardless of whether it has passed.
    /// Expiry is lazy: callers compare against their own `now`.
    pub fn get_ban(&self, actor: ActorId) -> Result<Option<DateTime<Utc>>> {
        let row = self.conn().query_row(
            "SELECT until FROM bans WHERE actor_id = ?1",
            params![actor.0],
            |row| row.get::<_, String>(0),
        );

        match row {
            Ok(ts_str) => {
                let ts = DateTime::parse_from_rfc3339(&ts_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(crate::error::StoreError::ChronoParse)?;
                Ok(Some(ts))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_ban(&self, actor: ActorId, until: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO bans (actor_id, until) VALUES (?1, ?2)",
            params![actor.0, until.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn quota_window_counts_only_recent_events() {
        let db = Database::open_in_memory().unwrap();
        let a = ActorId(1);
        let now = Utc::now();

        db.record_quota_event(a, QuotaKind::Search, Some("1234567890"), now - Duration::hours(25))
            .unwrap();
        db.record_quota_event(a, QuotaKind::Search, Some("1234567890"), now - Duration::hours(1))
            .unwrap();
        db.record_quota_event(a, QuotaKind::ReportSend, None, now)
            .unwrap();

        let since = now - Duration::hours(24);
        assert_eq!(db.count_quota_events(a, QuotaKind::Search, since).unwrap(), 1);
        assert_eq!(
            db.count_quota_events(a, QuotaKind::ReportSend, since).unwrap(),
            1
        );
        // The stale event is still visible with a wider window.
        assert_eq!(
            db.count_quota_events(a, QuotaKind::Search, now - Duration::hours(48))
                .unwrap(),
            2
        );
    }

    #[test]
    fn recent_events_serve_as_history() {
        let db = Database::open_in_memory().unwrap();
        let a = ActorId(1);
        let now = Utc::now();
        for i in 0..4 {
            db.record_quota_event(
                a,
                QuotaKind::Search,
                Some(&format!("111111111{i}")),
                now - Duration::minutes(4 - i),
            )
            .unwrap();
        }

        let recent = db.recent_quota_events(a, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].detail.as_deref(), Some("1111111113"));
    }

    #[test]
    fn ban_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let a = ActorId(1);
        assert_eq!(db.get_ban(a).unwrap(), None);

        let until = Utc::now() + Duration::minutes(15);
        db.set_ban(a, until).unwrap();
        let stored = db.get_ban(a).unwrap().unwrap();
        assert!((stored - until).num_seconds().abs() <= 1);
    }

    #[test]
    fn spacing_stamp_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let a = ActorId(1);
        assert_eq!(db.last_action_at(a).unwrap(), None);

        let now = Utc::now();
        db.stamp_action(a, now).unwrap();
        assert!(db.last_action_at(a).unwrap().is_some());
    }
}
