//! Indexed messages and their subject links.
//!
//! A message record is created once per `(chat_id, platform_message_id)`
//! key.  Links are always replaced wholesale: on first index and on every
//! edit the stored set becomes exactly the freshly extracted one.

use chrono::{DateTime, Utc};
use dossier_shared::{ActorId, ChatId, MediaKind, PlatformMessageId, SubjectGroupId, SubjectToken};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

use crate::database::Database;
use crate::error::Result;
use crate::models::{IndexedMessage, NewMessage};

impl Database {
    /// Idempotently insert a message record and return its insertion id.
    ///
    /// If a record already exists for the `(chat_id, platform_message_id)`
    /// key the insert is a no-op and the existing id is returned.
    pub fn upsert_message(&self, msg: &NewMessage<'_>) -> Result<i64> {
        self.conn().execute(
            "INSERT OR IGNORE INTO messages
                 (chat_id, platform_message_id, sender_id, sender_username,
                  text, media_kind, media_ref, is_forward, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                msg.chat_id.0,
                msg.platform_message_id.0,
                msg.sender_id.map(|a| a.0),
                msg.sender_username,
                msg.text,
                msg.media_kind.code(),
                msg.media_ref,
                msg.is_forward as i64,
                msg.sent_at.to_rfc3339(),
            ],
        )?;

        let id = self.conn().query_row(
            "SELECT id FROM messages WHERE chat_id = ?1 AND platform_message_id = ?2",
            params![msg.chat_id.0, msg.platform_message_id.0],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Look up the insertion id for a tracked message, if any.
    pub fn get_message_record_id(
        &self,
        chat_id: ChatId,
        platform_message_id: PlatformMessageId,
    ) -> Result<Option<i64>> {
        let id = self
            .conn()
            .query_row(
                "SELECT id FROM messages WHERE chat_id = ?1 AND platform_message_id = ?2",
                params![chat_id.0, platform_message_id.0],
                |row| row.get(0),
            )
            .map(Some);

        match id {
            Ok(id) => Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the stored text of a tracked message.
    pub fn update_message_text(&self, record_id: i64, text: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE messages SET text = ?1 WHERE id = ?2",
            params![text, record_id],
        )?;
        Ok(())
    }

    /// Set the subject links of a message to exactly `tokens`.
    ///
    /// Existing links are removed first; this is a full replace, not an
    /// incremental diff.
    pub fn replace_subject_links(&self, record_id: i64, tokens: &[SubjectToken]) -> Result<()> {
        self.conn().execute(
            "DELETE FROM message_subjects WHERE message_id = ?1",
            params![record_id],
        )?;

        let mut stmt = self.conn().prepare(
            "INSERT OR IGNORE INTO message_subjects (message_id, subject_token)
             VALUES (?1, ?2)",
        )?;
        for token in tokens {
            stmt.execute(params![record_id, token.as_str()])?;
        }
        Ok(())
    }

    /// Subject tokens currently linked to a message, for display
    /// highlighting and tests.
    pub fn linked_subjects(&self, record_id: i64) -> Result<Vec<SubjectToken>> {
        let mut stmt = self.conn().prepare(
            "SELECT subject_token FROM message_subjects
             WHERE message_id = ?1
             ORDER BY subject_token ASC",
        )?;

        let rows = stmt.query_map(params![record_id], |row| row.get::<_, String>(0))?;

        let mut tokens = Vec::new();
        for row in rows {
            if let Ok(token) = row?.parse() {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    /// Paginated search by subject token.
    ///
    /// Only messages from currently registered groups are returned,
    /// ordered newest first with the insertion id as a stable tiebreaker.
    pub fn query_by_subject(
        &self,
        token: &SubjectToken,
        limit: u32,
        offset: u32,
        group_filter: Option<&SubjectGroupId>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<IndexedMessage>> {
        let (filter_sql, mut values) = subject_filter(token, group_filter, since);

        let sql = format!(
            "SELECT m.id, m.chat_id, m.platform_message_id, m.sender_id,
                    m.sender_username, m.text, m.media_kind, m.media_ref,
                    m.is_forward, m.sent_at
             FROM messages m
             JOIN message_subjects s ON s.message_id = m.id
             JOIN group_registrations g ON g.chat_id = m.chat_id
             {filter_sql}
             ORDER BY m.sent_at DESC, m.id ASC
             LIMIT ? OFFSET ?"
        );
        values.push(Value::from(limit as i64));
        values.push(Value::from(offset as i64));

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_indexed_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Total number of hits for a subject under the given filters.
    pub fn count_by_subject(
        &self,
        token: &SubjectToken,
        group_filter: Option<&SubjectGroupId>,
        since: Option<DateTime<Utc>>,
    ) -> Result<u32> {
        let (filter_sql, values) = subject_filter(token, group_filter, since);

        let sql = format!(
            "SELECT COUNT(*)
             FROM messages m
             JOIN message_subjects s ON s.message_id = m.id
             JOIN group_registrations g ON g.chat_id = m.chat_id
             {filter_sql}"
        );

        let count: i64 =
            self.conn()
                .query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count as u32)
    }
}

/// WHERE clause and bind values shared by query and count.
fn subject_filter(
    token: &SubjectToken,
    group_filter: Option<&SubjectGroupId>,
    since: Option<DateTime<Utc>>,
) -> (String, Vec<Value>) {
    let mut sql = String::from("WHERE s.subject_token = ?");
    let mut values = vec![Value::from(token.as_str().to_string())];

    if let Some(group) = group_filter {
        sql.push_str(" AND g.subject_group_id = ?");
        values.push(Value::from(group.as_str().to_string()));
    }
    if let Some(since) = since {
        sql.push_str(" AND m.sent_at >= ?");
        values.push(Value::from(since.to_rfc3339()));
    }

    (sql, values)
}

fn row_to_indexed_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexedMessage> {
    let sent_at_str: String = row.get(9)?;
    let sent_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&sent_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let media_code: String = row.get(6)?;

    Ok(IndexedMessage {
        record_id: row.get(0)?,
        chat_id: ChatId(row.get(1)?),
        platform_message_id: PlatformMessageId(row.get(2)?),
        sender_id: row.get::<_, Option<i64>>(3)?.map(ActorId),
        sender_username: row.get(4)?,
        text: row.get(5)?,
        media_kind: MediaKind::from_code(&media_code).unwrap_or_default(),
        media_ref: row.get(7)?,
        is_forward: row.get::<_, i64>(8)? != 0,
        sent_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn token(s: &str) -> SubjectToken {
        s.parse().unwrap()
    }

    fn register(db: &Database, chat: i64, group: &str) {
        db.register_group(
            ChatId(chat),
            "group",
            &group.parse().unwrap(),
            ActorId(1),
            Utc::now(),
        )
        .unwrap();
    }

    fn insert(db: &Database, chat: i64, msg_id: i64, text: &str, sent_at: DateTime<Utc>) -> i64 {
        let id = db
            .upsert_message(&NewMessage {
                chat_id: ChatId(chat),
                platform_message_id: PlatformMessageId(msg_id),
                sender_id: Some(ActorId(7)),
                sender_username: Some("reporter"),
                text,
                media_kind: MediaKind::Text,
                media_ref: None,
                is_forward: false,
                sent_at,
            })
            .unwrap();
        let tokens = dossier_shared::extract_subject_tokens(text);
        db.replace_subject_links(id, &tokens).unwrap();
        id
    }

    #[test]
    fn upsert_is_idempotent_per_key() {
        let db = test_db();
        let now = Utc::now();
        let first = insert(&db, 100, 1, "subject 1234567890", now);
        let second = insert(&db, 100, 1, "different text, ignored", now);
        assert_eq!(first, second);

        // Original text wins; the second insert was a no-op.
        register(&db, 100, "5550001234");
        let hits = db
            .query_by_subject(&token("1234567890"), 5, 0, None, None)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "subject 1234567890");
    }

    #[test]
    fn edit_replaces_links_wholesale() {
        let db = test_db();
        register(&db, 100, "5550001234");
        let id = insert(&db, 100, 1, "1111111111 2222222222", Utc::now());

        // Edit from {A, B} to {B, C}.
        db.update_message_text(id, "2222222222 3333333333").unwrap();
        db.replace_subject_links(
            id,
            &[token("2222222222"), token("3333333333")],
        )
        .unwrap();

        let linked = db.linked_subjects(id).unwrap();
        assert_eq!(linked, vec![token("2222222222"), token("3333333333")]);
        assert_eq!(
            db.count_by_subject(&token("1111111111"), None, None).unwrap(),
            0
        );
    }

    #[test]
    fn pagination_slices_are_contiguous_and_descending() {
        let db = test_db();
        register(&db, 100, "5550001234");
        let base = Utc::now();
        for i in 0..12 {
            insert(
                &db,
                100,
                i,
                "hit 1234567890",
                base - Duration::minutes(i),
            );
        }

        let t = token("1234567890");
        let page1 = db.query_by_subject(&t, 5, 0, None, None).unwrap();
        let page2 = db.query_by_subject(&t, 5, 5, None, None).unwrap();
        let all = db.query_by_subject(&t, 10, 0, None, None).unwrap();

        assert_eq!(page1.len(), 5);
        assert_eq!(page2.len(), 5);

        let concat: Vec<i64> = page1.iter().chain(&page2).map(|m| m.record_id).collect();
        let direct: Vec<i64> = all.iter().map(|m| m.record_id).collect();
        assert_eq!(concat, direct);

        for pair in all.windows(2) {
            assert!(pair[0].sent_at >= pair[1].sent_at);
        }
        assert_eq!(db.count_by_subject(&t, None, None).unwrap(), 12);
    }

    #[test]
    fn group_and_time_filters_narrow_results() {
        let db = test_db();
        register(&db, 100, "5550001234");
        register(&db, 200, "5550009999");
        let now = Utc::now();
        insert(&db, 100, 1, "old 1234567890", now - Duration::hours(30));
        insert(&db, 100, 2, "new 1234567890", now);
        insert(&db, 200, 3, "other group 1234567890", now);

        let t = token("1234567890");
        let group: SubjectGroupId = "5550001234".parse().unwrap();

        assert_eq!(db.count_by_subject(&t, None, None).unwrap(), 3);
        assert_eq!(db.count_by_subject(&t, Some(&group), None).unwrap(), 2);
        assert_eq!(
            db.count_by_subject(&t, Some(&group), Some(now - Duration::hours(24)))
                .unwrap(),
            1
        );
    }

    #[test]
    fn unregistered_chats_are_invisible() {
        let db = test_db();
        insert(&db, 300, 1, "unregistered 1234567890", Utc::now());
        assert_eq!(
            db.count_by_subject(&token("1234567890"), None, None).unwrap(),
            0
        );
    }
}
