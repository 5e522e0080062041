//! CRUD operations for [`LegendDocument`] records.
//!
//! At most one row exists per subject-group id (upsert semantics).

use chrono::{DateTime, Utc};
use dossier_shared::{ChatId, PlatformMessageId, SubjectGroupId};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::LegendDocument;

impl Database {
    pub fn get_legend(&self, group: &SubjectGroupId) -> Result<Option<LegendDocument>> {
        let row = self.conn().query_row(
            "SELECT subject_group_id, source_chat_id, content, source_message_id, updated_at
             FROM legends
             WHERE subject_group_id = ?1",
            params![group.as_str()],
            row_to_legend,
        );

        match row {
            Ok(legend) => Ok(Some(legend)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn upsert_legend(&self, legend: &LegendDocument) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO legends
                 (subject_group_id, source_chat_id, content, source_message_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                legend.subject_group_id.as_str(),
                legend.source_chat_id.0,
                legend.content,
                legend.source_message_id.map(|m| m.0),
                legend.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn row_to_legend(row: &rusqlite::Row<'_>) -> rusqlite::Result<LegendDocument> {
    let group_str: String = row.get(0)?;
    let subject_group_id = group_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let ts_str: String = row.get(4)?;
    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(LegendDocument {
        subject_group_id,
        source_chat_id: ChatId(row.get(1)?),
        content: row.get(2)?,
        source_message_id: row.get::<_, Option<i64>>(3)?.map(PlatformMessageId),
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_one_row_per_group() {
        let db = Database::open_in_memory().unwrap();
        let group: SubjectGroupId = "5550001234".parse().unwrap();

        let first = LegendDocument {
            subject_group_id: group.clone(),
            source_chat_id: ChatId(100),
            content: "v1".into(),
            source_message_id: Some(PlatformMessageId(7)),
            updated_at: Utc::now(),
        };
        db.upsert_legend(&first).unwrap();

        let second = LegendDocument {
            content: "v2".into(),
            source_message_id: Some(PlatformMessageId(8)),
            ..first
        };
        db.upsert_legend(&second).unwrap();

        let stored = db.get_legend(&group).unwrap().unwrap();
        assert_eq!(stored.content, "v2");
        assert_eq!(stored.source_message_id, Some(PlatformMessageId(8)));
    }

    #[test]
    fn missing_legend_is_none() {
        let db = Database::open_in_memory().unwrap();
        let group: SubjectGroupId = "5550001234".parse().unwrap();
        assert!(db.get_legend(&group).unwrap().is_none());
    }
}
