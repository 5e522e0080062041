//! Legend registry: one long-form document per subject-group.
//!
//! Writes go through an equality check first; resubmitting identical
//! content is a no-op with no write and no re-broadcast.  A successful
//! write is broadcast into the owning group and the delivered message
//! reference is stored for later reference.  A failed broadcast is
//! logged and the document is stored without a reference; the write
//! itself never fails because delivery did.

use chrono::{DateTime, Utc};
use dossier_shared::{ChatId, Lang, PlatformMessageId, SubjectGroupId};
use dossier_store::{Database, GroupRegistration, LegendDocument};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::reply::{templates, Outbound, Reply, Transport};

/// Hashtag that turns a group message into a legend submission.
pub const LEGEND_MARKER: &str = "#legend";

/// Outcome of a legend write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegendWrite {
    /// Content identical to the stored document; nothing happened.
    Unchanged,
    /// Document stored; `broadcast_ref` is the delivered group message,
    /// `None` when delivery failed.
    Saved {
        broadcast_ref: Option<PlatformMessageId>,
    },
}

/// Store a legend document and broadcast it into the owning group.
///
/// The database lock is taken twice, once for the equality check and
/// once for the upsert; it is never held across the broadcast send, so
/// a slow delivery cannot stall other actors' store access.
pub async fn write_and_broadcast(
    db: &Mutex<Database>,
    transport: &dyn Transport,
    registration: &GroupRegistration,
    content: &str,
    lang: Lang,
    now: DateTime<Utc>,
) -> Result<LegendWrite> {
    {
        let db = db.lock().await;
        let previous = db.get_legend(&registration.subject_group_id)?;
        if previous.as_ref().map(|l| l.content.as_str()) == Some(content) {
            return Ok(LegendWrite::Unchanged);
        }
    }

    let outbound = Outbound::message(
        registration.chat_id,
        lang,
        Reply::new(templates::LEGEND_BROADCAST)
            .with("group", &registration.subject_group_id)
            .with("content", content),
    );

    let broadcast_ref = match transport.send(outbound).await {
        Ok(message_ref) => Some(message_ref.message_id),
        Err(e) => {
            tracing::warn!(group = %registration.subject_group_id, error = %e, "legend broadcast failed, storing without message reference");
            None
        }
    };

    let db = db.lock().await;
    db.upsert_legend(&LegendDocument {
        subject_group_id: registration.subject_group_id.clone(),
        source_chat_id: registration.chat_id,
        content: content.to_string(),
        source_message_id: broadcast_ref,
        updated_at: now,
    })?;

    Ok(LegendWrite::Saved { broadcast_ref })
}

/// Store a legend authored via the in-group marker hashtag.
///
/// The marker message itself is the document's source; there is no
/// re-broadcast on this path.
pub fn write_from_marker(
    db: &Database,
    group: &SubjectGroupId,
    chat_id: ChatId,
    message_id: PlatformMessageId,
    content: &str,
    now: DateTime<Utc>,
) -> Result<LegendWrite> {
    let previous = db.get_legend(group)?;
    if previous.as_ref().map(|l| l.content.as_str()) == Some(content) {
        return Ok(LegendWrite::Unchanged);
    }

    db.upsert_legend(&LegendDocument {
        subject_group_id: group.clone(),
        source_chat_id: chat_id,
        content: content.to_string(),
        source_message_id: Some(message_id),
        updated_at: now,
    })?;

    Ok(LegendWrite::Saved {
        broadcast_ref: Some(message_id),
    })
}

/// Extract the document body from a marker-tagged message, if the marker
/// is present and the remainder is non-empty.
pub fn marker_content(text: &str) -> Option<String> {
    if !text.contains(LEGEND_MARKER) {
        return None;
    }
    let body = text.replacen(LEGEND_MARKER, "", 1);
    let body = body.trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::{MessageRef, TransportError};
    use async_trait::async_trait;
    use dossier_shared::ActorId;
    use std::sync::Mutex as StdMutex;

    struct FakeTransport {
        sent: StdMutex<Vec<Outbound>>,
        fail: bool,
    }

    impl FakeTransport {
        fn new(fail: bool) -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(
            &self,
            outbound: Outbound,
        ) -> std::result::Result<MessageRef, TransportError> {
            let chat_id = outbound.chat_id;
            let mut sent = self.sent.lock().unwrap();
            sent.push(outbound);
            if self.fail {
                return Err(TransportError::Unavailable("down".into()));
            }
            Ok(MessageRef {
                chat_id,
                message_id: PlatformMessageId(sent.len() as i64),
            })
        }
    }

    fn registration() -> GroupRegistration {
        GroupRegistration {
            chat_id: ChatId(-100),
            title: "squad 5550001234".into(),
            subject_group_id: "5550001234".parse().unwrap(),
            registered_by: ActorId(1),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn identical_resubmission_is_a_silent_no_op() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        let transport = FakeTransport::new(false);
        let reg = registration();
        let now = Utc::now();

        let first = write_and_broadcast(&db, &transport, &reg, "dossier body", Lang::Ru, now)
            .await
            .unwrap();
        assert!(matches!(first, LegendWrite::Saved { broadcast_ref: Some(_) }));

        let second = write_and_broadcast(&db, &transport, &reg, "dossier body", Lang::Ru, now)
            .await
            .unwrap();
        assert_eq!(second, LegendWrite::Unchanged);
        // Exactly one broadcast went out.
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_broadcast_still_stores_the_document() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        let transport = FakeTransport::new(true);
        let reg = registration();

        let write = write_and_broadcast(&db, &transport, &reg, "body", Lang::Ru, Utc::now())
            .await
            .unwrap();
        assert_eq!(write, LegendWrite::Saved { broadcast_ref: None });

        let stored = db
            .lock()
            .await
            .get_legend(&reg.subject_group_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.content, "body");
        assert!(stored.source_message_id.is_none());
    }

    #[test]
    fn marker_path_uses_the_message_itself_as_source() {
        let db = Database::open_in_memory().unwrap();
        let group: SubjectGroupId = "5550001234".parse().unwrap();

        let body = marker_content("#legend the subject runs a storefront").unwrap();
        let write = write_from_marker(
            &db,
            &group,
            ChatId(-100),
            PlatformMessageId(42),
            &body,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            write,
            LegendWrite::Saved {
                broadcast_ref: Some(PlatformMessageId(42))
            }
        );

        let stored = db.get_legend(&group).unwrap().unwrap();
        assert_eq!(stored.source_message_id, Some(PlatformMessageId(42)));

        // Same content from a later message changes nothing.
        let again = write_from_marker(
            &db,
            &group,
            ChatId(-100),
            PlatformMessageId(43),
            &body,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(again, LegendWrite::Unchanged);
        let stored = db.get_legend(&group).unwrap().unwrap();
        assert_eq!(stored.source_message_id, Some(PlatformMessageId(42)));
    }

    #[test]
    fn marker_without_body_is_ignored() {
        assert_eq!(marker_content("#legend   "), None);
        assert_eq!(marker_content("no marker here"), None);
    }
}
