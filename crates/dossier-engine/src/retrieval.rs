//! Paginated subject retrieval.
//!
//! A search runs against the store with the page geometry fixed at five
//! hits.  The page result carries pre-encoded continuation payloads so
//! the router only has to attach them as controls; nothing about the
//! pagination position is held in the session.

use chrono::{DateTime, Duration, Utc};
use dossier_shared::{Cursor, SubjectGroupId, SubjectToken, TimeFilter};
use dossier_store::{Database, IndexedMessage};

use crate::error::Result;

pub const PAGE_SIZE: u32 = 5;

/// One retrieval request, fully described by its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub subject: SubjectToken,
    pub offset: u32,
    pub group_filter: Option<SubjectGroupId>,
    pub time_filter: TimeFilter,
    /// Whether the resulting page offers filter-change controls.
    pub with_filter_controls: bool,
}

impl SearchQuery {
    /// A fresh unfiltered search from the first page.
    pub fn fresh(subject: SubjectToken) -> Self {
        Self {
            subject,
            offset: 0,
            group_filter: None,
            time_filter: TimeFilter::All,
            with_filter_controls: true,
        }
    }
}

/// One page of results plus the continuation payloads for its controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub messages: Vec<IndexedMessage>,
    pub total: u32,
    /// The offset actually served, after any stale-cursor reset.
    pub offset: u32,
    /// Encoded cursor for the next page, when one exists.
    pub more_payload: Option<String>,
    /// Encoded cursor re-entering filter selection, when offered.
    pub filter_payload: Option<String>,
}

impl SearchPage {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Execute one search query against the store.
///
/// A cursor can outlive the data it pointed at; an offset at or past the
/// current total snaps back to the first page rather than serving an
/// empty tail.
pub fn run_search(db: &Database, query: &SearchQuery, now: DateTime<Utc>) -> Result<SearchPage> {
    let since = match query.time_filter {
        TimeFilter::All => None,
        TimeFilter::Last24h => Some(now - Duration::hours(24)),
    };

    let total = db.count_by_subject(&query.subject, query.group_filter.as_ref(), since)?;

    let mut offset = query.offset;
    if offset >= total {
        if offset > 0 {
            tracing::debug!(subject = %query.subject, offset, total, "stale cursor offset, resetting to first page");
        }
        offset = 0;
    }

    let messages = db.query_by_subject(
        &query.subject,
        PAGE_SIZE,
        offset,
        query.group_filter.as_ref(),
        since,
    )?;

    let next_offset = offset + messages.len() as u32;
    let more_payload = (next_offset < total).then(|| {
        Cursor::More {
            subject: query.subject.clone(),
            offset: next_offset,
            group_filter: query.group_filter.clone(),
            time_filter: query.time_filter,
            with_filter_controls: query.with_filter_controls,
        }
        .encode()
    });

    let filter_payload = (query.with_filter_controls && total > 0).then(|| {
        Cursor::Filter {
            subject: query.subject.clone(),
            group_filter: query.group_filter.clone(),
            time_filter: query.time_filter,
        }
        .encode()
    });

    Ok(SearchPage {
        messages,
        total,
        offset,
        more_payload,
        filter_payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_shared::{ActorId, ChatId, MediaKind, PlatformMessageId};
    use dossier_store::NewMessage;

    fn seed(db: &Database, count: i64) {
        db.register_group(
            ChatId(100),
            "group",
            &"5550001234".parse().unwrap(),
            ActorId(1),
            Utc::now(),
        )
        .unwrap();
        let base = Utc::now();
        for i in 0..count {
            let id = db
                .upsert_message(&NewMessage {
                    chat_id: ChatId(100),
                    platform_message_id: PlatformMessageId(i),
                    sender_id: Some(ActorId(7)),
                    sender_username: None,
                    text: "hit 1234567890",
                    media_kind: MediaKind::Text,
                    media_ref: None,
                    is_forward: false,
                    sent_at: base - Duration::minutes(i),
                })
                .unwrap();
            db.replace_subject_links(id, &["1234567890".parse().unwrap()])
                .unwrap();
        }
    }

    fn query() -> SearchQuery {
        SearchQuery::fresh("1234567890".parse().unwrap())
    }

    #[test]
    fn last_page_has_no_more_control() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 7);

        let page = run_search(&db, &query(), Utc::now()).unwrap();
        assert_eq!(page.messages.len(), 5);
        assert_eq!(page.total, 7);
        let more = page.more_payload.expect("first page continues");
        assert_eq!(more, "more:1234567890:5:-:all:1");

        let page = run_search(
            &db,
            &SearchQuery {
                offset: 5,
                ..query()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(page.messages.len(), 2);
        assert!(page.more_payload.is_none());
    }

    #[test]
    fn stale_offset_resets_to_first_page() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 3);

        let page = run_search(
            &db,
            &SearchQuery {
                offset: 40,
                ..query()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(page.offset, 0);
        assert_eq!(page.messages.len(), 3);
    }

    #[test]
    fn guest_pages_omit_filter_controls() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 7);

        let page = run_search(
            &db,
            &SearchQuery {
                group_filter: Some("5550001234".parse().unwrap()),
                with_filter_controls: false,
                ..query()
            },
            Utc::now(),
        )
        .unwrap();
        assert!(page.filter_payload.is_none());
        // The continuation preserves the reduced surface.
        assert_eq!(
            page.more_payload.unwrap(),
            "more:1234567890:5:5550001234:all:0"
        );
    }

    #[test]
    fn empty_result_offers_no_controls() {
        let db = Database::open_in_memory().unwrap();
        let page = run_search(&db, &query(), Utc::now()).unwrap();
        assert!(page.is_empty());
        assert!(page.more_payload.is_none());
        assert!(page.filter_payload.is_none());
    }
}
