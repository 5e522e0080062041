//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the API layer.

use chrono::{DateTime, Utc};
use dossier_shared::{ActorId, ChatId, MediaKind, PlatformMessageId, QuotaKind, SubjectGroupId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Actor profile
// ---------------------------------------------------------------------------

/// Profile row for an actor.  Role tiers live in separate membership
/// tables; an actor row is never deleted, only its tier membership changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorProfile {
    pub actor_id: ActorId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    /// Stored language code, `None` until the actor picks one.
    pub lang: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Group registration
// ---------------------------------------------------------------------------

/// A chat registered for indexing under a subject-group id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRegistration {
    pub chat_id: ChatId,
    pub title: String,
    pub subject_group_id: SubjectGroupId,
    pub registered_by: ActorId,
    pub registered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Indexed message
// ---------------------------------------------------------------------------

/// An indexed message as returned by subject queries.
///
/// `record_id` is the stable insertion id used as the pagination
/// tiebreaker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexedMessage {
    pub record_id: i64,
    pub chat_id: ChatId,
    pub platform_message_id: PlatformMessageId,
    pub sender_id: Option<ActorId>,
    pub sender_username: Option<String>,
    pub text: String,
    pub media_kind: MediaKind,
    pub media_ref: Option<String>,
    pub is_forward: bool,
    pub sent_at: DateTime<Utc>,
}

/// Attributes for inserting a new message record.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub chat_id: ChatId,
    pub platform_message_id: PlatformMessageId,
    pub sender_id: Option<ActorId>,
    pub sender_username: Option<&'a str>,
    pub text: &'a str,
    pub media_kind: MediaKind,
    pub media_ref: Option<&'a str>,
    pub is_forward: bool,
    pub sent_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Legend document
// ---------------------------------------------------------------------------

/// The canonical long-form note for a subject-group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegendDocument {
    pub subject_group_id: SubjectGroupId,
    pub source_chat_id: ChatId,
    pub content: String,
    /// Platform id of the last broadcast of this document, used for
    /// future updates.
    pub source_message_id: Option<PlatformMessageId>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Quota event
// ---------------------------------------------------------------------------

/// A recorded gated action, also serving as the actor's query history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaEvent {
    pub kind: QuotaKind,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}
