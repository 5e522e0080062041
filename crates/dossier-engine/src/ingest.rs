//! Group-message ingest and edit pipeline.
//!
//! Only registered chats feed the index.  A new message is recorded once
//! per `(chat_id, platform_message_id)` key and linked to every subject
//! token its text carries; a message with no tokens is not recorded at
//! all.  Edits replace the link set wholesale, including down to empty.

use chrono::{DateTime, Utc};
use dossier_shared::{
    extract_subject_tokens, subject_group_from_title, ActorId, ChatId, MediaKind,
    PlatformMessageId, SubjectToken,
};
use dossier_store::{Database, GroupRegistration, NewMessage};

use crate::error::Result;

/// A normalized group post handed to the ingest pipeline.
#[derive(Debug, Clone)]
pub struct InboundPost<'a> {
    pub chat_id: ChatId,
    pub message_id: PlatformMessageId,
    pub sender_id: Option<ActorId>,
    pub sender_username: Option<&'a str>,
    pub text: &'a str,
    pub media_kind: MediaKind,
    pub media_ref: Option<&'a str>,
    pub is_forward: bool,
    pub sent_at: DateTime<Utc>,
}

/// What happened to an inbound group message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The chat is not registered; the message was ignored.
    NotRegistered,
    /// The text carries no subject tokens; nothing was recorded.
    NoTokens,
    /// Recorded and linked.
    Indexed {
        record_id: i64,
        tokens: Vec<SubjectToken>,
    },
}

/// What happened to an edit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edited message was never indexed; the edit is ignored.
    Untracked,
    /// Text and link set replaced.
    Updated { tokens: Vec<SubjectToken> },
}

/// Index one group message.
pub fn index_message(db: &Database, post: &InboundPost<'_>) -> Result<IngestOutcome> {
    if db.get_registration(post.chat_id)?.is_none() {
        return Ok(IngestOutcome::NotRegistered);
    }

    let tokens = extract_subject_tokens(post.text);
    if tokens.is_empty() {
        return Ok(IngestOutcome::NoTokens);
    }

    let record_id = db.upsert_message(&NewMessage {
        chat_id: post.chat_id,
        platform_message_id: post.message_id,
        sender_id: post.sender_id,
        sender_username: post.sender_username,
        text: post.text,
        media_kind: post.media_kind,
        media_ref: post.media_ref,
        is_forward: post.is_forward,
        sent_at: post.sent_at,
    })?;
    db.replace_subject_links(record_id, &tokens)?;

    tracing::debug!(chat = %post.chat_id, record_id, tokens = tokens.len(), "message indexed");
    Ok(IngestOutcome::Indexed { record_id, tokens })
}

/// Apply an edit to a previously indexed message.
///
/// The stored link set becomes exactly the extracted set of the new
/// text; a search for a token only the old text carried finds nothing
/// afterwards.
pub fn apply_edit(
    db: &Database,
    chat_id: ChatId,
    message_id: PlatformMessageId,
    new_text: &str,
) -> Result<EditOutcome> {
    let Some(record_id) = db.get_message_record_id(chat_id, message_id)? else {
        return Ok(EditOutcome::Untracked);
    };

    let tokens = extract_subject_tokens(new_text);
    db.update_message_text(record_id, new_text)?;
    db.replace_subject_links(record_id, &tokens)?;
    Ok(EditOutcome::Updated { tokens })
}

/// Register a chat from its title when the service account is added.
///
/// The first bounded 10-digit run in the title becomes the subject-group
/// id; a title without one leaves the chat unregistered.
pub fn register_from_title(
    db: &Database,
    chat_id: ChatId,
    title: &str,
    added_by: ActorId,
    now: DateTime<Utc>,
) -> Result<Option<GroupRegistration>> {
    let Some(group) = subject_group_from_title(title) else {
        tracing::info!(chat = %chat_id, title, "added to a chat without a subject-group id in the title");
        return Ok(None);
    };

    db.register_group(chat_id, title, &group, added_by, now)?;
    db.log_audit(added_by, "group.auto_register", group.as_str(), title)?;
    tracing::info!(chat = %chat_id, group = %group, "chat auto-registered from title");

    Ok(db.get_registration(chat_id)?)
}
