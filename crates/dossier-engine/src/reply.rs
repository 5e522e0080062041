//! Outbound reply model and the transport seam.
//!
//! The engine never emits literal user-facing strings.  Every reply is a
//! phrasebook template key plus named parameters; the transport adapter
//! owns localization content and menu rendering.  Interactive controls
//! carry an opaque payload (a continuation cursor) that the transport
//! echoes back verbatim when activated.

use async_trait::async_trait;
use dossier_shared::{ChatId, Lang, PlatformMessageId};
use serde::{Deserialize, Serialize};

/// Phrasebook template key.
pub type TemplateKey = &'static str;

/// Template keys understood by the phrasebook.
pub mod templates {
    use super::TemplateKey;

    pub const START: TemplateKey = "start";
    pub const LANG_SET: TemplateKey = "lang.set";
    pub const UNKNOWN_INPUT: TemplateKey = "unknown_input";

    pub const MENU_ROOT: TemplateKey = "menu.root";
    pub const MENU_ADMIN: TemplateKey = "menu.admin";
    pub const MENU_ADMIN_ACTORS: TemplateKey = "menu.admin.actors";
    pub const MENU_ADMIN_GROUPS: TemplateKey = "menu.admin.groups";
    pub const MENU_ADMIN_STATS: TemplateKey = "menu.admin.stats";

    pub const ADMIN_ONLY: TemplateKey = "denied.admin_only";
    pub const SUPERADMIN_ONLY: TemplateKey = "denied.superadmin_only";
    pub const NOT_AUTHORIZED: TemplateKey = "denied.not_authorized";

    pub const BANNED: TemplateKey = "guard.banned";
    pub const RATE_LIMITED: TemplateKey = "guard.rate_limited";
    pub const QUOTA_EXCEEDED: TemplateKey = "guard.quota_exceeded";

    pub const SEARCH_PROMPT: TemplateKey = "search.prompt";
    pub const SEARCH_NOT_FOUND: TemplateKey = "search.not_found";
    pub const SEARCH_PAGE: TemplateKey = "search.page";
    pub const SEARCH_MORE: TemplateKey = "search.more";
    pub const SEARCH_CHANGE_FILTER: TemplateKey = "search.change_filter";
    pub const SEARCH_FILTER_GROUP_PROMPT: TemplateKey = "search.filter.group_prompt";
    pub const SEARCH_FILTER_TIME_PROMPT: TemplateKey = "search.filter.time_prompt";
    pub const SEARCH_FILTER_BAD_GROUP: TemplateKey = "search.filter.bad_group";
    pub const SEARCH_FILTER_BAD_TIME: TemplateKey = "search.filter.bad_time";

    pub const GUEST_GROUP_PROMPT: TemplateKey = "guest.group_prompt";
    pub const GUEST_SUBJECT_PROMPT: TemplateKey = "guest.subject_prompt";
    pub const GUEST_BAD_GROUP: TemplateKey = "guest.bad_group";
    pub const GUEST_BAD_SUBJECT: TemplateKey = "guest.bad_subject";
    pub const GUEST_USE_PAIR_ENTRY: TemplateKey = "guest.use_pair_entry";

    pub const REPORT_GROUP_PROMPT: TemplateKey = "report.group_prompt";
    pub const REPORT_TEXT_PROMPT: TemplateKey = "report.text_prompt";
    pub const REPORT_BAD_GROUP: TemplateKey = "report.bad_group";
    pub const REPORT_EMPTY_TEXT: TemplateKey = "report.empty_text";
    pub const REPORT_GROUP_UNKNOWN: TemplateKey = "report.group_unknown";
    pub const REPORT_SENT: TemplateKey = "report.sent";
    pub const REPORT_BODY: TemplateKey = "report.body";

    pub const LEGEND_GROUP_PROMPT: TemplateKey = "legend.group_prompt";
    pub const LEGEND_CONTENT_PROMPT: TemplateKey = "legend.content_prompt";
    pub const LEGEND_BAD_GROUP: TemplateKey = "legend.bad_group";
    pub const LEGEND_GROUP_UNKNOWN: TemplateKey = "legend.group_unknown";
    pub const LEGEND_EMPTY_CONTENT: TemplateKey = "legend.empty_content";
    pub const LEGEND_VIEW: TemplateKey = "legend.view";
    pub const LEGEND_NOT_FOUND: TemplateKey = "legend.not_found";
    pub const LEGEND_ALREADY_EXISTS: TemplateKey = "legend.already_exists";
    pub const LEGEND_UNCHANGED: TemplateKey = "legend.unchanged";
    pub const LEGEND_SAVED: TemplateKey = "legend.saved";
    pub const LEGEND_BROADCAST: TemplateKey = "legend.broadcast";

    pub const GROUP_REGISTERED: TemplateKey = "group.registered";
    pub const GROUP_UNREGISTERED: TemplateKey = "group.unregistered";
    pub const GROUP_TITLE_NO_ID: TemplateKey = "group.title_no_id";

    pub const ROLE_PROMPT_ID: TemplateKey = "role.prompt_id";
    pub const ROLE_ADMIN_ADDED: TemplateKey = "role.admin_added";
    pub const ROLE_ADMIN_REMOVED: TemplateKey = "role.admin_removed";
    pub const ROLE_ALLOWED_ADDED: TemplateKey = "role.allowed_added";
    pub const ROLE_ALLOWED_REMOVED: TemplateKey = "role.allowed_removed";
    pub const ROLE_BAD_ID: TemplateKey = "role.bad_id";

    pub const MY_QUERIES: TemplateKey = "my_queries";
    pub const MY_QUERIES_EMPTY: TemplateKey = "my_queries.empty";
    pub const STATS_SUMMARY: TemplateKey = "stats.summary";
}

/// A template key with named parameters, to be rendered by the
/// phrasebook on the transport side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reply {
    pub template: String,
    pub params: Vec<(String, String)>,
}

impl Reply {
    pub fn new(template: TemplateKey) -> Self {
        Self {
            template: template.to_string(),
            params: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }
}

/// An interactive control attached to a message.  `payload` is echoed
/// back verbatim by the transport when the control is activated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Control {
    pub label: String,
    pub payload: String,
}

/// One outbound action for the transport to perform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundKind {
    /// Rendered phrasebook message, optionally with controls and a menu.
    Message {
        reply: Reply,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        controls: Vec<Control>,
    },
    /// Re-deliver an indexed message into `chat_id` by reference.
    /// `fallback_text` is sent as plain text when the copy fails.
    CopyMessage {
        from_chat: ChatId,
        message_id: PlatformMessageId,
        fallback_text: String,
    },
}

/// A complete outbound instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outbound {
    pub chat_id: ChatId,
    pub lang: Lang,
    #[serde(flatten)]
    pub kind: OutboundKind,
}

impl Outbound {
    pub fn message(chat_id: ChatId, lang: Lang, reply: Reply) -> Self {
        Self {
            chat_id,
            lang,
            kind: OutboundKind::Message {
                reply,
                controls: Vec::new(),
            },
        }
    }

    pub fn with_control(mut self, label: TemplateKey, payload: String) -> Self {
        if let OutboundKind::Message { controls, .. } = &mut self.kind {
            controls.push(Control {
                label: label.to_string(),
                payload,
            });
        }
        self
    }
}

/// Reference to a delivered message, as reported by the transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: PlatformMessageId,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The chat rejected the delivery (bot blocked, chat deleted).
    #[error("delivery rejected: {0}")]
    Rejected(String),

    /// The transport itself failed (network, adapter down).
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Outbound delivery seam.
///
/// Implementations must be cheap to call concurrently; the engine never
/// holds a per-actor session lock across a send longer than necessary.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one outbound action, returning a reference to the message
    /// the platform created.
    async fn send(&self, outbound: Outbound) -> std::result::Result<MessageRef, TransportError>;
}
