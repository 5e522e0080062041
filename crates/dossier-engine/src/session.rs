//! Per-actor conversation sessions.
//!
//! One [`ConversationSession`] aggregate per actor holds the navigation
//! stack, the single active flow and any pending privileged input.  The
//! store is a map of per-actor locks behind one outer lock: the outer
//! lock is held only long enough to clone the per-actor `Arc`, so updates
//! from different actors proceed concurrently while updates from the
//! same actor serialize on the inner lock.

use std::collections::HashMap;
use std::sync::Arc;

use dossier_shared::ActorId;
use tokio::sync::Mutex;

use crate::flow::Flow;

/// Navigation screens (breadcrumbs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Screen {
    #[default]
    Root,
    Admin,
    AdminActors,
    AdminGroups,
    AdminStats,
}

/// A privileged input the actor was asked for (role management).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAdminAction {
    AddAdmin,
    RemoveAdmin,
    AddAllowed,
    RemoveAllowed,
}

/// All per-actor conversational state, consolidated in one aggregate.
#[derive(Debug, Default)]
pub struct ConversationSession {
    stack: Vec<Screen>,
    current: Screen,
    flow: Option<Flow>,
    pending_admin: Option<PendingAdminAction>,
}

impl ConversationSession {
    pub fn current_screen(&self) -> Screen {
        self.current
    }

    /// Push the current screen onto the stack and navigate to `screen`.
    /// Always succeeds.
    pub fn push_screen(&mut self, screen: Screen) {
        self.stack.push(self.current);
        self.current = screen;
    }

    /// Navigate back.  An empty stack falls through to the root screen;
    /// this never errors.
    pub fn pop_screen(&mut self) -> Screen {
        self.current = self.stack.pop().unwrap_or(Screen::Root);
        self.current
    }

    /// Reset navigation to the root screen, clearing the stack.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.current = Screen::Root;
        self.flow = None;
        self.pending_admin = None;
    }

    /// Activate `flow`, unconditionally replacing any active flow of any
    /// type.  Last writer wins by design; there is no queuing and no
    /// confirmation.
    pub fn start_flow(&mut self, flow: Flow) {
        self.flow = Some(flow);
    }

    /// Clear the active flow (explicit back-navigation).
    pub fn cancel_flow(&mut self) {
        self.flow = None;
    }

    pub fn flow(&self) -> Option<&Flow> {
        self.flow.as_ref()
    }

    pub fn set_pending_admin(&mut self, action: PendingAdminAction) {
        self.pending_admin = Some(action);
    }

    /// Consume the pending privileged input request, if any.
    pub fn take_pending_admin(&mut self) -> Option<PendingAdminAction> {
        self.pending_admin.take()
    }
}

/// Concurrent session map, keyed by actor.
///
/// Ephemeral by design: sessions live in memory only and are lost on
/// restart.  Abandoned flows have no timeout; they stay dormant until
/// overwritten or cancelled, which is acceptable because the state is
/// small and bounded.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<ActorId, Arc<Mutex<ConversationSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the session handle for an actor.
    ///
    /// Callers lock the returned handle for the full handling of one
    /// inbound update, which is what serializes same-actor updates.
    pub async fn session(&self, actor: ActorId) -> Arc<Mutex<ConversationSession>> {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(actor).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{GuestPairFlow, GuestStage, ReportFlow, ReportStage};

    #[test]
    fn pop_on_empty_stack_defaults_to_root() {
        let mut session = ConversationSession::default();
        assert_eq!(session.pop_screen(), Screen::Root);

        session.push_screen(Screen::Admin);
        session.push_screen(Screen::AdminActors);
        assert_eq!(session.pop_screen(), Screen::Admin);
        assert_eq!(session.pop_screen(), Screen::Root);
        assert_eq!(session.pop_screen(), Screen::Root);
    }

    #[test]
    fn starting_a_flow_replaces_any_active_flow() {
        let mut session = ConversationSession::default();
        session.start_flow(Flow::Report(ReportFlow {
            stage: ReportStage::AwaitGroup,
        }));
        session.start_flow(Flow::GuestPair(GuestPairFlow {
            stage: GuestStage::AwaitGroup,
        }));

        // Exactly the newer flow is active.
        assert!(matches!(session.flow(), Some(Flow::GuestPair(_))));

        session.cancel_flow();
        assert!(session.flow().is_none());
    }

    #[tokio::test]
    async fn sessions_are_per_actor() {
        let store = SessionStore::new();
        let a = store.session(ActorId(1)).await;
        let b = store.session(ActorId(2)).await;
        let a_again = store.session(ActorId(1)).await;

        assert!(Arc::ptr_eq(&a, &a_again));
        assert!(!Arc::ptr_eq(&a, &b));

        a.lock().await.push_screen(Screen::Admin);
        assert_eq!(b.lock().await.current_screen(), Screen::Root);
        assert_eq!(a_again.lock().await.current_screen(), Screen::Admin);
    }
}
