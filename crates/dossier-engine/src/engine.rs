//! The inbound update router.
//!
//! `Engine::handle_update` is the single entry point: it resolves the
//! actor's role and language, gates the action through the guard, then
//! advances flows and executes retrieval, legend and admin operations.
//! The per-actor session lock is held for the whole handling of one
//! private update, which serializes same-actor updates while letting
//! distinct actors proceed concurrently.

use std::sync::Arc;

use chrono::Utc;
use dossier_shared::{ActorId, ChatId, Cursor, Lang, QuotaKind, RoleTier, SubjectToken};
use dossier_store::{Database, StoreError};
use tokio::sync::Mutex;

use crate::directory::ActorDirectory;
use crate::error::Result;
use crate::flow::{
    Flow, FlowAction, FlowStep, GuestPairFlow, GuestStage, LegendFlow, LegendMode, LegendStage,
    ReportFlow, ReportStage, SearchFilterFlow, SearchFilterStage,
};
use crate::guard::{Guard, GuardConfig, Verdict};
use crate::ingest::{self, InboundPost};
use crate::legend::{self, LegendWrite};
use crate::reply::{templates, Outbound, OutboundKind, Reply, TemplateKey, Transport};
use crate::retrieval::{run_search, SearchPage, SearchQuery};
use crate::session::{ConversationSession, PendingAdminAction, Screen, SessionStore};
use crate::update::{ActorInfo, InboundUpdate};

/// Static engine configuration; everything else is tuned through the
/// settings table.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub owner: ActorId,
    /// Treat every actor without an explicit role as `Allowed`.
    pub public_open: bool,
    pub default_lang: Lang,
}

pub struct Engine {
    db: Arc<Mutex<Database>>,
    sessions: SessionStore,
    transport: Arc<dyn Transport>,
    directory: ActorDirectory,
    guard: Guard,
    default_lang: Lang,
}

impl Engine {
    pub fn new(db: Database, transport: Arc<dyn Transport>, config: EngineConfig) -> Result<Self> {
        let guard = Guard::new(GuardConfig::load(&db)?);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            sessions: SessionStore::new(),
            transport,
            directory: ActorDirectory::new(config.owner, config.public_open, config.default_lang),
            guard,
            default_lang: config.default_lang,
        })
    }

    /// Handle one normalized inbound update.
    pub async fn handle_update(&self, update: InboundUpdate) -> Result<()> {
        match update {
            InboundUpdate::PrivateMessage {
                actor,
                chat_id,
                text,
                ..
            } => self.handle_private(actor, chat_id, &text).await,
            InboundUpdate::GroupMessage {
                chat_id,
                chat_title,
                message_id,
                sender,
                text,
                media_kind,
                media_ref,
                is_forward,
                sent_at,
            } => {
                let post = InboundPost {
                    chat_id,
                    message_id,
                    sender_id: sender.as_ref().map(|s| s.id),
                    sender_username: sender.as_ref().and_then(|s| s.username.as_deref()),
                    text: &text,
                    media_kind,
                    media_ref: media_ref.as_deref(),
                    is_forward,
                    sent_at,
                };
                self.handle_group_message(&chat_title, sender.as_ref(), &post)
                    .await
            }
            InboundUpdate::EditedGroupMessage {
                chat_id,
                message_id,
                text,
            } => {
                let db = self.db.lock().await;
                ingest::apply_edit(&db, chat_id, message_id, &text)?;
                Ok(())
            }
            InboundUpdate::ControlActivated {
                actor,
                chat_id,
                payload,
            } => self.handle_control(actor, chat_id, &payload).await,
            InboundUpdate::BotAdded {
                chat_id,
                chat_title,
                added_by,
            } => {
                let reply = {
                    let db = self.db.lock().await;
                    match ingest::register_from_title(
                        &db,
                        chat_id,
                        &chat_title,
                        added_by.id,
                        Utc::now(),
                    )? {
                        Some(reg) => Reply::new(templates::GROUP_REGISTERED)
                            .with("group", &reg.subject_group_id),
                        None => Reply::new(templates::GROUP_TITLE_NO_ID),
                    }
                };
                self.deliver(Outbound::message(chat_id, self.default_lang, reply))
                    .await;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Group chat events
    // ------------------------------------------------------------------

    async fn handle_group_message(
        &self,
        chat_title: &str,
        sender: Option<&ActorInfo>,
        post: &InboundPost<'_>,
    ) -> Result<()> {
        let trimmed = post.text.trim();

        if trimmed == "/register" || trimmed == "/unregister" {
            return self.handle_group_command(trimmed, chat_title, sender, post.chat_id).await;
        }

        let marker_write = {
            let db = self.db.lock().await;
            ingest::index_message(&db, post)?;
            self.try_marker_legend(&db, sender, post)?
        };
        if let Some(group) = marker_write {
            self.deliver(Outbound::message(
                post.chat_id,
                self.default_lang,
                Reply::new(templates::LEGEND_SAVED).with("group", &group),
            ))
            .await;
        }
        Ok(())
    }

    /// Legend authoring via the in-group marker hashtag.  Returns the
    /// group id when a document was written.
    fn try_marker_legend(
        &self,
        db: &Database,
        sender: Option<&ActorInfo>,
        post: &InboundPost<'_>,
    ) -> Result<Option<dossier_shared::SubjectGroupId>> {
        let Some(body) = legend::marker_content(post.text) else {
            return Ok(None);
        };
        let Some(sender) = sender else {
            return Ok(None);
        };
        if !self.directory.tier(db, sender.id)?.is_admin() {
            return Ok(None);
        }
        let Some(reg) = db.get_registration(post.chat_id)? else {
            return Ok(None);
        };

        let write = legend::write_from_marker(
            db,
            &reg.subject_group_id,
            post.chat_id,
            post.message_id,
            &body,
            Utc::now(),
        )?;
        match write {
            LegendWrite::Unchanged => Ok(None),
            LegendWrite::Saved { .. } => {
                db.log_audit(sender.id, "legend.marker", reg.subject_group_id.as_str(), "")?;
                Ok(Some(reg.subject_group_id))
            }
        }
    }

    async fn handle_group_command(
        &self,
        command: &str,
        chat_title: &str,
        sender: Option<&ActorInfo>,
        chat_id: ChatId,
    ) -> Result<()> {
        let Some(sender) = sender else {
            return Ok(());
        };

        let reply = {
            let db = self.db.lock().await;
            let tier = self.directory.tier(&db, sender.id)?;
            match command {
                "/register" if tier.is_admin() => {
                    match ingest::register_from_title(&db, chat_id, chat_title, sender.id, Utc::now())? {
                        Some(reg) => Some(
                            Reply::new(templates::GROUP_REGISTERED)
                                .with("group", &reg.subject_group_id),
                        ),
                        None => Some(Reply::new(templates::GROUP_TITLE_NO_ID)),
                    }
                }
                "/unregister" if tier.is_superadmin() => {
                    if db.unregister_group(chat_id)? {
                        db.log_audit(sender.id, "group.unregister", &chat_id.to_string(), "")?;
                        Some(Reply::new(templates::GROUP_UNREGISTERED))
                    } else {
                        None
                    }
                }
                _ => {
                    tracing::debug!(actor = %sender.id, command, "group command from unprivileged actor ignored");
                    None
                }
            }
        };

        if let Some(reply) = reply {
            self.deliver(Outbound::message(chat_id, self.default_lang, reply))
                .await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control activation (echoed cursor payloads)
    // ------------------------------------------------------------------

    async fn handle_control(&self, actor: ActorInfo, chat_id: ChatId, payload: &str) -> Result<()> {
        let cursor = match Cursor::decode(payload) {
            Ok(cursor) => cursor,
            Err(e) => {
                // Malformed payloads are dropped without a reply.
                tracing::warn!(actor = %actor.id, payload, error = %e, "unparsable control payload dropped");
                return Ok(());
            }
        };

        match cursor {
            Cursor::More {
                subject,
                offset,
                group_filter,
                time_filter,
                with_filter_controls,
            } => {
                // Paging an already-served result re-reads the store but
                // consumes no quota; only the ban still applies.
                let now = Utc::now();
                let db = self.db.lock().await;
                let lang = self.directory.lang(&db, actor.id)?;
                if let Some(until) = db.get_ban(actor.id)? {
                    if now < until {
                        drop(db);
                        let minutes_left = ((until - now).num_seconds() + 59) / 60;
                        self.reply(
                            chat_id,
                            lang,
                            Reply::new(templates::BANNED).with("minutes", minutes_left),
                        )
                        .await;
                        return Ok(());
                    }
                }

                let page = run_search(
                    &db,
                    &SearchQuery {
                        subject: subject.clone(),
                        offset,
                        group_filter,
                        time_filter,
                        with_filter_controls,
                    },
                    now,
                )?;
                drop(db);
                self.send_page(chat_id, lang, &subject, &page).await;
                Ok(())
            }
            Cursor::Filter {
                subject,
                group_filter,
                time_filter,
            } => {
                let session_handle = self.sessions.session(actor.id).await;
                let mut session = session_handle.lock().await;
                let db = self.db.lock().await;
                let tier = self.directory.tier(&db, actor.id)?;
                let lang = self.directory.lang(&db, actor.id)?;
                if tier == RoleTier::Guest {
                    tracing::warn!(actor = %actor.id, "filter control activated by a guest, ignored");
                    return Ok(());
                }

                session.start_flow(Flow::SearchFilter(SearchFilterFlow {
                    subject,
                    group: group_filter,
                    time: time_filter,
                    stage: SearchFilterStage::AwaitGroup,
                }));
                drop(db);
                drop(session);
                self.deliver(Outbound::message(
                    chat_id,
                    lang,
                    Reply::new(templates::SEARCH_FILTER_GROUP_PROMPT),
                ))
                .await;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Private chat routing
    // ------------------------------------------------------------------

    async fn handle_private(&self, actor: ActorInfo, chat_id: ChatId, text: &str) -> Result<()> {
        let session_handle = self.sessions.session(actor.id).await;
        let mut session = session_handle.lock().await;

        let (tier, lang) = {
            let db = self.db.lock().await;
            db.upsert_actor_profile(
                actor.id,
                actor.first_name.as_deref(),
                actor.last_name.as_deref(),
                actor.username.as_deref(),
            )?;
            (
                self.directory.tier(&db, actor.id)?,
                self.directory.lang(&db, actor.id)?,
            )
        };

        let trimmed = text.trim();
        let mut parts = trimmed.split_whitespace();
        let head = parts.next().unwrap_or("");
        let arg = parts.next();

        match head {
            "/start" => {
                session.reset();
                self.reply(chat_id, lang, Reply::new(templates::START)).await;
            }
            "/lang" => {
                let next = lang.toggled();
                {
                    let db = self.db.lock().await;
                    db.set_lang(actor.id, next)?;
                }
                self.reply(
                    chat_id,
                    next,
                    Reply::new(templates::LANG_SET).with("lang", next.code()),
                )
                .await;
            }
            "/back" => {
                session.cancel_flow();
                let screen = session.pop_screen();
                self.reply(chat_id, lang, Reply::new(screen_template(screen)))
                    .await;
            }
            "/search" => {
                if tier == RoleTier::Guest {
                    session.start_flow(Flow::GuestPair(GuestPairFlow {
                        stage: GuestStage::AwaitGroup,
                    }));
                    self.reply(chat_id, lang, Reply::new(templates::GUEST_GROUP_PROMPT))
                        .await;
                } else {
                    self.reply(chat_id, lang, Reply::new(templates::SEARCH_PROMPT))
                        .await;
                }
            }
            "/report" => {
                session.start_flow(Flow::Report(ReportFlow {
                    stage: ReportStage::AwaitGroup,
                }));
                self.reply(chat_id, lang, Reply::new(templates::REPORT_GROUP_PROMPT))
                    .await;
            }
            "/legend" => {
                self.route_legend_command(&mut session, &actor, chat_id, tier, lang, arg)
                    .await?;
            }
            "/admin" => {
                if !tier.is_admin() {
                    self.reply(chat_id, lang, Reply::new(templates::ADMIN_ONLY)).await;
                } else {
                    self.route_admin_menu(&mut session, chat_id, lang, arg).await?;
                }
            }
            "/addadmin" | "/removeadmin" => {
                if !tier.is_superadmin() {
                    self.reply(chat_id, lang, Reply::new(templates::SUPERADMIN_ONLY))
                        .await;
                } else {
                    session.set_pending_admin(if head == "/addadmin" {
                        PendingAdminAction::AddAdmin
                    } else {
                        PendingAdminAction::RemoveAdmin
                    });
                    self.reply(chat_id, lang, Reply::new(templates::ROLE_PROMPT_ID))
                        .await;
                }
            }
            "/allow" | "/disallow" => {
                if !tier.is_admin() {
                    self.reply(chat_id, lang, Reply::new(templates::ADMIN_ONLY)).await;
                } else {
                    session.set_pending_admin(if head == "/allow" {
                        PendingAdminAction::AddAllowed
                    } else {
                        PendingAdminAction::RemoveAllowed
                    });
                    self.reply(chat_id, lang, Reply::new(templates::ROLE_PROMPT_ID))
                        .await;
                }
            }
            "/mine" => {
                let reply = {
                    let db = self.db.lock().await;
                    let events = db.recent_quota_events(actor.id, 10)?;
                    if events.is_empty() {
                        Reply::new(templates::MY_QUERIES_EMPTY)
                    } else {
                        let items = events
                            .iter()
                            .map(|e| match &e.detail {
                                Some(detail) => format!("{} {}", e.kind.code(), detail),
                                None => e.kind.code().to_string(),
                            })
                            .collect::<Vec<_>>()
                            .join("\n");
                        Reply::new(templates::MY_QUERIES)
                            .with("count", events.len())
                            .with("items", items)
                    }
                };
                self.reply(chat_id, lang, reply).await;
            }
            _ => {
                self.route_free_input(&mut session, &actor, chat_id, tier, lang, trimmed)
                    .await?;
            }
        }
        Ok(())
    }

    async fn route_legend_command(
        &self,
        session: &mut ConversationSession,
        actor: &ActorInfo,
        chat_id: ChatId,
        tier: RoleTier,
        lang: Lang,
        arg: Option<&str>,
    ) -> Result<()> {
        match arg {
            Some(mode @ ("add" | "edit")) => {
                if !tier.is_admin() {
                    self.reply(chat_id, lang, Reply::new(templates::ADMIN_ONLY)).await;
                    return Ok(());
                }
                session.start_flow(Flow::Legend(LegendFlow {
                    mode: if mode == "add" {
                        LegendMode::Add
                    } else {
                        LegendMode::Edit
                    },
                    stage: LegendStage::AwaitGroup,
                }));
                self.reply(chat_id, lang, Reply::new(templates::LEGEND_GROUP_PROMPT))
                    .await;
            }
            Some(raw) => match raw.parse::<dossier_shared::SubjectGroupId>() {
                Ok(group) => {
                    self.view_legend(actor, chat_id, tier, lang, &group).await?;
                }
                Err(_) => {
                    self.reply(chat_id, lang, Reply::new(templates::LEGEND_BAD_GROUP))
                        .await;
                }
            },
            None => {
                self.reply(chat_id, lang, Reply::new(templates::UNKNOWN_INPUT)).await;
            }
        }
        Ok(())
    }

    /// Gated legend view: counts against the legend-view quota for
    /// guests.
    async fn view_legend(
        &self,
        actor: &ActorInfo,
        chat_id: ChatId,
        tier: RoleTier,
        lang: Lang,
        group: &dossier_shared::SubjectGroupId,
    ) -> Result<()> {
        let now = Utc::now();
        let reply = {
            let db = self.db.lock().await;
            match self.guard.check(&db, actor.id, tier, QuotaKind::LegendView, now)? {
                Verdict::Deny(reply) => reply,
                Verdict::Allow => match db.get_legend(group)? {
                    Some(doc) => {
                        self.guard.commit(
                            &db,
                            actor.id,
                            QuotaKind::LegendView,
                            Some(group.as_str()),
                            now,
                        )?;
                        Reply::new(templates::LEGEND_VIEW)
                            .with("group", group)
                            .with("content", &doc.content)
                    }
                    None => Reply::new(templates::LEGEND_NOT_FOUND).with("group", group),
                },
            }
        };
        self.reply(chat_id, lang, reply).await;
        Ok(())
    }

    async fn route_admin_menu(
        &self,
        session: &mut ConversationSession,
        chat_id: ChatId,
        lang: Lang,
        arg: Option<&str>,
    ) -> Result<()> {
        match arg {
            None => {
                session.push_screen(Screen::Admin);
                self.reply(chat_id, lang, Reply::new(templates::MENU_ADMIN)).await;
            }
            Some("actors") => {
                session.push_screen(Screen::AdminActors);
                // Each admin with what they have granted: groups they
                // registered and actors they allow-listed.
                let reply = {
                    let db = self.db.lock().await;
                    let admins = db.list_admins()?;
                    let mut items = Vec::new();
                    for &admin in &admins {
                        let label = db
                            .get_actor_profile(admin)?
                            .and_then(|p| p.username.map(|u| format!("@{u}")).or(p.first_name))
                            .unwrap_or_else(|| "-".to_string());
                        let groups = db.list_registrations_by(admin)?.len();
                        let allowed = db.list_allowed_by(admin)?.len();
                        items.push(format!(
                            "id:{admin} {label} groups:{groups} allowed:{allowed}"
                        ));
                    }
                    Reply::new(templates::MENU_ADMIN_ACTORS)
                        .with("count", admins.len())
                        .with("items", items.join("\n"))
                };
                self.reply(chat_id, lang, reply).await;
            }
            Some("groups") => {
                session.push_screen(Screen::AdminGroups);
                let count = {
                    let db = self.db.lock().await;
                    db.list_registrations()?.len()
                };
                self.reply(
                    chat_id,
                    lang,
                    Reply::new(templates::MENU_ADMIN_GROUPS).with("count", count),
                )
                .await;
            }
            Some("stats") => {
                session.push_screen(Screen::AdminStats);
                let (groups, admins) = {
                    let db = self.db.lock().await;
                    (db.list_registrations()?.len(), db.list_admins()?.len())
                };
                self.reply(
                    chat_id,
                    lang,
                    Reply::new(templates::STATS_SUMMARY)
                        .with("groups", groups)
                        .with("admins", admins),
                )
                .await;
            }
            Some(_) => {
                self.reply(chat_id, lang, Reply::new(templates::UNKNOWN_INPUT)).await;
            }
        }
        Ok(())
    }

    /// Non-command input: pending role input first, then the active
    /// flow, then direct subject lookup.
    async fn route_free_input(
        &self,
        session: &mut ConversationSession,
        actor: &ActorInfo,
        chat_id: ChatId,
        tier: RoleTier,
        lang: Lang,
        input: &str,
    ) -> Result<()> {
        if let Some(pending) = session.take_pending_admin() {
            return self
                .execute_role_change(session, actor, chat_id, tier, lang, pending, input)
                .await;
        }

        if let Some(flow) = session.flow().cloned() {
            return match flow.advance(input) {
                FlowStep::Reprompt(key) => {
                    self.reply(chat_id, lang, Reply::new(key)).await;
                    Ok(())
                }
                FlowStep::Act(action) => {
                    self.execute_flow_action(session, actor, chat_id, tier, lang, action)
                        .await
                }
            };
        }

        if let Ok(subject) = input.parse::<SubjectToken>() {
            if tier == RoleTier::Guest {
                session.start_flow(Flow::GuestPair(GuestPairFlow {
                    stage: GuestStage::AwaitGroup,
                }));
                self.reply(chat_id, lang, Reply::new(templates::GUEST_USE_PAIR_ENTRY))
                    .await;
                return Ok(());
            }
            return self
                .gated_search(actor, chat_id, tier, lang, SearchQuery::fresh(subject))
                .await;
        }

        self.reply(chat_id, lang, Reply::new(templates::UNKNOWN_INPUT)).await;
        Ok(())
    }

    async fn execute_role_change(
        &self,
        session: &mut ConversationSession,
        actor: &ActorInfo,
        chat_id: ChatId,
        tier: RoleTier,
        lang: Lang,
        pending: PendingAdminAction,
        input: &str,
    ) -> Result<()> {
        let Some(target) = parse_actor_ref(input) else {
            // Keep the request pending so a corrected id still lands.
            session.set_pending_admin(pending);
            self.reply(chat_id, lang, Reply::new(templates::ROLE_BAD_ID)).await;
            return Ok(());
        };

        // Re-check against the live tier; the grant could have been
        // revoked since the prompt went out.
        let required_ok = match pending {
            PendingAdminAction::AddAdmin | PendingAdminAction::RemoveAdmin => tier.is_superadmin(),
            PendingAdminAction::AddAllowed | PendingAdminAction::RemoveAllowed => tier.is_admin(),
        };
        if !required_ok {
            self.reply(chat_id, lang, Reply::new(templates::NOT_AUTHORIZED)).await;
            return Ok(());
        }

        let reply = {
            let db = self.db.lock().await;
            match pending {
                PendingAdminAction::AddAdmin => {
                    db.add_admin(target)?;
                    db.log_audit(actor.id, "role.add_admin", &target.to_string(), "")?;
                    Reply::new(templates::ROLE_ADMIN_ADDED).with("id", target)
                }
                PendingAdminAction::RemoveAdmin => {
                    db.remove_admin(target)?;
                    db.log_audit(actor.id, "role.remove_admin", &target.to_string(), "")?;
                    Reply::new(templates::ROLE_ADMIN_REMOVED).with("id", target)
                }
                PendingAdminAction::AddAllowed => {
                    db.add_allowed(target, actor.id)?;
                    db.log_audit(actor.id, "role.add_allowed", &target.to_string(), "")?;
                    Reply::new(templates::ROLE_ALLOWED_ADDED).with("id", target)
                }
                PendingAdminAction::RemoveAllowed => {
                    db.remove_allowed(target)?;
                    db.log_audit(actor.id, "role.remove_allowed", &target.to_string(), "")?;
                    Reply::new(templates::ROLE_ALLOWED_REMOVED).with("id", target)
                }
            }
        };
        self.reply(chat_id, lang, reply).await;
        Ok(())
    }

    async fn execute_flow_action(
        &self,
        session: &mut ConversationSession,
        actor: &ActorInfo,
        chat_id: ChatId,
        tier: RoleTier,
        lang: Lang,
        action: FlowAction,
    ) -> Result<()> {
        match action {
            FlowAction::ReportGroupChosen(group) => {
                let resolved = {
                    let db = self.db.lock().await;
                    resolve_or_none(&db, &group)?
                };
                match resolved {
                    Some(reg) => {
                        session.start_flow(Flow::Report(ReportFlow {
                            stage: ReportStage::AwaitText {
                                group,
                                target_chat: reg.chat_id,
                                target_title: reg.title.clone(),
                            },
                        }));
                        self.reply(
                            chat_id,
                            lang,
                            Reply::new(templates::REPORT_TEXT_PROMPT).with("title", reg.title),
                        )
                        .await;
                    }
                    None => {
                        self.reply(chat_id, lang, Reply::new(templates::REPORT_GROUP_UNKNOWN))
                            .await;
                    }
                }
            }

            FlowAction::ReportSubmit {
                group,
                target_chat,
                target_title: _,
                text,
            } => {
                let now = Utc::now();
                let verdict = {
                    let db = self.db.lock().await;
                    self.guard
                        .check(&db, actor.id, tier, QuotaKind::ReportSend, now)?
                };
                if let Verdict::Deny(reply) = verdict {
                    // The drafted text survives; the flow stays open.
                    self.reply(chat_id, lang, reply).await;
                    return Ok(());
                }

                self.deliver(Outbound::message(
                    target_chat,
                    self.default_lang,
                    Reply::new(templates::REPORT_BODY)
                        .with("group", &group)
                        .with("from", display_name(actor))
                        .with("text", &text),
                ))
                .await;

                {
                    let db = self.db.lock().await;
                    self.guard.commit(
                        &db,
                        actor.id,
                        QuotaKind::ReportSend,
                        Some(group.as_str()),
                        now,
                    )?;
                    db.log_audit(actor.id, "report.send", group.as_str(), "")?;
                }
                session.cancel_flow();
                self.reply(chat_id, lang, Reply::new(templates::REPORT_SENT)).await;
            }

            FlowAction::LegendGroupChosen(mode, group) => {
                let (resolved, existing) = {
                    let db = self.db.lock().await;
                    (resolve_or_none(&db, &group)?, db.get_legend(&group)?)
                };
                if resolved.is_none() {
                    self.reply(chat_id, lang, Reply::new(templates::LEGEND_GROUP_UNKNOWN))
                        .await;
                    return Ok(());
                }
                match (mode, &existing) {
                    (LegendMode::Add, Some(_)) => {
                        session.cancel_flow();
                        self.reply(
                            chat_id,
                            lang,
                            Reply::new(templates::LEGEND_ALREADY_EXISTS).with("group", &group),
                        )
                        .await;
                    }
                    (LegendMode::Edit, None) => {
                        session.cancel_flow();
                        self.reply(
                            chat_id,
                            lang,
                            Reply::new(templates::LEGEND_NOT_FOUND).with("group", &group),
                        )
                        .await;
                    }
                    _ => {
                        session.start_flow(Flow::Legend(LegendFlow {
                            mode,
                            stage: LegendStage::AwaitContent { group },
                        }));
                        self.reply(chat_id, lang, Reply::new(templates::LEGEND_CONTENT_PROMPT))
                            .await;
                    }
                }
            }

            FlowAction::LegendSubmit {
                mode: _,
                group,
                content,
            } => {
                let resolved = {
                    let db = self.db.lock().await;
                    resolve_or_none(&db, &group)?
                };
                let Some(reg) = resolved else {
                    session.cancel_flow();
                    self.reply(chat_id, lang, Reply::new(templates::LEGEND_GROUP_UNKNOWN))
                        .await;
                    return Ok(());
                };

                let write = legend::write_and_broadcast(
                    &self.db,
                    self.transport.as_ref(),
                    &reg,
                    &content,
                    self.default_lang,
                    Utc::now(),
                )
                .await?;
                if matches!(write, LegendWrite::Saved { .. }) {
                    let db = self.db.lock().await;
                    db.log_audit(actor.id, "legend.write", group.as_str(), "")?;
                }
                session.cancel_flow();
                let reply = match write {
                    LegendWrite::Unchanged => {
                        Reply::new(templates::LEGEND_UNCHANGED).with("group", &group)
                    }
                    LegendWrite::Saved { .. } => {
                        Reply::new(templates::LEGEND_SAVED).with("group", &group)
                    }
                };
                self.reply(chat_id, lang, reply).await;
            }

            FlowAction::SearchGroupChosen(group) => {
                // Re-validate against the live session; only an active
                // filter flow carries the subject to continue with.
                let Some(Flow::SearchFilter(filter)) = session.flow().cloned() else {
                    tracing::warn!(actor = %actor.id, "filter group chosen without an active filter flow");
                    return Ok(());
                };
                session.start_flow(Flow::SearchFilter(SearchFilterFlow {
                    subject: filter.subject,
                    group: group.clone(),
                    time: filter.time,
                    stage: SearchFilterStage::AwaitTime { group },
                }));
                self.reply(chat_id, lang, Reply::new(templates::SEARCH_FILTER_TIME_PROMPT))
                    .await;
            }

            FlowAction::SearchFilterReady {
                subject,
                group,
                time,
            } => {
                session.cancel_flow();
                self.gated_search(
                    actor,
                    chat_id,
                    tier,
                    lang,
                    SearchQuery {
                        subject,
                        offset: 0,
                        group_filter: group,
                        time_filter: time,
                        with_filter_controls: true,
                    },
                )
                .await?;
            }

            FlowAction::GuestGroupChosen(group) => {
                let resolved = {
                    let db = self.db.lock().await;
                    resolve_or_none(&db, &group)?
                };
                match resolved {
                    Some(_) => {
                        session.start_flow(Flow::GuestPair(GuestPairFlow {
                            stage: GuestStage::AwaitSubject { group },
                        }));
                        self.reply(chat_id, lang, Reply::new(templates::GUEST_SUBJECT_PROMPT))
                            .await;
                    }
                    None => {
                        self.reply(chat_id, lang, Reply::new(templates::GUEST_BAD_GROUP))
                            .await;
                    }
                }
            }

            FlowAction::GuestSearch { group, subject } => {
                session.cancel_flow();
                self.gated_search(
                    actor,
                    chat_id,
                    tier,
                    lang,
                    SearchQuery {
                        subject,
                        offset: 0,
                        group_filter: Some(group),
                        time_filter: dossier_shared::TimeFilter::All,
                        with_filter_controls: false,
                    },
                )
                .await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------

    /// Run one quota-gated search and deliver the result page.
    async fn gated_search(
        &self,
        actor: &ActorInfo,
        chat_id: ChatId,
        tier: RoleTier,
        lang: Lang,
        query: SearchQuery,
    ) -> Result<()> {
        let now = Utc::now();
        let (page, ban_notice) = {
            let db = self.db.lock().await;
            match self.guard.check(&db, actor.id, tier, QuotaKind::Search, now)? {
                Verdict::Deny(reply) => {
                    drop(db);
                    self.reply(chat_id, lang, reply).await;
                    return Ok(());
                }
                Verdict::Allow => {}
            }

            let page = run_search(&db, &query, now)?;
            self.guard.commit(
                &db,
                actor.id,
                QuotaKind::Search,
                Some(query.subject.as_str()),
                now,
            )?;
            let ban_notice = self.guard.escalate_after_search(&db, actor.id, tier, now)?;
            (page, ban_notice)
        };

        self.send_page(chat_id, lang, &query.subject, &page).await;
        if let Some(notice) = ban_notice {
            self.reply(chat_id, lang, notice).await;
        }
        Ok(())
    }

    /// Deliver one result page: each hit re-sent by reference, then the
    /// summary message carrying the continuation controls.
    async fn send_page(&self, chat_id: ChatId, lang: Lang, subject: &SubjectToken, page: &SearchPage) {
        if page.is_empty() {
            self.reply(
                chat_id,
                lang,
                Reply::new(templates::SEARCH_NOT_FOUND).with("subject", subject),
            )
            .await;
            return;
        }

        for message in &page.messages {
            self.deliver(Outbound {
                chat_id,
                lang,
                kind: OutboundKind::CopyMessage {
                    from_chat: message.chat_id,
                    message_id: message.platform_message_id,
                    fallback_text: message.text.clone(),
                },
            })
            .await;
        }

        let shown = page.offset + page.messages.len() as u32;
        let mut summary = Outbound::message(
            chat_id,
            lang,
            Reply::new(templates::SEARCH_PAGE)
                .with("subject", subject)
                .with("shown", shown)
                .with("total", page.total),
        );
        if let Some(payload) = &page.more_payload {
            summary = summary.with_control(templates::SEARCH_MORE, payload.clone());
        }
        if let Some(payload) = &page.filter_payload {
            summary = summary.with_control(templates::SEARCH_CHANGE_FILTER, payload.clone());
        }
        self.deliver(summary).await;
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    async fn reply(&self, chat_id: ChatId, lang: Lang, reply: Reply) {
        self.deliver(Outbound::message(chat_id, lang, reply)).await;
    }

    /// Best-effort send.  A failed delivery is logged and dropped; it
    /// never aborts processing for other actors.
    async fn deliver(&self, outbound: Outbound) {
        let chat_id = outbound.chat_id;
        if let Err(e) = self.transport.send(outbound).await {
            tracing::warn!(chat = %chat_id, error = %e, "outbound delivery failed");
        }
    }
}

fn screen_template(screen: Screen) -> TemplateKey {
    match screen {
        Screen::Root => templates::MENU_ROOT,
        Screen::Admin => templates::MENU_ADMIN,
        Screen::AdminActors => templates::MENU_ADMIN_ACTORS,
        Screen::AdminGroups => templates::MENU_ADMIN_GROUPS,
        Screen::AdminStats => templates::MENU_ADMIN_STATS,
    }
}

fn resolve_or_none(
    db: &Database,
    group: &dossier_shared::SubjectGroupId,
) -> Result<Option<dossier_store::GroupRegistration>> {
    match db.resolve_group(group) {
        Ok(reg) => Ok(Some(reg)),
        Err(StoreError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse the `id:<digits>` form used for role management input.
fn parse_actor_ref(input: &str) -> Option<ActorId> {
    input
        .strip_prefix("id:")?
        .trim()
        .parse::<i64>()
        .ok()
        .map(ActorId)
}

fn display_name(actor: &ActorInfo) -> String {
    if let Some(username) = &actor.username {
        return format!("@{username}");
    }
    match (&actor.first_name, &actor.last_name) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first.clone(),
        _ => actor.id.to_string(),
    }
}
