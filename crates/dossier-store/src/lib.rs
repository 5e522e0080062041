//! # dossier-store
//!
//! Durable repository for the Dossier engine, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every
//! persisted entity: indexed messages and their subject links, group
//! registrations, actor roles, quota events, bans, legends, settings and
//! the audit log.  The store is the single source of truth for all
//! persisted state; conversation sessions never touch it.

pub mod actors;
pub mod audit;
pub mod database;
pub mod groups;
pub mod legends;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod quotas;
pub mod settings;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
