//! # dossier-engine
//!
//! The stateful interaction engine: per-actor conversation tracking,
//! identifier extraction and link maintenance under edits, the
//! quota/rate-limit/abuse-ban guard, the paginated retrieval protocol and
//! the legend registry.
//!
//! The engine owns no transport and renders no user-facing strings.  It
//! consumes normalized [`update::InboundUpdate`] values, mutates the store
//! and its in-process session state, and emits [`reply::Outbound`] values
//! (template keys plus named parameters) through the [`reply::Transport`]
//! seam.  Session state is ephemeral by design: it lives in memory only
//! and is lost on restart.

pub mod directory;
pub mod engine;
pub mod flow;
pub mod guard;
pub mod ingest;
pub mod legend;
pub mod reply;
pub mod retrieval;
pub mod session;
pub mod update;

mod error;

pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use update::{ActorInfo, InboundUpdate};
