//! # dossier-shared
//!
//! Domain primitives shared by every Dossier crate: validated 10-digit
//! identifiers, subject-token extraction, and the continuation-cursor wire
//! codec.  This crate does no I/O.

pub mod cursor;
pub mod token;
pub mod types;

pub use cursor::{Cursor, CursorError};
pub use token::{extract_subject_tokens, subject_group_from_title};
pub use types::*;
