//! Subject-token extraction.
//!
//! A run of digits qualifies as a subject token only when it is exactly 10
//! digits long and bounded by non-digit characters or the ends of the
//! string.  This keeps fragments of longer numbers (phone numbers, card
//! numbers) out of the index.

use crate::types::{SubjectGroupId, SubjectToken};

/// Scan `text` for subject tokens.
///
/// Duplicates collapse to a single entry; first-occurrence order is
/// preserved for display highlighting.
pub fn extract_subject_tokens(text: &str) -> Vec<SubjectToken> {
    let mut found: Vec<SubjectToken> = Vec::new();

    for run in digit_runs(text) {
        if run.len() != 10 {
            continue;
        }
        // Safe: digit_runs only yields ASCII-digit substrings.
        let token: SubjectToken = match run.parse() {
            Ok(t) => t,
            Err(_) => continue,
        };
        if !found.contains(&token) {
            found.push(token);
        }
    }

    found
}

/// Pull the subject-group id out of a chat title, if the title carries a
/// bounded 10-digit run.  The first qualifying run wins.
pub fn subject_group_from_title(title: &str) -> Option<SubjectGroupId> {
    digit_runs(title)
        .find(|run| run.len() == 10)
        .and_then(|run| run.parse().ok())
}

/// Iterate over maximal runs of ASCII digits in `text`.
fn digit_runs(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
}
