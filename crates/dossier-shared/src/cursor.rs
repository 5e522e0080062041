//! Continuation-cursor wire codec.
//!
//! The cursor travels inside an interactive control's payload and is echoed
//! back verbatim by the transport, so pagination resumes without any
//! server-held session.  Control payloads are tiny (treated as <= 64 bytes),
//! hence the compact colon-separated ASCII grammar:
//!
//! ```text
//! more:<subject>:<offset>:<groupOrDash>:<timeCode>[:<flag>]
//! filter:<subject>:<groupOrDash>:<timeCode>
//! ```

use crate::types::{SubjectGroupId, SubjectToken, TimeFilter};

/// Maximum encoded length the transport guarantees to carry.
pub const MAX_PAYLOAD_BYTES: usize = 64;

const GROUP_SENTINEL: &str = "-";

/// A parsed continuation cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Resume a paginated search at `offset`.
    More {
        subject: SubjectToken,
        offset: u32,
        group_filter: Option<SubjectGroupId>,
        time_filter: TimeFilter,
        /// Whether filter-change controls are offered on the next page.
        /// Guests get a reduced surface with this cleared.
        with_filter_controls: bool,
    },
    /// Re-enter the filter-selection flow for an ongoing search.
    Filter {
        subject: SubjectToken,
        group_filter: Option<SubjectGroupId>,
        time_filter: TimeFilter,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("unknown cursor verb: {0:?}")]
    UnknownVerb(String),

    #[error("wrong field count for {verb:?}: {got}")]
    FieldCount { verb: &'static str, got: usize },

    #[error("bad subject field")]
    BadSubject,

    #[error("bad offset field")]
    BadOffset,

    #[error("bad group filter field")]
    BadGroupFilter,

    #[error("bad time filter field")]
    BadTimeFilter,

    #[error("bad capability flag field")]
    BadFlag,
}

impl Cursor {
    /// Encode to the compact wire form.
    pub fn encode(&self) -> String {
        match self {
            Cursor::More {
                subject,
                offset,
                group_filter,
                time_filter,
                with_filter_controls,
            } => format!(
                "more:{}:{}:{}:{}:{}",
                subject,
                offset,
                group_field(group_filter),
                time_filter.code(),
                if *with_filter_controls { '1' } else { '0' },
            ),
            Cursor::Filter {
                subject,
                group_filter,
                time_filter,
            } => format!(
                "filter:{}:{}:{}",
                subject,
                group_field(group_filter),
                time_filter.code(),
            ),
        }
    }

    /// Parse an echoed control payload.
    pub fn decode(payload: &str) -> Result<Self, CursorError> {
        let mut parts = payload.split(':');
        let verb = parts.next().unwrap_or("");
        let rest: Vec<&str> = parts.collect();

        match verb {
            "more" => {
                if rest.len() != 4 && rest.len() != 5 {
                    return Err(CursorError::FieldCount {
                        verb: "more",
                        got: rest.len(),
                    });
                }
                let subject = rest[0].parse().map_err(|_| CursorError::BadSubject)?;
                let offset: u32 = rest[1].parse().map_err(|_| CursorError::BadOffset)?;
                let group_filter = parse_group(rest[2])?;
                let time_filter =
                    TimeFilter::from_code(rest[3]).ok_or(CursorError::BadTimeFilter)?;
                // The flag is optional on the wire; older controls without it
                // keep the full capability set.
                let with_filter_controls = match rest.get(4) {
                    None | Some(&"1") => true,
                    Some(&"0") => false,
                    Some(_) => return Err(CursorError::BadFlag),
                };
                Ok(Cursor::More {
                    subject,
                    offset,
                    group_filter,
                    time_filter,
                    with_filter_controls,
                })
            }
            "filter" => {
                if rest.len() != 3 {
                    return Err(CursorError::FieldCount {
                        verb: "filter",
                        got: rest.len(),
                    });
                }
                let subject = rest[0].parse().map_err(|_| CursorError::BadSubject)?;
                let group_filter = parse_group(rest[1])?;
                let time_filter =
                    TimeFilter::from_code(rest[2]).ok_or(CursorError::BadTimeFilter)?;
                Ok(Cursor::Filter {
                    subject,
                    group_filter,
                    time_filter,
                })
            }
            other => Err(CursorError::UnknownVerb(other.to_string())),
        }
    }
}

fn group_field(group: &Option<SubjectGroupId>) -> String {
    match group {
        Some(g) => g.to_string(),
        None => GROUP_SENTINEL.to_string(),
    }
}

fn parse_group(field: &str) -> Result<Option<SubjectGroupId>, CursorError> {
    if field == GROUP_SENTINEL {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| CursorError::BadGroupFilter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(s: &str) -> SubjectToken {
        s.parse().unwrap()
    }

    fn group(s: &str) -> SubjectGroupId {
        s.parse().unwrap()
    }

    #[test]
    fn more_round_trip() {
        let cursor = Cursor::More {
            subject: subject("1234567890"),
            offset: 15,
            group_filter: Some(group("9999999999")),
            time_filter: TimeFilter::Last24h,
            with_filter_controls: false,
        };
        let encoded = cursor.encode();
        assert_eq!(encoded, "more:1234567890:15:9999999999:24h:0");
        assert_eq!(Cursor::decode(&encoded).unwrap(), cursor);
    }

    #[test]
    fn filter_round_trip_with_sentinel() {
        let cursor = Cursor::Filter {
            subject: subject("1234567890"),
            group_filter: None,
            time_filter: TimeFilter::All,
        };
        let encoded = cursor.encode();
        assert_eq!(encoded, "filter:1234567890:-:all");
        assert_eq!(Cursor::decode(&encoded).unwrap(), cursor);
    }

    #[test]
    fn missing_flag_defaults_to_full_capabilities() {
        let cursor = Cursor::decode("more:1234567890:5:-:all").unwrap();
        match cursor {
            Cursor::More {
                with_filter_controls,
                offset,
                ..
            } => {
                assert!(with_filter_controls);
                assert_eq!(offset, 5);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            Cursor::decode("next:1234567890:5:-:all"),
            Err(CursorError::UnknownVerb(_))
        ));
        assert_eq!(
            Cursor::decode("more:123:5:-:all"),
            Err(CursorError::BadSubject)
        );
        assert_eq!(
            Cursor::decode("more:1234567890:x:-:all"),
            Err(CursorError::BadOffset)
        );
        assert_eq!(
            Cursor::decode("more:1234567890:5:abc:all"),
            Err(CursorError::BadGroupFilter)
        );
        assert_eq!(
            Cursor::decode("more:1234567890:5:-:week"),
            Err(CursorError::BadTimeFilter)
        );
        assert_eq!(
            Cursor::decode("filter:1234567890:-"),
            Err(CursorError::FieldCount {
                verb: "filter",
                got: 2
            })
        );
    }

    #[test]
    fn encoded_form_fits_payload_budget() {
        let cursor = Cursor::More {
            subject: subject("9999999999"),
            offset: u32::MAX,
            group_filter: Some(group("9999999999")),
            time_filter: TimeFilter::Last24h,
            with_filter_controls: true,
        };
        assert!(cursor.encode().len() <= MAX_PAYLOAD_BYTES);
    }
}
