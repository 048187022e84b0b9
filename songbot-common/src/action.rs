//! Button payload encoding
//!
//! Payloads are `verb|session|args…`:
//! - `select|<session>|<page>|<index>`
//! - `page|<session>|<page>`
//! - `close|<session>`
//!
//! `play` is accepted as an older spelling of `select`.

use crate::types::SessionId;
use thiserror::Error;

const SEPARATOR: char = '|';

/// Payload decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Empty action payload")]
    Empty,

    #[error("Unknown action verb: {0}")]
    UnknownVerb(String),

    #[error("Wrong argument count for {verb}: expected {expected}, got {got}")]
    Arity {
        verb: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// A decoded button press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Download item `index` of page `page`
    Select {
        session: SessionId,
        page: usize,
        index: usize,
    },
    /// Show page `page`
    Page { session: SessionId, page: usize },
    /// Dismiss the result list
    Close { session: SessionId },
}

impl Action {
    pub fn session(&self) -> SessionId {
        match self {
            Action::Select { session, .. } | Action::Page { session, .. } | Action::Close { session } => *session,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Action::Select { session, page, index } => format!("select|{session}|{page}|{index}"),
            Action::Page { session, page } => format!("page|{session}|{page}"),
            Action::Close { session } => format!("close|{session}"),
        }
    }

    pub fn decode(payload: &str) -> Result<Action, ActionError> {
        if payload.is_empty() {
            return Err(ActionError::Empty);
        }

        let mut parts = payload.split(SEPARATOR);
        let verb = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match verb {
            "select" | "play" => {
                expect_args("select", &args, 3)?;
                Ok(Action::Select {
                    session: parse_session(args[0])?,
                    page: parse_index("page", args[1])?,
                    index: parse_index("index", args[2])?,
                })
            }
            "page" => {
                expect_args("page", &args, 2)?;
                Ok(Action::Page {
                    session: parse_session(args[0])?,
                    page: parse_index("page", args[1])?,
                })
            }
            "close" => {
                expect_args("close", &args, 1)?;
                Ok(Action::Close {
                    session: parse_session(args[0])?,
                })
            }
            other => Err(ActionError::UnknownVerb(other.to_string())),
        }
    }
}

fn expect_args(verb: &'static str, args: &[&str], expected: usize) -> Result<(), ActionError> {
    if args.len() != expected {
        return Err(ActionError::Arity {
            verb,
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn parse_session(value: &str) -> Result<SessionId, ActionError> {
    value.parse().map_err(|_| ActionError::InvalidField {
        field: "session",
        value: value.to_string(),
    })
}

fn parse_index(field: &'static str, value: &str) -> Result<usize, ActionError> {
    value.parse().map_err(|_| ActionError::InvalidField {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_formats() {
        let s = SessionId(-42);
        assert_eq!(Action::Select { session: s, page: 1, index: 5 }.encode(), "select|-42|1|5");
        assert_eq!(Action::Page { session: s, page: 2 }.encode(), "page|-42|2");
        assert_eq!(Action::Close { session: s }.encode(), "close|-42");
    }

    #[test]
    fn test_decode_each_verb() {
        assert_eq!(
            Action::decode("select|9|1|5").unwrap(),
            Action::Select { session: SessionId(9), page: 1, index: 5 }
        );
        assert_eq!(
            Action::decode("page|9|2").unwrap(),
            Action::Page { session: SessionId(9), page: 2 }
        );
        assert_eq!(Action::decode("close|9").unwrap(), Action::Close { session: SessionId(9) });
    }

    #[test]
    fn test_decode_accepts_play_alias() {
        assert_eq!(
            Action::decode("play|9|0|3").unwrap(),
            Action::Select { session: SessionId(9), page: 0, index: 3 }
        );
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert_eq!(Action::decode(""), Err(ActionError::Empty));
        assert!(matches!(Action::decode("jump|9|1"), Err(ActionError::UnknownVerb(_))));
        assert!(matches!(Action::decode("page|9"), Err(ActionError::Arity { .. })));
        assert!(matches!(Action::decode("close|9|1"), Err(ActionError::Arity { .. })));
        assert!(matches!(
            Action::decode("page|abc|1"),
            Err(ActionError::InvalidField { field: "session", .. })
        ));
        assert!(matches!(
            Action::decode("select|9|-1|0"),
            Err(ActionError::InvalidField { field: "page", .. })
        ));
        assert!(matches!(
            Action::decode("select|9|0|x"),
            Err(ActionError::InvalidField { field: "index", .. })
        ));
    }

    #[test]
    fn test_session_accessor() {
        assert_eq!(Action::Close { session: SessionId(3) }.session(), SessionId(3));
    }
}
