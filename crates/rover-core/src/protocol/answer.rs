//! Server answers on the control link and their classification.
//!
//! Servers reply with loosely-shaped JSON objects; which fields are present
//! tells us what kind of answer it is:
//!
//! | Shape                                          | Kind                  |
//! |------------------------------------------------|-----------------------|
//! | `{server_id, msg:"ack"}`                       | `HelloAck`            |
//! | `{server_id, rovers:[..]}`                     | `RoverList`           |
//! | `{server_id, client_id, rover_id, msg:"ok"}`   | `BindAck`             |
//! | `{msg:"ok"}`                                   | `Ok`                  |
//! | `{msg:"failed", info:"<reason>"}`              | `Failed(reason)`      |
//!
//! An optional top-level `id` echoes the request id when the server supports
//! it.

use serde::{Deserialize, Serialize};

use super::codec::ProtocolError;
use super::messages::CommandKind;
use crate::domain::rover::RoverDescriptor;

/// A decoded control-link answer with every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAnswer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rovers: Option<Vec<RoverDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rover_id: Option<String>,
}

/// Why the server refused a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Another client already controls the rover.
    Blocked,
    BadDirection,
    BadParams,
    BadMotors,
    BadAction,
    /// The camera reached its upper tilt limit.
    TopLimit,
    /// The camera reached its lower tilt limit.
    BottomLimit,
    UnknownCmd,
    ParsingError,
    /// Any reason token this client does not know.
    Other(String),
}

impl FailureReason {
    /// Maps a server `info` token to a reason.
    pub fn from_info(info: &str) -> Self {
        match info {
            "blocked" => FailureReason::Blocked,
            "bad_direction" => FailureReason::BadDirection,
            "bad_params" => FailureReason::BadParams,
            "bad_motors" => FailureReason::BadMotors,
            "bad_action" => FailureReason::BadAction,
            "top_limit" => FailureReason::TopLimit,
            "bottom_limit" => FailureReason::BottomLimit,
            "unknown_cmd" => FailureReason::UnknownCmd,
            "parsing_error" => FailureReason::ParsingError,
            other => FailureReason::Other(other.to_string()),
        }
    }

    /// The server's token for this reason.
    pub fn as_str(&self) -> &str {
        match self {
            FailureReason::Blocked => "blocked",
            FailureReason::BadDirection => "bad_direction",
            FailureReason::BadParams => "bad_params",
            FailureReason::BadMotors => "bad_motors",
            FailureReason::BadAction => "bad_action",
            FailureReason::TopLimit => "top_limit",
            FailureReason::BottomLimit => "bottom_limit",
            FailureReason::UnknownCmd => "unknown_cmd",
            FailureReason::ParsingError => "parsing_error",
            FailureReason::Other(text) => text,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified meaning of a [`ServerAnswer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKind {
    HelloAck,
    RoverList,
    BindAck,
    Ok,
    Failed(FailureReason),
}

impl AnswerKind {
    /// Returns `true` if an answer of this kind is a well-shaped reply to
    /// `command`.
    ///
    /// `Failed` replies to anything.  `connect` accepts a bare `ok` as well as
    /// the full bind acknowledgement.
    pub fn answers(&self, command: CommandKind) -> bool {
        match (self, command) {
            (AnswerKind::Failed(_), _) => true,
            (AnswerKind::HelloAck, CommandKind::Hello) => true,
            (AnswerKind::RoverList, CommandKind::List) => true,
            (AnswerKind::BindAck | AnswerKind::Ok, CommandKind::Connect) => true,
            (AnswerKind::Ok, other) => !other.is_handshake(),
            _ => false,
        }
    }
}

impl ServerAnswer {
    /// Classifies this answer.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::MissingField`] if neither `rovers` nor `msg` is
    ///   present.
    /// - [`ProtocolError::UnexpectedShape`] for an unknown `msg` value.
    pub fn kind(&self) -> Result<AnswerKind, ProtocolError> {
        if self.rovers.is_some() {
            return Ok(AnswerKind::RoverList);
        }
        let msg = self.msg.as_deref().ok_or(ProtocolError::MissingField("msg"))?;
        match msg {
            "failed" => {
                let info = self.info.as_deref().unwrap_or("");
                Ok(AnswerKind::Failed(FailureReason::from_info(info)))
            }
            "ack" => Ok(AnswerKind::HelloAck),
            "ok" if self.rover_id.is_some() => Ok(AnswerKind::BindAck),
            "ok" => Ok(AnswerKind::Ok),
            other => Err(ProtocolError::UnexpectedShape(format!("msg '{other}'"))),
        }
    }

    /// The rover list carried by a `RoverList` answer, or an empty slice.
    pub fn rovers(&self) -> &[RoverDescriptor] {
        self.rovers.as_deref().unwrap_or(&[])
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ServerAnswer {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_hello_ack_is_classified() {
        let answer = parse(r#"{"server_id":"s","msg":"ack"}"#);
        assert_eq!(answer.kind().unwrap(), AnswerKind::HelloAck);
    }

    #[test]
    fn test_rover_list_wins_over_msg() {
        // Arrange
        let answer = parse(r#"{"server_id":"s","rovers":[{"rover_id":"a"},{"rover_id":"b"}]}"#);

        // Act
        let kind = answer.kind().unwrap();

        // Assert
        assert_eq!(kind, AnswerKind::RoverList);
        assert_eq!(answer.rovers().len(), 2);
    }

    #[test]
    fn test_ok_with_rover_id_is_bind_ack() {
        let answer = parse(r#"{"server_id":"s","client_id":"c","rover_id":"a","msg":"ok"}"#);
        assert_eq!(answer.kind().unwrap(), AnswerKind::BindAck);
    }

    #[test]
    fn test_failed_maps_known_and_unknown_reasons() {
        let blocked = parse(r#"{"msg":"failed","info":"blocked"}"#);
        assert_eq!(
            blocked.kind().unwrap(),
            AnswerKind::Failed(FailureReason::Blocked)
        );

        let odd = parse(r#"{"msg":"failed","info":"battery_low"}"#);
        assert_eq!(
            odd.kind().unwrap(),
            AnswerKind::Failed(FailureReason::Other("battery_low".to_string()))
        );
    }

    #[test]
    fn test_missing_msg_is_missing_field() {
        let answer = parse(r#"{"server_id":"s"}"#);
        assert!(matches!(answer.kind(), Err(ProtocolError::MissingField("msg"))));
    }

    #[test]
    fn test_unknown_msg_is_unexpected_shape() {
        let answer = parse(r#"{"msg":"maybe"}"#);
        assert!(matches!(answer.kind(), Err(ProtocolError::UnexpectedShape(_))));
    }

    #[test]
    fn test_answers_matches_handshake_pairs() {
        assert!(AnswerKind::HelloAck.answers(CommandKind::Hello));
        assert!(!AnswerKind::RoverList.answers(CommandKind::Hello));
        assert!(AnswerKind::RoverList.answers(CommandKind::List));
        assert!(AnswerKind::BindAck.answers(CommandKind::Connect));
        assert!(AnswerKind::Ok.answers(CommandKind::Connect));
        assert!(!AnswerKind::Ok.answers(CommandKind::List));
        assert!(AnswerKind::Ok.answers(CommandKind::Move));
        assert!(AnswerKind::Failed(FailureReason::TopLimit).answers(CommandKind::MoveCam));
    }

    #[test]
    fn test_failure_reason_round_trips_token() {
        for token in ["blocked", "top_limit", "parsing_error", "whatever"] {
            assert_eq!(FailureReason::from_info(token).as_str(), token);
        }
    }
}
