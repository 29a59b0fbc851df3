//! # Foundry Wire Codec
//!
//! Classification and parsing of the text frames exchanged with a Foundry VTT
//! server over its Engine.IO v4 / Socket.IO websocket.
//!
//! Only the handful of frame shapes the client actually meets are handled:
//!
//! | Prefix            | Direction | Meaning                                   |
//! |-------------------|-----------|-------------------------------------------|
//! | `0{...}`          | inbound   | Engine.IO handshake, answered with `40`   |
//! | `42<ack>[...]`    | outbound  | event that requests an acknowledgement    |
//! | `43<ack>[...]`    | inbound   | acknowledgement, payload is element `0`   |
//! | `430[...]`        | inbound   | answer to the world request `420["world"]`|
//!
//! ## Recognition versus validity
//!
//! The parsers never fail outright. They return [`Parsed::NotMine`] when the
//! frame has some other prefix and [`Parsed::Mine`] carrying a `Result` when it
//! does, so an inbound dispatcher can try each parser in turn and a caller can
//! report a malformed frame that was meant for it instead of waiting for a
//! timeout.
//!
//! ```rust
//! use foundry_wire::{Parsed, build_event_frame, parse_ack};
//! use serde_json::json;
//!
//! assert_eq!(build_event_frame(7, &json!(["x"])), "427[\"x\"]");
//!
//! match parse_ack("431[{\"ok\":true}]") {
//!     Parsed::Mine(Ok(payload)) => assert_eq!(payload[0]["ok"], true),
//!     other => panic!("unexpected {other:?}"),
//! }
//! assert!(parse_ack("2").is_not_mine());
//! ```

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

use serde_json::Value;

/// Socket.IO connect packet sent in reply to the Engine.IO handshake.
pub const CONNECT_FRAME: &str = "40";

/// Fixed event that asks the server for the full world snapshot.
///
/// The answer arrives as a `430` frame.
pub const WORLD_REQUEST_FRAME: &str = "420[\"world\"]";

const HANDSHAKE_PREFIX: &str = "0{";
const SESSION_EVENT_MARKER: &str = "[\"session\",";
const WORLD_RESPONSE_PREFIX: &str = "430";
const ACK_PREFIX: &str = "43";
const EVENT_PREFIX: &str = "42";

/// Reasons a recognised frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FrameError {
    /// An ack frame without any `[` to start its JSON array.
    #[error("Invalid ack format: missing JSON array")]
    MissingArray,

    /// An ack frame whose JSON is not an array or is an empty one.
    #[error("Invalid ack format: empty payload")]
    EmptyAck,

    /// A world response whose JSON is not an array or is an empty one.
    #[error("Invalid response format: expected array with data")]
    EmptyWorld,

    /// The JSON after the prefix did not decode.
    #[error("Failed to parse {frame}: {reason}")]
    Decode {
        /// Which kind of frame was being decoded
        frame: &'static str,
        /// Decoder message
        reason: String,
    },
}

/// Outcome of running one parser over one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    /// The frame has a different prefix; some other parser may claim it.
    NotMine,
    /// The frame has this parser's prefix; decoding may still have failed.
    Mine(Result<T, FrameError>),
}

impl<T> Parsed<T> {
    /// True when the prefix did not match.
    pub fn is_not_mine(&self) -> bool {
        matches!(self, Self::NotMine)
    }

    /// Converts into an `Option`, dropping the recognition distinction.
    pub fn into_option(self) -> Option<Result<T, FrameError>> {
        match self {
            Self::NotMine => None,
            Self::Mine(result) => Some(result),
        }
    }
}

/// Coarse classification of an inbound frame, used for dispatch and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Engine.IO open packet (`0{...}`)
    Handshake,
    /// Socket.IO `session` event announcing the connection is ready
    SessionEvent,
    /// World snapshot answer (`430[...]`)
    WorldResponse,
    /// Acknowledgement (`43<ack>[...]`)
    Ack,
    /// Anything else (pings, broadcasts, unrelated events)
    Other,
}

/// True iff the frame is the Engine.IO handshake (`0{`).
pub fn is_handshake(text: &str) -> bool {
    text.starts_with(HANDSHAKE_PREFIX)
}

/// True iff the frame carries the Socket.IO `session` event.
pub fn is_session_event(text: &str) -> bool {
    text.contains(SESSION_EVENT_MARKER)
}

/// Classifies a frame by prefix. World responses win over plain acks.
pub fn classify(text: &str) -> FrameKind {
    if is_handshake(text) {
        FrameKind::Handshake
    } else if is_session_event(text) {
        FrameKind::SessionEvent
    } else if text.starts_with(WORLD_RESPONSE_PREFIX) {
        FrameKind::WorldResponse
    } else if text.starts_with(ACK_PREFIX) {
        FrameKind::Ack
    } else {
        FrameKind::Other
    }
}

/// Parses a `430` world response; the data is the first array element.
pub fn parse_world_response(text: &str) -> Parsed<Value> {
    let Some(body) = text.strip_prefix(WORLD_RESPONSE_PREFIX) else {
        return Parsed::NotMine;
    };

    let decoded = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(e) => {
            return Parsed::Mine(Err(FrameError::Decode {
                frame: "world response",
                reason: e.to_string(),
            }));
        }
    };

    match decoded {
        Value::Array(mut items) if !items.is_empty() => Parsed::Mine(Ok(items.swap_remove(0))),
        _ => Parsed::Mine(Err(FrameError::EmptyWorld)),
    }
}

/// Parses a `43<ack>` acknowledgement into its full, non-empty array.
///
/// The ack id between the prefix and the array is skipped; responses are
/// correlated by content, not by echoed id.
pub fn parse_ack(text: &str) -> Parsed<Vec<Value>> {
    if !text.starts_with(ACK_PREFIX) {
        return Parsed::NotMine;
    }

    let Some(start) = text.find('[') else {
        return Parsed::Mine(Err(FrameError::MissingArray));
    };

    match serde_json::from_str::<Value>(&text[start..]) {
        Ok(Value::Array(items)) if !items.is_empty() => Parsed::Mine(Ok(items)),
        Ok(_) => Parsed::Mine(Err(FrameError::EmptyAck)),
        Err(e) => Parsed::Mine(Err(FrameError::Decode {
            frame: "ack response",
            reason: e.to_string(),
        })),
    }
}

/// Builds `42<ack_id><json>` with no separators.
pub fn build_event_frame(ack_id: u64, payload: &Value) -> String {
    format!("{EVENT_PREFIX}{ack_id}{payload}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn handshake_requires_open_brace() {
        assert!(is_handshake("0{\"sid\":\"abc\",\"pingInterval\":25000}"));
        assert!(!is_handshake("0"));
        assert!(!is_handshake("40"));
        assert!(!is_handshake("430[{}]"));
    }

    #[test]
    fn session_event_detected_anywhere() {
        assert!(is_session_event("42[\"session\",{\"userId\":\"u1\"}]"));
        assert!(!is_session_event("42[\"sessions\",{}]"));
        assert!(!is_session_event("40"));
    }

    #[test]
    fn classify_orders_world_before_ack() {
        assert_eq!(classify("0{\"sid\":\"x\"}"), FrameKind::Handshake);
        assert_eq!(classify("42[\"session\",{}]"), FrameKind::SessionEvent);
        assert_eq!(classify("430[{}]"), FrameKind::WorldResponse);
        assert_eq!(classify("4312[{}]"), FrameKind::Ack);
        assert_eq!(classify("2"), FrameKind::Other);
    }

    #[test]
    fn event_frame_concatenates_without_separators() {
        assert_eq!(build_event_frame(7, &json!(["x"])), "427[\"x\"]");
        assert_eq!(
            build_event_frame(12, &json!(["modifyDocument", {"type": "Actor"}])),
            "4212[\"modifyDocument\",{\"type\":\"Actor\"}]"
        );
    }

    #[test]
    fn world_response_returns_first_element() {
        let frame = format!("430{}", json!([{"ok": true}]));
        assert_eq!(parse_world_response(&frame), Parsed::Mine(Ok(json!({"ok": true}))));
    }

    #[test]
    fn world_response_rejects_empty_array() {
        let parsed = parse_world_response("430[]");
        assert_eq!(parsed, Parsed::Mine(Err(FrameError::EmptyWorld)));
    }

    #[test]
    fn world_response_rejects_non_array() {
        let parsed = parse_world_response("430{\"a\":1}");
        assert_eq!(parsed, Parsed::Mine(Err(FrameError::EmptyWorld)));
    }

    #[test]
    fn world_response_reports_decode_failure() {
        match parse_world_response("430[{broken") {
            Parsed::Mine(Err(FrameError::Decode { frame, .. })) => {
                assert_eq!(frame, "world response");
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn ack_skips_ack_id_digits() {
        let parsed = parse_ack("4315[{\"type\":\"Actor\",\"result\":[]}]");
        assert_eq!(
            parsed,
            Parsed::Mine(Ok(vec![json!({"type": "Actor", "result": []})]))
        );
    }

    #[test]
    fn ack_error_cases_are_distinct() {
        assert_eq!(parse_ack("431"), Parsed::Mine(Err(FrameError::MissingArray)));
        assert_eq!(parse_ack("431[]"), Parsed::Mine(Err(FrameError::EmptyAck)));
        assert!(matches!(
            parse_ack("431[nope"),
            Parsed::Mine(Err(FrameError::Decode { frame: "ack response", .. }))
        ));
    }

    #[test]
    fn world_frames_are_also_acks() {
        // 430 shares the 43 prefix, so ack listeners see world answers too
        assert!(!parse_ack("430[{\"actors\":[]}]").is_not_mine());
    }

    #[test]
    fn unrelated_frames_are_not_mine() {
        for frame in ["", "0{}", "2", "3", "40", "42[\"x\"]", "4", "44{\"message\":\"x\"}"] {
            assert!(parse_ack(frame).is_not_mine(), "ack claimed {frame:?}");
            assert!(parse_world_response(frame).is_not_mine(), "world claimed {frame:?}");
        }
    }

    #[test]
    fn decode_error_message_names_frame() {
        let err = FrameError::Decode {
            frame: "ack response",
            reason: "EOF".into(),
        };
        assert_eq!(err.to_string(), "Failed to parse ack response: EOF");
    }
}
