//! Permissive decode for inbound client messages.
//!
//! Unknown `type` tags and malformed JSON are logged and ignored rather than
//! closing the connection.

use crate::Command;

/// Decode one JSON text frame into a `Command`, or `None` if it does not
/// parse or carries an unrecognized `type` tag.
pub fn decode_command(raw: &str) -> Option<Command> {
    match serde_json::from_str::<Command>(raw) {
        Ok(cmd) => Some(cmd),
        Err(e) => {
            let tag = serde_json::from_str::<serde_json::Value>(raw)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string));
            match tag {
                Some(tag) => tracing::warn!(%tag, error = %e, "ignoring command with unknown or malformed payload"),
                None => tracing::warn!(error = %e, "ignoring unparseable client message"),
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tag_is_ignored_not_erroring() {
        assert!(decode_command(r#"{"type":"teleport","workerId":"w1"}"#).is_none());
    }

    #[test]
    fn malformed_json_is_ignored() {
        assert!(decode_command("{not json").is_none());
    }

    #[test]
    fn known_tag_decodes() {
        let cmd = decode_command(r#"{"type":"kill","workerId":"w1"}"#);
        assert!(cmd.is_some());
    }
}
