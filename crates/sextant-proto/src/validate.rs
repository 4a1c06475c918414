//! Validation of server-advertised metadata.
//!
//! Servers are untrusted input. Tool names feed into shell-adjacent
//! places downstream (logs, CLI completion, config keys), so the client
//! rejects names outside a conservative character set before anything
//! else sees them.

use crate::types::Tool;
use thiserror::Error;

/// Upper bound on tool name length, in bytes.
pub const TOOL_NAME_MAX_LEN: usize = 128;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tool name is empty")]
    EmptyName,
    #[error("tool name is {0} bytes, limit is {TOOL_NAME_MAX_LEN}")]
    NameTooLong(usize),
    #[error("tool name contains {0:?}; allowed are ASCII letters, digits, '_', '-' and '.'")]
    InvalidChar(char),
    #[error("tool {0:?} has no object input schema")]
    MissingSchema(String),
}

/// Check a tool name against the allowed grammar:
/// 1 to 128 bytes of `[A-Za-z0-9_.-]`.
pub fn validate_tool_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.len() > TOOL_NAME_MAX_LEN {
        return Err(ValidationError::NameTooLong(name.len()));
    }
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.') {
            return Err(ValidationError::InvalidChar(c));
        }
    }
    Ok(())
}

/// Validate a full tool definition as received from a server.
pub fn validate_tool(tool: &Tool) -> Result<(), ValidationError> {
    validate_tool_name(&tool.name)?;
    if !tool.input_schema.is_object() {
        return Err(ValidationError::MissingSchema(tool.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_reasonable_names() {
        for name in ["echo", "get_weather", "fs-read", "v2.list", "A1", "_x"] {
            assert_eq!(validate_tool_name(name), Ok(()), "{name}");
        }
    }

    #[test]
    fn rejects_empty_name() {
        assert_eq!(validate_tool_name(""), Err(ValidationError::EmptyName));
    }

    #[test]
    fn enforces_length_boundary() {
        let at_limit = "a".repeat(TOOL_NAME_MAX_LEN);
        assert_eq!(validate_tool_name(&at_limit), Ok(()));

        let over = "a".repeat(TOOL_NAME_MAX_LEN + 1);
        assert_eq!(
            validate_tool_name(&over),
            Err(ValidationError::NameTooLong(TOOL_NAME_MAX_LEN + 1))
        );
    }

    #[test]
    fn rejects_forbidden_characters() {
        assert_eq!(
            validate_tool_name("rm -rf"),
            Err(ValidationError::InvalidChar(' '))
        );
        assert_eq!(
            validate_tool_name("tool/name"),
            Err(ValidationError::InvalidChar('/'))
        );
        assert_eq!(
            validate_tool_name("café"),
            Err(ValidationError::InvalidChar('é'))
        );
    }

    #[test]
    fn tool_must_carry_object_schema() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "echo",
            "inputSchema": "not a schema"
        }))
        .unwrap();
        assert_eq!(
            validate_tool(&tool),
            Err(ValidationError::MissingSchema("echo".into()))
        );

        let ok: Tool = serde_json::from_value(json!({"name": "echo"})).unwrap();
        assert_eq!(validate_tool(&ok), Ok(()));
    }
}
