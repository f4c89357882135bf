//! Task payload validation: a security boundary on content arriving from
//! REST/WS callers before it reaches a Task's `payload` map.

use html_escape::encode_text;
use regex::Regex;
use std::collections::HashSet;

use crate::constants::{MAX_CONTEXT_KEY_LENGTH, MAX_CONTEXT_VALUE_LENGTH, MAX_TASK_PAYLOAD_LENGTH};
use crate::error::OrchestratorError;

static SAFE_CONTENT_REGEX: &str =
    r"^[a-zA-Z0-9\s\.,!?:;()\[\]{}\-_+=@#$%^&*|\\/<>'`~\n\r\t]+$";

static DANGEROUS_PATTERNS: &[&str] = &[
    "<script",
    "javascript:",
    "data:text/html",
    "vbscript:",
    "&&",
    "||",
    ";rm",
    ";del",
    "`rm",
    "`del",
    "$(rm",
    "$(del",
    "';",
    "\";",
    "union select",
    "drop table",
    "delete from",
    "../",
    "..\\",
    "file://",
    "/etc/passwd",
    "/etc/shadow",
    "C:\\Windows\\System32",
];

#[derive(Debug, Clone)]
pub struct TaskContentValidator {
    safe_content_regex: Regex,
    dangerous_patterns: HashSet<String>,
}

impl TaskContentValidator {
    pub fn new() -> Result<Self, OrchestratorError> {
        let safe_content_regex = Regex::new(SAFE_CONTENT_REGEX)
            .map_err(|e| OrchestratorError::Invalid(format!("invalid validator regex: {e}")))?;
        let dangerous_patterns = DANGEROUS_PATTERNS.iter().map(|s| s.to_lowercase()).collect();
        Ok(Self {
            safe_content_regex,
            dangerous_patterns,
        })
    }

    fn contains_dangerous_pattern(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.dangerous_patterns.iter().any(|p| lower.contains(p.as_str()))
    }

    pub fn validate_and_sanitize_value(&self, value: &str, max_len: usize) -> Result<String, OrchestratorError> {
        if value.len() > max_len {
            return Err(OrchestratorError::Invalid(format!(
                "value exceeds maximum length of {max_len} characters"
            )));
        }
        if self.contains_dangerous_pattern(value) {
            return Err(OrchestratorError::Invalid(
                "value contains a disallowed pattern".to_string(),
            ));
        }
        if !value.is_empty() && !self.safe_content_regex.is_match(value) {
            return Err(OrchestratorError::Invalid(
                "value contains characters outside the allowed set".to_string(),
            ));
        }
        Ok(encode_text(value).to_string())
    }

    pub fn validate_task_type(&self, task_type: &str) -> Result<(), OrchestratorError> {
        if task_type.is_empty() || task_type.len() > MAX_CONTEXT_KEY_LENGTH {
            return Err(OrchestratorError::Invalid(
                "task type must be non-empty and under the key length limit".to_string(),
            ));
        }
        if !task_type.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-') {
            return Err(OrchestratorError::Invalid(
                "task type contains disallowed characters".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_context_key(&self, key: &str) -> Result<(), OrchestratorError> {
        if key.is_empty() || key.len() > MAX_CONTEXT_KEY_LENGTH {
            return Err(OrchestratorError::Invalid(format!(
                "context key must be non-empty and under {MAX_CONTEXT_KEY_LENGTH} characters"
            )));
        }
        if !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(OrchestratorError::Invalid(
                "context keys may only contain alphanumeric characters and underscores".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_payload(&self, payload: &std::collections::HashMap<String, String>) -> Result<(), OrchestratorError> {
        for (key, value) in payload {
            self.validate_context_key(key)?;
            self.validate_and_sanitize_value(value, MAX_CONTEXT_VALUE_LENGTH)?;
        }
        Ok(())
    }
}

impl Default for TaskContentValidator {
    fn default() -> Self {
        Self::new().expect("validator regex is a fixed, known-valid pattern")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_clean_content() {
        let validator = TaskContentValidator::new().unwrap();
        let result = validator.validate_and_sanitize_value(
            "Create a hello world function in Rust",
            MAX_TASK_PAYLOAD_LENGTH,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_script_injection() {
        let validator = TaskContentValidator::new().unwrap();
        let result = validator.validate_and_sanitize_value(
            "Create a function <script>alert('xss')</script>",
            MAX_TASK_PAYLOAD_LENGTH,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_command_injection() {
        let validator = TaskContentValidator::new().unwrap();
        let result =
            validator.validate_and_sanitize_value("Create file && rm -rf /", MAX_TASK_PAYLOAD_LENGTH);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_oversized_content() {
        let validator = TaskContentValidator::new().unwrap();
        let long_content = "x".repeat(MAX_TASK_PAYLOAD_LENGTH + 1);
        let result = validator.validate_and_sanitize_value(&long_content, MAX_TASK_PAYLOAD_LENGTH);
        assert!(result.is_err());
    }

    #[test]
    fn accepts_content_at_exact_limit() {
        let validator = TaskContentValidator::new().unwrap();
        let boundary = "x".repeat(MAX_TASK_PAYLOAD_LENGTH);
        assert!(validator
            .validate_and_sanitize_value(&boundary, MAX_TASK_PAYLOAD_LENGTH)
            .is_ok());
    }

    #[test]
    fn validates_context_keys() {
        let validator = TaskContentValidator::new().unwrap();
        for key in ["project_type", "language", "priority_hint"] {
            assert!(validator.validate_context_key(key).is_ok());
        }
        for key in ["", "key with spaces", "key-with-dashes", "key/with/slashes"] {
            assert!(validator.validate_context_key(key).is_err());
        }
    }

    #[test]
    fn rejects_dangerous_context_values() {
        let validator = TaskContentValidator::new().unwrap();
        for value in [
            "<script>alert('xss')</script>",
            "'; DROP TABLE users; --",
            "javascript:alert(1)",
            "file://etc/passwd",
        ] {
            assert!(validator
                .validate_and_sanitize_value(value, MAX_CONTEXT_VALUE_LENGTH)
                .is_err());
        }
    }

    #[test]
    fn validation_is_idempotent() {
        let validator = TaskContentValidator::new().unwrap();
        for input in [
            "Simple clean text",
            "Text with ampersands & symbols",
            "Mixed content with valid punctuation!",
        ] {
            let first = validator.validate_and_sanitize_value(input, MAX_TASK_PAYLOAD_LENGTH);
            let second = validator.validate_and_sanitize_value(input, MAX_TASK_PAYLOAD_LENGTH);
            assert_eq!(first.is_ok(), second.is_ok());
            if let (Ok(a), Ok(b)) = (first, second) {
                assert_eq!(a, b);
            }
        }
    }
}
