//! Injection screening for tool arguments.
//!
//! Every string argument is checked against a table of dangerous patterns
//! before a tool sees it. Some patterns always block; the rest only produce
//! warnings unless the sanitizer runs in strict mode.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::config::SanitizerConfig;

/// Pattern names that block regardless of strict mode.
const ALWAYS_BLOCKING: &[&str] = &[
    "fork_bomb",
    "null_byte",
    "recursive_delete_root",
    "dd_disk_write",
    "filesystem_format",
];

const SENSITIVE_PATHS: &[&str] = &["/etc/passwd", "/etc/shadow", "/dev/", "~root"];

/// Parameter names screened as filesystem paths.
const PATH_PARAMS: &[&str] = &["path", "file_path", "working_dir", "directory"];

/// Name of the shell tool whose `command` parameter may carry shell syntax.
const SHELL_TOOL: &str = "exec";

struct NamedPattern {
    name: &'static str,
    regex: Regex,
}

fn compile(table: &[(&str, &'static str)]) -> Vec<NamedPattern> {
    table
        .iter()
        .map(|(pattern, name)| NamedPattern {
            name,
            regex: RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("sanitizer pattern is valid"),
        })
        .collect()
}

static DANGEROUS_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    compile(&[
        (r"[;&|`$]", "shell_metachar"),
        (r"\$\([^)]+\)", "command_substitution"),
        (r"`[^`]+`", "backtick_execution"),
        (r"\.\./", "path_traversal"),
        (r"\.\.\\", "path_traversal_windows"),
        (r"\x00", "null_byte"),
        (r"\x1b\[", "ansi_escape"),
    ])
});

static EXEC_DANGEROUS_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    compile(&[
        (r"\brm\s+-[rf]{1,2}\s+/", "recursive_delete_root"),
        (r"\bsudo\b", "sudo_usage"),
        (r"\bchmod\s+777\b", "insecure_permissions"),
        (r"\bcurl\b.*\|\s*(ba)?sh", "curl_pipe_shell"),
        (r"\bwget\b.*\|\s*(ba)?sh", "wget_pipe_shell"),
        (r">\s*/dev/sd", "direct_disk_write"),
        (r"\bdd\s+if=.*of=/dev/", "dd_disk_write"),
        (r"\bmkfs\b", "filesystem_format"),
        (r":\(\)\s*\{.*\};\s*:", "fork_bomb"),
        (r"\b(shutdown|reboot|poweroff|halt)\b", "system_power"),
    ])
});

/// What a string argument is used for; selects the length ceiling and pattern set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Command,
    Path,
    Content,
    Default,
}

impl InputKind {
    /// Maximum accepted length in characters.
    #[must_use]
    pub fn max_len(self) -> usize {
        match self {
            Self::Command => 10_000,
            Self::Path => 4_096,
            Self::Content => 1_000_000,
            Self::Default => 50_000,
        }
    }
}

/// Outcome of screening one value or a whole parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizationResult<T> {
    pub safe: bool,
    pub sanitized_value: T,
    pub warnings: Vec<String>,
    pub blocked_reason: Option<String>,
}

impl<T> SanitizationResult<T> {
    fn blocked(value: T, reason: String) -> Self {
        Self {
            safe: false,
            sanitized_value: value,
            warnings: vec![reason.clone()],
            blocked_reason: Some(reason),
        }
    }

    fn finish(value: T, warnings: Vec<String>, blocked_reason: Option<String>) -> Self {
        Self {
            safe: blocked_reason.is_none(),
            sanitized_value: value,
            warnings,
            blocked_reason,
        }
    }
}

/// Validates tool arguments against injection patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSanitizer {
    strict_mode: bool,
}

impl InputSanitizer {
    /// In strict mode any warning blocks; otherwise only critical findings do.
    #[must_use]
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    #[must_use]
    pub fn from_config(config: &SanitizerConfig) -> Self {
        Self::new(config.strict)
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict_mode
    }

    /// Screen a single string.
    ///
    /// Oversized input is truncated and blocked. Null bytes are stripped and
    /// blocked. Pattern matches become warnings, some of which block.
    #[must_use]
    pub fn sanitize_string(
        &self,
        value: &str,
        kind: InputKind,
        allow_shell_chars: bool,
    ) -> SanitizationResult<String> {
        let max_len = kind.max_len();
        let len = value.chars().count();
        if len > max_len {
            return SanitizationResult::blocked(
                value.chars().take(max_len).collect(),
                format!("Input exceeds maximum length ({len} > {max_len})"),
            );
        }

        if value.contains('\0') {
            return SanitizationResult::blocked(
                value.replace('\0', ""),
                "Input contains null bytes".to_owned(),
            );
        }

        let mut warnings = Vec::new();
        let mut blocked_reason = None;

        let exec_patterns: &[NamedPattern] = if kind == InputKind::Command {
            &EXEC_DANGEROUS_PATTERNS
        } else {
            &[]
        };

        for pattern in DANGEROUS_PATTERNS.iter().chain(exec_patterns) {
            if pattern.name == "shell_metachar" && allow_shell_chars {
                continue;
            }
            if pattern.regex.is_match(value) {
                let warning = format!("Detected potentially dangerous pattern: {}", pattern.name);
                if ALWAYS_BLOCKING.contains(&pattern.name) {
                    blocked_reason = Some(warning.clone());
                }
                warnings.push(warning);
            }
        }

        if self.strict_mode && !warnings.is_empty() {
            blocked_reason = Some(warnings[0].clone());
        }

        SanitizationResult::finish(value.to_owned(), warnings, blocked_reason)
    }

    /// Screen a filesystem path.
    ///
    /// Traversal and null bytes always block; sensitive locations only warn.
    #[must_use]
    pub fn sanitize_path(&self, path: &str) -> SanitizationResult<String> {
        if path.contains("..") {
            return SanitizationResult::blocked(
                path.to_owned(),
                "Path contains traversal sequence (..)".to_owned(),
            );
        }

        if path.contains('\0') {
            return SanitizationResult::blocked(
                path.replace('\0', ""),
                "Path contains null bytes".to_owned(),
            );
        }

        let lower = path.to_lowercase();
        let warnings: Vec<String> = SENSITIVE_PATHS
            .iter()
            .filter(|s| lower.contains(*s))
            .map(|s| format!("Path references sensitive location: {s}"))
            .collect();

        let max_len = InputKind::Path.max_len();
        let len = path.chars().count();
        let mut blocked_reason =
            (len > max_len).then(|| format!("Path exceeds maximum length ({len} > {max_len})"));
        if self.strict_mode && !warnings.is_empty() {
            blocked_reason = Some(warnings[0].clone());
        }

        SanitizationResult::finish(path.to_owned(), warnings, blocked_reason)
    }

    /// Screen every string parameter of a tool call.
    ///
    /// The first blocking parameter, in the order the caller sent them, names
    /// the overall reason.
    /// Non-string values are passed through untouched.
    #[must_use]
    pub fn sanitize_tool_params(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
    ) -> SanitizationResult<Map<String, Value>> {
        let mut sanitized = Map::new();
        let mut warnings = Vec::new();
        let mut blocked_reason = None;

        for (key, value) in params {
            let Value::String(text) = value else {
                sanitized.insert(key.clone(), value.clone());
                continue;
            };

            let result = if tool_name == SHELL_TOOL && key == "command" {
                self.sanitize_string(text, InputKind::Command, true)
            } else if PATH_PARAMS.contains(&key.as_str()) {
                self.sanitize_path(text)
            } else if key == "content" {
                self.sanitize_string(text, InputKind::Content, false)
            } else {
                self.sanitize_string(text, InputKind::Default, false)
            };

            if blocked_reason.is_none()
                && let Some(reason) = &result.blocked_reason
            {
                blocked_reason = Some(format!("Parameter '{key}': {reason}"));
            }
            warnings.extend(result.warnings);
            sanitized.insert(key.clone(), Value::String(result.sanitized_value));
        }

        if !warnings.is_empty() {
            tracing::debug!(tool = tool_name, ?warnings, "sanitization warnings");
        }

        SanitizationResult::finish(sanitized, warnings, blocked_reason)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn plain_text_is_safe() {
        let result = InputSanitizer::default().sanitize_string("hello world", InputKind::Default, false);
        assert!(result.safe);
        assert!(result.warnings.is_empty());
        assert_eq!(result.sanitized_value, "hello world");
    }

    #[test]
    fn oversized_input_truncated_and_blocked() {
        let long = "a".repeat(InputKind::Command.max_len() + 5);
        let result = InputSanitizer::default().sanitize_string(&long, InputKind::Command, true);
        assert!(!result.safe);
        assert_eq!(result.sanitized_value.len(), InputKind::Command.max_len());
        assert_eq!(
            result.blocked_reason.as_deref(),
            Some("Input exceeds maximum length (10005 > 10000)")
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let text = "é".repeat(InputKind::Path.max_len());
        let result = InputSanitizer::default().sanitize_string(&text, InputKind::Path, false);
        assert!(result.safe);
    }

    #[test]
    fn null_byte_stripped_and_blocked() {
        let result = InputSanitizer::default().sanitize_string("ab\0cd", InputKind::Default, false);
        assert!(!result.safe);
        assert_eq!(result.sanitized_value, "abcd");
        assert_eq!(result.blocked_reason.as_deref(), Some("Input contains null bytes"));
    }

    #[test]
    fn shell_metachar_warns_but_passes_in_default_mode() {
        let result = InputSanitizer::default().sanitize_string("a; b", InputKind::Default, false);
        assert!(result.safe);
        assert_eq!(
            result.warnings,
            vec!["Detected potentially dangerous pattern: shell_metachar"]
        );
    }

    #[test]
    fn shell_metachar_blocks_in_strict_mode() {
        let result = InputSanitizer::new(true).sanitize_string("a | b", InputKind::Default, false);
        assert!(!result.safe);
        assert_eq!(
            result.blocked_reason.as_deref(),
            Some("Detected potentially dangerous pattern: shell_metachar")
        );
    }

    #[test]
    fn allow_shell_chars_skips_metachar_check() {
        let result = InputSanitizer::new(true).sanitize_string("ls | wc -l", InputKind::Command, true);
        assert!(result.safe);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn command_substitution_still_reported_with_shell_chars_allowed() {
        let result =
            InputSanitizer::default().sanitize_string("echo $(whoami)", InputKind::Command, true);
        assert!(result.safe);
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.ends_with("command_substitution"))
        );
    }

    #[test]
    fn fork_bomb_always_blocks() {
        let result =
            InputSanitizer::default().sanitize_string(":(){ :|:& };:", InputKind::Command, true);
        assert!(!result.safe);
        assert_eq!(
            result.blocked_reason.as_deref(),
            Some("Detected potentially dangerous pattern: fork_bomb")
        );
    }

    #[test]
    fn recursive_delete_root_blocks_case_insensitively() {
        let result = InputSanitizer::default().sanitize_string("RM -RF /", InputKind::Command, true);
        assert!(!result.safe);
    }

    #[test]
    fn exec_patterns_only_apply_to_commands() {
        let result = InputSanitizer::default().sanitize_string("mkfs.ext4", InputKind::Default, false);
        assert!(result.safe);
        let result = InputSanitizer::default().sanitize_string("mkfs /dev/sda1", InputKind::Command, true);
        assert!(!result.safe);
    }

    #[test]
    fn sudo_is_informational_in_default_mode() {
        let result = InputSanitizer::default().sanitize_string("sudo ls", InputKind::Command, true);
        assert!(result.safe);
        assert_eq!(
            result.warnings,
            vec!["Detected potentially dangerous pattern: sudo_usage"]
        );
    }

    #[test]
    fn ansi_escape_detected() {
        let result = InputSanitizer::default().sanitize_string("\x1b[31mred", InputKind::Default, false);
        assert!(result.warnings.iter().any(|w| w.ends_with("ansi_escape")));
    }

    #[test]
    fn path_traversal_blocks() {
        let result = InputSanitizer::default().sanitize_path("notes/../../secret");
        assert!(!result.safe);
        assert_eq!(
            result.blocked_reason.as_deref(),
            Some("Path contains traversal sequence (..)")
        );
    }

    #[test]
    fn sensitive_path_warns_only_outside_strict_mode() {
        let result = InputSanitizer::default().sanitize_path("/etc/passwd");
        assert!(result.safe);
        assert_eq!(
            result.warnings,
            vec!["Path references sensitive location: /etc/passwd"]
        );

        let strict = InputSanitizer::new(true).sanitize_path("/dev/sda");
        assert!(!strict.safe);
    }

    #[test]
    fn path_null_byte_blocks() {
        let result = InputSanitizer::default().sanitize_path("a\0b");
        assert!(!result.safe);
        assert_eq!(result.sanitized_value, "ab");
    }

    #[test]
    fn tool_params_dispatch_by_name() {
        let sanitizer = InputSanitizer::default();
        let result = sanitizer.sanitize_tool_params(
            "exec",
            &params(json!({"command": "ls -la | grep src", "working_dir": "/home/me/project"})),
        );
        assert!(result.safe, "{:?}", result.blocked_reason);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn shell_chars_only_allowed_for_exec_command() {
        let sanitizer = InputSanitizer::new(true);
        let result = sanitizer.sanitize_tool_params("other", &params(json!({"command": "a; b"})));
        assert!(!result.safe);
        assert_eq!(
            result.blocked_reason.as_deref(),
            Some("Parameter 'command': Detected potentially dangerous pattern: shell_metachar")
        );
    }

    #[test]
    fn tool_params_block_prefixed_with_key() {
        let result = InputSanitizer::default().sanitize_tool_params(
            "read_file",
            &params(json!({"path": "../etc/passwd"})),
        );
        assert!(!result.safe);
        assert_eq!(
            result.blocked_reason.as_deref(),
            Some("Parameter 'path': Path contains traversal sequence (..)")
        );
    }

    #[test]
    fn non_string_params_pass_through() {
        let input = params(json!({"limit": 5, "flags": ["a;b"], "nested": {"x": "../"}}));
        let result = InputSanitizer::new(true).sanitize_tool_params("any", &input);
        assert!(result.safe);
        assert_eq!(result.sanitized_value, input);
    }

    #[test]
    fn first_blocking_parameter_wins() {
        let result = InputSanitizer::default().sanitize_tool_params(
            "write_file",
            &params(json!({"path": "../a", "content": "x\0"})),
        );
        assert_eq!(
            result.blocked_reason.as_deref(),
            Some("Parameter 'path': Path contains traversal sequence (..)")
        );
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn parameters_are_screened_in_call_order() {
        let params: Map<String, Value> =
            serde_json::from_str(r#"{"content": "x\u0000", "path": "../a"}"#).unwrap();
        let result = InputSanitizer::default().sanitize_tool_params("write_file", &params);
        assert_eq!(
            result.blocked_reason.as_deref(),
            Some("Parameter 'content': Input contains null bytes")
        );
        let keys: Vec<&str> = result.sanitized_value.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["content", "path"]);
    }

    #[test]
    fn sanitized_values_replace_originals() {
        let result = InputSanitizer::default()
            .sanitize_tool_params("any", &params(json!({"query": "a\0b"})));
        assert_eq!(result.sanitized_value["query"], json!("ab"));
    }

    proptest! {
        #[test]
        fn null_bytes_never_survive(prefix in ".*", suffix in ".*") {
            let input = format!("{prefix}\0{suffix}");
            let result = InputSanitizer::default().sanitize_string(&input, InputKind::Default, false);
            prop_assert!(!result.safe);
            prop_assert!(!result.sanitized_value.contains('\0'));
        }

        #[test]
        fn safe_strings_are_stable(input in "[a-zA-Z0-9 _.,-]{0,200}") {
            let sanitizer = InputSanitizer::default();
            let first = sanitizer.sanitize_string(&input, InputKind::Default, false);
            prop_assert!(first.safe);
            let second = sanitizer.sanitize_string(&first.sanitized_value, InputKind::Default, false);
            prop_assert!(second.safe);
            prop_assert_eq!(first.sanitized_value, second.sanitized_value);
        }
    }
}
