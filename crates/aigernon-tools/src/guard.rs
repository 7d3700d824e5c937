//! Allow/deny decision for shell command strings.
//!
//! Checks run in a fixed order and stop at the first rejection:
//! critical deny patterns, configured deny patterns, the allowlist and
//! finally the optional workspace restriction.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::config::ShellConfig;

/// Patterns that are always blocked, whatever the configuration says.
pub const CRITICAL_DENY_PATTERNS: &[&str] = &[
    r":\(\)\s*\{.*\};\s*:",
    r"\bdd\s+if=.*of=/dev/",
    r">\s*/dev/sd",
    r"\b(mkfs|fdisk|parted)\b",
    r"\b(shutdown|reboot|poweroff|halt|init\s+0)\b",
    r"\brm\s+-[rf]{2,}\s+/\s*$",
    r"\brm\s+-[rf]{2,}\s+/\*",
    r"\bchmod\s+-R\s+777\s+/",
    r"\bchown\s+-R\s+.*\s+/\s*$",
];

/// Read-mostly command prefixes allowed when no `allow_prefixes` are configured.
#[rustfmt::skip]
pub const DEFAULT_ALLOW_PREFIXES: &[&str] = &[
    // version control
    "git ",
    // package managers, read operations
    "npm list", "npm ls", "npm view", "npm search", "npm info",
    "pip list", "pip show", "pip search",
    "brew list", "brew info", "brew search",
    // file inspection
    "ls ", "ls\n", "cat ", "head ", "tail ", "less ", "more ",
    "wc ", "file ", "stat ", "du ", "df ",
    "find ", "locate ", "which ", "whereis ", "type ",
    // text processing
    "grep ", "awk ", "sed ", "sort ", "uniq ", "cut ", "tr ",
    "jq ", "yq ",
    // development
    "python ", "python3 ", "node ", "npm run", "npm test", "npm start",
    "cargo ", "go ", "rustc ", "gcc ", "clang ",
    "make ", "cmake ", "pytest ", "jest ", "mocha ",
    // system info
    "echo ", "printf ", "date ", "whoami ", "id ", "pwd ",
    "env ", "printenv ", "uname ", "hostname ",
    "ps ", "top ", "htop ", "free ", "uptime ",
    // network diagnostics
    "ping ", "curl ", "wget ", "nc ", "nslookup ", "dig ", "host ",
    // archives and misc
    "tar ", "zip ", "unzip ", "gzip ", "gunzip ",
    "diff ", "patch ", "md5 ", "sha256sum ", "base64 ",
];

const EXEMPT_SYSTEM_PREFIXES: &[&str] = &["/usr/", "/bin/", "/opt/", "/etc/", "/tmp/"];

static CRITICAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CRITICAL_DENY_PATTERNS
        .iter()
        .map(|p| compile(p).expect("critical deny pattern is valid"))
        .collect()
});

static WINDOWS_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[A-Za-z]:\\[^\\"']+"#).expect("windows path regex is valid"));

static POSIX_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"/[^\s"']+"#).expect("posix path regex is valid"));

/// Why a command was refused. The display text is what the caller sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GuardRejection {
    #[error("Error: Command blocked by security guard (dangerous operation detected)")]
    Dangerous,

    #[error("Error: Command blocked by security guard (pattern denied)")]
    PatternDenied,

    #[error(
        "Error: Command not in allowlist. For security, only approved commands are allowed. Common operations like git, npm, python, grep, find, ls are permitted."
    )]
    NotAllowlisted,

    #[error("Error: Command blocked by security guard (path traversal detected)")]
    PathTraversal,

    #[error("Error: Command blocked by security guard (path outside workspace)")]
    OutsideWorkspace,
}

#[derive(Debug, thiserror::Error)]
pub enum GuardConfigError {
    #[error("invalid {kind} pattern '{pattern}': {source}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Debug)]
pub struct CommandGuard {
    deny: Vec<Regex>,
    allow: Vec<Regex>,
    allow_prefixes: Vec<String>,
    use_allowlist: bool,
    restrict_to_workspace: bool,
}

impl CommandGuard {
    /// Build a guard from shell configuration.
    ///
    /// # Errors
    ///
    /// Returns `GuardConfigError` if a configured deny or allow pattern is not a valid regex.
    pub fn new(config: &ShellConfig) -> Result<Self, GuardConfigError> {
        let deny = config
            .deny_patterns
            .iter()
            .filter(|p| !CRITICAL_DENY_PATTERNS.contains(&p.as_str()))
            .map(|p| compile_configured("deny", p))
            .collect::<Result<Vec<_>, _>>()?;
        let allow = config
            .allow_patterns
            .iter()
            .map(|p| compile_configured("allow", p))
            .collect::<Result<Vec<_>, _>>()?;
        let allow_prefixes = config.allow_prefixes.clone().unwrap_or_else(|| {
            DEFAULT_ALLOW_PREFIXES
                .iter()
                .map(|p| (*p).to_owned())
                .collect()
        });

        Ok(Self {
            deny,
            allow,
            allow_prefixes,
            use_allowlist: config.use_allowlist,
            restrict_to_workspace: config.restrict_to_workspace,
        })
    }

    /// Decide whether `command` may run with working directory `cwd`.
    ///
    /// # Errors
    ///
    /// Returns the first `GuardRejection` that applies.
    pub fn check(&self, command: &str, cwd: &Path) -> Result<(), GuardRejection> {
        let cmd = command.trim();
        let preview: String = cmd.chars().take(100).collect();

        if CRITICAL.iter().any(|re| re.is_match(cmd)) {
            tracing::warn!("command blocked (critical pattern): {preview}");
            return Err(GuardRejection::Dangerous);
        }

        if self.deny.iter().any(|re| re.is_match(cmd)) {
            tracing::warn!("command blocked (deny pattern): {preview}");
            return Err(GuardRejection::PatternDenied);
        }

        if self.use_allowlist && !self.is_allowlisted(cmd) {
            tracing::warn!("command blocked (not in allowlist): {preview}");
            return Err(GuardRejection::NotAllowlisted);
        }

        if self.restrict_to_workspace {
            check_workspace(cmd, cwd)?;
        }

        Ok(())
    }

    fn is_allowlisted(&self, cmd: &str) -> bool {
        let lower = cmd.to_lowercase();
        self.allow_prefixes
            .iter()
            .any(|prefix| lower.starts_with(&prefix.to_lowercase()) || cmd.starts_with(prefix.as_str()))
            || self.allow.iter().any(|re| re.is_match(cmd))
    }
}

fn check_workspace(cmd: &str, cwd: &Path) -> Result<(), GuardRejection> {
    if cmd.contains("../") || cmd.contains("..\\") {
        return Err(GuardRejection::PathTraversal);
    }

    let workspace = resolve(cwd);

    let candidates = WINDOWS_PATH
        .find_iter(cmd)
        .chain(POSIX_PATH.find_iter(cmd))
        .map(|m| m.as_str());

    for raw in candidates {
        if EXEMPT_SYSTEM_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            continue;
        }
        let resolved = resolve(Path::new(raw));
        if !resolved.starts_with(&workspace) {
            tracing::warn!("command blocked (path outside workspace): {raw}");
            return Err(GuardRejection::OutsideWorkspace);
        }
    }
    Ok(())
}

/// Absolute form of `path`, following symlinks where the path exists.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };
    absolute
        .canonicalize()
        .unwrap_or_else(|_| normalize(&absolute))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn compile_configured(kind: &'static str, pattern: &str) -> Result<Regex, GuardConfigError> {
    compile(pattern).map_err(|source| GuardConfigError::InvalidPattern {
        kind,
        pattern: pattern.to_owned(),
        source,
    })
}
