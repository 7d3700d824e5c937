//! SHA-256 baselines for the files that define the assistant's identity and
//! configuration, and detection of changes made outside the normal flow.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::IntegrityConfig;

pub const MONITORED_FILES: &[&str] = &["SOUL.md", "AGENTS.md", "IDENTITY.md", "USER.md"];

const HASHES_FILE: &str = "integrity_hashes.json";
const DELETED_MARKER: &str = "DELETED";

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to serialize integrity hashes: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Stored baseline for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub path: String,
    pub hash: String,
    pub size: u64,
    pub modified: String,
    pub checked_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    Deleted,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub file: String,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub expected_hash: String,
    pub actual_hash: Option<String>,
}

impl Violation {
    /// Actual hash as reported to alert sinks; deleted files report `DELETED`.
    #[must_use]
    pub fn actual_or_marker(&self) -> &str {
        self.actual_hash.as_deref().unwrap_or(DELETED_MARKER)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedFile {
    pub path: String,
    pub hash: String,
    pub size: u64,
    pub last_checked: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityStatus {
    pub enabled: bool,
    pub monitored_files: usize,
    pub tracked_files: usize,
    pub files: Vec<TrackedFile>,
}

type ViolationHandler = Box<dyn Fn(&Violation) + Send + Sync>;

pub struct IntegrityMonitor {
    workspace: PathBuf,
    config_path: Option<PathBuf>,
    enabled: bool,
    hashes_file: PathBuf,
    hashes: BTreeMap<String, FileHash>,
    on_violation: Option<ViolationHandler>,
}

impl std::fmt::Debug for IntegrityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityMonitor")
            .field("workspace", &self.workspace)
            .field("config_path", &self.config_path)
            .field("enabled", &self.enabled)
            .field("hashes_file", &self.hashes_file)
            .field("tracked", &self.hashes.len())
            .finish_non_exhaustive()
    }
}

impl IntegrityMonitor {
    /// Create a monitor and load any baselines persisted in the state directory.
    ///
    /// An unreadable or corrupt baseline file is logged and treated as empty.
    #[must_use]
    pub fn new(workspace: &Path, config_path: Option<&Path>, config: &IntegrityConfig) -> Self {
        let hashes_file = config.resolved_state_dir().join(HASHES_FILE);
        let hashes = match load_hashes(&hashes_file) {
            Ok(hashes) => hashes,
            Err(e) => {
                tracing::warn!("failed to load integrity hashes: {e}");
                BTreeMap::new()
            }
        };

        Self {
            workspace: workspace.to_path_buf(),
            config_path: config_path.map(Path::to_path_buf),
            enabled: config.enabled,
            hashes_file,
            hashes,
            on_violation: None,
        }
    }

    /// Register a handler invoked once per violation found by [`verify`](Self::verify).
    #[must_use]
    pub fn with_violation_handler(
        mut self,
        handler: impl Fn(&Violation) + Send + Sync + 'static,
    ) -> Self {
        self.on_violation = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn hashes_file(&self) -> &Path {
        &self.hashes_file
    }

    fn candidates(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = MONITORED_FILES
            .iter()
            .map(|name| self.workspace.join(name))
            .collect();
        files.extend(self.config_path.clone());
        files
    }

    /// Monitored files that currently exist.
    #[must_use]
    pub fn monitored_files(&self) -> Vec<PathBuf> {
        self.candidates().into_iter().filter(|p| p.exists()).collect()
    }

    /// Record baselines for every existing monitored file and persist them.
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline file cannot be written.
    pub fn initialize(&mut self) -> Result<BTreeMap<String, String>, IntegrityError> {
        let mut results = BTreeMap::new();
        for path in self.monitored_files() {
            match snapshot(&path) {
                Ok(record) => {
                    tracing::info!(
                        "initialized integrity hash for {}: {}...",
                        display_name(&path),
                        short(&record.hash)
                    );
                    results.insert(record.path.clone(), record.hash.clone());
                    self.hashes.insert(record.path.clone(), record);
                }
                Err(e) => tracing::error!("{e}"),
            }
        }
        self.save()?;
        Ok(results)
    }

    /// Compare every tracked file against its baseline.
    ///
    /// Files without a baseline are skipped. Returns an empty list when
    /// monitoring is disabled.
    pub fn verify(&self) -> Vec<Violation> {
        if !self.enabled {
            return Vec::new();
        }

        let mut violations = Vec::new();
        for path in self.candidates() {
            let key = path_key(&path);
            let Some(stored) = self.hashes.get(&key) else {
                tracing::debug!("file not tracked: {}", display_name(&path));
                continue;
            };

            let violation = match hash_file(&path) {
                Ok(actual) if actual == stored.hash => continue,
                Ok(actual) => {
                    tracing::error!(
                        "INTEGRITY: file modified: {} (expected {}..., got {}...)",
                        display_name(&path),
                        short(&stored.hash),
                        short(&actual)
                    );
                    Violation {
                        file: key,
                        kind: ViolationKind::Modified,
                        expected_hash: stored.hash.clone(),
                        actual_hash: Some(actual),
                    }
                }
                Err(IntegrityError::Read { source, .. })
                    if source.kind() == io::ErrorKind::NotFound =>
                {
                    tracing::error!(
                        "INTEGRITY: monitored file deleted: {}",
                        display_name(&path)
                    );
                    Violation {
                        file: key,
                        kind: ViolationKind::Deleted,
                        expected_hash: stored.hash.clone(),
                        actual_hash: None,
                    }
                }
                Err(e) => {
                    tracing::error!("{e}");
                    continue;
                }
            };

            if let Some(handler) = &self.on_violation {
                handler(&violation);
            }
            violations.push(violation);
        }
        violations
    }

    /// Re-baseline one file after an authorized change.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the baselines cannot be saved.
    pub fn update_hash(&mut self, path: &Path) -> Result<Option<String>, IntegrityError> {
        if !path.exists() {
            return Ok(None);
        }
        let record = snapshot(path)?;
        let hash = record.hash.clone();
        self.hashes.insert(record.path.clone(), record);
        self.save()?;
        tracing::info!(
            "updated integrity hash for {}: {}...",
            display_name(path),
            short(&hash)
        );
        Ok(Some(hash))
    }

    #[must_use]
    pub fn status(&self) -> IntegrityStatus {
        IntegrityStatus {
            enabled: self.enabled,
            monitored_files: self.monitored_files().len(),
            tracked_files: self.hashes.len(),
            files: self
                .hashes
                .values()
                .map(|h| TrackedFile {
                    path: h.path.clone(),
                    hash: format!("{}...", short(&h.hash)),
                    size: h.size,
                    last_checked: h.checked_at.clone(),
                })
                .collect(),
        }
    }

    fn save(&self) -> Result<(), IntegrityError> {
        if let Some(parent) = self.hashes_file.parent() {
            std::fs::create_dir_all(parent).map_err(|source| IntegrityError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&self.hashes)?;
        std::fs::write(&self.hashes_file, json).map_err(|source| IntegrityError::Write {
            path: self.hashes_file.clone(),
            source,
        })
    }
}

fn load_hashes(path: &Path) -> Result<BTreeMap<String, FileHash>, IntegrityError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| IntegrityError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn hash_file(path: &Path) -> Result<String, IntegrityError> {
    let read_err = |source| IntegrityError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(read_err)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn snapshot(path: &Path) -> Result<FileHash, IntegrityError> {
    let hash = hash_file(path)?;
    let meta = std::fs::metadata(path).map_err(|source| IntegrityError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let modified = meta
        .modified()
        .map(|t| format_time(chrono::DateTime::<chrono::Local>::from(t)))
        .unwrap_or_default();

    Ok(FileHash {
        path: path_key(path),
        hash,
        size: meta.len(),
        modified,
        checked_at: format_time(chrono::Local::now()),
    })
}

fn format_time(time: chrono::DateTime<chrono::Local>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path_key(path), |n| n.to_string_lossy().into_owned())
}

fn short(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}
