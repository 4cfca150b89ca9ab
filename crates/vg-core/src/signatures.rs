//! Malicious-signature denylists
//!
//! The signature set is shared by the orchestrator and the background scan
//! loop and is reloaded from disk while both are running. Readers always
//! take an immutable snapshot (`Arc<SignatureSet>`); a reload swaps the
//! pointer, so a reader never observes a half-updated set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::error::SignatureError;

/// Process-name, port and domain denylists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignatureSet {
    /// Executable names of disallowed applications
    pub process_names: Vec<String>,
    /// Ports commonly used by remote-control tools
    pub ports: Vec<u16>,
    /// Domains of screen-sharing or remote-control services
    pub domains: Vec<String>,
}

impl SignatureSet {
    /// Parse a signature file
    pub fn from_file(path: &Path) -> Result<Self, SignatureError> {
        if !path.exists() {
            return Err(SignatureError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read(path).map_err(|source| SignatureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Find the denylist entry matching a process name
    ///
    /// Matching is case-insensitive and ignores a trailing `.exe` / `.app`.
    pub fn match_process(&self, process_name: &str) -> Option<&str> {
        let candidate = normalize_process_name(process_name);
        self.process_names
            .iter()
            .find(|entry| normalize_process_name(entry) == candidate)
            .map(String::as_str)
    }

    /// Whether a port is on the denylist
    pub fn matches_port(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }

    /// Whether a host is a denylisted domain or one of its subdomains
    pub fn matches_domain(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }

    /// Total number of entries across all lists
    pub fn len(&self) -> usize {
        self.process_names.len() + self.ports.len() + self.domains.len()
    }

    /// Whether all lists are empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short content hash used to detect changes between reloads
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        hex::encode(&digest[..8])
    }
}

fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    lower
        .strip_suffix(".exe")
        .or_else(|| lower.strip_suffix(".app"))
        .unwrap_or(&lower)
        .to_string()
}

/// Copy-on-read holder of the current signature set
pub struct SignatureStore {
    /// Backing file, if any
    path: Option<PathBuf>,
    /// Current snapshot
    current: RwLock<Arc<SignatureSet>>,
    /// Bumped every time the snapshot changes
    revision: watch::Sender<u64>,
}

impl SignatureStore {
    /// Create an in-memory store
    pub fn new(set: SignatureSet) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            path: None,
            current: RwLock::new(Arc::new(set)),
            revision,
        }
    }

    /// Create a store backed by a file
    ///
    /// A missing or unreadable file starts the store empty; the periodic
    /// reload will pick the file up once it appears.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = match SignatureSet::from_file(&path) {
            Ok(set) => {
                tracing::info!(
                    "Loaded {} signatures from {:?} (fingerprint {})",
                    set.len(),
                    path,
                    set.fingerprint()
                );
                set
            }
            Err(e) => {
                tracing::warn!("Starting with empty signature set: {}", e);
                SignatureSet::default()
            }
        };

        let (revision, _) = watch::channel(0);
        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(initial)),
            revision,
        }
    }

    /// Take an immutable snapshot of the current signatures
    pub fn snapshot(&self) -> Arc<SignatureSet> {
        Arc::clone(&self.current.read())
    }

    /// Replace the current set; returns `true` if the content changed
    pub fn replace(&self, set: SignatureSet) -> bool {
        {
            let mut current = self.current.write();
            if current.fingerprint() == set.fingerprint() {
                return false;
            }
            *current = Arc::new(set);
        }
        self.revision.send_modify(|rev| *rev += 1);
        true
    }

    /// Re-read the backing file; returns `true` if the content changed
    pub async fn reload(&self) -> Result<bool, SignatureError> {
        let Some(path) = self.path.clone() else {
            return Ok(false);
        };

        let set = tokio::task::spawn_blocking(move || SignatureSet::from_file(&path))
            .await
            .map_err(|e| SignatureError::Read {
                path: self.path.clone().unwrap_or_default(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })??;

        let changed = self.replace(set);
        if changed {
            let snapshot = self.snapshot();
            tracing::info!(
                "Reloaded {} signatures (fingerprint {})",
                snapshot.len(),
                snapshot.fingerprint()
            );
        }
        Ok(changed)
    }

    /// Watch for snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current revision number
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}
