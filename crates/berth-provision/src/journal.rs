//! Persistent provisioning journal.
//!
//! Keeps a local JSON index of every provisioning attempt and the state
//! transitions it went through, so `status` works without a daemon.
//! The file is rewritten atomically on every change.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use berth_common::error::{BerthError, Result};
use berth_common::types::{PortSpec, ProvisionId, ProvisionState, Sha256Hash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State entered.
    pub state: ProvisionState,
    /// When it was entered.
    pub at: DateTime<Utc>,
    /// Free-form note (failure reason, exit status).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Persistent record of a provisioning attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRecord {
    /// Attempt identifier.
    pub id: ProvisionId,
    /// Recipe the attempt was started from.
    pub recipe: PathBuf,
    /// Effective root, once established.
    pub root: Option<PathBuf>,
    /// Current state.
    pub state: ProvisionState,
    /// Every state entered, oldest first.
    pub history: Vec<Transition>,
    /// Digests of the validated manifests.
    #[serde(default)]
    pub manifests: Vec<Sha256Hash>,
    /// Number of declared packages across all manifests.
    #[serde(default)]
    pub packages: usize,
    /// Declared ports.
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    /// PID of the service process while running.
    pub pid: Option<u32>,
    /// Exit code of the service process.
    pub exit_code: Option<i32>,
}

impl ProvisionRecord {
    /// Starts a record in `Unprovisioned`.
    #[must_use]
    pub fn new(id: ProvisionId, recipe: impl Into<PathBuf>) -> Self {
        Self {
            id,
            recipe: recipe.into(),
            root: None,
            state: ProvisionState::Unprovisioned,
            history: vec![Transition {
                state: ProvisionState::Unprovisioned,
                at: Utc::now(),
                detail: None,
            }],
            manifests: Vec::new(),
            packages: 0,
            ports: Vec::new(),
            pid: None,
            exit_code: None,
        }
    }

    /// Moves to `next`, recording the transition.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::InvalidTransition`] if the state machine does
    /// not allow the move.
    pub fn advance(&mut self, next: ProvisionState, detail: Option<String>) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(BerthError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::info!(id = %self.id, from = %self.state, to = %next, "state transition");
        self.state = next;
        self.history.push(Transition {
            state: next,
            at: Utc::now(),
            detail,
        });
        Ok(())
    }

    /// When the attempt started.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.history.first().map(|t| t.at)
    }

    /// The detail of the last transition, if any.
    #[must_use]
    pub fn last_detail(&self) -> Option<&str> {
        self.history.last().and_then(|t| t.detail.as_deref())
    }
}

/// The on-disk set of provisioning records.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    records: Vec<ProvisionRecord>,
}

impl Journal {
    /// Loads the journal from `path`.
    ///
    /// A missing file is an empty journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading journal");
        let records = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(BerthError::io(path, e)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    /// Persists the journal through a uniquely named temporary file in the
    /// same directory, renamed over the journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        tracing::debug!(path = %self.path.display(), records = self.records.len(), "saving journal");
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| BerthError::io(parent, e))?;
        let json = serde_json::to_vec_pretty(&self.records)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| BerthError::io(parent, e))?;
        tmp.write_all(&json).map_err(|e| BerthError::io(tmp.path(), e))?;
        let _ = tmp
            .persist(&self.path)
            .map_err(|e| BerthError::io(&self.path, e.error))?;
        Ok(())
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[ProvisionRecord] {
        &self.records
    }

    /// The most recently started record.
    #[must_use]
    pub fn latest(&self) -> Option<&ProvisionRecord> {
        self.records.last()
    }

    /// Inserts `record`, replacing any record with the same ID.
    pub fn upsert(&mut self, record: ProvisionRecord) {
        if let Some(slot) = self.records.iter_mut().find(|r| r.id == record.id) {
            *slot = record;
        } else {
            self.records.push(record);
        }
    }

    /// Finds a record by full ID or unique prefix.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::NotFound`] when nothing matches and
    /// [`BerthError::Config`] when the prefix is ambiguous.
    pub fn find(&self, prefix: &str) -> Result<&ProvisionRecord> {
        if let Some(exact) = self.records.iter().find(|r| r.id.as_str() == prefix) {
            return Ok(exact);
        }
        let mut matches = self.records.iter().filter(|r| r.id.matches_prefix(prefix));
        match (matches.next(), matches.next()) {
            (Some(record), None) => Ok(record),
            (Some(_), Some(_)) => Err(BerthError::Config {
                message: format!("ID prefix '{prefix}' is ambiguous"),
            }),
            (None, _) => Err(BerthError::NotFound {
                kind: "provisioning attempt",
                id: prefix.to_string(),
            }),
        }
    }
}

/// Writes `record` into the journal at `path`.
///
/// The journal is re-read first so records committed by earlier attempts
/// are kept. Writers are not serialized: when two processes commit at the
/// same moment the last rename wins and the other update is lost.
///
/// # Errors
///
/// Returns an error if the journal cannot be read or written.
pub fn commit(path: &Path, record: &ProvisionRecord) -> Result<()> {
    let mut journal = Journal::open(path)?;
    journal.upsert(record.clone());
    journal.save()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_journal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::open(&dir.path().join("state.json")).expect("open");
        assert!(journal.records().is_empty());
        assert!(journal.latest().is_none());
    }

    #[test]
    fn advance_follows_state_machine() {
        let mut rec = ProvisionRecord::new(ProvisionId::new("a"), "Berthfile");
        rec.advance(ProvisionState::RootEstablished, None).expect("root");
        rec.advance(ProvisionState::DependenciesInstalled, None).expect("deps");
        let err = rec.advance(ProvisionState::RootEstablished, None).unwrap_err();
        assert!(matches!(err, BerthError::InvalidTransition { .. }));
        assert_eq!(rec.history.len(), 3);
    }

    #[test]
    fn failed_is_permanent() {
        let mut rec = ProvisionRecord::new(ProvisionId::new("a"), "Berthfile");
        rec.advance(ProvisionState::Failed, Some("boom".into())).expect("fail");
        assert_eq!(rec.last_detail(), Some("boom"));
        assert!(rec.advance(ProvisionState::RootEstablished, None).is_err());
        assert!(rec.advance(ProvisionState::Failed, None).is_err());
    }

    #[test]
    fn commit_persists_and_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("state.json");
        let mut rec = ProvisionRecord::new(ProvisionId::new("abc"), "Berthfile");
        commit(&path, &rec).expect("first commit");
        rec.advance(ProvisionState::RootEstablished, None).expect("advance");
        commit(&path, &rec).expect("second commit");

        let journal = Journal::open(&path).expect("reopen");
        assert_eq!(journal.records().len(), 1);
        assert_eq!(journal.records()[0].state, ProvisionState::RootEstablished);
        let leftovers: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("state.json")]);
    }

    #[test]
    fn states_are_stored_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        let mut rec = ProvisionRecord::new(ProvisionId::new("abc"), "Berthfile");
        rec.advance(ProvisionState::RootEstablished, None).expect("advance");
        commit(&path, &rec).expect("commit");
        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"ROOT_ESTABLISHED\""), "got: {raw}");
    }

    #[test]
    fn find_by_prefix() {
        let mut journal = Journal::open(Path::new("/nonexistent/state.json")).expect("open");
        journal.upsert(ProvisionRecord::new(ProvisionId::new("abc123"), "B"));
        journal.upsert(ProvisionRecord::new(ProvisionId::new("abd456"), "B"));
        assert_eq!(journal.find("abc").expect("unique").id.as_str(), "abc123");
        assert!(matches!(journal.find("ab"), Err(BerthError::Config { .. })));
        assert!(matches!(journal.find("zz"), Err(BerthError::NotFound { .. })));
    }

    #[test]
    fn corrupt_journal_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(matches!(
            Journal::open(&path),
            Err(BerthError::Serialization { .. })
        ));
    }
}
