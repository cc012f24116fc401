//! Action ledger
//!
//! Action ids created by a run are written once, at the end of the run, one
//! id per line. A later `sumactl validate` reads the file back and asks the
//! server how each action went.

use chrono::{Local, NaiveDateTime};
use fleetkit::{ActionId, ActionSystem, Client};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of generated ledger file names
pub const DEFAULT_PREFIX: &str = "action_ids";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("could not access ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: '{content}' is not an action id")]
    Parse {
        path: PathBuf,
        line: usize,
        content: String,
    },
}

/// Action ids collected by a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    path: PathBuf,
    ids: Vec<ActionId>,
}

impl Ledger {
    /// Ledger written to `path`, or to `action_ids.<timestamp>` in the
    /// current directory.
    pub fn new(path: Option<PathBuf>) -> Self {
        let path =
            path.unwrap_or_else(|| PathBuf::from(default_filename(&Local::now().naive_local())));
        Self {
            path,
            ids: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ids(&self) -> &[ActionId] {
        &self.ids
    }

    pub fn append(&mut self, ids: &[ActionId]) {
        self.ids.extend_from_slice(ids);
    }

    /// Write all ids. Returns `false` without touching the disk when there
    /// is nothing to write.
    pub fn save(&self) -> Result<bool, LedgerError> {
        if self.ids.is_empty() {
            log::debug!("No action ids collected, ledger not written");
            return Ok(false);
        }
        let content: String = self.ids.iter().map(|id| format!("{id}\n")).collect();
        fs::write(&self.path, content).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })?;
        log::debug!("Action IDs file created: {}", self.path.display());
        Ok(true)
    }

    /// Read a ledger file. Blank lines are ignored.
    pub fn read(path: &Path) -> Result<Self, LedgerError> {
        let content = fs::read_to_string(path).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut ids = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line_text = line.trim();
            if line_text.is_empty() {
                continue;
            }
            let id = line_text.parse().map_err(|_| LedgerError::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                content: line_text.to_string(),
            })?;
            ids.push(id);
        }
        Ok(Self {
            path: path.to_path_buf(),
            ids,
        })
    }
}

/// `action_ids.<local timestamp>`
pub fn default_filename(now: &NaiveDateTime) -> String {
    format!("{DEFAULT_PREFIX}.{}", now.format("%Y-%m-%dT%H:%M:%S"))
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Where the systems of a set of actions stand
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub completed: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub in_progress: BTreeSet<String>,
}

impl Reconciliation {
    /// Whether the server knew about none of the actions.
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.failed.is_empty() && self.in_progress.is_empty()
    }
}

/// Classify the systems of every action.
///
/// A fault for one id and one classification is logged and that id is left
/// out of that classification. Transport and session failures abort.
pub fn reconcile(client: &Client, ids: &[ActionId]) -> fleetkit::Result<Reconciliation> {
    Ok(Reconciliation {
        completed: classify(ids, "completed", |id| client.completed_systems(id))?,
        failed: classify(ids, "failed", |id| client.failed_systems(id))?,
        in_progress: classify(ids, "in progress", |id| client.in_progress_systems(id))?,
    })
}

fn classify<F>(ids: &[ActionId], kind: &str, mut list: F) -> fleetkit::Result<BTreeSet<String>>
where
    F: FnMut(ActionId) -> fleetkit::Result<Vec<ActionSystem>>,
{
    let mut systems = BTreeSet::new();
    for &id in ids {
        match list(id) {
            Ok(found) => systems.extend(found.into_iter().map(|s| s.server_name)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => log::error!("Could not list {kind} systems of action {id}: {e}"),
        }
    }
    Ok(systems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fleetkit::{Credentials, MemorySessionStore, Method, MockBackend};
    use tempfile::TempDir;

    fn client(mock: &MockBackend) -> Client {
        let mut client =
            Client::with_backend(Box::new(mock.clone()), Box::new(MemorySessionStore::new()));
        client.login(&Credentials::new("admin", "admin")).unwrap();
        client
    }

    #[test]
    fn test_save_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids");
        let mut ledger = Ledger::new(Some(path.clone()));
        ledger.append(&[1001, 1002]);
        ledger.append(&[2001]);

        assert!(ledger.save().unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "1001\n1002\n2001\n");

        let read = Ledger::read(&path).unwrap();
        assert_eq!(read.ids(), &[1001, 1002, 2001]);
    }

    #[test]
    fn test_empty_ledger_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids");
        let ledger = Ledger::new(Some(path.clone()));

        assert!(!ledger.save().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_read_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids");
        fs::write(&path, "\n42\n  \n 43 \n").unwrap();
        assert_eq!(Ledger::read(&path).unwrap().ids(), &[42, 43]);
    }

    #[test]
    fn test_read_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids");
        fs::write(&path, "42\nforty-three\n").unwrap();

        let err = Ledger::read(&path).unwrap_err();
        assert!(matches!(err, LedgerError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_default_filename() {
        let now = NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(default_filename(&now), "action_ids.2030-01-01T10:00:00");
        assert!(
            Ledger::new(None)
                .path()
                .to_string_lossy()
                .starts_with("action_ids.")
        );
    }

    #[test]
    fn test_reconcile() {
        let mut mock = MockBackend::new();
        mock.set_completed(1, &["web01"]);
        mock.set_completed(2, &["web02", "web03"]);
        mock.set_failed(3, &["db01"]);
        mock.set_in_progress(4, &["db02"]);
        let client = client(&mock);

        let result = reconcile(&client, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            result.completed.iter().collect::<Vec<_>>(),
            vec!["web01", "web02", "web03"]
        );
        assert!(result.failed.contains("db01"));
        assert!(result.in_progress.contains("db02"));
    }

    #[test]
    fn test_reconcile_skips_faulting_id() {
        let mut mock = MockBackend::new();
        mock.set_completed(1, &["web01"]);
        mock.set_completed(2, &["web02"]);
        mock.fail_for_action(Method::ScheduleListCompletedSystems, 1);
        let client = client(&mock);

        let result = reconcile(&client, &[1, 2]).unwrap();
        assert_eq!(result.completed.iter().collect::<Vec<_>>(), vec!["web02"]);
        // the other classifications were still asked for id 1
        assert_eq!(mock.count(Method::ScheduleListFailedSystems), 2);
    }

    #[test]
    fn test_reconcile_unknown_ids_is_empty() {
        let mock = MockBackend::new();
        let client = client(&mock);
        assert!(reconcile(&client, &[99]).unwrap().is_empty());
    }
}
