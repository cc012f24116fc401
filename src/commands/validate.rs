use anyhow::{Context as _, Result};
use fleetkit::Client;
use std::path::Path;

use crate::Context;
use crate::engine::ledger::{Reconciliation, reconcile};
use crate::engine::{ExitStatus, Ledger};
use crate::ui;

/// Reconcile the actions recorded in a ledger file.
///
/// Exits 0 when the server knows at least one of the actions, 65 otherwise.
pub fn run(ctx: &Context, path: &Path) -> Result<i32> {
    let ledger = Ledger::read(path)?;
    if ledger.ids().is_empty() {
        log::error!("No action IDs in {}", path.display());
        return Ok(ExitStatus::BadInput.code());
    }
    log::debug!("Validating {} action id(s)", ledger.ids().len());

    let config = super::load_config(ctx)?;
    let mut client = super::connect(&config)?;

    let result = validate_with(&client, &ledger);

    if let Err(e) = client.release() {
        log::warn!("Could not log out: {e}");
    }
    result
}

fn validate_with(client: &Client, ledger: &Ledger) -> Result<i32> {
    let found = reconcile(client, ledger.ids()).context("Could not reconcile action ids")?;

    report(&found);
    if found.is_empty() {
        log::error!("Action IDs not found.");
        return Ok(ExitStatus::Failure.code());
    }
    Ok(ExitStatus::Success.code())
}

fn report(found: &Reconciliation) {
    if !found.completed.is_empty() {
        log::info!(
            "The following systems have completed successfully: {}",
            ui::join_names(&found.completed)
        );
    }
    if !found.failed.is_empty() {
        log::error!(
            "The following systems have failed: {}",
            ui::join_names(&found.failed)
        );
    }
    if !found.in_progress.is_empty() {
        log::warn!(
            "The following systems have actions in progress: {}",
            ui::join_names(&found.in_progress)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetkit::{Credentials, MemorySessionStore, MockBackend};
    use std::fs;
    use tempfile::TempDir;

    fn client(mock: &MockBackend) -> Client {
        let mut client =
            Client::with_backend(Box::new(mock.clone()), Box::new(MemorySessionStore::new()));
        client.login(&Credentials::new("admin", "admin")).unwrap();
        client
    }

    fn ledger(dir: &TempDir, content: &str) -> Ledger {
        let path = dir.path().join("ids");
        fs::write(&path, content).unwrap();
        Ledger::read(&path).unwrap()
    }

    #[test]
    fn test_known_actions_succeed() {
        let mut mock = MockBackend::new();
        mock.set_completed(1000, &["web01"]);
        mock.set_failed(1001, &["db01"]);
        let dir = TempDir::new().unwrap();

        let code = validate_with(&client(&mock), &ledger(&dir, "1000\n1001\n")).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_unknown_actions_fail() {
        let mock = MockBackend::new();
        let dir = TempDir::new().unwrap();

        let code = validate_with(&client(&mock), &ledger(&dir, "4242\n")).unwrap();
        assert_eq!(code, 65);
    }

    #[test]
    fn test_ledger_without_ids_is_bad_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids");
        fs::write(&path, "\n\n").unwrap();
        let ctx = Context {
            verbose: 0,
            quiet: true,
            config: None,
        };

        // answered before any config is loaded
        assert_eq!(run(&ctx, &path).unwrap(), 66);
    }
}
