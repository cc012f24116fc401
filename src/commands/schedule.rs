use anyhow::{Context as _, Result};
use fleetkit::Client;

use crate::Context;
use crate::cli::{MigrateArgs, PatchArgs, ScheduleArgs, UpgradeArgs, UtilsArgs};
use crate::engine::{
    CategorySource, ExitStatus, Ledger, Operation, ProductPolicy, RebootPolicy, RunOptions, Tally,
    run,
};
use crate::input::Schedule;
use crate::ui;

pub fn patch(ctx: &Context, args: &PatchArgs) -> Result<i32> {
    let categories = match &args.policy {
        Some(path) => {
            let policy = ProductPolicy::load(path)
                .with_context(|| format!("Invalid patching policy {}", path.display()))?;
            if policy.is_empty() {
                log::warn!("Patching policy {} names no product", path.display());
            }
            log::debug!("Patching policy covers {} product(s)", policy.len());
            CategorySource::Policy(policy)
        }
        None => CategorySource::from_flags(
            args.all_patches,
            args.bugfix,
            args.enhancement,
            args.security,
        ),
    };
    let operation = Operation::Patch {
        categories,
        reboot: RebootPolicy::from_flags(args.reboot, args.no_reboot),
    };
    schedule(ctx, &args.common, &operation)
}

pub fn migrate(ctx: &Context, args: &MigrateArgs) -> Result<i32> {
    if args.list_migration_targets {
        return list_migration_targets(ctx, &args.common);
    }
    let operation = Operation::Migrate {
        dry_run: args.dry_run,
    };
    schedule(ctx, &args.common, &operation)
}

pub fn upgrade(ctx: &Context, args: &UpgradeArgs) -> Result<i32> {
    schedule(ctx, &args.common, &Operation::Upgrade)
}

pub fn utils(ctx: &Context, args: &UtilsArgs) -> Result<i32> {
    let operation = if args.package_refresh {
        Operation::PackageRefresh
    } else {
        Operation::Reboot
    };
    schedule(ctx, &args.common, &operation)
}

/// Log in, run the schedule, then release the session whatever happened.
fn schedule(ctx: &Context, args: &ScheduleArgs, operation: &Operation) -> Result<i32> {
    let config = super::load_config(ctx)?;
    let mut client = super::connect(&config)?;

    let result = schedule_with(ctx, &client, args, operation);

    if let Err(e) = client.release() {
        log::warn!("Could not log out: {e}");
    }
    result
}

fn schedule_with(
    ctx: &Context,
    client: &Client,
    args: &ScheduleArgs,
    operation: &Operation,
) -> Result<i32> {
    let schedule = Schedule::load(&args.filename, client)?;
    if schedule.is_empty() {
        log::error!("No systems found in file: {}", args.filename.display());
        log::error!(
            "The format of the file is: systemName,year-month-day hour:minute:second"
        );
        log::error!("Example: web01.example.com,2030-01-01 10:00:00");
        return Ok(ExitStatus::BadInput.code());
    }
    if !ctx.quiet {
        ui::info(&format!(
            "Scheduling {} for {} system(s)",
            operation.describe(),
            schedule.system_count()
        ));
    }

    let mut ledger = Ledger::new(args.save_action_ids_file.clone());
    let tally = run::run(client, &schedule, operation, &mut ledger, &RunOptions::default());

    let ledger_saved = match ledger.save() {
        Ok(saved) => {
            if saved {
                log::info!("Action IDs file saved: {}", ledger.path().display());
            }
            true
        }
        Err(e) => {
            log::error!("{e}");
            false
        }
    };
    let status = settle(tally.exit_status(), ledger_saved);

    if !ctx.quiet {
        print_summary(&tally, status, ledger_saved);
    }
    Ok(status.code())
}

/// A clean run whose ledger could not be written counts as partial.
fn settle(status: ExitStatus, ledger_saved: bool) -> ExitStatus {
    match status {
        ExitStatus::Success if !ledger_saved => ExitStatus::Partial,
        status => status,
    }
}

fn print_summary(tally: &Tally, status: ExitStatus, ledger_saved: bool) {
    ui::header("Summary");
    ui::kv("Scheduled", &tally.succeeded.to_string());
    ui::kv("Failed", &tally.failed.to_string());
    if tally.nothing_to_do > 0 {
        ui::kv("Nothing to do", &tally.nothing_to_do.to_string());
    }
    if tally.skipped > 0 {
        ui::kv("Skipped (past date)", &tally.skipped.to_string());
    }
    if !ledger_saved {
        ui::kv("Action IDs file", "not saved");
    }
    println!();
    match status {
        ExitStatus::Success => ui::success("All systems handled"),
        ExitStatus::Partial if tally.failed == 0 => {
            ui::warn("Systems scheduled, but their action ids were not saved");
        }
        ExitStatus::Partial => ui::warn("Some systems failed to be scheduled"),
        ExitStatus::Failure | ExitStatus::BadInput => {
            ui::error("No system could be scheduled");
        }
    }
}

fn list_migration_targets(ctx: &Context, args: &ScheduleArgs) -> Result<i32> {
    let config = super::load_config(ctx)?;
    let mut client = super::connect(&config)?;

    let result = list_with(&client, args);

    if let Err(e) = client.release() {
        log::warn!("Could not log out: {e}");
    }
    result
}

fn list_with(client: &Client, args: &ScheduleArgs) -> Result<i32> {
    let schedule = Schedule::load(&args.filename, client)?;
    if schedule.is_empty() {
        log::error!("No systems found in file: {}", args.filename.display());
        return Ok(ExitStatus::BadInput.code());
    }

    ui::dim("Put an ident in the fourth field of the systems file to pin the target");
    let mut tally = Tally::default();
    for system in schedule.entries().iter().flat_map(|e| &e.systems) {
        let targets = client
            .resolve_system_id(&system.name)
            .and_then(|sid| client.migration_targets(sid));
        ui::section(&system.name);
        match targets {
            Ok(targets) => {
                if targets.is_empty() {
                    ui::dim("no migration targets");
                }
                for target in targets {
                    ui::kv(&target.ident, &target.friendly);
                }
                tally.succeeded += 1;
            }
            Err(e) => {
                ui::error(&e.to_string());
                tally.failed += 1;
            }
        }
    }
    Ok(tally.exit_status().code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetkit::{Credentials, MemorySessionStore, Method, MockBackend};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn quiet() -> Context {
        Context {
            verbose: 0,
            quiet: true,
            config: None,
        }
    }

    fn client(mock: &MockBackend) -> Client {
        let mut client =
            Client::with_backend(Box::new(mock.clone()), Box::new(MemorySessionStore::new()));
        client.login(&Credentials::new("admin", "admin")).unwrap();
        client
    }

    fn args(dir: &TempDir, systems: &str, ledger: Option<PathBuf>) -> ScheduleArgs {
        let filename = dir.path().join("systems");
        fs::write(&filename, systems).unwrap();
        ScheduleArgs {
            filename,
            save_action_ids_file: ledger,
        }
    }

    #[test]
    fn test_empty_systems_file_is_bad_input() {
        let mock = MockBackend::new();
        let dir = TempDir::new().unwrap();
        let args = args(&dir, "not-a-line\n\n", None);

        let code = schedule_with(&quiet(), &client(&mock), &args, &Operation::Reboot).unwrap();
        assert_eq!(code, 66);
        assert!(!mock.has_mutations());
    }

    #[test]
    fn test_schedule_saves_ledger() {
        let mut mock = MockBackend::new();
        mock.add_system("web01", 1);
        let dir = TempDir::new().unwrap();
        let ledger = dir.path().join("ids");
        let args = args(&dir, "web01,now\n", Some(ledger.clone()));

        let code = schedule_with(&quiet(), &client(&mock), &args, &Operation::Reboot).unwrap();
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(ledger).unwrap(), "1000\n");
    }

    #[test]
    fn test_unwritable_ledger_is_not_success() {
        let mut mock = MockBackend::new();
        mock.add_system("web01", 1);
        let dir = TempDir::new().unwrap();
        // a directory cannot be written as a file
        let args = args(&dir, "web01,now\n", Some(dir.path().to_path_buf()));

        let code = schedule_with(&quiet(), &client(&mock), &args, &Operation::Reboot).unwrap();
        assert_eq!(code, 64);
        assert_eq!(mock.count(Method::SystemScheduleReboot), 1);
    }

    #[test]
    fn test_settle() {
        assert_eq!(settle(ExitStatus::Success, true), ExitStatus::Success);
        assert_eq!(settle(ExitStatus::Success, false), ExitStatus::Partial);
        assert_eq!(settle(ExitStatus::Failure, false), ExitStatus::Failure);
    }

    #[test]
    fn test_list_migration_targets() {
        let mut mock = MockBackend::new();
        mock.add_system("web01", 1);
        mock.add_migration_target(1, "[base-sles15-sp5]", "SUSE Linux Enterprise Server 15 SP5");
        let dir = TempDir::new().unwrap();
        let args = args(&dir, "web01,now\n", None);

        assert_eq!(list_with(&client(&mock), &args).unwrap(), 0);
        assert_eq!(mock.count(Method::SystemListMigrationTargets), 1);
        assert!(!mock.has_mutations());
    }

    #[test]
    fn test_list_migration_targets_unknown_system() {
        let mut mock = MockBackend::new();
        mock.add_system("web01", 1);
        let dir = TempDir::new().unwrap();
        let args = args(&dir, "web01,now\nghost,now\n", None);

        assert_eq!(list_with(&client(&mock), &args).unwrap(), 64);
    }
}
