//! Run driver: walks a schedule in input order and tallies outcomes

use super::chain::{Outcome, Scheduler};
use super::ledger::Ledger;
use super::operation::Operation;
use crate::input::Schedule;
use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use fleetkit::Client;

/// Keyword standing for the time of the run
pub const NOW: &str = "now";

/// Timestamp format of the systems list
pub const INPUT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How far in the past a time may be before its systems are skipped
const PAST_GRACE_SECS: i64 = 5;

/// Process exit status of a scheduling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every system scheduled, or nothing to do
    Success,
    /// Some systems failed
    Partial,
    /// Every attempted system failed
    Failure,
    /// The systems list held nothing usable
    BadInput,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Partial => 64,
            Self::Failure => 65,
            Self::BadInput => 66,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Start of the run; also the meaning of `now`
    pub now: NaiveDateTime,
    pub grace: TimeDelta,
}

impl Default for RunOptions {
    fn default() -> Self {
        let now = Local::now().naive_local();
        Self {
            now: now.with_nanosecond(0).unwrap_or(now),
            grace: TimeDelta::seconds(PAST_GRACE_SECS),
        }
    }
}

/// Per-system outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
    /// No applicable patches
    pub nothing_to_do: usize,
    /// Time already in the past
    pub skipped: usize,
}

impl Tally {
    pub fn exit_status(&self) -> ExitStatus {
        match (self.succeeded, self.failed) {
            (_, 0) => ExitStatus::Success,
            (0, _) => ExitStatus::Failure,
            _ => ExitStatus::Partial,
        }
    }
}

/// Resolve the time text of a schedule entry.
pub fn parse_time(when: &str, now: &NaiveDateTime) -> Option<NaiveDateTime> {
    if when.eq_ignore_ascii_case(NOW) {
        return Some(*now);
    }
    NaiveDateTime::parse_from_str(when, INPUT_TIME_FORMAT).ok()
}

/// Schedule every system, strictly in input order.
///
/// Ids of committed actions are appended to `ledger`; saving it is up to
/// the caller.
pub fn run(
    client: &Client,
    schedule: &Schedule,
    operation: &Operation,
    ledger: &mut Ledger,
    options: &RunOptions,
) -> Tally {
    let scheduler = Scheduler::new(client, operation);
    let what = operation.describe();
    let mut tally = Tally::default();

    for entry in schedule.entries() {
        let names: Vec<&str> = entry.systems.iter().map(|s| s.name.as_str()).collect();
        let Some(time) = parse_time(&entry.when, &options.now) else {
            log::error!(
                "Invalid date '{}', expected YYYY-MM-DD HH:MM:SS or 'now'. System(s) failed: {names:?}",
                entry.when
            );
            tally.failed += entry.systems.len();
            continue;
        };
        if time + options.grace < options.now {
            log::warn!(
                "Date {} is in the past! System(s) skipped: {names:?}",
                entry.when
            );
            tally.skipped += entry.systems.len();
            continue;
        }

        for system in &entry.systems {
            match scheduler.schedule(system, &time) {
                Ok(Outcome::Scheduled(ids)) => {
                    log::info!(
                        "System {} scheduled successfully for {what} at {}",
                        system.name,
                        entry.when
                    );
                    log::debug!("Action ids for {}: {ids:?}", system.name);
                    ledger.append(&ids);
                    tally.succeeded += 1;
                }
                Ok(Outcome::NothingToDo) => {
                    tally.nothing_to_do += 1;
                }
                Err(e) => {
                    log::error!(
                        "System {} failed to be scheduled for {what} at {}: {e}",
                        system.name,
                        entry.when
                    );
                    tally.failed += 1;
                }
            }
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::operation::{CategorySource, RebootPolicy};
    use crate::input::{ScheduleEntry, System};
    use chrono::NaiveDate;
    use fleetkit::{AdvisoryType, Credentials, Erratum, MemorySessionStore, Method, MockBackend};
    use tempfile::TempDir;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2029, 12, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn options() -> RunOptions {
        RunOptions {
            now: start(),
            grace: TimeDelta::seconds(PAST_GRACE_SECS),
        }
    }

    fn client(mock: &MockBackend) -> Client {
        let mut client =
            Client::with_backend(Box::new(mock.clone()), Box::new(MemorySessionStore::new()));
        client.login(&Credentials::new("admin", "admin")).unwrap();
        client
    }

    fn entry(when: &str, names: &[&str]) -> ScheduleEntry {
        ScheduleEntry {
            when: when.to_string(),
            systems: names.iter().map(|n| System::new(*n)).collect(),
        }
    }

    fn security() -> Operation {
        Operation::Patch {
            categories: CategorySource::Explicit(vec![AdvisoryType::Security]),
            reboot: RebootPolicy::Auto,
        }
    }

    #[test]
    fn test_exit_status() {
        let tally = |succeeded, failed| Tally {
            succeeded,
            failed,
            ..Tally::default()
        };
        assert_eq!(tally(3, 0).exit_status(), ExitStatus::Success);
        assert_eq!(tally(0, 0).exit_status(), ExitStatus::Success);
        assert_eq!(tally(2, 1).exit_status(), ExitStatus::Partial);
        assert_eq!(tally(0, 2).exit_status(), ExitStatus::Failure);
        assert_eq!(ExitStatus::Partial.code(), 64);
        assert_eq!(ExitStatus::BadInput.code(), 66);
    }

    #[test]
    fn test_parse_time() {
        let now = start();
        assert_eq!(parse_time("now", &now), Some(now));
        assert_eq!(
            parse_time("2030-01-01 10:00:00", &now),
            NaiveDate::from_ymd_opt(2030, 1, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
        );
        assert_eq!(parse_time("tomorrow", &now), None);
    }

    #[test]
    fn test_reboot_suggested_patch_run() {
        let mut mock = MockBackend::new();
        mock.add_system("hostA", 100);
        mock.set_errata(100, AdvisoryType::Security, vec![Erratum::new(11, "SUSE-SU-11")]);
        mock.set_keywords("SUSE-SU-11", &["reboot_suggested"]);
        let client = client(&mock);
        let schedule = Schedule::from_entries(vec![entry("2030-01-01 10:00:00", &["hostA"])]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids");
        let mut ledger = Ledger::new(Some(path.clone()));
        let tally = run(&client, &schedule, &security(), &mut ledger, &options());

        assert_eq!(tally.succeeded, 1);
        assert_eq!(tally.exit_status().code(), 0);
        assert!(ledger.save().unwrap());
        assert_eq!(Ledger::read(&path).unwrap().ids().len(), 2);
    }

    #[test]
    fn test_partial_failure() {
        let mut mock = MockBackend::new();
        mock.add_system("web01", 1);
        let client = client(&mock);
        let schedule = Schedule::from_entries(vec![entry("now", &["web01", "ghost"])]);
        let mut ledger = Ledger::new(None);

        let tally = run(&client, &schedule, &Operation::Reboot, &mut ledger, &options());
        assert_eq!((tally.succeeded, tally.failed), (1, 1));
        assert_eq!(tally.exit_status(), ExitStatus::Partial);
        assert_eq!(ledger.ids(), &[1000]);
    }

    #[test]
    fn test_past_dates_skipped() {
        let mut mock = MockBackend::new();
        mock.add_system("web01", 1);
        let client = client(&mock);
        let schedule = Schedule::from_entries(vec![entry("2020-01-01 00:00:00", &["web01"])]);
        let mut ledger = Ledger::new(None);

        let tally = run(&client, &schedule, &Operation::Reboot, &mut ledger, &options());
        assert_eq!(tally.skipped, 1);
        assert_eq!(tally.exit_status(), ExitStatus::Success);
        assert!(!mock.has_mutations());
    }

    #[test]
    fn test_invalid_date_fails_its_systems() {
        let mock = MockBackend::new();
        let client = client(&mock);
        let schedule = Schedule::from_entries(vec![
            entry("next tuesday", &["a"]),
            entry("", &["b"]),
        ]);
        let mut ledger = Ledger::new(None);

        let tally = run(&client, &schedule, &Operation::Reboot, &mut ledger, &options());
        assert_eq!(tally.failed, 2);
        assert_eq!(tally.exit_status(), ExitStatus::Failure);
    }

    #[test]
    fn test_nothing_to_do_is_neither() {
        let mut mock = MockBackend::new();
        mock.add_system("clean", 5);
        let client = client(&mock);
        let schedule = Schedule::from_entries(vec![entry("now", &["clean"])]);
        let mut ledger = Ledger::new(None);

        let tally = run(&client, &schedule, &security(), &mut ledger, &options());
        assert_eq!(tally.nothing_to_do, 1);
        assert_eq!((tally.succeeded, tally.failed), (0, 0));
        assert_eq!(tally.exit_status(), ExitStatus::Success);
    }

    #[test]
    fn test_session_expiring_mid_run_fails_later_systems() {
        let mut mock = MockBackend::new();
        mock.add_system("web01", 1);
        mock.add_system("web02", 2);
        mock.add_system("web03", 3);
        let client = client(&mock);
        mock.expire_sessions_after(Method::SystemScheduleReboot);
        let schedule = Schedule::from_entries(vec![entry("now", &["web01", "web02", "web03"])]);
        let mut ledger = Ledger::new(None);

        let tally = run(&client, &schedule, &Operation::Reboot, &mut ledger, &options());
        assert_eq!((tally.succeeded, tally.failed), (1, 2));
        assert_eq!(tally.exit_status().code(), 64);
        assert_eq!(ledger.ids(), &[1000]);
        assert_eq!(mock.count(Method::SystemScheduleReboot), 1);
    }

    #[test]
    fn test_expired_session_fails_every_system() {
        let mut mock = MockBackend::new();
        mock.add_system("web01", 1);
        mock.add_system("web02", 2);
        let client = client(&mock);
        mock.expire_sessions();
        let schedule = Schedule::from_entries(vec![
            entry("now", &["web01"]),
            entry("2030-01-01 10:00:00", &["web02"]),
        ]);
        let mut ledger = Ledger::new(None);

        let tally = run(&client, &schedule, &Operation::Reboot, &mut ledger, &options());
        assert_eq!(tally.failed, 2);
        assert_eq!(tally.exit_status().code(), 65);
        assert!(!mock.has_mutations());
    }
}
