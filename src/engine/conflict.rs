//! Same-instant conflict detection
//!
//! Only actions whose earliest execution time equals the requested time are
//! considered. Overlapping windows at different instants are not detected.

use chrono::NaiveDateTime;
use fleetkit::Client;

/// Whether `system` already has an in-progress action at exactly `time`.
pub fn has_conflict(client: &Client, system: &str, time: &NaiveDateTime) -> fleetkit::Result<bool> {
    for action in client.in_progress_actions()? {
        let Some(earliest) = action.earliest_time() else {
            log::debug!(
                "Action {} has an unreadable earliest time '{}', ignored",
                action.id,
                action.earliest
            );
            continue;
        };
        if earliest != *time {
            continue;
        }
        let busy = client
            .in_progress_systems(action.id)?
            .iter()
            .any(|s| s.server_name == system);
        if busy {
            log::debug!("System {system} is busy with action {} at {time}", action.id);
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fleetkit::{Credentials, MemorySessionStore, Method, MockBackend};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn client(mock: &MockBackend) -> Client {
        let mut client =
            Client::with_backend(Box::new(mock.clone()), Box::new(MemorySessionStore::new()));
        client.login(&Credentials::new("admin", "admin")).unwrap();
        client
    }

    #[test]
    fn test_conflict_same_instant_same_system() {
        let mut mock = MockBackend::new();
        mock.add_in_progress_action(50, &at(10), &["db01", "web01"]);
        let client = client(&mock);

        assert!(has_conflict(&client, "web01", &at(10)).unwrap());
    }

    #[test]
    fn test_no_conflict_other_system() {
        let mut mock = MockBackend::new();
        mock.add_in_progress_action(50, &at(10), &["db01"]);
        let client = client(&mock);

        assert!(!has_conflict(&client, "web01", &at(10)).unwrap());
    }

    #[test]
    fn test_no_conflict_other_instant() {
        let mut mock = MockBackend::new();
        mock.add_in_progress_action(50, &at(9), &["web01"]);
        let client = client(&mock);

        assert!(!has_conflict(&client, "web01", &at(10)).unwrap());
        // systems of non-matching actions are never listed
        assert_eq!(mock.count(Method::ScheduleListInProgressSystems), 0);
    }
}
