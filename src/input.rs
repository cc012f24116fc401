//! Systems list parsing
//!
//! One line per system:
//!
//! ```text
//! system-or-group, timestamp[, target[, extra-options]]
//! ```
//!
//! The timestamp is `YYYY-MM-DD HH:MM:SS` or `now`. A system written as
//! `group:<name>` stands for every member of that system group. Fields may
//! be wrapped in double quotes to carry commas (kernel options often do).
//! A line with an empty timestamp is kept; the run then fails its systems
//! for an invalid date.

use anyhow::{Context, Result};
use fleetkit::Client;
use std::fs;
use std::path::Path;

/// Literal prefix marking a system group
pub const GROUP_PREFIX: &str = "group:";

/// One system to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct System {
    pub name: String,
    /// Base channel label to migrate onto, or auto-installation profile
    pub target: Option<String>,
    /// Migration target ident, or kernel options for upgrades
    pub extra: Option<String>,
}

impl System {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            extra: None,
        }
    }
}

/// Systems sharing one schedule time, in processing order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Timestamp text as written in the file (or `now`)
    pub when: String,
    pub systems: Vec<System>,
}

/// Parsed systems list, keyed by time in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

/// One accepted line before group expansion
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    system: String,
    when: String,
    target: Option<String>,
    extra: Option<String>,
}

impl Schedule {
    /// Read and parse a systems file, expanding groups through the server.
    pub fn load(path: &Path, client: &Client) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read systems file: {}", path.display()))?;
        Self::parse(&content, client)
    }

    /// Parse systems list content.
    ///
    /// Malformed lines are logged and skipped. Only a transport failure while
    /// expanding a group is an error.
    pub fn parse(content: &str, client: &Client) -> Result<Self> {
        let mut schedule = Self::default();
        for raw in content.lines() {
            if raw.trim().is_empty() {
                continue;
            }
            let Some(line) = parse_line(raw) else {
                log::error!("Line skipped: {raw}");
                continue;
            };
            let entry = schedule.entry(&line.when);
            let names = match line.system.strip_prefix(GROUP_PREFIX) {
                Some(group) => expand_group(client, group.trim())?,
                None => vec![line.system.clone()],
            };
            entry.systems.extend(names.into_iter().map(|name| System {
                target: line.target.clone(),
                extra: line.extra.clone(),
                ..System::new(name)
            }));
        }
        Ok(schedule)
    }

    fn entry(&mut self, when: &str) -> &mut ScheduleEntry {
        let index = match self.entries.iter().position(|e| e.when == when) {
            Some(i) => i,
            None => {
                self.entries.push(ScheduleEntry {
                    when: when.to_string(),
                    systems: Vec::new(),
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Whether no system made it into the schedule.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.systems.is_empty())
    }

    pub fn system_count(&self) -> usize {
        self.entries.iter().map(|e| e.systems.len()).sum()
    }

    #[cfg(test)]
    pub fn from_entries(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }
}

fn parse_line(raw: &str) -> Option<Line> {
    let fields = split_fields(raw);
    if fields.len() < 2 || fields.len() > 4 {
        return None;
    }
    let system = fields[0].trim();
    let when = fields[1].trim();
    if system.is_empty() {
        return None;
    }
    let optional = |i: usize| {
        fields
            .get(i)
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
    };
    Some(Line {
        system: system.to_string(),
        when: when.to_string(),
        target: optional(2),
        extra: optional(3),
    })
}

/// Split on commas outside double quotes. Quotes are removed; `""` inside a
/// quoted field is a literal quote.
pub(crate) fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Names of the members of a system group, in server order.
///
/// An unknown group is a warning and expands to nothing.
fn expand_group(client: &Client, group: &str) -> Result<Vec<String>> {
    match client.group_members(group) {
        Ok(members) => {
            log::debug!("Group {group} has {} system(s)", members.len());
            Ok(members.into_iter().map(|m| m.profile_name).collect())
        }
        Err(e) if e.is_fatal() => {
            Err(e).with_context(|| format!("Could not expand group {group}"))
        }
        Err(e) => {
            log::error!("{e}");
            log::warn!("Group \"{group}\" does not exist!");
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetkit::{Credentials, MemorySessionStore, MockBackend};

    fn client(mock: &MockBackend) -> Client {
        let mut client =
            Client::with_backend(Box::new(mock.clone()), Box::new(MemorySessionStore::new()));
        client.login(&Credentials::new("admin", "admin")).unwrap();
        client
    }

    fn names(entry: &ScheduleEntry) -> Vec<&str> {
        entry.systems.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_groups_by_date_in_first_seen_order() {
        let mock = MockBackend::new();
        let content = "\
web01,2030-01-01 10:00:00
db01,2030-01-02 22:00:00
web02,2030-01-01 10:00:00
db02, 2030-01-02 22:00:00
";
        let schedule = Schedule::parse(content, &client(&mock)).unwrap();
        let entries = schedule.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].when, "2030-01-01 10:00:00");
        assert_eq!(names(&entries[0]), vec!["web01", "web02"]);
        assert_eq!(entries[1].when, "2030-01-02 22:00:00");
        assert_eq!(names(&entries[1]), vec!["db01", "db02"]);
        assert_eq!(schedule.system_count(), 4);
    }

    #[test]
    fn test_bad_lines_skipped() {
        let mock = MockBackend::new();
        let content = "\
lonely-system

a,b,c,d,e
web01,now
";
        let schedule = Schedule::parse(content, &client(&mock)).unwrap();
        assert_eq!(schedule.entries().len(), 1);
        assert_eq!(schedule.entries()[0].when, "now");
        assert_eq!(names(&schedule.entries()[0]), vec!["web01"]);
    }

    #[test]
    fn test_empty_timestamp_is_kept() {
        let mock = MockBackend::new();
        let schedule = Schedule::parse("web01,\n,now\n", &client(&mock)).unwrap();
        assert_eq!(schedule.entries().len(), 1);
        assert_eq!(schedule.entries()[0].when, "");
        assert_eq!(names(&schedule.entries()[0]), vec!["web01"]);
    }

    #[test]
    fn test_only_bad_lines_is_empty() {
        let mock = MockBackend::new();
        let schedule = Schedule::parse("just-a-name\n\n", &client(&mock)).unwrap();
        assert!(schedule.is_empty());
    }

    #[test]
    fn test_target_and_extra_options() {
        let mock = MockBackend::new();
        let content =
            "web01,2030-01-01 10:00:00,sles15sp5-autoyast,\"console=ttyS0,115200 quiet\"\n";
        let schedule = Schedule::parse(content, &client(&mock)).unwrap();
        let system = &schedule.entries()[0].systems[0];
        assert_eq!(system.target.as_deref(), Some("sles15sp5-autoyast"));
        assert_eq!(system.extra.as_deref(), Some("console=ttyS0,115200 quiet"));
    }

    #[test]
    fn test_group_expansion_keeps_server_order() {
        let mut mock = MockBackend::new();
        mock.add_group("web", &[("web03", 3), ("web01", 1)]);
        let content = "\
db01,2030-01-01 10:00:00
group:web,2030-01-01 10:00:00,target-x
";
        let schedule = Schedule::parse(content, &client(&mock)).unwrap();
        let entry = &schedule.entries()[0];
        assert_eq!(names(entry), vec!["db01", "web03", "web01"]);
        assert_eq!(entry.systems[2].target.as_deref(), Some("target-x"));
    }

    #[test]
    fn test_unknown_group_expands_to_nothing() {
        let mock = MockBackend::new();
        let schedule = Schedule::parse("group:ghosts,now\n", &client(&mock)).unwrap();
        assert!(schedule.is_empty());
    }

    #[test]
    fn test_group_transport_failure_is_error() {
        let mut mock = MockBackend::new();
        let client = client(&mock);
        mock.set_transport_down(true);
        assert!(Schedule::parse("group:web,now\n", &client).is_err());
    }

    #[test]
    fn test_split_fields_quotes() {
        assert_eq!(split_fields("a,\"b,c\",d"), vec!["a", "b,c", "d"]);
        assert_eq!(split_fields("a,\"say \"\"hi\"\"\""), vec!["a", "say \"hi\""]);
        assert_eq!(split_fields("a"), vec!["a"]);
    }
}
