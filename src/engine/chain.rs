//! Action chain building and single-action scheduling
//!
//! A patch run for one system goes through:
//!
//! ```text
//! Unscheduled ─┬─> Conflicted                       (failure, nothing sent)
//!              └─> ErrataChecked ─┬─> Empty         (nothing to do)
//!                                 └─> ChainBuilt ─┬─> Committed   (ids returned)
//!                                                 └─> Faulted     (failure)
//! ```
//!
//! Every lookup (errata, keywords) happens before `ErrataChecked`; from
//! `ChainBuilt` on only mutations are sent. Stack updates lead the chain:
//! package manager, then salt (plus a minion restart when one of them asks
//! for it), then the remaining patches, then the reboot.
//!
//! Chain building is several remote calls and not atomic. A chain whose
//! commit fails stays on the server; it is neither retried nor removed.

use super::conflict::has_conflict;
use super::errata::{ErrataInspector, StackComponent};
use super::operation::{CategorySource, Operation, RebootPolicy};
use super::policy;
use crate::input::System;
use chrono::NaiveDateTime;
use fleetkit::{ActionId, Client, ProvisionOptions, ScriptRun, SystemId};
use thiserror::Error;

/// Format of the schedule time inside chain labels
const LABEL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Run after a salt update that asks for it
const SALT_RESTART: &str = "systemctl restart salt-minion";

/// Why one system could not be scheduled
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("system {system} already has an action in progress at {time}")]
    Conflict { system: String, time: NaiveDateTime },

    #[error("no such system: {0}")]
    UnknownSystem(String),

    #[error("system {0} has no target")]
    MissingTarget(String),

    #[error("{step} was not accepted by the server (returned {id})")]
    Rejected { step: &'static str, id: i64 },

    #[error("action chain '{0}' was not committed")]
    NotCommitted(String),

    #[error("{step} failed: {source}")]
    Remote {
        step: &'static str,
        #[source]
        source: fleetkit::Error,
    },
}

impl ScheduleError {
    /// Wrap a client error, keeping unknown systems apart.
    fn remote(step: &'static str) -> impl FnOnce(fleetkit::Error) -> Self {
        move |source| match source {
            fleetkit::Error::UnknownSystem(name) => Self::UnknownSystem(name),
            source => Self::Remote { step, source },
        }
    }
}

/// Result of scheduling one system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Committed; ids of every action created
    Scheduled(Vec<ActionId>),
    /// No applicable patches; nothing was sent
    NothingToDo,
}

/// Label of the action chain for one system and time.
pub fn chain_label(prefix: &str, system: &str, time: &NaiveDateTime) -> String {
    format!("{prefix}-{system}{}", time.format(LABEL_TIME_FORMAT))
}

/// Schedules one operation on systems, one at a time
pub struct Scheduler<'a> {
    client: &'a Client,
    operation: &'a Operation,
}

impl<'a> Scheduler<'a> {
    pub fn new(client: &'a Client, operation: &'a Operation) -> Self {
        Self { client, operation }
    }

    pub fn schedule(
        &self,
        system: &System,
        time: &NaiveDateTime,
    ) -> Result<Outcome, ScheduleError> {
        let target = system.target.as_deref();
        if self.operation.requires_target() && target.is_none() {
            return Err(ScheduleError::MissingTarget(system.name.clone()));
        }

        if has_conflict(self.client, &system.name, time)
            .map_err(ScheduleError::remote("conflict check"))?
        {
            return Err(ScheduleError::Conflict {
                system: system.name.clone(),
                time: *time,
            });
        }

        let sid = self
            .client
            .resolve_system_id(&system.name)
            .map_err(ScheduleError::remote("system.getId"))?;

        match self.operation {
            Operation::Patch { categories, reboot } => {
                self.patch(system, sid, time, categories, *reboot)
            }
            Operation::Migrate { dry_run } => {
                let target = target.unwrap_or_default();
                let id = self
                    .client
                    .schedule_product_migration(
                        sid,
                        target,
                        system.extra.as_deref(),
                        *dry_run,
                        time,
                    )
                    .map_err(ScheduleError::remote("system.scheduleProductMigration"))?;
                single(id, "system.scheduleProductMigration")
            }
            Operation::Upgrade => {
                let profile = target.unwrap_or_default();
                let proxy = self
                    .client
                    .connection_path(sid)
                    .map_err(ScheduleError::remote("system.getConnectionPath"))?
                    .first()
                    .map(|hop| hop.id);
                if let Some(proxy) = proxy {
                    log::debug!("System {} is behind proxy {proxy}", system.name);
                }
                let options = ProvisionOptions {
                    kernel_options: system.extra.clone().unwrap_or_default(),
                    post_kernel_options: String::new(),
                };
                let id = self
                    .client
                    .provision_system(sid, proxy, profile, time, &options)
                    .map_err(ScheduleError::remote("system.provisionSystem"))?;
                single(id, "system.provisionSystem")
            }
            Operation::PackageRefresh => {
                let id = self
                    .client
                    .schedule_package_refresh(sid, time)
                    .map_err(ScheduleError::remote("system.schedulePackageRefresh"))?;
                single(id, "system.schedulePackageRefresh")
            }
            Operation::Reboot => {
                let id = self
                    .client
                    .schedule_reboot(sid, time)
                    .map_err(ScheduleError::remote("system.scheduleReboot"))?;
                single(id, "system.scheduleReboot")
            }
        }
    }

    fn patch(
        &self,
        system: &System,
        sid: SystemId,
        time: &NaiveDateTime,
        source: &CategorySource,
        reboot: RebootPolicy,
    ) -> Result<Outcome, ScheduleError> {
        let categories = policy::resolve(self.client, &system.name, sid, source)
            .map_err(ScheduleError::remote("system.getInstalledProducts"))?;
        if categories.is_empty() {
            log::warn!("No patch categories apply to system {}. Skipping...", system.name);
            return Ok(Outcome::NothingToDo);
        }

        let mut inspector = ErrataInspector::new(self.client, sid, &categories);
        let plan = PatchPlan::build(&mut inspector, reboot)
            .map_err(ScheduleError::remote("errata lookup"))?;
        if plan.is_empty() {
            let labels: Vec<_> = categories.iter().map(|c| c.label()).collect();
            log::warn!(
                "No patches of type {labels:?} available for system {}. Skipping...",
                system.name
            );
            return Ok(Outcome::NothingToDo);
        }

        let label = chain_label(self.operation.label_prefix(), &system.name, time);
        let chain_id = self
            .client
            .create_chain(&label)
            .map_err(ScheduleError::remote("actionchain.createChain"))?;
        accepted(chain_id, "actionchain.createChain")?;

        let mut actions = Vec::new();
        for (component, ids) in &plan.stack {
            actions.push(self.add_errata(sid, ids, &label)?);
            log::debug!("Added {component:?} update to action chain {label}");
            if *component == StackComponent::Salt && plan.restart_salt {
                let script = ScriptRun::root_bash(SALT_RESTART);
                let id = self
                    .client
                    .add_script_run(sid, &label, &script)
                    .map_err(ScheduleError::remote("actionchain.addScriptRun"))?;
                actions.push(accepted(id, "actionchain.addScriptRun")?);
                log::debug!("Added salt-minion restart to action chain {label}");
            }
        }
        if !plan.rest.is_empty() {
            actions.push(self.add_errata(sid, &plan.rest, &label)?);
        }
        log::debug!("Added {} patch(es) to action chain {label}", plan.patch_count());

        if plan.reboot {
            let id = self
                .client
                .add_system_reboot(sid, &label)
                .map_err(ScheduleError::remote("actionchain.addSystemReboot"))?;
            actions.push(accepted(id, "actionchain.addSystemReboot")?);
            log::debug!("Added system reboot to action chain {label}");
        }

        let committed = self
            .client
            .schedule_chain(&label, time)
            .map_err(ScheduleError::remote("actionchain.scheduleChain"))?;
        if committed != 1 {
            return Err(ScheduleError::NotCommitted(label));
        }
        Ok(Outcome::Scheduled(actions))
    }

    fn add_errata(
        &self,
        sid: SystemId,
        ids: &[i64],
        label: &str,
    ) -> Result<ActionId, ScheduleError> {
        let id = self
            .client
            .add_errata_update(sid, ids, label)
            .map_err(ScheduleError::remote("actionchain.addErrataUpdate"))?;
        accepted(id, "actionchain.addErrataUpdate")
    }
}

/// Everything a patch chain holds, settled by read-only calls before the
/// chain is created.
#[derive(Debug, Default)]
struct PatchPlan {
    /// Non-empty stack batches in installation order
    stack: Vec<(StackComponent, Vec<i64>)>,
    restart_salt: bool,
    rest: Vec<i64>,
    reboot: bool,
}

impl PatchPlan {
    fn build(
        inspector: &mut ErrataInspector<'_>,
        reboot: RebootPolicy,
    ) -> fleetkit::Result<Self> {
        let mut plan = Self::default();
        if inspector.errata()?.is_empty() {
            return Ok(plan);
        }
        for component in StackComponent::ORDER {
            let ids = inspector.stack_ids(component)?;
            if !ids.is_empty() {
                plan.stack.push((component, ids));
            }
        }
        plan.rest = inspector.other_ids()?;
        plan.restart_salt = plan.stack.iter().any(|(c, _)| *c == StackComponent::Salt)
            && inspector.suggests_stack_restart()?;
        let suggested = reboot == RebootPolicy::Auto && inspector.suggests_reboot()?;
        plan.reboot = reboot.wants_reboot(suggested);
        Ok(plan)
    }

    fn is_empty(&self) -> bool {
        self.stack.is_empty() && self.rest.is_empty()
    }

    fn patch_count(&self) -> usize {
        self.stack.iter().map(|(_, ids)| ids.len()).sum::<usize>() + self.rest.len()
    }
}

fn accepted(id: i64, step: &'static str) -> Result<i64, ScheduleError> {
    if id > 0 {
        Ok(id)
    } else {
        Err(ScheduleError::Rejected { step, id })
    }
}

fn single(id: ActionId, step: &'static str) -> Result<Outcome, ScheduleError> {
    Ok(Outcome::Scheduled(vec![accepted(id, step)?]))
}
