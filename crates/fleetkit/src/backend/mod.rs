//! Backend trait and implementations for reaching the fleet server.
//!
//! The [`Backend`] trait has one typed method per remote call the crate uses.
//! [`http::HttpBackend`] talks to a real server; [`MockBackend`] keeps
//! everything in memory and records the calls it receives.
//!
//! # Testing
//!
//! ```
//! use fleetkit::backend::{Backend, MockBackend};
//! use fleetkit::Credentials;
//!
//! let mut mock = MockBackend::new();
//! mock.add_system("web01.example.com", 1000010001);
//!
//! let key = mock.login(&Credentials::new("admin", "admin")).unwrap();
//! let found = mock.get_system_id(&key, "web01.example.com").unwrap();
//! assert_eq!(found[0].id, 1000010001);
//! ```

pub mod http;

use crate::error::{Error, Result};
use crate::method::Method;
use crate::types::{
    ActionId, ActionSystem, AdvisoryType, Credentials, Erratum, GroupMember, InstalledProduct,
    MigrationTarget, ProvisionOptions, ProxyHop, ScheduledAction, ScriptRun, SessionKey,
    SystemId, SystemRecord, format_server_time,
};
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Typed access to the fleet server's remote methods.
///
/// Every method except [`Backend::login`] takes the session key obtained
/// from login.
pub trait Backend: Send + Sync {
    /// `auth.login`
    fn login(&self, credentials: &Credentials) -> Result<SessionKey>;

    /// `auth.logout`
    fn logout(&self, key: &SessionKey) -> Result<()>;

    /// `user.listAssignableRoles`. Cheap and read-only, used to check a
    /// cached session.
    fn list_assignable_roles(&self, key: &SessionKey) -> Result<Vec<String>>;

    /// `system.getId`
    fn get_system_id(&self, key: &SessionKey, name: &str) -> Result<Vec<SystemRecord>>;

    /// `systemgroup.listSystems`
    fn list_group_systems(&self, key: &SessionKey, group: &str) -> Result<Vec<GroupMember>>;

    /// `system.getRelevantErrata`
    fn get_relevant_errata(&self, key: &SessionKey, sid: SystemId) -> Result<Vec<Erratum>>;

    /// `system.getRelevantErrataByType`
    fn get_relevant_errata_by_type(
        &self,
        key: &SessionKey,
        sid: SystemId,
        advisory_type: AdvisoryType,
    ) -> Result<Vec<Erratum>>;

    /// `errata.listKeywords`
    fn list_errata_keywords(&self, key: &SessionKey, advisory_name: &str) -> Result<Vec<String>>;

    /// `system.getInstalledProducts`
    fn get_installed_products(
        &self,
        key: &SessionKey,
        sid: SystemId,
    ) -> Result<Vec<InstalledProduct>>;

    /// `system.getConnectionPath`
    fn get_connection_path(&self, key: &SessionKey, sid: SystemId) -> Result<Vec<ProxyHop>>;

    /// `system.listMigrationTargets`
    fn list_migration_targets(
        &self,
        key: &SessionKey,
        sid: SystemId,
    ) -> Result<Vec<MigrationTarget>>;

    /// `schedule.listInProgressActions`
    fn list_in_progress_actions(&self, key: &SessionKey) -> Result<Vec<ScheduledAction>>;

    /// `schedule.listInProgressSystems`
    fn list_in_progress_systems(
        &self,
        key: &SessionKey,
        action: ActionId,
    ) -> Result<Vec<ActionSystem>>;

    /// `schedule.listCompletedSystems`
    fn list_completed_systems(
        &self,
        key: &SessionKey,
        action: ActionId,
    ) -> Result<Vec<ActionSystem>>;

    /// `schedule.listFailedSystems`
    fn list_failed_systems(&self, key: &SessionKey, action: ActionId)
    -> Result<Vec<ActionSystem>>;

    /// `actionchain.createChain`. Returns the chain id.
    fn create_chain(&self, key: &SessionKey, label: &str) -> Result<i64>;

    /// `actionchain.addErrataUpdate`
    fn add_errata_update(
        &self,
        key: &SessionKey,
        sid: SystemId,
        errata_ids: &[i64],
        label: &str,
    ) -> Result<ActionId>;

    /// `actionchain.addSystemReboot`
    fn add_system_reboot(&self, key: &SessionKey, sid: SystemId, label: &str) -> Result<ActionId>;

    /// `actionchain.addScriptRun`
    fn add_script_run(
        &self,
        key: &SessionKey,
        sid: SystemId,
        label: &str,
        script: &ScriptRun,
    ) -> Result<ActionId>;

    /// `actionchain.scheduleChain`. Returns 1 on success.
    fn schedule_chain(&self, key: &SessionKey, label: &str, time: &NaiveDateTime) -> Result<i64>;

    /// `system.scheduleProductMigration` to the product behind
    /// `base_channel`, optionally pinned to one migration target.
    fn schedule_product_migration(
        &self,
        key: &SessionKey,
        sid: SystemId,
        base_channel: &str,
        target_ident: Option<&str>,
        dry_run: bool,
        time: &NaiveDateTime,
    ) -> Result<ActionId>;

    /// `system.provisionSystem`
    fn provision_system(
        &self,
        key: &SessionKey,
        sid: SystemId,
        proxy: Option<SystemId>,
        profile: &str,
        time: &NaiveDateTime,
        options: &ProvisionOptions,
    ) -> Result<ActionId>;

    /// `system.schedulePackageRefresh`
    fn schedule_package_refresh(
        &self,
        key: &SessionKey,
        sid: SystemId,
        time: &NaiveDateTime,
    ) -> Result<ActionId>;

    /// `system.scheduleReboot`
    fn schedule_reboot(
        &self,
        key: &SessionKey,
        sid: SystemId,
        time: &NaiveDateTime,
    ) -> Result<ActionId>;
}

// =============================================================================
// Mock backend
// =============================================================================

/// One call received by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Method that was called.
    pub method: Method,
    /// Arguments, rendered for assertions.
    pub args: String,
}

#[derive(Debug, Default)]
struct MockState {
    systems: HashMap<String, Vec<SystemRecord>>,
    groups: HashMap<String, Vec<GroupMember>>,
    relevant_errata: HashMap<SystemId, Vec<Erratum>>,
    errata_by_type: HashMap<(SystemId, AdvisoryType), Vec<Erratum>>,
    keywords: HashMap<String, Vec<String>>,
    products: HashMap<SystemId, Vec<InstalledProduct>>,
    connection_paths: HashMap<SystemId, Vec<ProxyHop>>,
    migration_targets: HashMap<SystemId, Vec<MigrationTarget>>,
    in_progress_actions: Vec<ScheduledAction>,
    in_progress_systems: HashMap<ActionId, Vec<ActionSystem>>,
    completed_systems: HashMap<ActionId, Vec<ActionSystem>>,
    failed_systems: HashMap<ActionId, Vec<ActionSystem>>,
    faults: HashMap<Method, (i32, String)>,
    action_faults: HashSet<(Method, ActionId)>,
    results: HashMap<Method, i64>,
    transport_down: bool,
    reject_login: bool,
    expire_after: Option<Method>,
    sessions: HashSet<String>,
    next_session: u32,
    next_id: i64,
    calls: Vec<MockCall>,
}

/// Mock backend for testing without network access.
///
/// Clones share state, so a test can hand one clone to a
/// [`Client`](crate::Client) and inspect the recorded calls through another.
/// Action ids are handed out sequentially starting at 1000.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system name.
    pub fn add_system(&mut self, name: impl Into<String>, id: SystemId) {
        let name = name.into();
        let mut state = self.state.lock().unwrap();
        state
            .systems
            .entry(name.clone())
            .or_default()
            .push(SystemRecord { id, name });
    }

    /// Register a system group and its members, in server order.
    pub fn add_group(&mut self, group: impl Into<String>, members: &[(&str, SystemId)]) {
        let members = members
            .iter()
            .map(|(name, id)| GroupMember {
                id: *id,
                profile_name: (*name).to_string(),
            })
            .collect();
        self.state.lock().unwrap().groups.insert(group.into(), members);
    }

    /// Set the errata relevant to a system for one category.
    ///
    /// `AdvisoryType::All` sets the answer of `system.getRelevantErrata`.
    pub fn set_errata(&mut self, sid: SystemId, advisory_type: AdvisoryType, errata: Vec<Erratum>) {
        let mut state = self.state.lock().unwrap();
        if advisory_type == AdvisoryType::All {
            state.relevant_errata.insert(sid, errata);
        } else {
            state.errata_by_type.insert((sid, advisory_type), errata);
        }
    }

    /// Set the keywords of an advisory.
    pub fn set_keywords(&mut self, advisory_name: impl Into<String>, keywords: &[&str]) {
        let keywords = keywords.iter().map(|k| (*k).to_string()).collect();
        self.state
            .lock()
            .unwrap()
            .keywords
            .insert(advisory_name.into(), keywords);
    }

    /// Add an installed product to a system.
    pub fn add_product(&mut self, sid: SystemId, friendly_name: impl Into<String>, base: bool) {
        self.state
            .lock()
            .unwrap()
            .products
            .entry(sid)
            .or_default()
            .push(InstalledProduct {
                friendly_name: friendly_name.into(),
                is_base_product: base,
            });
    }

    /// Put a proxy on the connection path of a system.
    pub fn add_proxy(&mut self, sid: SystemId, position: i32, proxy: SystemId, hostname: &str) {
        self.state
            .lock()
            .unwrap()
            .connection_paths
            .entry(sid)
            .or_default()
            .push(ProxyHop {
                position,
                id: proxy,
                hostname: hostname.to_string(),
            });
    }

    /// Add a migration target for a system.
    pub fn add_migration_target(&mut self, sid: SystemId, ident: &str, friendly: &str) {
        self.state
            .lock()
            .unwrap()
            .migration_targets
            .entry(sid)
            .or_default()
            .push(MigrationTarget {
                ident: ident.to_string(),
                friendly: friendly.to_string(),
            });
    }

    /// Register an in-progress action and the systems it targets.
    pub fn add_in_progress_action(
        &mut self,
        id: ActionId,
        earliest: &NaiveDateTime,
        systems: &[&str],
    ) {
        let mut state = self.state.lock().unwrap();
        state.in_progress_actions.push(ScheduledAction {
            id,
            name: format!("action {id}"),
            earliest: format_server_time(earliest),
        });
        state.in_progress_systems.insert(id, action_systems(systems));
    }

    /// Set the systems that completed an action.
    pub fn set_completed(&mut self, action: ActionId, systems: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .completed_systems
            .insert(action, action_systems(systems));
    }

    /// Set the systems that failed an action.
    pub fn set_failed(&mut self, action: ActionId, systems: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .failed_systems
            .insert(action, action_systems(systems));
    }

    /// Set the systems still working on an action, without listing the
    /// action among in-progress actions.
    pub fn set_in_progress(&mut self, action: ActionId, systems: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .in_progress_systems
            .insert(action, action_systems(systems));
    }

    /// Make every call to `method` fail with a fault.
    pub fn fail(&mut self, method: Method, code: i32, message: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .faults
            .insert(method, (code, message.into()));
    }

    /// Make calls to a `schedule.list*Systems` method fail for one action.
    pub fn fail_for_action(&mut self, method: Method, action: ActionId) {
        self.state
            .lock()
            .unwrap()
            .action_faults
            .insert((method, action));
    }

    /// Override the integer result of a mutating method (e.g. make
    /// `actionchain.scheduleChain` return 0).
    pub fn set_result(&mut self, method: Method, value: i64) {
        self.state.lock().unwrap().results.insert(method, value);
    }

    /// Make every call fail as if the server were unreachable.
    pub fn set_transport_down(&mut self, down: bool) {
        self.state.lock().unwrap().transport_down = down;
    }

    /// Make `auth.login` refuse any credentials.
    pub fn set_reject_login(&mut self, reject: bool) {
        self.state.lock().unwrap().reject_login = reject;
    }

    /// Invalidate every issued session, as a server restart would.
    pub fn expire_sessions(&mut self) {
        self.state.lock().unwrap().sessions.clear();
    }

    /// Invalidate every session once a call to `method` has been answered.
    pub fn expire_sessions_after(&mut self, method: Method) {
        self.state.lock().unwrap().expire_after = Some(method);
    }

    /// Accept a session key as valid (e.g. one loaded from a store).
    pub fn accept_session(&mut self, key: &str) {
        self.state.lock().unwrap().sessions.insert(key.to_string());
    }

    /// All calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls received for one method, in order.
    #[must_use]
    pub fn calls_to(&self, method: Method) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    /// Number of calls received for one method.
    #[must_use]
    pub fn count(&self, method: Method) -> usize {
        self.calls_to(method).len()
    }

    /// Whether any state-changing call other than login/logout was received.
    #[must_use]
    pub fn has_mutations(&self) -> bool {
        self.calls().iter().any(|c| {
            c.method.is_mutating() && !matches!(c.method, Method::AuthLogin | Method::AuthLogout)
        })
    }

    /// Record a call and apply transport, session and fault injection.
    fn enter(&self, method: Method, key: Option<&SessionKey>, args: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall { method, args });
        if state.transport_down {
            return Err(Error::Transport("connection refused".to_string()));
        }
        if let Some(key) = key
            && !state.sessions.contains(key.as_str())
        {
            return Err(Error::fault(method.name(), 2950, "Could not find session"));
        }
        if let Some((code, message)) = state.faults.get(&method) {
            return Err(Error::fault(method.name(), *code, message.clone()));
        }
        if state.expire_after == Some(method) {
            state.sessions.clear();
        }
        Ok(())
    }

    fn enter_action(&self, method: Method, key: &SessionKey, action: ActionId) -> Result<()> {
        self.enter(method, Some(key), action.to_string())?;
        if self
            .state
            .lock()
            .unwrap()
            .action_faults
            .contains(&(method, action))
        {
            return Err(Error::fault(
                method.name(),
                -208,
                format!("No such action - action = {action}"),
            ));
        }
        Ok(())
    }

    fn issue_id(&self, method: Method) -> i64 {
        let mut state = self.state.lock().unwrap();
        if let Some(value) = state.results.get(&method) {
            return *value;
        }
        state.next_id += 1;
        999 + state.next_id
    }
}

fn action_systems(names: &[&str]) -> Vec<ActionSystem> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| ActionSystem {
            server_id: 1000 + i as SystemId,
            server_name: (*name).to_string(),
        })
        .collect()
}

impl Backend for MockBackend {
    fn login(&self, credentials: &Credentials) -> Result<SessionKey> {
        self.enter(Method::AuthLogin, None, credentials.username.clone())?;
        let mut state = self.state.lock().unwrap();
        if state.reject_login {
            return Err(Error::fault(
                Method::AuthLogin.name(),
                2950,
                "Either the password or username is incorrect.",
            ));
        }
        state.next_session += 1;
        let token = format!("mock-session-{}", state.next_session);
        state.sessions.insert(token.clone());
        Ok(SessionKey::new(token))
    }

    fn logout(&self, key: &SessionKey) -> Result<()> {
        self.enter(Method::AuthLogout, Some(key), String::new())?;
        self.state.lock().unwrap().sessions.remove(key.as_str());
        Ok(())
    }

    fn list_assignable_roles(&self, key: &SessionKey) -> Result<Vec<String>> {
        self.enter(Method::UserListAssignableRoles, Some(key), String::new())?;
        Ok(vec!["org_admin".to_string()])
    }

    fn get_system_id(&self, key: &SessionKey, name: &str) -> Result<Vec<SystemRecord>> {
        self.enter(Method::SystemGetId, Some(key), name.to_string())?;
        let state = self.state.lock().unwrap();
        Ok(state.systems.get(name).cloned().unwrap_or_default())
    }

    fn list_group_systems(&self, key: &SessionKey, group: &str) -> Result<Vec<GroupMember>> {
        self.enter(Method::SystemGroupListSystems, Some(key), group.to_string())?;
        let state = self.state.lock().unwrap();
        state.groups.get(group).cloned().ok_or_else(|| {
            Error::fault(
                Method::SystemGroupListSystems.name(),
                2201,
                format!("Unable to locate or access server group: {group}"),
            )
        })
    }

    fn get_relevant_errata(&self, key: &SessionKey, sid: SystemId) -> Result<Vec<Erratum>> {
        self.enter(Method::SystemGetRelevantErrata, Some(key), sid.to_string())?;
        let state = self.state.lock().unwrap();
        Ok(state.relevant_errata.get(&sid).cloned().unwrap_or_default())
    }

    fn get_relevant_errata_by_type(
        &self,
        key: &SessionKey,
        sid: SystemId,
        advisory_type: AdvisoryType,
    ) -> Result<Vec<Erratum>> {
        self.enter(
            Method::SystemGetRelevantErrataByType,
            Some(key),
            format!("{sid} {}", advisory_type.label()),
        )?;
        let state = self.state.lock().unwrap();
        Ok(state
            .errata_by_type
            .get(&(sid, advisory_type))
            .cloned()
            .unwrap_or_default())
    }

    fn list_errata_keywords(&self, key: &SessionKey, advisory_name: &str) -> Result<Vec<String>> {
        self.enter(Method::ErrataListKeywords, Some(key), advisory_name.to_string())?;
        let state = self.state.lock().unwrap();
        Ok(state.keywords.get(advisory_name).cloned().unwrap_or_default())
    }

    fn get_installed_products(
        &self,
        key: &SessionKey,
        sid: SystemId,
    ) -> Result<Vec<InstalledProduct>> {
        self.enter(Method::SystemGetInstalledProducts, Some(key), sid.to_string())?;
        let state = self.state.lock().unwrap();
        Ok(state.products.get(&sid).cloned().unwrap_or_default())
    }

    fn get_connection_path(&self, key: &SessionKey, sid: SystemId) -> Result<Vec<ProxyHop>> {
        self.enter(Method::SystemGetConnectionPath, Some(key), sid.to_string())?;
        let state = self.state.lock().unwrap();
        Ok(state.connection_paths.get(&sid).cloned().unwrap_or_default())
    }

    fn list_migration_targets(
        &self,
        key: &SessionKey,
        sid: SystemId,
    ) -> Result<Vec<MigrationTarget>> {
        self.enter(Method::SystemListMigrationTargets, Some(key), sid.to_string())?;
        let state = self.state.lock().unwrap();
        Ok(state.migration_targets.get(&sid).cloned().unwrap_or_default())
    }

    fn list_in_progress_actions(&self, key: &SessionKey) -> Result<Vec<ScheduledAction>> {
        self.enter(Method::ScheduleListInProgressActions, Some(key), String::new())?;
        Ok(self.state.lock().unwrap().in_progress_actions.clone())
    }

    fn list_in_progress_systems(
        &self,
        key: &SessionKey,
        action: ActionId,
    ) -> Result<Vec<ActionSystem>> {
        self.enter_action(Method::ScheduleListInProgressSystems, key, action)?;
        let state = self.state.lock().unwrap();
        Ok(state.in_progress_systems.get(&action).cloned().unwrap_or_default())
    }

    fn list_completed_systems(
        &self,
        key: &SessionKey,
        action: ActionId,
    ) -> Result<Vec<ActionSystem>> {
        self.enter_action(Method::ScheduleListCompletedSystems, key, action)?;
        let state = self.state.lock().unwrap();
        Ok(state.completed_systems.get(&action).cloned().unwrap_or_default())
    }

    fn list_failed_systems(
        &self,
        key: &SessionKey,
        action: ActionId,
    ) -> Result<Vec<ActionSystem>> {
        self.enter_action(Method::ScheduleListFailedSystems, key, action)?;
        let state = self.state.lock().unwrap();
        Ok(state.failed_systems.get(&action).cloned().unwrap_or_default())
    }

    fn create_chain(&self, key: &SessionKey, label: &str) -> Result<i64> {
        self.enter(Method::ActionChainCreateChain, Some(key), label.to_string())?;
        Ok(self.issue_id(Method::ActionChainCreateChain))
    }

    fn add_errata_update(
        &self,
        key: &SessionKey,
        sid: SystemId,
        errata_ids: &[i64],
        label: &str,
    ) -> Result<ActionId> {
        self.enter(
            Method::ActionChainAddErrataUpdate,
            Some(key),
            format!("{sid} {errata_ids:?} {label}"),
        )?;
        Ok(self.issue_id(Method::ActionChainAddErrataUpdate))
    }

    fn add_system_reboot(&self, key: &SessionKey, sid: SystemId, label: &str) -> Result<ActionId> {
        self.enter(
            Method::ActionChainAddSystemReboot,
            Some(key),
            format!("{sid} {label}"),
        )?;
        Ok(self.issue_id(Method::ActionChainAddSystemReboot))
    }

    fn add_script_run(
        &self,
        key: &SessionKey,
        sid: SystemId,
        label: &str,
        script: &ScriptRun,
    ) -> Result<ActionId> {
        self.enter(
            Method::ActionChainAddScriptRun,
            Some(key),
            format!(
                "{sid} {label} {}:{} timeout={} {:?}",
                script.uid, script.gid, script.timeout, script.body
            ),
        )?;
        Ok(self.issue_id(Method::ActionChainAddScriptRun))
    }

    fn schedule_chain(&self, key: &SessionKey, label: &str, time: &NaiveDateTime) -> Result<i64> {
        self.enter(
            Method::ActionChainScheduleChain,
            Some(key),
            format!("{label} {}", format_server_time(time)),
        )?;
        let state = self.state.lock().unwrap();
        Ok(state
            .results
            .get(&Method::ActionChainScheduleChain)
            .copied()
            .unwrap_or(1))
    }

    fn schedule_product_migration(
        &self,
        key: &SessionKey,
        sid: SystemId,
        base_channel: &str,
        target_ident: Option<&str>,
        dry_run: bool,
        time: &NaiveDateTime,
    ) -> Result<ActionId> {
        self.enter(
            Method::SystemScheduleProductMigration,
            Some(key),
            format!(
                "{sid} {base_channel} target={target_ident:?} dry_run={dry_run} {}",
                format_server_time(time)
            ),
        )?;
        Ok(self.issue_id(Method::SystemScheduleProductMigration))
    }

    fn provision_system(
        &self,
        key: &SessionKey,
        sid: SystemId,
        proxy: Option<SystemId>,
        profile: &str,
        time: &NaiveDateTime,
        options: &ProvisionOptions,
    ) -> Result<ActionId> {
        self.enter(
            Method::SystemProvisionSystem,
            Some(key),
            format!(
                "{sid} proxy={proxy:?} {profile} {} kopts={:?}",
                format_server_time(time),
                options.kernel_options
            ),
        )?;
        Ok(self.issue_id(Method::SystemProvisionSystem))
    }

    fn schedule_package_refresh(
        &self,
        key: &SessionKey,
        sid: SystemId,
        time: &NaiveDateTime,
    ) -> Result<ActionId> {
        self.enter(
            Method::SystemSchedulePackageRefresh,
            Some(key),
            format!("{sid} {}", format_server_time(time)),
        )?;
        Ok(self.issue_id(Method::SystemSchedulePackageRefresh))
    }

    fn schedule_reboot(
        &self,
        key: &SessionKey,
        sid: SystemId,
        time: &NaiveDateTime,
    ) -> Result<ActionId> {
        self.enter(
            Method::SystemScheduleReboot,
            Some(key),
            format!("{sid} {}", format_server_time(time)),
        )?;
        Ok(self.issue_id(Method::SystemScheduleReboot))
    }
}
