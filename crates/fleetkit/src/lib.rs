//! # fleetkit
//!
//! Typed client for the SUSE Manager / Uyuni HTTP API.
//!
//! This crate provides:
//! - One authenticated session per [`Client`], resumed from a
//!   [`SessionStore`] when the server still accepts it
//! - One typed wrapper per remote method the scheduler needs (errata,
//!   action chains, schedules, groups, products, migration, provisioning)
//! - Faults and transport failures kept apart in [`Error`]
//! - An in-memory [`MockBackend`] for tests
//!
//! ## Example
//!
//! ```
//! use fleetkit::{Client, Credentials, MemorySessionStore, MockBackend};
//!
//! let mut mock = MockBackend::new();
//! mock.add_system("web01.example.com", 1000010001);
//!
//! let mut client = Client::with_backend(Box::new(mock), Box::new(MemorySessionStore::new()));
//! if !client.resume().unwrap() {
//!     client.login(&Credentials::new("admin", "secret")).unwrap();
//! }
//!
//! let sid = client.resolve_system_id("web01.example.com").unwrap();
//! assert_eq!(sid, 1000010001);
//!
//! client.release().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod method;
pub mod session;
pub mod types;

pub use backend::MockBackend;
pub use backend::http::{HttpBackend, HttpSettings};
pub use error::{Error, ErrorCategory, Result};
pub use method::Method;
pub use session::{FileSessionStore, MemorySessionStore, SessionStore, StoredSession};
pub use types::{
    ActionId, ActionSystem, AdvisoryType, Credentials, Erratum, GroupMember, InstalledProduct,
    MigrationTarget, ProvisionOptions, ProxyHop, ScheduledAction, ScriptRun, SessionKey,
    SystemId, SystemRecord,
};

use backend::Backend;
use chrono::NaiveDateTime;

/// The session this client is currently using.
#[derive(Debug, Clone)]
struct ActiveSession {
    username: String,
    key: SessionKey,
    /// Taken over from the store rather than opened by this client.
    resumed: bool,
}

/// High-level client: one session, typed remote calls.
///
/// Calls made before [`Client::resume`] or [`Client::login`] succeed fail
/// with [`Error::NotLoggedIn`].
pub struct Client {
    backend: Box<dyn Backend>,
    store: Box<dyn SessionStore>,
    session: Option<ActiveSession>,
}

impl Client {
    /// Create a client talking HTTP to a real server.
    #[must_use]
    pub fn new(settings: &HttpSettings, store: Box<dyn SessionStore>) -> Self {
        Self::with_backend(Box::new(HttpBackend::new(settings)), store)
    }

    /// Create a client with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>, store: Box<dyn SessionStore>) -> Self {
        Self {
            backend,
            store,
            session: None,
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Try to take over the stored session.
    ///
    /// The stored token is checked with a cheap read-only call. Returns
    /// `Ok(false)` when there is no stored session or the server no longer
    /// accepts it; transport failures are returned as errors.
    pub fn resume(&mut self) -> Result<bool> {
        if self.session.is_some() {
            return Ok(true);
        }
        let Some(stored) = self.store.load()? else {
            log::debug!("No stored session");
            return Ok(false);
        };
        match self.backend.list_assignable_roles(&stored.key) {
            Ok(_) => {
                log::info!("User {} already logged in", stored.username);
                self.session = Some(ActiveSession {
                    username: stored.username,
                    key: stored.key,
                    resumed: true,
                });
                Ok(true)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                log::warn!("Stored session is not valid anymore: {e}");
                Ok(false)
            }
        }
    }

    /// Log in with credentials and save the new session to the store.
    pub fn login(&mut self, credentials: &Credentials) -> Result<()> {
        let key = self.backend.login(credentials).map_err(|e| match e {
            Error::Fault { message, .. } => Error::Session(format!(
                "could not log in as {}: {message}",
                credentials.username
            )),
            other => other,
        })?;
        let stored = StoredSession {
            username: credentials.username.clone(),
            key: key.clone(),
        };
        if let Err(e) = self.store.save(&stored) {
            log::warn!("Could not save session: {e}");
        }
        log::info!("User {} logged in", credentials.username);
        self.session = Some(ActiveSession {
            username: credentials.username.clone(),
            key,
            resumed: false,
        });
        Ok(())
    }

    /// Log out: invalidate the token server-side and forget it locally.
    ///
    /// Works on the stored session too when this client never resumed it.
    pub fn logout(&mut self) -> Result<()> {
        let current = match self.session.take() {
            Some(active) => Some((active.username, active.key)),
            None => self.store.load()?.map(|s| (s.username, s.key)),
        };
        if let Some((username, key)) = current {
            match self.backend.logout(&key) {
                Ok(()) => log::info!("User {username} logged out"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log::warn!("Server refused logout for {username}: {e}"),
            }
        }
        self.store.clear()
    }

    /// End-of-run teardown.
    ///
    /// A session opened by this client is logged out; a session resumed from
    /// the store belongs to whoever saved it and is left alone.
    pub fn release(&mut self) -> Result<()> {
        match &self.session {
            Some(active) if !active.resumed => self.logout(),
            _ => {
                self.session = None;
                Ok(())
            }
        }
    }

    /// Whether a session is active.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// Login name of the active session.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    fn key(&self) -> Result<&SessionKey> {
        self.session
            .as_ref()
            .map(|s| &s.key)
            .ok_or(Error::NotLoggedIn)
    }

    // =========================================================================
    // Systems and groups
    // =========================================================================

    /// All systems registered under a name.
    pub fn system_ids(&self, name: &str) -> Result<Vec<SystemRecord>> {
        self.backend.get_system_id(self.key()?, name)
    }

    /// Resolve a system name to its id.
    ///
    /// Fails with [`Error::UnknownSystem`] when the name matches nothing;
    /// the first match wins when several systems share the name.
    pub fn resolve_system_id(&self, name: &str) -> Result<SystemId> {
        let matches = self.system_ids(name)?;
        if matches.len() > 1 {
            log::warn!(
                "{} systems are named {name}, using id {}",
                matches.len(),
                matches[0].id
            );
        }
        matches
            .first()
            .map(|s| s.id)
            .ok_or_else(|| Error::UnknownSystem(name.to_string()))
    }

    /// Members of a system group, in server order.
    pub fn group_members(&self, group: &str) -> Result<Vec<GroupMember>> {
        self.backend.list_group_systems(self.key()?, group)
    }

    /// Products installed on a system.
    pub fn installed_products(&self, sid: SystemId) -> Result<Vec<InstalledProduct>> {
        self.backend.get_installed_products(self.key()?, sid)
    }

    /// Proxies between the server and a system, closest first.
    pub fn connection_path(&self, sid: SystemId) -> Result<Vec<ProxyHop>> {
        let mut path = self.backend.get_connection_path(self.key()?, sid)?;
        path.sort_by_key(|hop| hop.position);
        Ok(path)
    }

    /// Product migration targets available to a system.
    pub fn migration_targets(&self, sid: SystemId) -> Result<Vec<MigrationTarget>> {
        self.backend.list_migration_targets(self.key()?, sid)
    }

    // =========================================================================
    // Errata
    // =========================================================================

    /// Every erratum relevant to a system.
    pub fn relevant_errata(&self, sid: SystemId) -> Result<Vec<Erratum>> {
        self.backend.get_relevant_errata(self.key()?, sid)
    }

    /// Errata of one category relevant to a system.
    ///
    /// `AdvisoryType::All` is routed to [`Client::relevant_errata`]; it is
    /// never sent as a category.
    pub fn relevant_errata_by_type(
        &self,
        sid: SystemId,
        advisory_type: AdvisoryType,
    ) -> Result<Vec<Erratum>> {
        if advisory_type == AdvisoryType::All {
            return self.relevant_errata(sid);
        }
        self.backend
            .get_relevant_errata_by_type(self.key()?, sid, advisory_type)
    }

    /// Keywords attached to an advisory (e.g. `reboot_suggested`).
    pub fn errata_keywords(&self, advisory_name: &str) -> Result<Vec<String>> {
        self.backend.list_errata_keywords(self.key()?, advisory_name)
    }

    // =========================================================================
    // Schedule
    // =========================================================================

    /// Actions currently scheduled or running.
    pub fn in_progress_actions(&self) -> Result<Vec<ScheduledAction>> {
        self.backend.list_in_progress_actions(self.key()?)
    }

    /// Systems still working on an action.
    pub fn in_progress_systems(&self, action: ActionId) -> Result<Vec<ActionSystem>> {
        self.backend.list_in_progress_systems(self.key()?, action)
    }

    /// Systems that completed an action.
    pub fn completed_systems(&self, action: ActionId) -> Result<Vec<ActionSystem>> {
        self.backend.list_completed_systems(self.key()?, action)
    }

    /// Systems that failed an action.
    pub fn failed_systems(&self, action: ActionId) -> Result<Vec<ActionSystem>> {
        self.backend.list_failed_systems(self.key()?, action)
    }

    // =========================================================================
    // Action chains
    // =========================================================================

    /// Create an empty action chain. Returns the chain id.
    pub fn create_chain(&self, label: &str) -> Result<i64> {
        self.backend.create_chain(self.key()?, label)
    }

    /// Append an errata update to a chain.
    pub fn add_errata_update(
        &self,
        sid: SystemId,
        errata_ids: &[i64],
        label: &str,
    ) -> Result<ActionId> {
        self.backend
            .add_errata_update(self.key()?, sid, errata_ids, label)
    }

    /// Append a reboot to a chain.
    pub fn add_system_reboot(&self, sid: SystemId, label: &str) -> Result<ActionId> {
        self.backend.add_system_reboot(self.key()?, sid, label)
    }

    /// Append a script run to a chain.
    pub fn add_script_run(&self, sid: SystemId, label: &str, script: &ScriptRun) -> Result<ActionId> {
        self.backend.add_script_run(self.key()?, sid, label, script)
    }

    /// Commit a chain for execution at `time`. Returns 1 on success.
    pub fn schedule_chain(&self, label: &str, time: &NaiveDateTime) -> Result<i64> {
        self.backend.schedule_chain(self.key()?, label, time)
    }

    // =========================================================================
    // Single actions
    // =========================================================================

    /// Schedule a product migration onto `base_channel`, optionally pinned
    /// to one of [`Client::migration_targets`].
    pub fn schedule_product_migration(
        &self,
        sid: SystemId,
        base_channel: &str,
        target_ident: Option<&str>,
        dry_run: bool,
        time: &NaiveDateTime,
    ) -> Result<ActionId> {
        self.backend.schedule_product_migration(
            self.key()?,
            sid,
            base_channel,
            target_ident,
            dry_run,
            time,
        )
    }

    /// Schedule a reinstallation with an auto-installation profile.
    pub fn provision_system(
        &self,
        sid: SystemId,
        proxy: Option<SystemId>,
        profile: &str,
        time: &NaiveDateTime,
        options: &ProvisionOptions,
    ) -> Result<ActionId> {
        self.backend
            .provision_system(self.key()?, sid, proxy, profile, time, options)
    }

    /// Schedule a package list refresh.
    pub fn schedule_package_refresh(&self, sid: SystemId, time: &NaiveDateTime) -> Result<ActionId> {
        self.backend
            .schedule_package_refresh(self.key()?, sid, time)
    }

    /// Schedule a reboot.
    pub fn schedule_reboot(&self, sid: SystemId, time: &NaiveDateTime) -> Result<ActionId> {
        self.backend.schedule_reboot(self.key()?, sid, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(mock: &MockBackend, store: &MemorySessionStore) -> Client {
        Client::with_backend(Box::new(mock.clone()), Box::new(store.clone()))
    }

    fn admin() -> Credentials {
        Credentials::new("admin", "admin")
    }

    #[test]
    fn test_calls_require_login() {
        let mock = MockBackend::new();
        let client = client(&mock, &MemorySessionStore::new());
        assert!(!client.is_logged_in());
        assert!(matches!(
            client.in_progress_actions(),
            Err(Error::NotLoggedIn)
        ));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_login_saves_session() {
        let mock = MockBackend::new();
        let store = MemorySessionStore::new();
        let mut client = client(&mock, &store);

        assert!(!client.resume().unwrap());
        client.login(&admin()).unwrap();

        assert!(client.is_logged_in());
        assert_eq!(client.username(), Some("admin"));
        assert_eq!(store.current().unwrap().username, "admin");
    }

    #[test]
    fn test_resume_checks_stored_session() {
        let mut mock = MockBackend::new();
        mock.accept_session("saved-token");
        let store = MemorySessionStore::with_session("ops", "saved-token");
        let mut client = client(&mock, &store);

        assert!(client.resume().unwrap());
        assert_eq!(client.username(), Some("ops"));
        assert_eq!(mock.count(Method::UserListAssignableRoles), 1);
        assert_eq!(mock.count(Method::AuthLogin), 0);
    }

    #[test]
    fn test_resume_rejects_stale_session() {
        let mock = MockBackend::new();
        let store = MemorySessionStore::with_session("ops", "expired");
        let mut client = client(&mock, &store);

        assert!(!client.resume().unwrap());
        assert!(!client.is_logged_in());

        // replaced transparently by a fresh login
        client.login(&admin()).unwrap();
        assert_ne!(store.current().unwrap().key.as_str(), "expired");
    }

    #[test]
    fn test_resume_transport_failure_is_error() {
        let mut mock = MockBackend::new();
        mock.set_transport_down(true);
        let store = MemorySessionStore::with_session("ops", "token");
        let mut client = client(&mock, &store);

        let err = client.resume().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_login_rejected() {
        let mut mock = MockBackend::new();
        mock.set_reject_login(true);
        let mut client = client(&mock, &MemorySessionStore::new());

        let err = client.login(&admin()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Session);
        assert!(err.to_string().contains("admin"));
    }

    #[test]
    fn test_release_logs_out_own_session() {
        let mock = MockBackend::new();
        let store = MemorySessionStore::new();
        let mut client = client(&mock, &store);
        client.login(&admin()).unwrap();

        client.release().unwrap();
        assert!(!client.is_logged_in());
        assert_eq!(mock.count(Method::AuthLogout), 1);
        assert!(store.current().is_none());
    }

    #[test]
    fn test_release_keeps_resumed_session() {
        let mut mock = MockBackend::new();
        mock.accept_session("saved-token");
        let store = MemorySessionStore::with_session("ops", "saved-token");
        let mut client = client(&mock, &store);
        assert!(client.resume().unwrap());

        client.release().unwrap();
        assert_eq!(mock.count(Method::AuthLogout), 0);
        assert!(store.current().is_some());
    }

    #[test]
    fn test_logout_uses_stored_session() {
        let mut mock = MockBackend::new();
        mock.accept_session("saved-token");
        let store = MemorySessionStore::with_session("ops", "saved-token");
        let mut client = client(&mock, &store);

        client.logout().unwrap();
        assert_eq!(mock.count(Method::AuthLogout), 1);
        assert!(store.current().is_none());
    }

    #[test]
    fn test_resolve_system_id() {
        let mut mock = MockBackend::new();
        mock.add_system("web01", 100);
        let mut client = client(&mock, &MemorySessionStore::new());
        client.login(&admin()).unwrap();

        assert_eq!(client.resolve_system_id("web01").unwrap(), 100);
        assert!(matches!(
            client.resolve_system_id("ghost"),
            Err(Error::UnknownSystem(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_all_category_uses_relevant_errata() {
        let mut mock = MockBackend::new();
        mock.set_errata(7, AdvisoryType::All, vec![Erratum::new(1, "SUSE-1")]);
        let mut client = client(&mock, &MemorySessionStore::new());
        client.login(&admin()).unwrap();

        let errata = client.relevant_errata_by_type(7, AdvisoryType::All).unwrap();
        assert_eq!(errata.len(), 1);
        assert_eq!(mock.count(Method::SystemGetRelevantErrataByType), 0);
        assert_eq!(mock.count(Method::SystemGetRelevantErrata), 1);
    }

    #[test]
    fn test_connection_path_sorted() {
        let mut mock = MockBackend::new();
        mock.add_proxy(7, 2, 501, "outer-proxy");
        mock.add_proxy(7, 1, 500, "inner-proxy");
        let mut client = client(&mock, &MemorySessionStore::new());
        client.login(&admin()).unwrap();

        let path = client.connection_path(7).unwrap();
        assert_eq!(path[0].id, 500);
        assert_eq!(path[1].id, 501);
    }
}
