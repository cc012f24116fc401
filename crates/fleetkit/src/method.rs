//! Remote methods used by this crate.
//!
//! Every call the crate makes is listed here; backends never build method
//! names at runtime.

/// A remote method, identified by its dotted `namespace.method` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `auth.login`
    AuthLogin,
    /// `auth.logout`
    AuthLogout,
    /// `user.listAssignableRoles`, used as the session check.
    UserListAssignableRoles,
    /// `system.getId`
    SystemGetId,
    /// `system.getRelevantErrata`
    SystemGetRelevantErrata,
    /// `system.getRelevantErrataByType`
    SystemGetRelevantErrataByType,
    /// `system.getInstalledProducts`
    SystemGetInstalledProducts,
    /// `system.getConnectionPath`
    SystemGetConnectionPath,
    /// `system.listMigrationTargets`
    SystemListMigrationTargets,
    /// `system.scheduleProductMigration`
    SystemScheduleProductMigration,
    /// `system.provisionSystem`
    SystemProvisionSystem,
    /// `system.schedulePackageRefresh`
    SystemSchedulePackageRefresh,
    /// `system.scheduleReboot`
    SystemScheduleReboot,
    /// `systemgroup.listSystems`
    SystemGroupListSystems,
    /// `errata.listKeywords`
    ErrataListKeywords,
    /// `schedule.listInProgressActions`
    ScheduleListInProgressActions,
    /// `schedule.listInProgressSystems`
    ScheduleListInProgressSystems,
    /// `schedule.listCompletedSystems`
    ScheduleListCompletedSystems,
    /// `schedule.listFailedSystems`
    ScheduleListFailedSystems,
    /// `actionchain.createChain`
    ActionChainCreateChain,
    /// `actionchain.addErrataUpdate`
    ActionChainAddErrataUpdate,
    /// `actionchain.addSystemReboot`
    ActionChainAddSystemReboot,
    /// `actionchain.addScriptRun`
    ActionChainAddScriptRun,
    /// `actionchain.scheduleChain`
    ActionChainScheduleChain,
}

impl Method {
    /// Dotted method name as documented by the server.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthLogin => "auth.login",
            Self::AuthLogout => "auth.logout",
            Self::UserListAssignableRoles => "user.listAssignableRoles",
            Self::SystemGetId => "system.getId",
            Self::SystemGetRelevantErrata => "system.getRelevantErrata",
            Self::SystemGetRelevantErrataByType => "system.getRelevantErrataByType",
            Self::SystemGetInstalledProducts => "system.getInstalledProducts",
            Self::SystemGetConnectionPath => "system.getConnectionPath",
            Self::SystemListMigrationTargets => "system.listMigrationTargets",
            Self::SystemScheduleProductMigration => "system.scheduleProductMigration",
            Self::SystemProvisionSystem => "system.provisionSystem",
            Self::SystemSchedulePackageRefresh => "system.schedulePackageRefresh",
            Self::SystemScheduleReboot => "system.scheduleReboot",
            Self::SystemGroupListSystems => "systemgroup.listSystems",
            Self::ErrataListKeywords => "errata.listKeywords",
            Self::ScheduleListInProgressActions => "schedule.listInProgressActions",
            Self::ScheduleListInProgressSystems => "schedule.listInProgressSystems",
            Self::ScheduleListCompletedSystems => "schedule.listCompletedSystems",
            Self::ScheduleListFailedSystems => "schedule.listFailedSystems",
            Self::ActionChainCreateChain => "actionchain.createChain",
            Self::ActionChainAddErrataUpdate => "actionchain.addErrataUpdate",
            Self::ActionChainAddSystemReboot => "actionchain.addSystemReboot",
            Self::ActionChainAddScriptRun => "actionchain.addScriptRun",
            Self::ActionChainScheduleChain => "actionchain.scheduleChain",
        }
    }

    /// URL path segment for the HTTP API (`namespace/method`).
    #[must_use]
    pub fn path(&self) -> String {
        self.name().replacen('.', "/", 1)
    }

    /// Whether the call changes server state.
    ///
    /// The HTTP API serves read-only methods over GET and everything else
    /// over POST.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::AuthLogin
                | Self::AuthLogout
                | Self::SystemScheduleProductMigration
                | Self::SystemProvisionSystem
                | Self::SystemSchedulePackageRefresh
                | Self::SystemScheduleReboot
                | Self::ActionChainCreateChain
                | Self::ActionChainAddErrataUpdate
                | Self::ActionChainAddSystemReboot
                | Self::ActionChainAddScriptRun
                | Self::ActionChainScheduleChain
        )
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_path() {
        assert_eq!(Method::SystemGetId.path(), "system/getId");
        assert_eq!(
            Method::ActionChainScheduleChain.path(),
            "actionchain/scheduleChain"
        );
    }

    #[test]
    fn test_reads_are_not_mutating() {
        assert!(!Method::ScheduleListInProgressActions.is_mutating());
        assert!(!Method::ErrataListKeywords.is_mutating());
        assert!(!Method::UserListAssignableRoles.is_mutating());
        assert!(Method::ActionChainCreateChain.is_mutating());
        assert!(Method::ActionChainAddScriptRun.is_mutating());
        assert!(Method::AuthLogin.is_mutating());
    }
}
