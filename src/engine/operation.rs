//! What to schedule for each system

use super::policy::ProductPolicy;
use fleetkit::AdvisoryType;

/// Whether a patch chain ends with a reboot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebootPolicy {
    /// Reboot when a patch in the set suggests it
    #[default]
    Auto,
    /// Always reboot
    Always,
    /// Never reboot, even when suggested
    Never,
}

impl RebootPolicy {
    pub fn from_flags(reboot: bool, no_reboot: bool) -> Self {
        match (reboot, no_reboot) {
            (true, _) => Self::Always,
            (false, true) => Self::Never,
            (false, false) => Self::Auto,
        }
    }

    /// Whether the chain gets a reboot, given what the errata suggest.
    pub fn wants_reboot(self, suggested: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => suggested,
        }
    }
}

/// Where the advisory categories of a patch run come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategorySource {
    /// Same categories for every system
    Explicit(Vec<AdvisoryType>),
    /// Looked up per system by its base product
    Policy(ProductPolicy),
}

impl CategorySource {
    /// Categories picked from the `-a/-b/-e/-s` flags. `all` wins.
    pub fn from_flags(all: bool, bugfix: bool, enhancement: bool, security: bool) -> Self {
        if all {
            return Self::Explicit(vec![AdvisoryType::All]);
        }
        let mut categories = Vec::new();
        if security {
            categories.push(AdvisoryType::Security);
        }
        if bugfix {
            categories.push(AdvisoryType::Bugfix);
        }
        if enhancement {
            categories.push(AdvisoryType::ProductEnhancement);
        }
        Self::Explicit(categories)
    }
}

/// One maintenance operation, applied to every system of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Patch {
        categories: CategorySource,
        reboot: RebootPolicy,
    },
    Migrate {
        dry_run: bool,
    },
    Upgrade,
    PackageRefresh,
    Reboot,
}

impl Operation {
    /// Human description used in run logs, e.g. "product migration".
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Patch { .. } => "patching",
            Self::Migrate { dry_run: true } => "product migration (dry run)",
            Self::Migrate { dry_run: false } => "product migration",
            Self::Upgrade => "upgrade",
            Self::PackageRefresh => "a package refresh",
            Self::Reboot => "a reboot",
        }
    }

    /// Prefix of action chain labels.
    pub fn label_prefix(&self) -> &'static str {
        match self {
            Self::Patch { .. } => "patching",
            Self::Migrate { .. } => "migration",
            Self::Upgrade => "upgrade",
            Self::PackageRefresh => "refresh",
            Self::Reboot => "reboot",
        }
    }

    /// Whether each system needs a target (base channel or profile).
    pub fn requires_target(&self) -> bool {
        matches!(self, Self::Migrate { .. } | Self::Upgrade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reboot_policy_truth_table() {
        assert!(RebootPolicy::Always.wants_reboot(false));
        assert!(RebootPolicy::Always.wants_reboot(true));
        assert!(!RebootPolicy::Never.wants_reboot(true));
        assert!(RebootPolicy::Auto.wants_reboot(true));
        assert!(!RebootPolicy::Auto.wants_reboot(false));
    }

    #[test]
    fn test_reboot_policy_from_flags() {
        assert_eq!(RebootPolicy::from_flags(true, false), RebootPolicy::Always);
        assert_eq!(RebootPolicy::from_flags(false, true), RebootPolicy::Never);
        assert_eq!(RebootPolicy::from_flags(false, false), RebootPolicy::Auto);
    }

    #[test]
    fn test_all_flag_wins() {
        assert_eq!(
            CategorySource::from_flags(true, true, false, true),
            CategorySource::Explicit(vec![AdvisoryType::All])
        );
        assert_eq!(
            CategorySource::from_flags(false, true, false, true),
            CategorySource::Explicit(vec![AdvisoryType::Security, AdvisoryType::Bugfix])
        );
    }

    #[test]
    fn test_requires_target() {
        assert!(Operation::Upgrade.requires_target());
        assert!(Operation::Migrate { dry_run: true }.requires_target());
        assert!(!Operation::Reboot.requires_target());
    }
}
