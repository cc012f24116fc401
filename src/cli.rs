use clap::{ArgGroup, Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sumactl")]
#[command(version)]
#[command(about = "Schedule patching, migration and upgrades on a SUSE Manager fleet", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ~/.config/sumactl/config.toml)
    #[arg(short, long, global = true, env = "SUMACTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Patch systems with an action chain per system
    Patch(PatchArgs),

    /// Migrate systems to a new service pack
    Migrate(MigrateArgs),

    /// Reinstall systems with a new product version
    Upgrade(UpgradeArgs),

    /// Utility actions on systems
    Utils(UtilsArgs),

    /// Check how the actions of a previous run went
    Validate {
        /// Action ids file written by a scheduling run
        action_ids_file: PathBuf,
    },

    /// Log in to or out of the server
    User(UserArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Scheduling Commands
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ScheduleArgs {
    /// Systems file: system-or-group,YYYY-MM-DD HH:MM:SS[,target[,options]]
    pub filename: PathBuf,

    /// Where to save the ids of scheduled actions (default: action_ids.<timestamp>)
    #[arg(short = 'f', long = "save-action-ids-file")]
    pub save_action_ids_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("selection")
        .required(true)
        .multiple(true)
        .args(["policy", "all_patches", "bugfix", "enhancement", "security"])
))]
pub struct PatchArgs {
    #[command(flatten)]
    pub common: ScheduleArgs,

    /// Product patching policy file (product,categories per line)
    #[arg(short, long, conflicts_with_all = ["all_patches", "bugfix", "enhancement", "security"])]
    pub policy: Option<PathBuf>,

    /// Apply all relevant patches
    #[arg(short, long)]
    pub all_patches: bool,

    /// Apply bug fix patches
    #[arg(short, long)]
    pub bugfix: bool,

    /// Apply product enhancement patches
    #[arg(short, long)]
    pub enhancement: bool,

    /// Apply security patches
    #[arg(short, long)]
    pub security: bool,

    /// Always end each action chain with a reboot
    #[arg(short, long, conflicts_with = "no_reboot")]
    pub reboot: bool,

    /// Never reboot, even when a patch suggests it
    #[arg(short, long)]
    pub no_reboot: bool,
}

// Systems file fields: system,time,base-channel-label[,target-ident]
#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub common: ScheduleArgs,

    /// Schedule dry-run migrations
    #[arg(short, long)]
    pub dry_run: bool,

    /// List migration target idents of each system (usable as the fourth field)
    #[arg(short, long)]
    pub list_migration_targets: bool,
}

#[derive(Args, Debug)]
pub struct UpgradeArgs {
    #[command(flatten)]
    pub common: ScheduleArgs,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("task")
        .required(true)
        .args(["package_refresh", "reboot"])
))]
pub struct UtilsArgs {
    #[command(flatten)]
    pub common: ScheduleArgs,

    /// Schedule a package list refresh
    #[arg(short = 'r', long)]
    pub package_refresh: bool,

    /// Schedule a reboot
    #[arg(long)]
    pub reboot: bool,
}

// ============================================================================
// User Command
// ============================================================================

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["login", "logout"])
))]
pub struct UserArgs {
    /// Log in and keep the session for later runs
    #[arg(short = 'i', long)]
    pub login: bool,

    /// Log out and forget the saved session
    #[arg(short = 'o', long)]
    pub logout: bool,
}
