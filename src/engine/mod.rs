//! Scheduling engine for sumactl
//!
//! Per system, the engine:
//! 1. Resolves which advisory categories apply (policy)
//! 2. Refuses to double-book a system already busy at that instant (conflict)
//! 3. Fetches the relevant errata (errata)
//! 4. Builds and commits an action chain, or one single action (chain)
//!
//! The run driver walks a parsed schedule in input order and tallies the
//! outcomes; action ids end up in the ledger for a later `validate` run.

pub mod chain;
pub mod conflict;
pub mod errata;
pub mod ledger;
pub mod operation;
pub mod policy;
pub mod run;

pub use ledger::Ledger;
pub use operation::{CategorySource, Operation, RebootPolicy};
pub use policy::ProductPolicy;
pub use run::{ExitStatus, RunOptions, Tally};
