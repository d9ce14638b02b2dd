//! Side-effecting operations: filesystem, git, process execution and
//! HTTP. Kept behind small seams so orchestration stays testable.

pub mod agents;
pub mod config;
pub mod context;
pub mod git;
pub mod metadata;
pub mod notify;
pub mod process;
pub mod tasks;
