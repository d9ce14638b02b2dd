//! Stable exit codes for the agent-runner CLI.
//!
//! Driver scripts dispatch on these values, so they are part of the
//! external contract.

/// Run completed and all post-conditions held.
pub const OK: i32 = 0;
/// Generic runner failure (process error, missing binary, failed
/// pre-flight, missing commit, bad descriptor).
pub const FAILURE: i32 = 1;
/// An error escaped the pipeline stages unhandled.
pub const UNHANDLED: i32 = 2;
/// The agent hit a provider usage/rate limit.
pub const USAGE_LIMIT: i32 = 10;
/// The child exceeded the wall-clock timeout and was terminated.
pub const TIMEOUT: i32 = 11;
