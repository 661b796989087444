//! Process exit codes. Part of the CLI contract.

pub const SUCCESS: i32 = 0;
pub const PARTIAL_FAILURE: i32 = 1; // at least one profile has a failed outcome
pub const CONFIG_ERROR: i32 = 2; // config, input or storage error
