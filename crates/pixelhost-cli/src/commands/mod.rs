//! Command handlers. Each handler takes the composed context and does one
//! job; process exit codes come from the returned `Result`.

pub mod cleanup;
pub mod programs;
pub mod run;
pub mod status;
