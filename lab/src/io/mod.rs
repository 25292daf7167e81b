//! Side-effecting adapters: configuration, remote services, local processes
//! and on-disk session state.

pub mod completion;
pub mod config;
pub mod process;
pub mod prompt;
pub mod sandbox;
pub mod test_runner;
pub mod workspace;
