//! Console installer for Secure Pass Generator.
//!
//! The binary wires these modules together: [`cli`] parses switches,
//! [`orchestrator`] runs the install state machine and [`logging`] mirrors
//! progress into `install_log.txt`.

pub mod cli;
pub mod logging;
pub mod orchestrator;
pub mod prompt;
