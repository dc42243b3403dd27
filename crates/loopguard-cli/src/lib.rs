//! # loopguard-cli — Handler Orchestration
//!
//! The pieces behind the `loopguard` binary:
//!
//! - `hostenv`: the SABnzbd `SAB_*` environment contract.
//! - `logging`: file logging with size-based rotation.
//! - `prequeue`: duplicate check and accept/refuse response.
//! - `postprocess`: completion reconciliation and status update.

pub mod hostenv;
pub mod logging;
pub mod postprocess;
pub mod prequeue;
