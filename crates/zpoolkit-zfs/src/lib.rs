//! System `zpool` integration for zpoolkit. The provider lives in `system`,
//! while `command` and `parse` cover process handling and report parsing.

mod command;
mod parse;
mod system;

pub use system::{SystemZpoolProvider, DEFAULT_ZPOOL_PATHS};
