//! nicflash-exec: Process execution abstraction
//!
//! Every external tool the daemon drives (diagnostics, the vendor update tool,
//! `tar`, `rsu`) goes through a [`ProcessRunner`] injected at construction
//! time, so tests substitute a fake and dry runs never touch hardware.

pub mod dry_run;
pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use dry_run::DryRunRunner;
pub use error::ExecError;
pub use local::LocalRunner;
pub use result::{CommandResult, CommandSpec};
pub use traits::ProcessRunner;
