//! # Forge Types
//!
//! Shared data definitions used by every Forge crate:
//!
//! - [`command`]: the redacting command model. Arguments can carry secrets that are
//!   substituted when a process is spawned and masked whenever the command is shown.
//! - [`work`]: tracked units of external interaction ([`WorkItem`]) and the lifecycle
//!   events ([`WorkEvent`]) observers receive while items run.

pub mod command;
pub mod work;

pub use command::{Arg, Command, Elidable, SECRET_MASK, Secret};
pub use work::{ItemKind, ItemState, WorkEvent, WorkItem};
