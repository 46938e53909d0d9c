//! # Forge Engine
//!
//! Concurrent execution of external commands and HTTP requests as observable work items,
//! plus the fan-out/fan-in combinators the pipeline stages are built from.
//!
//! ## Architecture
//!
//! - **`workstream`**: the execution engine; issues [`WorkItem`](forge_types::WorkItem)s and
//!   publishes their lifecycle events
//! - **`transport`**: the seam between the engine and real processes/sockets
//! - **`fanout`**: ordered, failure-isolating concurrent map/apply
//! - **`error`**: the error taxonomy shared by every Forge crate
//!
//! ## Usage
//!
//! ```no_run
//! use forge_engine::{RunOptions, Workstream, concurrent_map, gather};
//! use forge_types::Command;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let workstream = Workstream::system()?;
//! let hosts = ["a.example", "b.example"];
//! let outputs = gather(concurrent_map(hosts, |host| {
//!     let workstream = workstream.clone();
//!     async move {
//!         let outcome = workstream.run(&Command::new("ping").args(["-c", "1", host]), RunOptions::default()).await?;
//!         Ok(outcome.output)
//!     }
//! }))
//! .await?;
//! # let _ = outputs;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fanout;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transport;
pub mod workstream;

pub use error::{Conflict, ConflictError, ConfigError, ForgeError, TaskError};
pub use fanout::{FanOut, Spread, concurrent_apply, concurrent_filter_map, concurrent_map, drain, gather};
pub use transport::{HttpAuth, HttpReply, HttpRequest, Invocation, SystemTransport, Transport};
pub use workstream::{Auth, FetchOptions, FetchOutcome, OutputSink, RunOptions, RunOutcome, Workstream};
