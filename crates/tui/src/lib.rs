//! Progress view for Forge work items.
//!
//! [`render_tail`] decides what is shown; [`ProgressRenderer`] keeps it on screen while a
//! command runs.

pub mod progress;
pub mod tail;

pub use progress::{ProgressRenderer, Screen, Transcript};
pub use tail::{SPINNER, item_lines, render_tail, spinner, summary_line};
