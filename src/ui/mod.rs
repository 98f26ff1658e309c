//! Terminal UI for the build supervisor.

mod progress;

pub use progress::{BuildUi, UiDisplay, UiProgress};
