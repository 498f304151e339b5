//! Scroll and exposure tracking

pub mod interaction;
pub mod scroll;
pub mod surface;

pub use interaction::{ActiveTimeFn, InteractionTracker, IntersectionEntry};
pub use scroll::ScrollTracker;
pub use surface::{ScrollSurface, WindowSurface};
