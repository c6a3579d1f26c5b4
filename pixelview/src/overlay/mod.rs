//! Live classification overlay.
//!
//! [`OverlayRenderer`] is what a viewer talks to. It draws onto an
//! [`OverlayCanvas`], turns computed tiles into colours with a
//! [`TileColorizer`], and reports changes as [`OverlayEvent`]s.

mod canvas;
mod colorize;
mod renderer;
mod state;

pub use canvas::{OverlayCanvas, RasterCanvas};
pub use colorize::{to_rgba, ClassColorizer, TileColorizer};
pub use renderer::{OverlayRenderer, PaintReport};
pub use state::{ListenerId, OverlayEvent, OverlayListener, OverlayState};
