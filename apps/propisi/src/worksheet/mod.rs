// Worksheet core: options → ruling + text runs → draw ops → PDF.
// Everything here is synchronous and pure; callers on the async runtime wrap
// composition in tokio::task::spawn_blocking.

pub mod compose;
pub mod fill;
pub mod font;
pub mod geometry;
pub mod options;
pub mod pdf;

pub use compose::{ComposeError, PageComposer};
pub use font::FontSource;
pub use options::{FillMode, Layout, Orientation, StrokeStyle, ValidationError, WorksheetOptions};
