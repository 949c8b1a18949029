pub mod blend;
pub mod frame;
pub mod render;
pub mod source;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use frame::{Frame, FrameGeometry};
pub use render::FrameCompositor;
pub use source::{ImageRef, ImageSource, MemoryCatalog, SourceError};

#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("no layer had an image near {timestamp}")]
    NoLayers { timestamp: DateTime<Utc> },

    #[error("frame geometry has no pixels")]
    EmptyGeometry,

    #[error("Failed to write frame '{path}': {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
