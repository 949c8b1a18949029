pub mod layer;
pub mod roi;

pub use layer::{Layer, LayerSet};
pub use roi::{even_dimension, FrameLimits, RegionOfInterest};
