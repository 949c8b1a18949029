use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::compositor::source::ImageRef;
use crate::model::RegionOfInterest;

/// Pixel grid of every frame of a movie.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub roi: RegionOfInterest,
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    /// Uses the even, encoder-safe dimensions of `roi`.
    pub fn from_roi(roi: RegionOfInterest) -> Self {
        let (width, height) = roi.even_dimensions();
        Self { roi, width, height }
    }

    /// Maps the centre of output pixel `(px, py)` to arcseconds from the
    /// sun centre.
    pub fn pixel_to_arcsec(&self, px: u32, py: u32) -> (f64, f64) {
        let (cx, cy) = self.roi.center();
        let scale = self.roi.image_scale;
        (
            cx + (f64::from(px) + 0.5 - f64::from(self.width) / 2.0) * scale,
            cy + (f64::from(py) + 0.5 - f64::from(self.height) / 2.0) * scale,
        )
    }
}

/// One composited frame written to disk.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    /// Images actually drawn, keyed by source id.
    pub layer_images: BTreeMap<u32, ImageRef>,
    /// Layers that had no usable image for this timestamp.
    pub skipped_layers: Vec<u32>,
    pub composite_path: PathBuf,
}

impl Frame {
    pub fn is_degraded(&self) -> bool {
        !self.skipped_layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FrameLimits;

    #[test]
    fn test_geometry_is_even_and_centered() {
        let roi = RegionOfInterest::resolve(-101.0, -101.0, 100.0, 100.0, 1.0, &FrameLimits::default())
            .unwrap();
        let geometry = FrameGeometry::from_roi(roi);
        assert_eq!((geometry.width, geometry.height), (202, 202));

        let (x0, _) = geometry.pixel_to_arcsec(0, 0);
        let (x1, _) = geometry.pixel_to_arcsec(geometry.width - 1, 0);
        let (cx, _) = roi.center();
        assert!(((x0 + x1) / 2.0 - cx).abs() < 1e-9);
    }

    #[test]
    fn test_degraded_when_layer_skipped() {
        let frame = Frame {
            index: 0,
            timestamp: Utc::now(),
            layer_images: BTreeMap::new(),
            skipped_layers: vec![3],
            composite_path: PathBuf::from("frame_00000.png"),
        };
        assert!(frame.is_degraded());
    }
}
