use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Maximum output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLimits {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
        }
    }
}

/// Rectangular window relative to the sun centre, in arcseconds, plus the
/// output scale in arcseconds per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionOfInterest {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub image_scale: f64,
}

impl RegionOfInterest {
    /// Normalizes a requested box into a region whose pixel size fits
    /// `limits`.
    ///
    /// When the box is too large at the requested scale the scale is
    /// inflated by `max(width / max_width, height / max_height)`, the
    /// smallest uniform factor that brings both dimensions within bounds.
    pub fn resolve(
        top: f64,
        left: f64,
        bottom: f64,
        right: f64,
        image_scale: f64,
        limits: &FrameLimits,
    ) -> Result<Self, GeometryError> {
        if ![top, left, bottom, right].iter().all(|v| v.is_finite()) {
            return Err(GeometryError::NotFinite);
        }
        if !image_scale.is_finite() || image_scale <= 0.0 {
            return Err(GeometryError::InvalidScale(image_scale));
        }

        let mut roi = Self {
            top,
            left,
            bottom,
            right,
            image_scale,
        };

        if roi.pixel_width() <= 0.0 {
            return Err(GeometryError::EmptyWidth { left, right });
        }
        if roi.pixel_height() <= 0.0 {
            return Err(GeometryError::EmptyHeight { top, bottom });
        }

        let factor = (roi.pixel_width() / f64::from(limits.max_width))
            .max(roi.pixel_height() / f64::from(limits.max_height));
        if factor > 1.0 {
            roi.image_scale *= factor;
        }

        Ok(roi)
    }

    pub fn width_arcsec(&self) -> f64 {
        self.right - self.left
    }

    pub fn height_arcsec(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn pixel_width(&self) -> f64 {
        self.width_arcsec() / self.image_scale
    }

    pub fn pixel_height(&self) -> f64 {
        self.height_arcsec() / self.image_scale
    }

    /// Centre of the window in arcseconds.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Frame size handed to the encoder: rounded, then padded to even.
    pub fn even_dimensions(&self) -> (u32, u32) {
        (
            even_dimension(self.pixel_width()),
            even_dimension(self.pixel_height()),
        )
    }
}

/// Rounds a pixel length and adds one if the result is odd. Never below 2.
pub fn even_dimension(value: f64) -> u32 {
    let rounded = (value.round().max(1.0) as u32).max(1);
    rounded + rounded % 2
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_within_bounds_is_unchanged() {
        let roi = RegionOfInterest::resolve(-500.0, -800.0, 500.0, 800.0, 2.0, &FrameLimits::default())
            .unwrap();
        assert_eq!(roi.image_scale, 2.0);
        assert!((roi.pixel_width() - 800.0).abs() < EPS);
        assert!((roi.pixel_height() - 500.0).abs() < EPS);
    }

    #[test]
    fn test_wide_region_doubles_scale() {
        let roi = RegionOfInterest::resolve(0.0, 0.0, 1000.0, 3840.0, 1.0, &FrameLimits::default())
            .unwrap();
        assert!((roi.image_scale - 2.0).abs() < EPS);
        assert!((roi.pixel_width() - 1920.0).abs() < EPS);
        assert_eq!(roi.even_dimensions(), (1920, 500));
    }

    #[test]
    fn test_minimal_factor_preserves_aspect_ratio() {
        let limits = FrameLimits::default();
        let cases = [
            (0.0, 0.0, 4000.0, 3000.0, 1.0),
            (-2000.0, -5000.0, 2000.0, 5000.0, 0.6),
            (0.0, 0.0, 1081.0, 100.0, 1.0),
            (-900.0, -900.0, 900.0, 900.0, 0.3),
        ];

        for (top, left, bottom, right, scale) in cases {
            let requested_w = (right - left) / scale;
            let requested_h = (bottom - top) / scale;
            let roi = RegionOfInterest::resolve(top, left, bottom, right, scale, &limits).unwrap();

            assert!(roi.pixel_width() <= f64::from(limits.max_width) + EPS);
            assert!(roi.pixel_height() <= f64::from(limits.max_height) + EPS);

            let expected_factor = (requested_w / 1920.0).max(requested_h / 1080.0);
            assert!((roi.image_scale / scale - expected_factor).abs() < 1e-9);

            // One dimension lands exactly on its bound.
            let touches = (roi.pixel_width() - 1920.0).abs() < 1e-6
                || (roi.pixel_height() - 1080.0).abs() < 1e-6;
            assert!(touches);

            let before = requested_w / requested_h;
            let after = roi.pixel_width() / roi.pixel_height();
            assert!((before - after).abs() < 1e-9);
        }
    }

    #[test]
    fn test_inverted_box_is_rejected() {
        let limits = FrameLimits::default();
        assert!(matches!(
            RegionOfInterest::resolve(0.0, 10.0, 10.0, 10.0, 1.0, &limits),
            Err(GeometryError::EmptyWidth { .. })
        ));
        assert!(matches!(
            RegionOfInterest::resolve(10.0, 0.0, 5.0, 10.0, 1.0, &limits),
            Err(GeometryError::EmptyHeight { .. })
        ));
    }

    #[test]
    fn test_bad_scale_is_rejected() {
        let limits = FrameLimits::default();
        assert!(RegionOfInterest::resolve(0.0, 0.0, 10.0, 10.0, 0.0, &limits).is_err());
        assert!(RegionOfInterest::resolve(0.0, 0.0, 10.0, 10.0, -1.0, &limits).is_err());
        assert!(RegionOfInterest::resolve(0.0, 0.0, 10.0, 10.0, f64::NAN, &limits).is_err());
        assert!(RegionOfInterest::resolve(0.0, 0.0, f64::INFINITY, 10.0, 1.0, &limits).is_err());
    }

    #[test]
    fn test_even_dimension() {
        assert_eq!(even_dimension(1920.0), 1920);
        assert_eq!(even_dimension(1919.6), 1920);
        assert_eq!(even_dimension(1079.0), 1080);
        assert_eq!(even_dimension(0.2), 2);
        assert_eq!(even_dimension(501.4), 502);
    }
}
