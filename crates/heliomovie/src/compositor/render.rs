use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbaImage};

use crate::compositor::blend::{flatten_over_black, over, premultiply};
use crate::compositor::frame::{Frame, FrameGeometry};
use crate::compositor::source::{ImageRef, ImageSource};
use crate::compositor::CompositeError;
use crate::model::Layer;
use crate::sanitize::redact_path;

/// Blends the visible layers of one instant into a single raster frame.
pub struct FrameCompositor {
    source: Arc<dyn ImageSource>,
    tolerance: chrono::Duration,
}

impl FrameCompositor {
    pub fn new(source: Arc<dyn ImageSource>, tolerance: chrono::Duration) -> Self {
        Self { source, tolerance }
    }

    pub fn tolerance(&self) -> chrono::Duration {
        self.tolerance
    }

    /// Composites `layers` at `timestamp` and writes the PNG to `out_path`.
    ///
    /// Layers without a usable image are skipped and listed in
    /// [`Frame::skipped_layers`]. Fails with [`CompositeError::NoLayers`]
    /// only when nothing could be drawn.
    pub fn composite(
        &self,
        index: usize,
        timestamp: DateTime<Utc>,
        layers: &[Layer],
        geometry: &FrameGeometry,
        out_path: &Path,
    ) -> Result<Frame, CompositeError> {
        let _span = tracing::info_span!(
            "composite_frame",
            index,
            timestamp = %timestamp,
            file = %redact_path(out_path)
        )
        .entered();

        if geometry.width == 0 || geometry.height == 0 {
            return Err(CompositeError::EmptyGeometry);
        }

        let mut ordered: Vec<&Layer> = layers.iter().filter(|l| l.visible).collect();
        ordered.sort_by_key(|l| l.layering_order);

        let mut canvas = vec![0u8; geometry.width as usize * geometry.height as usize * 4];
        let mut layer_images = BTreeMap::new();
        let mut skipped_layers = Vec::new();

        for layer in ordered {
            let image_ref = match self
                .source
                .nearest_image(layer.source_id, timestamp, self.tolerance)
            {
                Ok(found) => found,
                Err(e) => {
                    tracing::debug!(source_id = layer.source_id, "Skipping layer: {}", e);
                    skipped_layers.push(layer.source_id);
                    continue;
                }
            };

            let decoded = match image::open(&image_ref.path) {
                Ok(img) => img.to_rgba8(),
                Err(e) => {
                    tracing::warn!(
                        source_id = layer.source_id,
                        file = %redact_path(&image_ref.path),
                        "Skipping undecodable layer image: {}",
                        e
                    );
                    skipped_layers.push(layer.source_id);
                    continue;
                }
            };

            draw_layer(&mut canvas, geometry, &decoded, &image_ref, layer.alpha());
            layer_images.insert(layer.source_id, image_ref);
        }

        if layer_images.is_empty() {
            return Err(CompositeError::NoLayers { timestamp });
        }

        flatten_over_black(&mut canvas);
        let frame = RgbaImage::from_raw(geometry.width, geometry.height, canvas)
            .ok_or(CompositeError::EmptyGeometry)?;
        frame
            .save_with_format(out_path, ImageFormat::Png)
            .map_err(|e| CompositeError::Save {
                path: out_path.to_path_buf(),
                source: e,
            })?;

        Ok(Frame {
            index,
            timestamp,
            layer_images,
            skipped_layers,
            composite_path: out_path.to_path_buf(),
        })
    }
}

/// Nearest-neighbour resample of `source` into the frame grid, blended over
/// the canvas. Pixels outside the source image are left untouched.
fn draw_layer(
    canvas: &mut [u8],
    geometry: &FrameGeometry,
    source: &RgbaImage,
    image_ref: &ImageRef,
    alpha: f32,
) {
    if image_ref.scale <= 0.0 || !image_ref.scale.is_finite() {
        return;
    }
    let (src_w, src_h) = source.dimensions();
    let (sun_x, sun_y) = image_ref.sun_center;

    for py in 0..geometry.height {
        for px in 0..geometry.width {
            let (ax, ay) = geometry.pixel_to_arcsec(px, py);
            let sx = (sun_x + ax / image_ref.scale).floor();
            let sy = (sun_y + ay / image_ref.scale).floor();
            if sx < 0.0 || sy < 0.0 || sx >= f64::from(src_w) || sy >= f64::from(src_h) {
                continue;
            }

            let src = premultiply(source.get_pixel(sx as u32, sy as u32).0);
            let offset = (py as usize * geometry.width as usize + px as usize) * 4;
            let dst = [
                canvas[offset],
                canvas[offset + 1],
                canvas[offset + 2],
                canvas[offset + 3],
            ];
            canvas[offset..offset + 4].copy_from_slice(&over(dst, src, alpha));
        }
    }
}
