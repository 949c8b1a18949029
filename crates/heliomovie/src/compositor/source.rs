use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reference to one stored source image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub source_id: u32,
    pub date: DateTime<Utc>,
    pub path: PathBuf,
    /// Arcseconds per source pixel.
    pub scale: f64,
    /// Sun centre in source pixel coordinates.
    pub sun_center: (f64, f64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("no image for source {source_id} within {tolerance_secs}s of {at}")]
    NoImageAvailable {
        source_id: u32,
        at: DateTime<Utc>,
        tolerance_secs: i64,
    },

    #[error("unknown data source {0}")]
    UnknownSource(u32),

    #[error("catalog lookup failed: {0}")]
    Catalog(String),
}

/// Data-source catalog resolving `(source, instant)` to the closest image.
pub trait ImageSource: Send + Sync {
    fn nearest_image(
        &self,
        source_id: u32,
        at: DateTime<Utc>,
        tolerance: chrono::Duration,
    ) -> Result<ImageRef, SourceError>;
}

/// Catalog held in memory, sorted by observation date per source.
#[derive(Default)]
pub struct MemoryCatalog {
    images: RwLock<HashMap<u32, Vec<ImageRef>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, image: ImageRef) {
        let mut images = match self.images.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entries = images.entry(image.source_id).or_default();
        let position = entries.partition_point(|existing| existing.date <= image.date);
        entries.insert(position, image);
    }

    pub fn len(&self) -> usize {
        match self.images.read() {
            Ok(guard) => guard.values().map(Vec::len).sum(),
            Err(poisoned) => poisoned.into_inner().values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ImageSource for MemoryCatalog {
    fn nearest_image(
        &self,
        source_id: u32,
        at: DateTime<Utc>,
        tolerance: chrono::Duration,
    ) -> Result<ImageRef, SourceError> {
        let images = match self.images.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entries = images
            .get(&source_id)
            .ok_or(SourceError::UnknownSource(source_id))?;

        let split = entries.partition_point(|image| image.date < at);
        let before = split.checked_sub(1).and_then(|i| entries.get(i));
        let after = entries.get(split);

        // Ties go to the earlier image.
        let nearest = match (before, after) {
            (Some(b), Some(a)) => {
                if (at - b.date) <= (a.date - at) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        };

        match nearest {
            Some(image) if (image.date - at).abs() <= tolerance => Ok(image.clone()),
            _ => Err(SourceError::NoImageAvailable {
                source_id,
                at,
                tolerance_secs: tolerance.num_seconds(),
            }),
        }
    }
}
