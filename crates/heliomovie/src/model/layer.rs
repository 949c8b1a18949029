use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// `sourceId,visible,opacity`: the body of one bracketed layer entry.
static LAYER_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*,\s*(0|1|true|false)\s*,\s*(\d{1,3})\s*$")
        .expect("layer entry pattern is valid")
});

/// One data source contributing to a composite frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub source_id: u32,
    pub visible: bool,
    /// Opacity in percent, 0–100.
    pub opacity: u8,
    #[serde(default)]
    pub layering_order: i32,
}

impl Layer {
    pub fn new(source_id: u32, visible: bool, opacity: u8) -> Self {
        Self {
            source_id,
            visible,
            opacity: opacity.min(100),
            layering_order: 0,
        }
    }

    pub fn with_layering_order(mut self, order: i32) -> Self {
        self.layering_order = order;
        self
    }

    /// Opacity as a blend factor in `[0, 1]`.
    pub fn alpha(&self) -> f32 {
        f32::from(self.opacity.min(100)) / 100.0
    }
}

/// Ordered layers of a single request, unique by source id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Layer>", into = "Vec<Layer>")]
pub struct LayerSet {
    layers: Vec<Layer>,
}

impl LayerSet {
    /// Opacity above 100 is clamped to 100.
    pub fn new(mut layers: Vec<Layer>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for layer in &mut layers {
            if !seen.insert(layer.source_id) {
                return Err(ValidationError::DuplicateLayer(layer.source_id));
            }
            layer.opacity = layer.opacity.min(100);
        }
        Ok(Self { layers })
    }

    /// Parses the API layer string, e.g. `[14,1,100],[3,0,50]`.
    ///
    /// Layering order follows the position in the string; opacity is
    /// clamped to 100.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| ValidationError::InvalidLayerString(input.to_string()))?;

        let mut layers = Vec::new();
        for (position, entry) in body.split("],[").enumerate() {
            let captures = LAYER_ENTRY
                .captures(entry)
                .ok_or_else(|| ValidationError::InvalidLayerString(input.to_string()))?;

            let source_id: u32 = captures[1]
                .parse()
                .map_err(|_| ValidationError::InvalidLayerString(input.to_string()))?;
            let visible = matches!(&captures[2], "1" | "true");
            let opacity: u16 = captures[3]
                .parse()
                .map_err(|_| ValidationError::InvalidLayerString(input.to_string()))?;

            let order = i32::try_from(position).unwrap_or(i32::MAX);
            layers.push(
                Layer::new(source_id, visible, opacity.min(100) as u8).with_layering_order(order),
            );
        }

        Self::new(layers)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    /// Visible layers in drawing order (ascending layering order, stable).
    pub fn visible(&self) -> Vec<Layer> {
        let mut visible: Vec<Layer> = self.layers.iter().filter(|l| l.visible).cloned().collect();
        visible.sort_by_key(|l| l.layering_order);
        visible
    }

    pub fn has_visible(&self) -> bool {
        self.layers.iter().any(|l| l.visible)
    }

    /// Identifier safe for file names, e.g. `14__3`.
    pub fn to_filename_string(&self) -> String {
        self.layers
            .iter()
            .filter(|l| l.visible)
            .map(|l| l.source_id.to_string())
            .collect::<Vec<_>>()
            .join("__")
    }

    /// Short human readable name used in notifications.
    pub fn display_name(&self) -> String {
        let ids: Vec<String> = self
            .layers
            .iter()
            .filter(|l| l.visible)
            .map(|l| format!("#{}", l.source_id))
            .collect();
        format!("source {}", ids.join("/"))
    }
}

impl TryFrom<Vec<Layer>> for LayerSet {
    type Error = ValidationError;

    fn try_from(layers: Vec<Layer>) -> Result<Self, Self::Error> {
        Self::new(layers)
    }
}

impl From<LayerSet> for Vec<Layer> {
    fn from(set: LayerSet) -> Self {
        set.layers
    }
}

impl fmt::Display for LayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .layers
            .iter()
            .map(|l| format!("[{},{},{}]", l.source_id, u8::from(l.visible), l.opacity))
            .collect();
        write!(f, "{}", entries.join(","))
    }
}
