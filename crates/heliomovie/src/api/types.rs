//! Request and response bodies of the movie service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, ValidationError};
use crate::model::{FrameLimits, Layer, LayerSet, RegionOfInterest};
use crate::worker::job::MovieStatus;

/// Layers as sent by clients: either the bracketed wire string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayersParam {
    Wire(String),
    List(Vec<Layer>),
}

impl LayersParam {
    pub fn into_layer_set(self) -> Result<LayerSet, ValidationError> {
        let layers = match self {
            LayersParam::Wire(wire) => LayerSet::parse(&wire)?,
            LayersParam::List(list) => LayerSet::new(list)?,
        };
        if !layers.has_visible() {
            return Err(ValidationError::NoVisibleLayers);
        }
        Ok(layers)
    }
}

impl From<&str> for LayersParam {
    fn from(wire: &str) -> Self {
        LayersParam::Wire(wire.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiParams {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub image_scale: f64,
}

impl RoiParams {
    pub fn resolve(&self, limits: &FrameLimits) -> Result<RegionOfInterest, GeometryError> {
        RegionOfInterest::resolve(
            self.top,
            self.left,
            self.bottom,
            self.right,
            self.image_scale,
            limits,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub layers: LayersParam,
    pub roi: RoiParams,
    pub start_time: DateTime<Utc>,
    pub frame_rate: f64,
    pub num_frames: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub id: String,
    pub token: String,
    /// Estimated seconds until the movie is ready.
    pub eta: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRequest {
    pub layers: LayersParam,
    pub roi: RoiParams,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotResponse {
    pub id: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingStatus {
    pub status: u8,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedStatus {
    pub status: u8,
    pub frame_rate: f64,
    pub num_frames: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub thumbnail_url: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedStatus {
    pub status: u8,
    pub error: String,
}

/// Answer to a status query. Variants are tried in this order when
/// deserializing, most specific first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusResponse {
    Completed(CompletedStatus),
    Failed(FailedStatus),
    Pending(PendingStatus),
}

impl StatusResponse {
    pub fn pending(status: MovieStatus, progress: f64) -> Self {
        StatusResponse::Pending(PendingStatus {
            status: status.code(),
            progress,
        })
    }

    pub fn failed(error: impl Into<String>) -> Self {
        StatusResponse::Failed(FailedStatus {
            status: MovieStatus::Error.code(),
            error: error.into(),
        })
    }

    /// Status carried by the response. Unknown codes read as queued.
    pub fn status(&self) -> MovieStatus {
        let code = match self {
            StatusResponse::Completed(c) => c.status,
            StatusResponse::Failed(f) => f.status,
            StatusResponse::Pending(p) => p.status,
        };
        MovieStatus::from_code(code).unwrap_or(MovieStatus::Queued)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    QueueMovie(SubmitRequest),
    GetMovieStatus { id: String, token: String },
    TakeScreenshot(ScreenshotRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Submitted(SubmitResponse),
    Status(StatusResponse),
    Screenshot(ScreenshotResponse),
}
