//! In-process request dispatcher for movie submission, status queries and
//! screenshots.

pub mod service;
pub mod types;

pub use service::{MovieService, ServiceSettings};
pub use types::{
    CompletedStatus, FailedStatus, LayersParam, PendingStatus, Request, Response, RoiParams,
    ScreenshotRequest, ScreenshotResponse, StatusResponse, SubmitRequest, SubmitResponse,
};
