pub mod api;
pub mod broadcast;
pub mod compositor;
pub mod config;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod poller;
pub mod sanitize;
pub mod sequencer;
pub mod storage;
pub mod worker;

pub use api::{MovieService, Request, Response, ServiceSettings, StatusResponse};
pub use broadcast::{JobProgressBroadcaster, JobStore, Watchdog};
pub use compositor::{FrameCompositor, ImageRef, ImageSource, MemoryCatalog};
pub use config::{load_config, load_config_from_str, Config};
pub use encoder::{FfmpegEncoder, VideoEncoder};
pub use error::{
    ConfigError, GeometryError, JobError, MovieError, Result, StorageError, ValidationError,
    WorkerError,
};
pub use logging::init_logging;
pub use model::{FrameLimits, Layer, LayerSet, RegionOfInterest};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext};
pub use poller::{MovieHistory, PollerConfig, StatusPoller};
pub use worker::{MovieJob, MovieStatus, WorkerPool};
