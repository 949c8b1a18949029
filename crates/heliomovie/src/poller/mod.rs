//! Client side of movie generation: polls job status, keeps the local
//! history and raises notifications.

pub mod client;
pub mod error;
pub mod history;
pub mod notify;
#[allow(clippy::module_inception)]
pub mod poller;

pub use client::{ServiceClient, StatusClient};
pub use error::ClientError;
pub use history::{HistoryEntry, MovieHistory};
pub use notify::{
    CollectingNotifier, LogNotifier, Notification, NotificationLevel, Notifier, FAILURE_MESSAGE,
};
pub use poller::{PollOutcome, PollerConfig, StatusPoller};
