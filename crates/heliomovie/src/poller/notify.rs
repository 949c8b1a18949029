use std::sync::Mutex;

use serde::Serialize;

/// Shown when a movie fails, whatever the server-side cause.
pub const FAILURE_MESSAGE: &str = "Sorry, we were unable to create the movie you requested. \
This usually means that there are not enough images for the time range requested. \
Please try adjusting the observation date or movie duration and try creating a new movie.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub job_id: String,
    pub level: NotificationLevel,
    pub message: String,
    /// Sticky notifications stay until dismissed.
    pub sticky: bool,
}

impl Notification {
    pub fn completed(job_id: &str, name: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            level: NotificationLevel::Success,
            message: format!("Your {} movie is ready!", name),
            sticky: false,
        }
    }

    pub fn failed(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            level: NotificationLevel::Error,
            message: FAILURE_MESSAGE.to_string(),
            sticky: true,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => {
                tracing::info!(job_id = %notification.job_id, "{}", notification.message)
            }
            NotificationLevel::Error => {
                tracing::warn!(job_id = %notification.job_id, "{}", notification.message)
            }
        }
    }
}

/// Keeps every notification in memory.
#[derive(Default)]
pub struct CollectingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        match self.notifications.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn for_job(&self, job_id: &str) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.job_id == job_id)
            .collect()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        match self.notifications.lock() {
            Ok(mut guard) => guard.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
