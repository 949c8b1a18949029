use std::sync::Arc;

use async_trait::async_trait;

use crate::api::{MovieService, StatusResponse};
use crate::error::MovieError;

use super::error::ClientError;

/// Where the poller asks for movie status.
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn query(&self, id: &str, token: &str) -> Result<StatusResponse, ClientError>;
}

/// Queries a service running in the same process.
pub struct ServiceClient {
    service: Arc<MovieService>,
}

impl ServiceClient {
    pub fn new(service: Arc<MovieService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StatusClient for ServiceClient {
    async fn query(&self, id: &str, token: &str) -> Result<StatusResponse, ClientError> {
        self.service.movie_status(id, token).map_err(|e| match e {
            MovieError::Job(_) | MovieError::Validation(_) => {
                ClientError::Rejected(e.public_message())
            }
            other => ClientError::Unavailable(other.public_message()),
        })
    }
}
