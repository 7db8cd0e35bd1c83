use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ConnectorError;
use crate::oauth::{CredentialSource, TokenProvider};
use crate::worker_pool::WorkerPool;

pub const DISPLAY_VIDEO_SCOPE: &str = "https://www.googleapis.com/auth/display-video";
pub const BID_MANAGER_SCOPE: &str = "https://www.googleapis.com/auth/doubleclickbidmanager";
pub const BID_MANAGER_VERSION: &str = "v2";

/// The two remote APIs this crate talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiService {
    DisplayVideo,
    BidManager,
}

impl ApiService {
    pub fn name(&self) -> &'static str {
        match self {
            ApiService::DisplayVideo => "displayvideo",
            ApiService::BidManager => "doubleclickbidmanager",
        }
    }

    pub fn scope(&self) -> &'static str {
        match self {
            ApiService::DisplayVideo => DISPLAY_VIDEO_SCOPE,
            ApiService::BidManager => BID_MANAGER_SCOPE,
        }
    }

    pub fn base_url(&self, display_video_version: &str) -> String {
        match self {
            ApiService::DisplayVideo => format!(
                "https://displayvideo.googleapis.com/{}/",
                display_video_version
            ),
            ApiService::BidManager => format!(
                "https://doubleclickbidmanager.googleapis.com/{}/",
                BID_MANAGER_VERSION
            ),
        }
    }
}

impl fmt::Display for ApiService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Authenticated entry point for one API: base URL plus a token source.
pub struct ServiceHandle {
    service: ApiService,
    base_url: String,
    tokens: TokenProvider,
}

impl ServiceHandle {
    /// Resolves credentials and performs the first token exchange so bad
    /// credentials fail here rather than on some later request.
    pub async fn build(
        service: ApiService,
        config: &Config,
        http: reqwest::Client,
        pool: Arc<WorkerPool>,
    ) -> Result<Self, ConnectorError> {
        let source = CredentialSource::resolve(config, &pool).await?;
        let tokens = TokenProvider::new(source, service.scope(), http, pool);
        tokens.access_token().await?;
        Ok(Self {
            service,
            base_url: service.base_url(&config.api_version),
            tokens,
        })
    }

    pub fn service(&self) -> ApiService {
        self.service
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }
}

/// Lazily built handles, at most one per API for the life of the process.
///
/// A failed build is not stored; the next caller retries construction.
pub struct ServiceHandles {
    config: Arc<Config>,
    http: reqwest::Client,
    pool: Arc<WorkerPool>,
    display_video: OnceCell<Arc<ServiceHandle>>,
    bid_manager: OnceCell<Arc<ServiceHandle>>,
}

impl ServiceHandles {
    pub fn new(config: Arc<Config>, http: reqwest::Client, pool: Arc<WorkerPool>) -> Self {
        Self {
            config,
            http,
            pool,
            display_video: OnceCell::new(),
            bid_manager: OnceCell::new(),
        }
    }

    pub async fn get(&self, service: ApiService) -> Result<Arc<ServiceHandle>, ConnectorError> {
        let cell = match service {
            ApiService::DisplayVideo => &self.display_video,
            ApiService::BidManager => &self.bid_manager,
        };
        cell.get_or_try_init(|| async {
            info!(
                service = %service,
                mode = self.config.credential_mode().as_str(),
                "Building API service handle"
            );
            ServiceHandle::build(
                service,
                &self.config,
                self.http.clone(),
                Arc::clone(&self.pool),
            )
            .await
            .map(Arc::new)
            .map_err(|e| {
                warn!(service = %service, error = %e, "Service handle construction failed");
                e
            })
        })
        .await
        .map(Arc::clone)
    }

    pub fn is_built(&self, service: ApiService) -> bool {
        match service {
            ApiService::DisplayVideo => self.display_video.initialized(),
            ApiService::BidManager => self.bid_manager.initialized(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_and_scopes() {
        assert_eq!(
            ApiService::DisplayVideo.base_url("v4"),
            "https://displayvideo.googleapis.com/v4/"
        );
        assert_eq!(
            ApiService::BidManager.base_url("v4"),
            "https://doubleclickbidmanager.googleapis.com/v2/"
        );
        assert!(ApiService::BidManager.scope().ends_with("doubleclickbidmanager"));
    }

    #[tokio::test]
    async fn failed_construction_is_not_cached() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let handles = ServiceHandles::new(Arc::new(Config::default()), reqwest::Client::new(), pool);

        for _ in 0..2 {
            let err = handles.get(ApiService::DisplayVideo).await.err().unwrap();
            assert!(matches!(err, ConnectorError::Configuration(_)));
            assert!(!handles.is_built(ApiService::DisplayVideo));
        }
    }
}
