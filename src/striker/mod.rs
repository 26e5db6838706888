use crate::config::Target;
use crate::connection_pool::{PoolError, SharedConnectionPool};
use crate::request::RequestDescriptor;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StrikeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),
    #[error("failed to encode body: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Status(StatusCode),
    TransportFault,
    UnsupportedMethod,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    /// Set only when a response came back.
    pub latency: Option<Duration>,
    pub classification: Classification,
}

impl Outcome {
    fn dry_run() -> Self {
        Self {
            success: true,
            latency: None,
            classification: Classification::DryRun,
        }
    }

    fn failed(classification: Classification) -> Self {
        Self {
            success: false,
            latency: None,
            classification,
        }
    }

    fn response(status: StatusCode, latency: Duration) -> Self {
        Self {
            success: is_success(status),
            latency: Some(latency),
            classification: Classification::Status(status),
        }
    }
}

/// 2xx and 3xx count as success.
pub fn is_success(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

enum Mode {
    DryRun,
    Live {
        pool: SharedConnectionPool,
        target: Target,
        timeout: Duration,
    },
}

/// Executes single requests and classifies what came back.
pub struct Striker {
    mode: Mode,
}

impl Striker {
    pub fn dry_run() -> Self {
        Self { mode: Mode::DryRun }
    }

    pub fn live(pool: SharedConnectionPool, target: Target, timeout: Duration) -> Self {
        Self {
            mode: Mode::Live {
                pool,
                target,
                timeout,
            },
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.mode, Mode::DryRun)
    }

    /// Never fails: every fault is folded into the returned [`Outcome`].
    pub async fn strike(&self, descriptor: RequestDescriptor) -> Outcome {
        let Mode::Live {
            pool,
            target,
            timeout,
        } = &self.mode
        else {
            return Outcome::dry_run();
        };

        if descriptor.method != Method::GET && descriptor.method != Method::POST {
            debug!("Unsupported method {}", descriptor.method);
            return Outcome::failed(Classification::UnsupportedMethod);
        }

        let started = Instant::now();
        let result = match time::timeout(*timeout, dispatch(pool, target, descriptor)).await {
            Ok(result) => result,
            Err(_) => Err(StrikeError::Timeout(*timeout)),
        };

        match result {
            Ok(status) => Outcome::response(status, started.elapsed()),
            Err(e) => {
                debug!("Request to {} failed: {}", target.url(), e);
                Outcome::failed(Classification::TransportFault)
            }
        }
    }
}

async fn dispatch(
    pool: &SharedConnectionPool,
    target: &Target,
    descriptor: RequestDescriptor,
) -> Result<StatusCode, StrikeError> {
    let body = match &descriptor.body {
        Some(body) => Full::new(Bytes::from(serde_json::to_vec(body)?)),
        None => Full::default(),
    };

    let mut request = Request::builder()
        .method(descriptor.method)
        .uri(target.uri_for(&descriptor.path_and_query)?)
        .body(body)?;
    *request.headers_mut() = descriptor.headers;

    Ok(pool.send(request).await?)
}
