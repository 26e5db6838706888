use crate::config::RunConfig;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("connection capacity for {workers} workers x {sockets} sockets overflows")]
    CapacityOverflow { workers: usize, sockets: usize },
    #[error("failed to set up TLS: {0}")]
    Tls(#[from] rustls::Error),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("connection pool is closed")]
    Closed,
    #[error("request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("failed to read response body: {0}")]
    Body(#[from] hyper::Error),
}

/// HTTP client shared by every worker of a run.
///
/// Connection reuse is handled by hyper's pool; the semaphore caps how many
/// exchanges may be open at once.
pub struct ConnectionPool {
    client: HttpsClient,
    permits: Arc<Semaphore>,
    max_connections: usize,
    max_idle_per_host: usize,
}

impl ConnectionPool {
    pub fn new(config: &RunConfig) -> Result<Self, SetupError> {
        let overflow = || SetupError::CapacityOverflow {
            workers: config.workers,
            sockets: config.sockets,
        };
        let max_connections = config
            .workers
            .checked_mul(config.sockets)
            .and_then(|n| n.checked_mul(2))
            .filter(|&n| n <= Semaphore::MAX_PERMITS)
            .ok_or_else(overflow)?;
        let max_idle_per_host = config.sockets.checked_mul(2).ok_or_else(overflow)?;

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        // keep idle connections alive, disable Nagle
        http.set_keepalive(Some(TCP_KEEPALIVE));
        http.set_nodelay(true);
        http.set_connect_timeout(Some(config.request_timeout));

        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(max_idle_per_host)
            .build(https);

        debug!(
            "Connection pool ready: {} max connections, {} idle per host",
            max_connections, max_idle_per_host
        );

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            max_idle_per_host,
        })
    }

    /// Sends `request` and drains the response body.
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<StatusCode, PoolError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?;

        let response = self.client.request(request).await?;
        let status = response.status();
        response.into_body().collect().await?;

        Ok(status)
    }

    /// Refuses new exchanges. Exchanges already holding a permit finish normally.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn max_idle_per_host(&self) -> usize {
        self.max_idle_per_host
    }
}

pub type SharedConnectionPool = Arc<ConnectionPool>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;

    fn config(workers: usize, sockets: usize) -> RunConfig {
        let mut config = RunConfig::new(Target::parse("http://127.0.0.1:9/").unwrap());
        config.workers = workers;
        config.sockets = sockets;
        config
    }

    #[tokio::test]
    async fn sizes_pool_from_config() {
        let pool = ConnectionPool::new(&config(50, 350)).unwrap();
        assert_eq!(pool.max_connections(), 35_000);
        assert_eq!(pool.max_idle_per_host(), 700);
        assert!(pool.max_connections() > 50 * 350);
    }

    #[tokio::test]
    async fn rejects_overflowing_capacity() {
        let result = ConnectionPool::new(&config(usize::MAX / 2, 4));
        assert!(matches!(result, Err(SetupError::CapacityOverflow { .. })));
    }

    #[tokio::test]
    async fn closed_pool_refuses_requests() {
        let pool = ConnectionPool::new(&config(1, 1)).unwrap();
        pool.close();
        assert!(pool.is_closed());

        let request = Request::get("http://127.0.0.1:9/")
            .body(Full::default())
            .unwrap();
        let result = pool.send(request).await;
        assert!(matches!(result, Err(PoolError::Closed)));
    }
}
