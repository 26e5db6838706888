use crate::config::{MethodMode, RunConfig};
use http::header::{ACCEPT_ENCODING, CONNECTION, CONTENT_TYPE, REFERER, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.10 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_3_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/134.0.6998.99 Mobile/15E148 Safari/604.1",
];

const ACCEPT_ENCODING_VALUE: &str = "gzip, deflate, br";

/// JSON payload attached to every POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostBody {
    pub key: String,
    pub timestamp: u64,
    pub worker_id: usize,
}

/// Everything needed to issue one request. Used exactly once.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Option<PostBody>,
}

pub struct RequestGenerator {
    path: String,
    base_url: String,
    mode: MethodMode,
    workers: usize,
}

impl RequestGenerator {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            path: config.target.path().to_string(),
            base_url: config.target.base_url(),
            mode: config.method,
            workers: config.workers.max(1),
        }
    }

    pub fn generate(&self) -> RequestDescriptor {
        self.generate_with(&mut rand::rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> RequestDescriptor {
        let path_and_query = format!("{}?q={}", self.path, rng.random_range(100_000..=999_999));

        let mut headers = HeaderMap::with_capacity(5);
        if let Some(&agent) = USER_AGENTS.choose(rng) {
            headers.insert(USER_AGENT, HeaderValue::from_static(agent));
        }
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        let referer = format!(
            "{}/search?q={}",
            self.base_url,
            rng.random_range(1_000..=9_999)
        );
        if let Ok(referer) = HeaderValue::from_str(&referer) {
            headers.insert(REFERER, referer);
        }
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static(ACCEPT_ENCODING_VALUE),
        );

        let method = self.resolve_method(rng);
        let body = if method == Method::POST {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Some(PostBody {
                key: format!("data_{}", rng.random_range(1..=1000)),
                timestamp: unix_seconds(),
                worker_id: rng.random_range(1..=self.workers),
            })
        } else {
            None
        };

        RequestDescriptor {
            method,
            path_and_query,
            headers,
            body,
        }
    }

    fn resolve_method<R: Rng + ?Sized>(&self, rng: &mut R) -> Method {
        match self.mode {
            MethodMode::Get => Method::GET,
            MethodMode::Post => Method::POST,
            MethodMode::Random => {
                if rng.random_bool(0.5) {
                    Method::GET
                } else {
                    Method::POST
                }
            }
        }
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
