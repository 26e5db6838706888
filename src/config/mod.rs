use anyhow::{Context, bail};
use http::uri::{Authority, Scheme};
use http::Uri;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WORKERS: usize = 50;
pub const DEFAULT_SOCKETS: usize = 350;
pub const DEFAULT_RATE_LIMIT: u32 = 10_000;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MethodMode {
    Get,
    #[default]
    Post,
    Random,
}

impl fmt::Display for MethodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodMode::Get => f.write_str("GET"),
            MethodMode::Post => f.write_str("POST"),
            MethodMode::Random => f.write_str("RANDOM"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid target url {url:?}: {source}")]
    Parse {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },
    #[error("target url {0:?} has no http or https scheme")]
    Scheme(String),
    #[error("target url {0:?} has no host")]
    MissingHost(String),
}

/// The endpoint every request of a run is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: String,
    scheme: Scheme,
    authority: Authority,
    path: String,
}

impl Target {
    pub fn parse(url: &str) -> Result<Self, TargetError> {
        let uri: Uri = url.parse().map_err(|source| TargetError::Parse {
            url: url.to_string(),
            source,
        })?;

        let scheme = match uri.scheme() {
            Some(s) if *s == Scheme::HTTP || *s == Scheme::HTTPS => s.clone(),
            _ => return Err(TargetError::Scheme(url.to_string())),
        };
        let authority = uri
            .authority()
            .filter(|a| !a.host().is_empty())
            .cloned()
            .ok_or_else(|| TargetError::MissingHost(url.to_string()))?;

        // the query of the input url is replaced by the cache buster
        let path = match uri.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            url: url.to_string(),
            scheme,
            authority,
            path,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }

    pub fn uri_for(&self, path_and_query: &str) -> Result<Uri, http::Error> {
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

/// Immutable parameters of a single run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target: Target,
    pub workers: usize,
    /// Requests per cycle per worker.
    pub sockets: usize,
    pub method: MethodMode,
    /// Per-worker admissions per second.
    pub rate_limit: u32,
    pub duration: Option<Duration>,
    pub dry_run: bool,
    pub request_timeout: Duration,
    pub progress_interval: Option<Duration>,
}

impl RunConfig {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            workers: DEFAULT_WORKERS,
            sockets: DEFAULT_SOCKETS,
            method: MethodMode::default(),
            rate_limit: DEFAULT_RATE_LIMIT,
            duration: None,
            dry_run: false,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            progress_interval: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.sockets == 0 {
            bail!("sockets must be at least 1");
        }
        if self.request_timeout.is_zero() {
            bail!("request timeout must be greater than zero");
        }
        Ok(())
    }
}

/// Run settings as read from a TOML file or the command line.
///
/// Every field is optional so that sources can be layered with [`Settings::merge`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub url: Option<String>,
    pub workers: Option<usize>,
    pub sockets: Option<usize>,
    pub method: Option<MethodMode>,
    pub rate_limit: Option<u32>,
    pub duration_seconds: Option<u64>,
    pub dry_run: Option<bool>,
    pub timeout_seconds: Option<u64>,
    pub progress_seconds: Option<u64>,
}

impl Settings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(settings)
    }

    /// Layers `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: Settings) -> Settings {
        Settings {
            url: other.url.or(self.url),
            workers: other.workers.or(self.workers),
            sockets: other.sockets.or(self.sockets),
            method: other.method.or(self.method),
            rate_limit: other.rate_limit.or(self.rate_limit),
            duration_seconds: other.duration_seconds.or(self.duration_seconds),
            dry_run: other.dry_run.or(self.dry_run),
            timeout_seconds: other.timeout_seconds.or(self.timeout_seconds),
            progress_seconds: other.progress_seconds.or(self.progress_seconds),
        }
    }

    pub fn resolve(self) -> anyhow::Result<RunConfig> {
        let Some(url) = self.url else {
            bail!("no target url given");
        };
        let target = Target::parse(&url)?;

        let mut config = RunConfig::new(target);
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(sockets) = self.sockets {
            config.sockets = sockets;
        }
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(rate_limit) = self.rate_limit {
            config.rate_limit = rate_limit.max(1);
        }
        // zero means run until interrupted
        config.duration = self
            .duration_seconds
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);
        config.dry_run = self.dry_run.unwrap_or(false);
        if let Some(timeout) = self.timeout_seconds {
            config.request_timeout = Duration::from_secs(timeout);
        }
        config.progress_interval = self
            .progress_seconds
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        config.validate()?;
        Ok(config)
    }
}
