use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::delivery::{EndpointRoster, Operation, Timeouts};
use crate::worksheet::FontSource;

pub const DEFAULT_ENDPOINTS: &str = "https://propisi-backend.vercel.app,http://localhost:8000";

/// Application configuration loaded from environment variables.
/// Fails at startup if a value is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Comma-separated roster, in attempt order.
    pub endpoints: String,
    pub preview_timeout: Duration,
    pub generate_timeout: Duration,
    pub min_payload_bytes: usize,
    /// Optional TrueType font embedded in generated documents.
    pub font_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            endpoints: env_or("PROPISI_ENDPOINTS", DEFAULT_ENDPOINTS),
            preview_timeout: Duration::from_secs(parse_env("PREVIEW_TIMEOUT_SECS", 15)?),
            generate_timeout: Duration::from_secs(parse_env("GENERATE_TIMEOUT_SECS", 45)?),
            min_payload_bytes: parse_env("MIN_PAYLOAD_BYTES", 512)?,
            font_path: std::env::var("PROPISI_FONT")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            output_dir: PathBuf::from(env_or("OUTPUT_DIR", ".")),
            port: parse_env("PORT", 8000).context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
        };
        config.check()?;
        Ok(config)
    }

    /// Rejects settings that would only fail later, mid-operation.
    pub fn check(&self) -> Result<()> {
        self.roster()?;
        if self.preview_timeout.is_zero() || self.generate_timeout.is_zero() {
            bail!("timeouts must be positive");
        }
        if self.generate_timeout < self.preview_timeout {
            bail!(
                "GENERATE_TIMEOUT_SECS ({}s) must not be shorter than PREVIEW_TIMEOUT_SECS ({}s)",
                self.generate_timeout.as_secs(),
                self.preview_timeout.as_secs()
            );
        }
        Ok(())
    }

    /// A fresh roster with its cursor at the first endpoint.
    pub fn roster(&self) -> Result<EndpointRoster> {
        EndpointRoster::parse_list(&self.endpoints)
            .with_context(|| format!("invalid PROPISI_ENDPOINTS '{}'", self.endpoints))
    }

    /// The embedded font named by `PROPISI_FONT`, or the built-in one.
    pub fn font(&self) -> Result<FontSource> {
        match &self.font_path {
            Some(path) => FontSource::load(path)
                .with_context(|| format!("failed to load PROPISI_FONT '{}'", path.display())),
            None => Ok(FontSource::Builtin),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            preview: self.preview_timeout,
            generate: self.generate_timeout,
        }
    }

    pub fn timeout_for(&self, op: Operation) -> Duration {
        self.timeouts().for_op(op)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoints: DEFAULT_ENDPOINTS.to_string(),
            preview_timeout: Duration::from_secs(15),
            generate_timeout: Duration::from_secs(45),
            min_payload_bytes: 512,
            font_path: None,
            output_dir: PathBuf::from("."),
            port: 8000,
            rust_log: "info".to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("environment variable '{key}' has invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
