//! Endpoint Roster: ordered remote generators plus a traversal cursor.
//!
//! Pure bookkeeping. A roster is built fresh for every delivery operation, so
//! each attempt sequence starts at index 0.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("endpoint roster is empty")]
    Empty,

    #[error("invalid endpoint '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },
}

/// Base URL of one remote generator, e.g. `https://propisi-backend.vercel.app`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Url);

impl Endpoint {
    /// Resolves an absolute API path (`/api/preview`) against the base,
    /// keeping any path prefix the base already has.
    pub fn join(&self, path: &str) -> Url {
        let mut url = self.0.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}/{}", path.trim_start_matches('/')));
        url
    }
}

impl FromStr for Endpoint {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let url = Url::parse(value).map_err(|e| RosterError::InvalidUrl {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RosterError::InvalidUrl {
                value: value.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(Endpoint(url))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str().trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRoster {
    endpoints: Vec<Endpoint>,
    current: usize,
}

impl EndpointRoster {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, RosterError> {
        if endpoints.is_empty() {
            return Err(RosterError::Empty);
        }
        Ok(Self {
            endpoints,
            current: 0,
        })
    }

    /// Parses a comma-separated list, skipping empty entries.
    pub fn parse_list(list: &str) -> Result<Self, RosterError> {
        let endpoints = list
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Endpoint>, _>>()?;
        Self::new(endpoints)
    }

    pub fn current(&self) -> &Endpoint {
        &self.endpoints[self.current]
    }

    /// Moves the cursor to `(current + 1) mod len` and returns the new current.
    pub fn advance(&mut self) -> &Endpoint {
        self.current = (self.current + 1) % self.endpoints.len();
        self.current()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}
