// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Source protocols for dataset layers.
//!
//! Layer sources in the catalogue are URLs. The scheme selects a
//! [`SourceProtocol`] from the registry, which is populated once at startup.
//! Sources without a scheme are files relative to the catalogue directory.
//! Fetches are blocking and are run on the runtime's blocking pool.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;

use crate::pmtiles::{ArchiveError, PmtilesProtocol};

/// Errors that can occur while fetching a layer source.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("no protocol registered for scheme '{0}'")]
    UnknownScheme(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("tile archive: {0}")]
    Archive(#[from] ArchiveError),
}

/// Fetches the bytes behind a source location.
pub trait SourceProtocol: Send + Sync {
    /// `location` is the full source URL, or a filesystem path for `file`.
    fn fetch(&self, location: &str) -> Result<Vec<u8>, ProtocolError>;
}

/// Reads sources from the local filesystem.
#[derive(Debug, Default)]
pub struct FileProtocol;

impl SourceProtocol for FileProtocol {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, ProtocolError> {
        fs::read(location).map_err(|source| ProtocolError::Io {
            path: location.to_string(),
            source,
        })
    }
}

/// Downloads sources over HTTP(S).
#[derive(Debug, Default)]
pub struct HttpProtocol {
    client: reqwest::blocking::Client,
}

impl SourceProtocol for HttpProtocol {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, ProtocolError> {
        let response = self.client.get(location).send()?;
        if !response.status().is_success() {
            return Err(ProtocolError::Status {
                url: location.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// Scheme to protocol mapping, plus the directory relative sources resolve against.
#[derive(Clone)]
pub struct ProtocolRegistry {
    base_dir: PathBuf,
    protocols: HashMap<String, Arc<dyn SourceProtocol>>,
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<&String> = self.protocols.keys().collect();
        schemes.sort();
        f.debug_struct("ProtocolRegistry")
            .field("base_dir", &self.base_dir)
            .field("schemes", &schemes)
            .finish()
    }
}

impl ProtocolRegistry {
    /// Empty registry resolving relative sources against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            protocols: HashMap::new(),
        }
    }

    /// Registry with `file`, `http`, `https` and `pmtiles` handlers.
    pub fn with_defaults(base_dir: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new(base_dir);
        let http: Arc<dyn SourceProtocol> = Arc::new(HttpProtocol::default());
        let archives = PmtilesProtocol::new(registry.base_dir.clone());
        registry.register("file", Arc::new(FileProtocol));
        registry.register("pmtiles", Arc::new(archives));
        registry.register("http", Arc::clone(&http));
        registry.register("https", http);
        registry
    }

    pub fn register(&mut self, scheme: &str, protocol: Arc<dyn SourceProtocol>) {
        let scheme = scheme.to_ascii_lowercase();
        if self.protocols.insert(scheme.clone(), protocol).is_some() {
            warn!("Replaced source protocol for scheme '{}'", scheme);
        } else {
            info!("Registered source protocol '{}'", scheme);
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Pick the protocol for a source and the location to hand it.
    pub fn resolve(
        &self,
        source: &str,
    ) -> Result<(Arc<dyn SourceProtocol>, String), ProtocolError> {
        let (scheme, location) = match source.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("file") => {
                ("file".to_string(), rest.to_string())
            }
            Some((scheme, _)) => (scheme.to_ascii_lowercase(), source.to_string()),
            None => (
                "file".to_string(),
                self.base_dir.join(source).to_string_lossy().into_owned(),
            ),
        };

        self.protocols
            .get(&scheme)
            .map(|protocol| (Arc::clone(protocol), location))
            .ok_or(ProtocolError::UnknownScheme(scheme))
    }

    /// Fetch a source through its protocol. Blocks.
    pub fn fetch(&self, source: &str) -> Result<Vec<u8>, ProtocolError> {
        let (protocol, location) = self.resolve(source)?;
        protocol.fetch(&location)
    }
}
