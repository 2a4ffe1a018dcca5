//! Elevation tiles fetched from a remote bucket into the build cache

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{hgt_filename, tiles_covering, ElevationData, ElevationSource, SrtmTile};
use crate::model::Graph;

/// Retrieves raw tile bytes; `Ok(None)` means the bucket has no such tile
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>>;
}

pub struct HttpTileFetcher {
    client: Client,
}

impl HttpTileFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("junction-build/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Request to {url} failed"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("Unexpected response from {url}"))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("Failed to read body of {url}"))?;
        Ok(Some(bytes.to_vec()))
    }
}

/// Tiles named `N50E004.hgt` under a base URL, cached on disk
pub struct BucketSource {
    base_url: String,
    cache_dir: PathBuf,
    fetcher: Arc<dyn TileFetcher>,
}

impl BucketSource {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>, fetcher: Arc<dyn TileFetcher>) -> Self {
        Self {
            base_url: base_url.into(),
            cache_dir: cache_dir.into(),
            fetcher,
        }
    }

    fn tile_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }

    /// Cached tile bytes, downloading them first if needed
    fn tile_bytes(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let cached = self.cache_dir.join(name);
        if cached.is_file() {
            debug!(tile = name, "Using cached elevation tile");
            return fs::read(&cached)
                .map(Some)
                .with_context(|| format!("Failed to read {}", cached.display()));
        }

        let url = self.tile_url(name);
        let Some(bytes) = self.fetcher.fetch(&url)? else {
            debug!(tile = name, "Elevation tile not available in bucket");
            return Ok(None);
        };
        fs::write(&cached, &bytes).with_context(|| format!("Failed to cache {}", cached.display()))?;
        info!(tile = name, bytes = bytes.len(), "Downloaded elevation tile");
        Ok(Some(bytes))
    }
}

impl ElevationSource for BucketSource {
    fn describe(&self) -> String {
        format!("bucket {}", self.base_url)
    }

    fn check(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("elevation bucket URL is empty".to_string());
        }
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| format!("cache directory {} is unusable: {e}", self.cache_dir.display()))?;
        if !self.cache_dir.is_dir() {
            return Err(format!("{} is not a directory", self.cache_dir.display()));
        }
        Ok(())
    }

    fn load(&self, graph: &Graph) -> Result<ElevationData> {
        let Some(bbox) = graph.bbox() else {
            return Ok(ElevationData::default());
        };
        let mut tiles = Vec::new();
        for (lat, lon) in tiles_covering(&bbox) {
            let name = hgt_filename(lat, lon);
            if let Some(bytes) = self.tile_bytes(&name)? {
                tiles.push(SrtmTile::from_bytes(lat, lon, &bytes).with_context(|| format!("Invalid tile {name}"))?);
            }
        }
        Ok(ElevationData::from_tiles(tiles))
    }
}
