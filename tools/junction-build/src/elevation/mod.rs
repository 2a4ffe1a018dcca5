//! Elevation sources and SRTM tile lookup
//!
//! Tiles are SRTM `.hgt` files: 1 x 1 degree, named after their SW corner
//! (`N50E004.hgt` covers lat 50-51, lon 4-5), row-major big-endian `i16`
//! samples with row 0 at the north edge and `-32768` marking voids.
//! SRTM1 (3601 samples per side) and SRTM3 (1201) both load, as does any
//! other square sample count, which keeps test fixtures small.

pub mod bucket;

pub use bucket::{BucketSource, HttpTileFetcher, TileFetcher};

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::geo::BBox;
use crate::model::Graph;

const SRTM_VOID: i16 = -32768;

pub struct SrtmTile {
    lat_sw: i16,
    lon_sw: i16,
    samples_per_side: usize,
    data: Vec<i16>,
}

impl SrtmTile {
    /// Decode raw `.hgt` bytes; the sample count is derived from the length
    pub fn from_bytes(lat_sw: i16, lon_sw: i16, bytes: &[u8]) -> Result<Self> {
        let samples = bytes.len() / 2;
        let side = (samples as f64).sqrt().round() as usize;
        if bytes.len() % 2 != 0 || side < 2 || side * side != samples {
            bail!("{} bytes is not a square grid of 16-bit samples", bytes.len());
        }
        let data = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self {
            lat_sw,
            lon_sw,
            samples_per_side: side,
            data,
        })
    }

    pub fn corner(&self) -> (i16, i16) {
        (self.lat_sw, self.lon_sw)
    }

    fn get_raw(&self, row: usize, col: usize) -> Option<f64> {
        let n = self.samples_per_side;
        if row >= n || col >= n {
            return None;
        }
        let val = self.data[row * n + col];
        (val != SRTM_VOID).then_some(val as f64)
    }

    /// Bilinear interpolation; `None` outside the tile or next to a void
    fn interpolate(&self, lat: f64, lon: f64) -> Option<f64> {
        let intervals = (self.samples_per_side - 1) as f64;
        let frac_lat = lat - self.lat_sw as f64;
        let frac_lon = lon - self.lon_sw as f64;
        if !(0.0..=1.0).contains(&frac_lat) || !(0.0..=1.0).contains(&frac_lon) {
            return None;
        }

        // Row grows southward
        let row_f = (1.0 - frac_lat) * intervals;
        let col_f = frac_lon * intervals;
        let last_cell = self.samples_per_side - 2;
        let row0 = (row_f.floor() as usize).min(last_cell);
        let col0 = (col_f.floor() as usize).min(last_cell);

        let v00 = self.get_raw(row0, col0)?;
        let v01 = self.get_raw(row0, col0 + 1)?;
        let v10 = self.get_raw(row0 + 1, col0)?;
        let v11 = self.get_raw(row0 + 1, col0 + 1)?;

        let dr = row_f - row0 as f64;
        let dc = col_f - col0 as f64;
        let top = v00 + (v01 - v00) * dc;
        let bottom = v10 + (v11 - v10) * dc;
        Some(top + (bottom - top) * dr)
    }
}

/// Parse `N50E004.hgt` / `s12w077` into the SW corner `(lat, lon)`
pub fn parse_hgt_filename(filename: &str) -> Option<(i16, i16)> {
    let lower = filename.to_ascii_lowercase();
    let stem = lower.strip_suffix(".hgt").unwrap_or(&lower);
    if stem.len() != 7 || !stem.is_ascii() {
        return None;
    }
    let lat_sign = match &stem[0..1] {
        "n" => 1,
        "s" => -1,
        _ => return None,
    };
    let lon_sign = match &stem[3..4] {
        "e" => 1,
        "w" => -1,
        _ => return None,
    };
    let lat: i16 = stem[1..3].parse().ok()?;
    let lon: i16 = stem[4..7].parse().ok()?;
    Some((lat_sign * lat, lon_sign * lon))
}

/// Tile file name for a SW corner, the inverse of [`parse_hgt_filename`]
pub fn hgt_filename(lat: i16, lon: i16) -> String {
    format!(
        "{}{:02}{}{:03}.hgt",
        if lat < 0 { 'S' } else { 'N' },
        lat.unsigned_abs(),
        if lon < 0 { 'W' } else { 'E' },
        lon.unsigned_abs()
    )
}

pub fn load_tile(path: &Path) -> Result<SrtmTile> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid tile path {}", path.display()))?;
    let (lat, lon) =
        parse_hgt_filename(filename).with_context(|| format!("Cannot parse SRTM filename: {filename}"))?;
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    SrtmTile::from_bytes(lat, lon, &bytes).with_context(|| format!("Invalid SRTM tile {}", path.display()))
}

/// SW corners of every tile touching a bounding box
pub fn tiles_covering(bbox: &BBox) -> Vec<(i16, i16)> {
    let mut corners = Vec::new();
    for lat in (bbox.min_lat.floor() as i16)..=(bbox.max_lat.floor() as i16) {
        for lon in (bbox.min_lon.floor() as i16)..=(bbox.max_lon.floor() as i16) {
            corners.push((lat, lon));
        }
    }
    corners
}

/// Loaded tiles, keyed by SW corner
#[derive(Default)]
pub struct ElevationData {
    tiles: HashMap<(i16, i16), SrtmTile>,
}

impl ElevationData {
    pub fn from_tiles(tiles: impl IntoIterator<Item = SrtmTile>) -> Self {
        Self {
            tiles: tiles.into_iter().map(|t| (t.corner(), t)).collect(),
        }
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Interpolated elevation, also trying the neighbouring tile for points
    /// lying exactly on a shared south or west edge
    pub fn elevation_at(&self, lat: f64, lon: f64) -> Option<f64> {
        let tile_lat = lat.floor() as i16;
        let tile_lon = lon.floor() as i16;
        let on_lat_edge = lat == lat.floor();
        let on_lon_edge = lon == lon.floor();

        let mut candidates = vec![(tile_lat, tile_lon)];
        if on_lat_edge {
            candidates.push((tile_lat - 1, tile_lon));
        }
        if on_lon_edge {
            candidates.push((tile_lat, tile_lon - 1));
        }
        if on_lat_edge && on_lon_edge {
            candidates.push((tile_lat - 1, tile_lon - 1));
        }

        candidates
            .into_iter()
            .filter_map(|corner| self.tiles.get(&corner))
            .find_map(|tile| tile.interpolate(lat, lon))
    }
}

/// A provider of elevation tiles for the area of a graph
pub trait ElevationSource: Send {
    fn describe(&self) -> String;

    /// Reason the source is unusable, checked before any stage runs
    fn check(&self) -> Result<(), String>;

    fn load(&self, graph: &Graph) -> Result<ElevationData>;
}

/// A single local raster file
#[derive(Debug, Clone)]
pub struct RasterFileSource {
    path: PathBuf,
}

impl RasterFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ElevationSource for RasterFileSource {
    fn describe(&self) -> String {
        format!("raster {}", self.path.display())
    }

    fn check(&self) -> Result<(), String> {
        if !self.path.is_file() {
            return Err(format!("{} does not exist", self.path.display()));
        }
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tif") || name.ends_with(".tiff") {
            return Err(format!(
                "{} is a GeoTIFF; only SRTM .hgt tiles are supported",
                self.path.display()
            ));
        }
        if parse_hgt_filename(&name).is_none() {
            return Err(format!(
                "{} is not named after its SW corner (e.g. N50E004.hgt)",
                self.path.display()
            ));
        }
        Ok(())
    }

    fn load(&self, _graph: &Graph) -> Result<ElevationData> {
        Ok(ElevationData::from_tiles([load_tile(&self.path)?]))
    }
}
