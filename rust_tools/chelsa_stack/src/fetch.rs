//! Fetch one tile: open (or stage) the source, reproject it to the target CRS
//! when needed, and read the pixel window covering the bounding box.

use crate::crs::{self, TargetCrs};
use crate::error::{Result, StackError};
use crate::io::{self, GeoMetadata};
use crate::select::SelectedTile;
use crate::window::{self, BoundingBox, PixelWindow};
use gdal::Dataset;
use log::{debug, info};
use ndarray::Array2;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

/// How remote tiles are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Let GDAL read the URL in place through `/vsicurl/`
    #[default]
    RemoteDirect,
    /// Download to a temporary file first, removed once the tile is read
    StagedDownload,
}

/// Everything a fetch needs; shared read-only by all workers
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub source_mode: SourceMode,
    pub bbox: BoundingBox,
    pub target_crs: TargetCrs,
    pub proj_data_dir: Option<PathBuf>,
    /// Where staged downloads and warped tiles go (system temp dir when `None`)
    pub staging_dir: Option<PathBuf>,
    pub client: reqwest::blocking::Client,
}

/// Pixel block of one tile cropped to the bounding box
#[derive(Debug, Clone)]
pub struct TileResult {
    pub data: Array2<f32>,
    pub band_label: String,
    pub meta: GeoMetadata,
}

/// Fill value for warped tiles whose source declares no nodata
pub const WARP_NODATA: f64 = -9999.0;

/// Blocking client without a request timeout: a stalled download holds its worker
pub fn http_client() -> Result<reqwest::blocking::Client> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("chelsa-stack/", env!("CARGO_PKG_VERSION")))
        .timeout(None::<std::time::Duration>)
        .build()?;
    Ok(client)
}

pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// A tile location GDAL can open. Staged copies are deleted on drop.
enum TileSource {
    Local(String),
    Vsicurl(String),
    Staged(NamedTempFile),
}

impl TileSource {
    fn gdal_path(&self) -> PathBuf {
        match self {
            TileSource::Local(path) => PathBuf::from(path),
            TileSource::Vsicurl(url) => PathBuf::from(format!("/vsicurl/{}", url)),
            TileSource::Staged(file) => file.path().to_path_buf(),
        }
    }
}

fn resolve_source(url: &str, ctx: &FetchContext) -> Result<TileSource> {
    if !is_remote(url) {
        return Ok(TileSource::Local(url.to_string()));
    }
    match ctx.source_mode {
        SourceMode::RemoteDirect => Ok(TileSource::Vsicurl(url.to_string())),
        SourceMode::StagedDownload => {
            stage_download(&ctx.client, url, ctx.staging_dir.as_deref()).map(TileSource::Staged)
        }
    }
}

fn temp_tif(prefix: &str, dir: Option<&Path>) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(".tif");
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    Ok(file)
}

/// Stream a remote tile into a temporary file under `dir`.
///
/// Nothing is left on disk when the request is rejected or the transfer
/// breaks off: the file only exists once the status is known, and it is
/// dropped (and deleted) on any copy error.
pub fn stage_download(
    client: &reqwest::blocking::Client,
    url: &str,
    dir: Option<&Path>,
) -> Result<NamedTempFile> {
    let mut response = client.get(url).send()?;
    if !response.status().is_success() {
        return Err(StackError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let staged = temp_tif("chelsa_tile_", dir)?;
    let mut file: &File = staged.as_file();
    let bytes = response
        .copy_to(&mut file)
        .map_err(|e| StackError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    debug!("Staged {} ({} bytes) at {}", url, bytes, staged.path().display());

    Ok(staged)
}

/// gdalwarp arguments that reproject only the bounding box into the target CRS
fn warp_args(source: &Path, dest: &Path, ctx: &FetchContext, nodata: f64) -> Vec<OsString> {
    let bbox = &ctx.bbox;
    let mut args: Vec<OsString> = ["-q", "-overwrite", "-of", "GTiff"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push("-te".into());
    for v in [bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat] {
        args.push(v.to_string().into());
    }
    args.extend(
        [
            "-te_srs".to_string(),
            "EPSG:4326".to_string(),
            "-t_srs".to_string(),
            ctx.target_crs.to_string(),
            "-r".to_string(),
            "near".to_string(),
            "-dstnodata".to_string(),
            nodata.to_string(),
        ]
        .map(OsString::from),
    );
    args.push(source.as_os_str().to_owned());
    args.push(dest.as_os_str().to_owned());
    args
}

/// Reproject the part of `source` under the bounding box with gdalwarp (nearest neighbour)
fn warp_to_target(source: &Path, ctx: &FetchContext, nodata: f64) -> Result<NamedTempFile> {
    let warped = temp_tif("chelsa_warp_", ctx.staging_dir.as_deref())?;

    let mut command = Command::new("gdalwarp");
    command.args(warp_args(source, warped.path(), ctx, nodata));

    // Scoped to this subprocess only
    if let Some(dir) = &ctx.proj_data_dir {
        command.env("PROJ_DATA", dir).env("PROJ_LIB", dir);
    }

    let output = command
        .output()
        .map_err(|e| StackError::WarpFailed(format!("cannot run gdalwarp: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StackError::WarpFailed(format!(
            "gdalwarp failed for {}: {}",
            source.display(),
            stderr.trim()
        )));
    }

    Ok(warped)
}

fn outside(bbox: &BoundingBox) -> StackError {
    StackError::OutsideTile(bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat)
}

fn is_nodata(value: f32, nodata: f64) -> bool {
    if nodata.is_nan() {
        value.is_nan()
    } else {
        value == nodata as f32
    }
}

/// Crop a tile that is already in the target CRS (degrees)
fn crop_to_bounds(dataset: &Dataset, bbox: &BoundingBox) -> Result<(Array2<f32>, GeoMetadata)> {
    let geotransform = dataset.geo_transform()?;
    let window = window::window_from_bounds(bbox, &geotransform, dataset.raster_size())?;
    let data = io::read_window(dataset, &window)?;

    let meta = GeoMetadata {
        width: window.width,
        height: window.height,
        geotransform: window::window_transform(&geotransform, &window),
        projection: dataset.projection(),
        nodata: io::band_nodata(dataset)?,
    };
    Ok((data, meta))
}

/// Read a warped tile. gdalwarp already clipped it to the box, so the window
/// is the whole raster; a result without a single valid pixel means the box
/// missed the source.
fn read_warped(dataset: &Dataset, bbox: &BoundingBox, nodata: f64) -> Result<(Array2<f32>, GeoMetadata)> {
    let (width, height) = dataset.raster_size();
    let window = PixelWindow {
        col_off: 0,
        row_off: 0,
        width,
        height,
    };
    let data = io::read_window(dataset, &window)?;
    if data.iter().all(|&v| is_nodata(v, nodata)) {
        return Err(outside(bbox));
    }

    let meta = GeoMetadata {
        width,
        height,
        geotransform: dataset.geo_transform()?,
        projection: dataset.projection(),
        nodata: Some(nodata),
    };
    Ok((data, meta))
}

/// Fetch, reproject and crop one selected tile
pub fn fetch_tile(tile: &SelectedTile, ctx: &FetchContext) -> Result<TileResult> {
    info!("Processing {}", tile.url);

    let source = resolve_source(&tile.url, ctx)?;
    let source_path = source.gdal_path();
    let dataset = Dataset::open(&source_path)?;

    // The box is in degrees: only a WGS84 tile going to a WGS84 output is cropped in place.
    // Everything else goes through gdalwarp, which clips and reprojects in one pass.
    let crop_in_place = ctx.target_crs == TargetCrs::wgs84()
        && crs::matches_target(&dataset.projection(), &ctx.target_crs);

    let (data, meta) = if crop_in_place {
        crop_to_bounds(&dataset, &ctx.bbox)?
    } else {
        debug!("Reprojecting {} to {}", tile.url, ctx.target_crs);
        let nodata = io::band_nodata(&dataset)?.unwrap_or(WARP_NODATA);
        let warped = warp_to_target(&source_path, ctx, nodata)?;
        let warped_dataset = Dataset::open(warped.path())?;
        let cropped = read_warped(&warped_dataset, &ctx.bbox, nodata);
        // Close before the temp file goes away
        drop(warped_dataset);
        drop(warped);
        cropped?
    };

    drop(dataset);
    drop(source);

    Ok(TileResult {
        data,
        band_label: tile.band_label(),
        meta,
    })
}
