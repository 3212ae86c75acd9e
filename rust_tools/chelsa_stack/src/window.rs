use crate::error::{Result, StackError};
use log::debug;
use std::str::FromStr;

// Guards against float noise pulling in an extra row/column at exact pixel edges
const EDGE_EPSILON: f64 = 1e-6;

/// Geographic rectangle in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        let values = [min_lon, min_lat, max_lon, max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(StackError::InvalidBoundingBox(format!(
                "non-finite coordinate in {:?}",
                values
            )));
        }
        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(StackError::InvalidBoundingBox(format!(
                "min must be below max: ({}, {}, {}, {})",
                min_lon, min_lat, max_lon, max_lat
            )));
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Britain and Ireland
    pub fn british_isles() -> Self {
        Self {
            min_lon: -11.0,
            min_lat: 49.5,
            max_lon: 2.1,
            max_lat: 61.0,
        }
    }
}

impl FromStr for BoundingBox {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|e| StackError::InvalidBoundingBox(format!("{}: {}", s, e)))?;

        match values.as_slice() {
            [min_lon, min_lat, max_lon, max_lat] => {
                Self::new(*min_lon, *min_lat, *max_lon, *max_lat)
            }
            _ => Err(StackError::InvalidBoundingBox(format!(
                "expected min_lon,min_lat,max_lon,max_lat, got {:?}",
                s
            ))),
        }
    }
}

/// Pixel rectangle inside a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

/// Pixel window covering `bbox` on a north-up raster, clipped to the raster extent.
///
/// Offsets are floored and far edges ceiled so the window always covers the
/// whole box. A box that misses the raster is an error, never an empty window.
pub fn window_from_bounds(
    bbox: &BoundingBox,
    geotransform: &[f64; 6],
    raster_size: (usize, usize),
) -> Result<PixelWindow> {
    let gt = geotransform;
    if gt[2] != 0.0 || gt[4] != 0.0 || gt[1] == 0.0 || gt[5] == 0.0 {
        return Err(StackError::RotatedRaster(*gt));
    }

    let col_a = (bbox.min_lon - gt[0]) / gt[1];
    let col_b = (bbox.max_lon - gt[0]) / gt[1];
    let row_a = (bbox.max_lat - gt[3]) / gt[5];
    let row_b = (bbox.min_lat - gt[3]) / gt[5];

    let (width, height) = (raster_size.0 as f64, raster_size.1 as f64);
    let col_start = (col_a.min(col_b) + EDGE_EPSILON).floor().clamp(0.0, width);
    let col_end = (col_a.max(col_b) - EDGE_EPSILON).ceil().clamp(0.0, width);
    let row_start = (row_a.min(row_b) + EDGE_EPSILON).floor().clamp(0.0, height);
    let row_end = (row_a.max(row_b) - EDGE_EPSILON).ceil().clamp(0.0, height);

    if col_end <= col_start || row_end <= row_start {
        return Err(StackError::OutsideTile(
            bbox.min_lon,
            bbox.min_lat,
            bbox.max_lon,
            bbox.max_lat,
        ));
    }

    let window = PixelWindow {
        col_off: col_start as usize,
        row_off: row_start as usize,
        width: (col_end - col_start) as usize,
        height: (row_end - row_start) as usize,
    };
    debug!("Window for {:?}: {:?}", bbox, window);
    Ok(window)
}

/// Affine transform whose origin is the window's top-left pixel
pub fn window_transform(geotransform: &[f64; 6], window: &PixelWindow) -> [f64; 6] {
    let gt = geotransform;
    let col = window.col_off as f64;
    let row = window.row_off as f64;
    [
        gt[0] + col * gt[1] + row * gt[2],
        gt[1],
        gt[2],
        gt[3] + col * gt[4] + row * gt[5],
        gt[4],
        gt[5],
    ]
}
