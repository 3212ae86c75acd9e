use crate::error::{Result, StackError};
use gdal::spatial_ref::SpatialRef;
use log::{debug, warn};
use std::fmt;
use std::str::FromStr;

/// Output coordinate reference, identified by authority and code (e.g. `EPSG:4326`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCrs {
    pub authority: String,
    pub code: i32,
}

impl TargetCrs {
    pub fn wgs84() -> Self {
        Self {
            authority: "EPSG".to_string(),
            code: 4326,
        }
    }
}

impl Default for TargetCrs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for TargetCrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

impl FromStr for TargetCrs {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        let (authority, code) = s
            .split_once(':')
            .ok_or_else(|| StackError::CrsError(format!("expected AUTHORITY:CODE, got {:?}", s)))?;
        let code = code
            .trim()
            .parse::<i32>()
            .map_err(|_| StackError::CrsError(format!("invalid code in {:?}", s)))?;
        Ok(Self {
            authority: authority.trim().to_uppercase(),
            code,
        })
    }
}

/// Whether a raster's projection WKT already is the target CRS.
///
/// WKT that fails to parse or carries no authority is treated as a mismatch,
/// so the tile gets reprojected rather than silently trusted.
pub fn matches_target(projection_wkt: &str, target: &TargetCrs) -> bool {
    if projection_wkt.trim().is_empty() {
        warn!("Raster has no projection, assuming it needs reprojection");
        return false;
    }

    let spatial_ref = match SpatialRef::from_wkt(projection_wkt) {
        Ok(sr) => sr,
        Err(e) => {
            warn!("Failed to parse projection WKT, will reproject: {}", e);
            return false;
        }
    };

    match (spatial_ref.auth_name(), spatial_ref.auth_code()) {
        (Ok(name), Ok(code)) => {
            debug!("Source CRS {}:{}, target {}", name, code, target);
            name.eq_ignore_ascii_case(&target.authority) && code == target.code
        }
        _ => {
            debug!("Source CRS has no authority code, will reproject");
            false
        }
    }
}
