//! Cloud-Optimized GeoTIFF conversion and layout checks for the finished stack.

use crate::error::{Result, StackError};
use gdal::Dataset;
use log::{debug, info};
use std::path::Path;
use std::process::Command;

/// Rewrite a finished GeoTIFF as a Cloud-Optimized GeoTIFF with gdal_translate
pub fn convert_to_cog(
    input_path: &Path,
    output_path: &Path,
    compression: &str,
    block_size: usize,
) -> Result<()> {
    info!("Converting to Cloud-Optimized GeoTIFF using gdal_translate...");

    let output = Command::new("gdal_translate")
        .arg("-q")
        .arg("-of")
        .arg("COG")
        .arg("-co")
        .arg(format!("COMPRESS={}", compression))
        .arg("-co")
        .arg(format!("BLOCKSIZE={}", block_size))
        .arg("-co")
        .arg("OVERVIEW_RESAMPLING=NEAREST")
        .arg("-co")
        .arg("BIGTIFF=IF_SAFER")
        .arg(input_path)
        .arg(output_path)
        .output()
        .map_err(|e| StackError::CogCreationFailed(format!("cannot run gdal_translate: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StackError::CogCreationFailed(format!(
            "gdal_translate failed: {}",
            stderr.trim()
        )));
    }

    info!("COG conversion successful");
    Ok(())
}

/// Check that the written stack is tiled rather than striped
pub fn validate_tiled_structure(dataset: &Dataset) -> Result<()> {
    let (width, _height) = dataset.raster_size();

    let rasterband = dataset.rasterband(1)?;
    let block_size = rasterband.block_size();

    if block_size.0 == width && block_size.1 == 1 && width > 1 {
        return Err(StackError::CogCreationFailed(
            "Output is not tiled (scanline format detected)".to_string(),
        ));
    }

    debug!("Output layout: tiled=yes, block_size={}x{}", block_size.0, block_size.1);
    Ok(())
}
