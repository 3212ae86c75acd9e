use crate::error::{Result, StackError};
use crate::window::PixelWindow;
use gdal::cpl::CslStringList;
use gdal::raster::RasterBand;
use gdal::{Dataset, DriverManager, Metadata};
use log::{debug, info};
use ndarray::Array2;
use std::path::Path;

/// Georeferencing of one band (or of the whole output stack)
#[derive(Debug, Clone, PartialEq)]
pub struct GeoMetadata {
    pub width: usize,
    pub height: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub nodata: Option<f64>,
}

/// Read band 1 of `window` as f32
pub fn read_window(dataset: &Dataset, window: &PixelWindow) -> Result<Array2<f32>> {
    let rasterband: RasterBand = dataset.rasterband(1)?;

    debug!(
        "Reading window: offset=({},{}), size=({},{})",
        window.col_off, window.row_off, window.width, window.height
    );

    let buffer = rasterband.read_as::<f32>(
        (window.col_off as isize, window.row_off as isize),
        (window.width, window.height),
        (window.width, window.height),
        None,
    )?;

    let data_vec: Vec<f32> = buffer.into_iter().collect();
    let data = Array2::from_shape_vec((window.height, window.width), data_vec)?;

    Ok(data)
}

/// Nodata value of band 1, if any
pub fn band_nodata(dataset: &Dataset) -> Result<Option<f64>> {
    Ok(dataset.rasterband(1)?.no_data_value())
}

/// Create an f32 GTiff with `num_bands` bands and the georeferencing in `metadata`
pub fn create_output_dataset(
    path: &Path,
    metadata: &GeoMetadata,
    num_bands: usize,
    options: Vec<String>,
) -> Result<Dataset> {
    info!("Creating output dataset: {}", path.display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let mut dataset = if options.is_empty() {
        driver.create_with_band_type::<f32, _>(path, metadata.width, metadata.height, num_bands)?
    } else {
        let mut gdal_options = CslStringList::new();
        for opt in options {
            gdal_options.add_string(&opt)?;
        }

        driver.create_with_band_type_with_options::<f32, _>(
            path,
            metadata.width,
            metadata.height,
            num_bands,
            &gdal_options,
        )?
    };

    dataset.set_geo_transform(&metadata.geotransform)?;
    if !metadata.projection.is_empty() {
        dataset.set_projection(&metadata.projection)?;
    }

    Ok(dataset)
}

/// Write one band of the stack and label it
pub fn write_band(
    dataset: &mut Dataset,
    band_index: usize,
    data: &Array2<f32>,
    label: &str,
    nodata: Option<f64>,
) -> Result<()> {
    let (width, height) = dataset.raster_size();
    let (rows, cols) = data.dim();
    if rows != height || cols != width {
        return Err(StackError::BandShapeMismatch {
            band: band_index,
            width,
            height,
            got_width: cols,
            got_height: rows,
        });
    }

    let mut raster_band = dataset.rasterband(band_index)?;

    // Array2 is row-major, which is the layout GDAL expects
    let values: Vec<f32> = data.iter().copied().collect();
    let mut buffer = gdal::raster::Buffer::new((width, height), values);
    raster_band.write((0, 0), (width, height), &mut buffer)?;

    raster_band.set_description(label)?;
    if nodata.is_some() {
        raster_band.set_no_data_value(nodata)?;
    }

    debug!("Wrote band {} ({}) {}x{}", band_index, label, width, height);
    Ok(())
}

/// Band descriptions of an existing raster, in band order
pub fn band_descriptions(dataset: &Dataset) -> Result<Vec<String>> {
    let mut labels = Vec::with_capacity(dataset.raster_count());
    for index in 1..=dataset.raster_count() {
        labels.push(dataset.rasterband(index)?.description()?);
    }
    Ok(labels)
}
