use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Catalog error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Listing parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Catalog is missing required column: {0}")]
    MissingColumn(String),

    #[error("No bands to write")]
    NoBandsToWrite,

    #[error("Bounding box ({0}, {1}, {2}, {3}) does not intersect the tile")]
    OutsideTile(f64, f64, f64, f64),

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid CRS: {0}")]
    CrsError(String),

    #[error("Tile has non north-up geotransform: {0:?}")]
    RotatedRaster([f64; 6]),

    #[error("Band {band} is {got_width}x{got_height}, expected {width}x{height}")]
    BandShapeMismatch {
        band: usize,
        width: usize,
        height: usize,
        got_width: usize,
        got_height: usize,
    },

    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Reprojection failed: {0}")]
    WarpFailed(String),

    #[error("COG creation failed: {0}")]
    CogCreationFailed(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid block size: {0} (must be multiple of 16)")]
    InvalidBlockSize(usize),

    #[error("Invalid thread count: {0} (must be positive)")]
    InvalidThreadCount(usize),

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, StackError>;
