//! Fixtures shared by the integration suites: GDAL-written tiles and a
//! loopback HTTP server that hands them out.
#![allow(dead_code)]

use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::Command;
use std::thread;

pub const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;

// Half-degree grid over lon -20..20, lat 40..70
pub const TILE_GT: [f64; 6] = [-20.0, 0.5, 0.0, 70.0, 0.0, -0.5];
pub const TILE_SIZE: (usize, usize) = (80, 60);
pub const NODATA: f64 = -9999.0;

// 50 km Web Mercator grid over x -2000..2000 km, y 6000..10000 km
// (about lon -18..18, lat 47.4..66.4)
pub const MERCATOR_GT: [f64; 6] = [-2.0e6, 50_000.0, 0.0, 1.0e7, 0.0, -50_000.0];
pub const MERCATOR_SIZE: (usize, usize) = (80, 80);

/// Write a single-band f32 tile filled with `value`
pub fn write_raster(path: &Path, geotransform: &[f64; 6], size: (usize, usize), wkt: &str, value: f32) {
    let (width, height) = size;
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f32, _>(path, width, height, 1)
        .unwrap();
    dataset.set_geo_transform(geotransform).unwrap();
    dataset.set_projection(wkt).unwrap();

    let mut band = dataset.rasterband(1).unwrap();
    let mut buffer = Buffer::new((width, height), vec![value; width * height]);
    band.write((0, 0), (width, height), &mut buffer).unwrap();
    band.set_no_data_value(Some(NODATA)).unwrap();
}

/// WGS84 tile on the half-degree grid
pub fn write_tile(path: &Path, value: f32) {
    write_raster(path, &TILE_GT, TILE_SIZE, WGS84_WKT, value);
}

/// Web Mercator tile covering Britain and Ireland
pub fn write_mercator_tile(path: &Path, value: f32) {
    let wkt = SpatialRef::from_epsg(3857).unwrap().to_wkt().unwrap();
    write_raster(path, &MERCATOR_GT, MERCATOR_SIZE, &wkt, value);
}

pub fn read_band(path: &Path, index: usize) -> Vec<f32> {
    let dataset = Dataset::open(path).unwrap();
    let band = dataset.rasterband(index).unwrap();
    let (width, height) = dataset.raster_size();
    let buffer = band
        .read_as::<f32>((0, 0), (width, height), (width, height), None)
        .unwrap();
    buffer.into_iter().collect()
}

/// Reprojection shells out to gdalwarp; suites skip those cases without it
pub fn gdalwarp_available() -> bool {
    let found = Command::new("gdalwarp")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !found {
        eprintln!("gdalwarp not found, skipping");
    }
    found
}

/// What the server answers for one path
#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub body: Vec<u8>,
    /// Announce more bytes than are sent, then hang up
    pub truncated: bool,
}

impl Route {
    pub fn file(path: &str, body: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            body,
            truncated: false,
        }
    }

    pub fn truncated(path: &str, body: Vec<u8>) -> Self {
        Self {
            truncated: true,
            ..Self::file(path, body)
        }
    }
}

/// Serve `routes` on a loopback port; any other path is a 404.
/// Returns the base URL, e.g. `http://127.0.0.1:40123`.
pub fn serve(routes: Vec<Route>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = routes.clone();
            thread::spawn(move || {
                let _ = respond(stream, &routes);
            });
        }
    });

    base
}

fn respond(mut stream: TcpStream, routes: &[Route]) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 || header == "\r\n" {
            break;
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    match routes.iter().find(|r| r.path == path) {
        Some(route) => {
            let announced = if route.truncated {
                route.body.len() + 4096
            } else {
                route.body.len()
            };
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: image/tiff\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                announced
            )?;
            stream.write_all(&route.body)?;
        }
        None => write!(
            stream,
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        )?,
    }
    stream.flush()
}

/// Entries left in a directory
pub fn entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}
