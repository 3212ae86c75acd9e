//! Tile catalogs: CSV files with `variable,month,timeID,url` rows, or an
//! S3-style bucket listing scraped from the CHELSA object store.

use crate::error::{Result, StackError};
use crate::select::is_monthly;
use log::{debug, info, warn};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Object store listing for the TraCE21k V1.0 collection, one folder per variable.
pub const LISTING_BASE_URL: &str = "https://os.zhdk.cloud.switch.ch/chelsav1/chelsa_TRACE21k/V1.0";

/// Bucket root that listing keys are relative to.
pub const BUCKET_BASE_URL: &str = "https://os.zhdk.cloud.switch.ch/chelsav1/";

const REQUIRED_COLUMNS: [&str; 4] = ["variable", "month", "timeID", "url"];

/// One retrievable tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub variable: String,
    pub month: Option<u8>,
    pub time_id: i32,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    variable: String,
    month: String,
    #[serde(rename = "timeID")]
    time_id: String,
    url: String,
}

impl RawRow {
    fn parse(self) -> std::result::Result<CatalogRow, String> {
        let time_id = self
            .time_id
            .parse::<i32>()
            .map_err(|_| format!("timeID {:?} is not an integer", self.time_id))?;

        let month = if self.month.is_empty() {
            None
        } else {
            let month = self
                .month
                .parse::<u8>()
                .map_err(|_| format!("month {:?} is not an integer", self.month))?;
            if !(1..=12).contains(&month) {
                return Err(format!("month {} is outside 1-12", month));
            }
            Some(month)
        };

        Ok(CatalogRow {
            variable: self.variable,
            month,
            time_id,
            url: self.url,
        })
    }
}

/// Read a catalog CSV from disk
pub fn read_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<CatalogRow>> {
    let path = path.as_ref();
    info!("Reading catalog: {}", path.display());
    let file = File::open(path)?;
    parse_catalog(file)
}

/// Parse catalog rows from any CSV source.
///
/// A row that cannot be used (wrong field count, non-integer `timeID`/`month`)
/// is dropped with a warning rather than failing the whole load. Missing
/// columns in the header are fatal.
pub fn parse_catalog<R: Read>(reader: R) -> Result<Vec<CatalogRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(StackError::MissingColumn(column.to_string()));
        }
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                warn!("Skipping catalog line {}: {}", line, e);
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        if record.len() != headers.len() {
            warn!(
                "Skipping catalog line {}: expected {} fields, found {}",
                line,
                headers.len(),
                record.len()
            );
            continue;
        }

        let parsed = record
            .deserialize::<RawRow>(Some(&headers))
            .map_err(|e| e.to_string())
            .and_then(RawRow::parse);
        match parsed {
            Ok(row) => {
                if row.month.is_none() && is_monthly(&row.variable) {
                    debug!("Line {}: monthly variable {} has no month", line, row.variable);
                }
                rows.push(row);
            }
            Err(reason) => warn!("Skipping catalog line {}: {}", line, reason),
        }
    }

    info!("Loaded {} catalog rows", rows.len());
    for row in rows.iter().take(10) {
        debug!("{:?}", row);
    }

    Ok(rows)
}

/// Write rows in the same CSV layout `parse_catalog` reads
pub fn write_catalog<W: Write>(rows: &[CatalogRow], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(REQUIRED_COLUMNS)?;
    for row in rows {
        let month = row.month.map(|m| m.to_string()).unwrap_or_default();
        let time_id = row.time_id.to_string();
        wtr.write_record([
            row.variable.as_str(),
            month.as_str(),
            time_id.as_str(),
            row.url.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Split a TraCE21k file name into (variable, month, timeID).
///
/// `CHELSA_TraCE21k_pr_7_-150_V1.0.tif` -> `("pr", Some(7), -150)`,
/// `CHELSA_TraCE21k_bio12_20_V1.0.tif` -> `("bio12", None, 20)`.
pub fn parse_tile_name(name: &str) -> Option<(String, Option<u8>, i32)> {
    let file_name = name.rsplit('/').next()?;
    let middle = file_name
        .strip_prefix("CHELSA_TraCE21k_")?
        .strip_suffix("_V1.0.tif")?;

    let parts: Vec<&str> = middle.split('_').collect();
    match parts.as_slice() {
        [variable, time_id] => Some((variable.to_string(), None, time_id.parse().ok()?)),
        [variable, month, time_id] => {
            let month: u8 = month.parse().ok()?;
            if !(1..=12).contains(&month) {
                return None;
            }
            Some((variable.to_string(), Some(month), time_id.parse().ok()?))
        }
        _ => None,
    }
}

/// Extract the text of every `<Key>` element from a bucket listing
pub fn parse_listing_keys(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut keys = Vec::new();
    let mut in_key = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"Key" => in_key = true,
            Event::End(e) if e.local_name().as_ref() == b"Key" => in_key = false,
            Event::Text(t) if in_key => keys.push(t.unescape()?.into_owned()),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(keys)
}

/// Turn listing keys into catalog rows, keeping only GeoTIFFs
pub fn rows_from_keys(keys: &[String], bucket_base: &str, limit: Option<usize>) -> Vec<CatalogRow> {
    let mut rows = Vec::new();
    for key in keys.iter().filter(|k| k.ends_with(".tif")) {
        if limit.is_some_and(|l| rows.len() >= l) {
            break;
        }
        match parse_tile_name(key) {
            Some((variable, month, time_id)) => rows.push(CatalogRow {
                variable,
                month,
                time_id,
                url: format!("{}{}", bucket_base, key),
            }),
            None => warn!("Skipping unrecognised tile name: {}", key),
        }
    }
    rows
}

/// Scrape the bucket listing for one variable
pub fn fetch_listing(
    client: &reqwest::blocking::Client,
    listing_base: &str,
    variable: &str,
    limit: Option<usize>,
) -> Result<Vec<CatalogRow>> {
    let url = format!("{}/{}/", listing_base.trim_end_matches('/'), variable);
    info!("Fetching listing: {}", url);

    let response = client
        .get(&url)
        .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
        .send()?;

    if !response.status().is_success() {
        return Err(StackError::DownloadFailed {
            url,
            reason: format!("HTTP {}", response.status()),
        });
    }

    let body = response.text()?;
    let keys = parse_listing_keys(&body)?;
    debug!("Listing returned {} keys", keys.len());

    let rows = rows_from_keys(&keys, BUCKET_BASE_URL, limit);
    info!("Found {} GeoTIFF tiles for variable '{}'", rows.len(), variable);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = "variable,month,timeID,url\n\
        bio12,,5,A\n\
        bio12,,6,B\n\
        pr,3,-10,C\n\
        pr,,-9,D\n";

    #[test]
    fn test_parse_catalog_blank_month() {
        let rows = parse_catalog(CATALOG.as_bytes()).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            CatalogRow {
                variable: "bio12".to_string(),
                month: None,
                time_id: 5,
                url: "A".to_string(),
            }
        );
        assert_eq!(rows[2].month, Some(3));
        assert_eq!(rows[2].time_id, -10);
        // Monthly variable without a month is kept for the selector to judge
        assert_eq!(rows[3].month, None);
    }

    #[test]
    fn test_parse_catalog_skips_bad_rows() {
        let csv = "variable,month,timeID,url\n\
            bio12,,x,A\n\
            pr,13,1,B\n\
            pr,jan,1,C\n\
            bio12,5,A\n\
            bio12,,8,E,extra\n\
            bio12,,7,D\n\
            pr,2,3\n\
            tasmax,1,-2,F\n";
        let rows = parse_catalog(csv.as_bytes()).unwrap();
        let urls: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["D", "F"]);
    }

    #[test]
    fn test_parse_catalog_missing_column() {
        let csv = "variable,timeID,url\nbio12,5,A\n";
        let err = parse_catalog(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, StackError::MissingColumn(ref c) if c == "month"));
    }

    #[test]
    fn test_write_catalog_layout() {
        let rows = parse_catalog(CATALOG.as_bytes()).unwrap();
        let mut out = Vec::new();
        write_catalog(&rows, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("variable,month,timeID,url\n"));
        assert!(text.contains("bio12,,5,A\n"));
        assert!(text.contains("pr,3,-10,C\n"));
    }

    #[test]
    fn test_parse_tile_name() {
        assert_eq!(
            parse_tile_name("chelsa_TRACE21k/V1.0/pr/CHELSA_TraCE21k_pr_7_-150_V1.0.tif"),
            Some(("pr".to_string(), Some(7), -150))
        );
        assert_eq!(
            parse_tile_name("CHELSA_TraCE21k_bio12_20_V1.0.tif"),
            Some(("bio12".to_string(), None, 20))
        );
        assert_eq!(parse_tile_name("CHELSA_TraCE21k_pr_13_1_V1.0.tif"), None);
        assert_eq!(parse_tile_name("readme.txt"), None);
    }

    #[test]
    fn test_parse_listing_keys() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>chelsav1</Name>
  <Contents><Key>chelsa_TRACE21k/V1.0/bio12/CHELSA_TraCE21k_bio12_-1_V1.0.tif</Key></Contents>
  <Contents><Key>chelsa_TRACE21k/V1.0/bio12/CHELSA_TraCE21k_bio12_0_V1.0.tif</Key></Contents>
  <Contents><Key>chelsa_TRACE21k/V1.0/bio12/index.html</Key></Contents>
</ListBucketResult>"#;
        let keys = parse_listing_keys(xml).unwrap();
        assert_eq!(keys.len(), 3);

        let rows = rows_from_keys(&keys, BUCKET_BASE_URL, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].time_id, -1);
        assert_eq!(
            rows[1].url,
            "https://os.zhdk.cloud.switch.ch/chelsav1/chelsa_TRACE21k/V1.0/bio12/CHELSA_TraCE21k_bio12_0_V1.0.tif"
        );

        let limited = rows_from_keys(&keys, BUCKET_BASE_URL, Some(1));
        assert_eq!(limited.len(), 1);
    }
}
