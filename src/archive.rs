//! Wayback Machine CDX availability check for the operation-status pages.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

use crate::http_client::{self, HttpError};

pub const CDX_ENDPOINT: &str = "http://web.archive.org/cdx/search/cdx";
pub const DEFAULT_TARGET: &str = "https://www3.jrhokkaido.co.jp/webunkou/*";
const MAX_CDX_BYTES: usize = 64 * 1024 * 1024;
const TOP_PAGES: usize = 10;
const WINTER_MONTHS: [u32; 5] = [11, 12, 1, 2, 3];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid CDX endpoint {endpoint}: {source}")]
    Endpoint {
        endpoint: String,
        source: url::ParseError,
    },
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("malformed CDX response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CDX row {row} has {found} fields, expected 2")]
    RowShape { row: usize, found: usize },
    #[error("CDX row {row} has an unparseable timestamp {timestamp:?}")]
    Timestamp { row: usize, timestamp: String },
}

/// One captured page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// `YYYYMMDDhhmmss`.
    pub timestamp: String,
    pub original: String,
}

impl Snapshot {
    pub fn year(&self) -> &str {
        self.timestamp.get(..4).unwrap_or("")
    }

    pub fn month(&self) -> Option<u32> {
        self.timestamp.get(4..6)?.parse().ok()
    }

    /// Last path segment of the captured URL.
    pub fn page_name(&self) -> &str {
        self.original.rsplit('/').next().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilitySummary {
    pub total: usize,
    pub by_year: BTreeMap<String, usize>,
    /// Up to 10 `area_` pages, most captured first; ties keep first-seen order.
    pub top_area_pages: Vec<(String, usize)>,
    /// Captures taken November through March.
    pub winter_snapshots: usize,
}

/// CDX query for every 200-status capture under `target`, one row per distinct digest.
pub fn cdx_query_url(endpoint: &str, target: &str) -> Result<Url, ArchiveError> {
    let mut url = Url::parse(endpoint).map_err(|source| ArchiveError::Endpoint {
        endpoint: endpoint.to_string(),
        source,
    })?;
    url.query_pairs_mut()
        .append_pair("url", target)
        .append_pair("output", "json")
        .append_pair("fl", "timestamp,original")
        .append_pair("filter", "statuscode:200")
        .append_pair("collapse", "digest");
    Ok(url)
}

/// Parse a CDX `output=json` body, dropping the header row if present.
pub fn parse_cdx(body: &[u8]) -> Result<Vec<Snapshot>, ArchiveError> {
    let mut rows: Vec<Vec<String>> = serde_json::from_slice(body)?;
    if rows
        .first()
        .and_then(|row| row.first())
        .is_some_and(|first| first == "timestamp")
    {
        rows.remove(0);
    }
    rows.into_iter()
        .enumerate()
        .map(|(row, fields)| {
            let found = fields.len();
            let mut fields = fields.into_iter();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(timestamp), Some(original), None) => Ok(Snapshot {
                    timestamp,
                    original,
                }),
                _ => Err(ArchiveError::RowShape { row, found }),
            }
        })
        .collect()
}

pub fn summarize(snapshots: &[Snapshot]) -> Result<AvailabilitySummary, ArchiveError> {
    let mut by_year = BTreeMap::new();
    let mut area_pages: Vec<(String, usize)> = Vec::new();
    let mut winter_snapshots = 0usize;
    for (row, snapshot) in snapshots.iter().enumerate() {
        *by_year.entry(snapshot.year().to_string()).or_insert(0) += 1;
        if snapshot.original.contains("area_") {
            let page = snapshot.page_name();
            match area_pages.iter_mut().find(|(name, _)| name == page) {
                Some((_, count)) => *count += 1,
                None => area_pages.push((page.to_string(), 1)),
            }
        }
        let month = snapshot.month().ok_or_else(|| ArchiveError::Timestamp {
            row,
            timestamp: snapshot.timestamp.clone(),
        })?;
        if WINTER_MONTHS.contains(&month) {
            winter_snapshots += 1;
        }
    }
    area_pages.sort_by(|a, b| b.1.cmp(&a.1));
    area_pages.truncate(TOP_PAGES);
    Ok(AvailabilitySummary {
        total: snapshots.len(),
        by_year,
        top_area_pages: area_pages,
        winter_snapshots,
    })
}

/// Query `endpoint` once for `target` and summarise the captures.
pub fn check_availability(endpoint: &str, target: &str) -> Result<AvailabilitySummary, ArchiveError> {
    let url = cdx_query_url(endpoint, target)?;
    tracing::info!(%url, "Querying CDX index");
    let body = http_client::get_bytes(&url, MAX_CDX_BYTES)?;
    let snapshots = parse_cdx(&body)?;
    tracing::debug!(rows = snapshots.len(), "Parsed CDX rows");
    summarize(&snapshots)
}
