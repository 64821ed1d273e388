//! Request workloads
//!
//! The driver pulls the requests that arrived during the current tick from a
//! [`WorkloadSource`]. [`RequestLog`] reads a pre-generated CSV trace with the
//! header `time,source,origin,item,size`, where `source` and `origin` are
//! location names.

use crate::{Result, SimError};
use ground_stations::StationRegistry;
use orbital_mechanics::GroundId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One content request from a ground station to the origin holding the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub arrival_s: f64,
    pub source: GroundId,
    pub destination: GroundId,
    pub item: String,
    pub size: u64,
}

pub trait WorkloadSource {
    /// Requests with `after_s < arrival <= until_s`, in arrival order.
    fn requests_between(&mut self, after_s: f64, until_s: f64) -> Result<Vec<Request>>;
}

/// A workload that never issues requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyWorkload;

impl WorkloadSource for EmptyWorkload {
    fn requests_between(&mut self, _after_s: f64, _until_s: f64) -> Result<Vec<Request>> {
        Ok(Vec::new())
    }
}

/// A request trace held in memory, sorted by arrival time.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    requests: Vec<Request>,
}

const COLUMNS: [&str; 5] = ["time", "source", "origin", "item", "size"];

impl RequestLog {
    pub fn new(mut requests: Vec<Request>) -> Self {
        requests.sort_by(|a, b| a.arrival_s.total_cmp(&b.arrival_s));
        Self { requests }
    }

    pub fn load(path: impl AsRef<Path>, stations: &StationRegistry) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading workload from {:?}", path);

        let file = File::open(path).map_err(|e| SimError::Workload {
            path: path.to_path_buf(),
            line: 0,
            message: format!("cannot open: {e}"),
        })?;
        let log = Self::from_reader(BufReader::new(file), path, stations)?;

        info!("Loaded {} requests", log.len());
        Ok(log)
    }

    /// `origin` names the location of the content origin, i.e. the request
    /// destination. Columns may appear in any order.
    pub fn from_reader(
        reader: impl BufRead,
        path: &Path,
        stations: &StationRegistry,
    ) -> Result<Self> {
        let fail = |line: usize, message: String| SimError::Workload {
            path: path.to_path_buf(),
            line,
            message,
        };

        let mut lines = reader.lines().enumerate();
        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(fail(0, "missing header row".to_string())),
            }
        };
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let mut index = [0usize; 5];
        for (slot, column) in index.iter_mut().zip(COLUMNS) {
            *slot = names
                .iter()
                .position(|n| *n == column)
                .ok_or_else(|| fail(1, format!("header lacks column {column:?}")))?;
        }
        let [time_col, source_col, origin_col, item_col, size_col] = index;

        let mut requests = Vec::new();
        for (i, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = i + 1;
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != names.len() {
                return Err(fail(
                    line_no,
                    format!("expected {} columns, found {}", names.len(), fields.len()),
                ));
            }

            let arrival_s = fields[time_col]
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .ok_or_else(|| fail(line_no, format!("invalid time {:?}", fields[time_col])))?;
            let size = fields[size_col]
                .parse::<u64>()
                .map_err(|_| fail(line_no, format!("invalid size {:?}", fields[size_col])))?;
            let source = stations
                .lookup(fields[source_col])
                .map_err(|e| fail(line_no, e.to_string()))?;
            let destination = stations
                .lookup(fields[origin_col])
                .map_err(|e| fail(line_no, e.to_string()))?;

            requests.push(Request {
                arrival_s,
                source,
                destination,
                item: fields[item_col].to_string(),
                size,
            });
        }

        debug!("Parsed {} workload rows", requests.len());
        Ok(Self::new(requests))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl WorkloadSource for RequestLog {
    fn requests_between(&mut self, after_s: f64, until_s: f64) -> Result<Vec<Request>> {
        let start = self.requests.partition_point(|r| r.arrival_s <= after_s);
        let end = self.requests.partition_point(|r| r.arrival_s <= until_s);
        Ok(self.requests.get(start..end).unwrap_or_default().to_vec())
    }
}

/// Opens the configured workload, or an empty one when none is configured.
pub fn open(path: Option<&PathBuf>, stations: &StationRegistry) -> Result<Box<dyn WorkloadSource>> {
    match path {
        Some(path) => Ok(Box::new(RequestLog::load(path, stations)?)),
        None => {
            info!("No workload configured, ticks will carry no requests");
            Ok(Box::new(EmptyWorkload))
        }
    }
}
