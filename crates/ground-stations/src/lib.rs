//! Ground Stations Library
//!
//! Loads the location list (`name,latitude,longitude` with a header row) that
//! defines every ground station of a run, and assigns each one its negative
//! [`GroundId`]: the first data row is `-1`, the second `-2`, and so on.

use orbital_mechanics::{ConstellationModel, GeodeticPosition, GroundId, OrbitalError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StationError {
    #[error("Cannot read location file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Location file has no header row")]
    MissingHeader,
    #[error("Location header needs at least name, latitude and longitude, found {0} columns")]
    ShortHeader(usize),
    #[error("Line {line}: expected {expected} columns, found {found}")]
    ColumnMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("Line {line}: invalid {field} {value:?}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("Line {line}: {source}")]
    InvalidLocation {
        line: usize,
        #[source]
        source: OrbitalError,
    },
    #[error("Line {line}: duplicate location name {name:?}")]
    DuplicateName { line: usize, name: String },
    #[error("Location file contains no stations")]
    Empty,
    #[error("Station not found: {0}")]
    NotFound(String),
    #[error("Orbital model rejected station: {0}")]
    Orbital(#[from] OrbitalError),
}

pub type Result<T> = std::result::Result<T, StationError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundStation {
    pub id: GroundId,
    pub name: String,
    pub location: GeodeticPosition,
}

/// Every ground station of a run, indexed by id and by name.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: Vec<GroundStation>,
    by_name: HashMap<String, GroundId>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading locations from {:?}", path);

        let file = File::open(path).map_err(|source| StationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_reader(BufReader::new(file)).map_err(|e| match e {
            StationError::Io { source, .. } => StationError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        info!("Loaded {} ground stations", registry.len());
        Ok(registry)
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut lines = reader.lines().enumerate();

        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line.map_err(|source| StationError::Io {
                        path: PathBuf::new(),
                        source,
                    })?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(StationError::MissingHeader),
            }
        };
        let columns = header.split(',').count();
        if columns < 3 {
            return Err(StationError::ShortHeader(columns));
        }

        let mut registry = Self::new();
        for (i, line) in lines {
            let line = line.map_err(|source| StationError::Io {
                path: PathBuf::new(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = i + 1;
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != columns {
                return Err(StationError::ColumnMismatch {
                    line: line_no,
                    expected: columns,
                    found: fields.len(),
                });
            }

            let name = fields[0];
            if name.is_empty() {
                return Err(StationError::InvalidField {
                    line: line_no,
                    field: "name",
                    value: name.to_string(),
                });
            }
            let latitude = parse_coordinate(line_no, "latitude", fields[1])?;
            let longitude = parse_coordinate(line_no, "longitude", fields[2])?;
            let location = GeodeticPosition::new(latitude, longitude)
                .map_err(|source| StationError::InvalidLocation {
                    line: line_no,
                    source,
                })?;

            registry.insert(line_no, name, location)?;
        }

        if registry.is_empty() {
            return Err(StationError::Empty);
        }
        Ok(registry)
    }

    fn insert(&mut self, line: usize, name: &str, location: GeodeticPosition) -> Result<GroundId> {
        if self.by_name.contains_key(name) {
            return Err(StationError::DuplicateName {
                line,
                name: name.to_string(),
            });
        }
        let id = GroundId::from_index(self.stations.len()).ok_or(StationError::InvalidField {
            line,
            field: "row count",
            value: self.stations.len().to_string(),
        })?;

        debug!("Station {} -> {}", name, id);
        self.by_name.insert(name.to_string(), id);
        self.stations.push(GroundStation {
            id,
            name: name.to_string(),
            location,
        });
        Ok(id)
    }

    pub fn get(&self, id: GroundId) -> Result<&GroundStation> {
        self.stations
            .get(id.index())
            .filter(|s| s.id == id)
            .ok_or_else(|| StationError::NotFound(id.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Result<GroundId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| StationError::NotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroundStation> {
        self.stations.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = GroundId> + '_ {
        self.stations.iter().map(|s| s.id)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Place every station into the orbital model. The model must not hold
    /// any ground stations yet so that its ids line up with ours.
    pub fn register(&self, model: &mut ConstellationModel) -> Result<()> {
        for station in &self.stations {
            let id = model.add_ground(&station.location)?;
            if id != station.id {
                return Err(StationError::NotFound(format!(
                    "{} registered as {} instead of {}",
                    station.name, id, station.id
                )));
            }
        }
        Ok(())
    }
}

fn parse_coordinate(line: usize, field: &'static str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| StationError::InvalidField {
        line,
        field,
        value: value.to_string(),
    })
}
