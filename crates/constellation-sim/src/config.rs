//! Run configuration
//!
//! One immutable [`SimConfig`] is loaded per process and handed to every
//! component at construction. Relative paths inside a config file are resolved
//! against the directory holding that file.

use crate::{Result, SimError};
use constellation_net::{ConstellationShape, LinkingPolicy};
use orbital_mechanics::limits::LinkLimits;
use orbital_mechanics::walker::WalkerDelta;
use orbital_mechanics::{EarthModel, EARTH_RADIUS_M};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub constellation: ConstellationConfig,
    pub earth: EarthConfig,
    pub links: LinkConfig,
    pub routing: RoutingConfig,
    pub run: RunConfig,
    pub animation: AnimationConfig,
}

/// Walker-delta shell parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstellationConfig {
    pub planes: u32,
    pub nodes_per_plane: u32,
    pub inclination_deg: f64,
    pub altitude_m: f64,
    pub phasing: u32,
}

impl Default for ConstellationConfig {
    fn default() -> Self {
        Self {
            planes: 24,
            nodes_per_plane: 66,
            inclination_deg: 53.0,
            altitude_m: 550_000.0,
            phasing: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EarthConfig {
    pub radius_m: f64,
    pub rotates: bool,
}

impl Default for EarthConfig {
    fn default() -> Self {
        Self {
            radius_m: EARTH_RADIUS_M,
            rotates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub policy: LinkingPolicy,
    /// Lowest altitude an ISL line of sight may graze.
    pub min_communications_altitude_m: f64,
    pub min_elevation_deg: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            policy: LinkingPolicy::default(),
            min_communications_altitude_m: 100_000.0,
            min_elevation_deg: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub enabled: bool,
    /// Attach every station each tick, not only those with pending requests.
    pub attach_all_stations: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attach_all_stations: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub steps: u64,
    pub step_length_s: f64,
    pub locations: PathBuf,
    pub workload: Option<PathBuf>,
    /// Prefix of every result file, e.g. `results/run1_`.
    pub results: PathBuf,
    /// Maximum number of requests resolved per tick.
    pub request_cap: Option<usize>,
    pub worker: usize,
    pub workers: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: 86_400,
            step_length_s: 1.0,
            locations: PathBuf::from("locations.csv"),
            workload: None,
            results: PathBuf::from("results/"),
            request_cap: None,
            worker: 0,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub enabled: bool,
    pub frame_interval_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frame_interval_ms: 10,
        }
    }
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading config from {:?}", path);

        let content = std::fs::read_to_string(path)?;
        let mut config: SimConfig = serde_json::from_str(&content)?;

        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        resolve(&mut self.run.locations);
        resolve(&mut self.run.results);
        if let Some(workload) = self.run.workload.as_mut() {
            resolve(workload);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.walker().validate()?;
        self.link_limits()?;

        let run = &self.run;
        if !(run.step_length_s.is_finite() && run.step_length_s > 0.0) {
            return Err(SimError::Config(format!(
                "step_length_s must be positive, got {}",
                run.step_length_s
            )));
        }
        if run.workers == 0 {
            return Err(SimError::Config("workers must be at least 1".into()));
        }
        if run.worker >= run.workers {
            return Err(SimError::Config(format!(
                "worker index {} out of range for {} workers",
                run.worker, run.workers
            )));
        }
        if run.request_cap == Some(0) {
            return Err(SimError::Config("request_cap must be at least 1".into()));
        }
        if run.results.as_os_str().is_empty() {
            return Err(SimError::Config("results base path is empty".into()));
        }
        crate::output::check_base(&run.results)?;
        if let LinkingPolicy::PlusGrid {
            crosslink_interpolation: 0,
        } = self.links.policy
        {
            return Err(SimError::Config(
                "crosslink_interpolation must be at least 1".into(),
            ));
        }
        if self.animation.enabled && self.animation.frame_interval_ms == 0 {
            return Err(SimError::Config("frame_interval_ms must be at least 1".into()));
        }
        Ok(())
    }

    pub fn walker(&self) -> WalkerDelta {
        let c = &self.constellation;
        WalkerDelta {
            planes: c.planes,
            nodes_per_plane: c.nodes_per_plane,
            phasing: c.phasing,
            semi_major_axis_m: self.earth.radius_m + c.altitude_m,
            inclination_deg: c.inclination_deg,
        }
    }

    pub fn earth_model(&self) -> EarthModel {
        EarthModel {
            radius_m: self.earth.radius_m,
            rotates: self.earth.rotates,
        }
    }

    pub fn shape(&self) -> ConstellationShape {
        ConstellationShape::new(self.constellation.planes, self.constellation.nodes_per_plane)
    }

    pub fn link_limits(&self) -> Result<LinkLimits> {
        Ok(LinkLimits::for_shell(
            self.earth.radius_m + self.constellation.altitude_m,
            self.earth.radius_m,
            self.links.min_communications_altitude_m,
            self.links.min_elevation_deg,
        )?)
    }

    /// Steps this worker is responsible for.
    pub fn assigned_steps(&self) -> Vec<u64> {
        crate::harness::stride(self.run.steps, self.run.worker, self.run.workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_reference_shell() {
        let config = SimConfig::default();
        assert_eq!(config.constellation.planes, 24);
        assert_eq!(config.constellation.nodes_per_plane, 66);
        assert_eq!(config.links.min_elevation_deg, 30.0);
        assert_eq!(config.links.policy.name(), "+GRID");
        assert!(config.validate().is_ok());
        assert_eq!(config.walker().total_satellites(), 1584);
    }

    #[test]
    fn test_load_partial_json_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "constellation": {{ "planes": 4, "nodes_per_plane": 10 }},
                "links": {{ "policy": {{ "method": "SPARSE" }} }},
                "run": {{ "steps": 20, "locations": "cities.csv", "workload": "load.csv", "results": "out/r_" }}
            }}"#
        )
        .unwrap();

        let config = SimConfig::load(&path).unwrap();
        assert_eq!(config.constellation.planes, 4);
        assert_eq!(config.constellation.inclination_deg, 53.0);
        assert_eq!(config.links.policy, LinkingPolicy::Sparse);
        assert_eq!(config.run.locations, dir.path().join("cities.csv"));
        assert_eq!(config.run.workload, Some(dir.path().join("load.csv")));
        assert_eq!(config.run.results, dir.path().join("out/r_"));
    }

    #[test]
    fn test_validate_rejects_bad_run_parameters() {
        let mut config = SimConfig::default();
        config.run.step_length_s = 0.0;
        assert!(matches!(config.validate(), Err(SimError::Config(_))));

        let mut config = SimConfig::default();
        config.run.workers = 2;
        config.run.worker = 2;
        assert!(matches!(config.validate(), Err(SimError::Config(_))));

        let mut config = SimConfig::default();
        config.run.results = "results/run1".into();
        assert!(matches!(config.validate(), Err(SimError::Config(_))));

        let mut config = SimConfig::default();
        config.constellation.planes = 0;
        assert!(matches!(config.validate(), Err(SimError::Orbital(_))));

        let mut config = SimConfig::default();
        config.links.policy = LinkingPolicy::PlusGrid {
            crosslink_interpolation: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SimConfig::load(&path), Err(SimError::Json(_))));
    }

    #[test]
    fn test_assigned_steps() {
        let mut config = SimConfig::default();
        config.run.steps = 7;
        config.run.workers = 3;
        config.run.worker = 1;
        assert_eq!(config.assigned_steps(), vec![1, 4]);
    }
}
