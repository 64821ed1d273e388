//! Orbital Mechanics Library
//!
//! Circular-orbit Walker Delta propagation, ground-station frame transforms and
//! link range limits for LEO relay constellations.
//!
//! All positions are expressed in one Earth-centred inertial frame: `z` along
//! the rotation axis, `x` through the Greenwich meridian at simulated time 0.
//! Satellites move on circular orbits in that frame; ground stations are fixed
//! on a spherical Earth and rotate about `z` with the planet. Every position is
//! a pure function of elapsed simulated seconds, so any tick can be computed
//! without replaying the ticks before it.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Mean Earth radius used for the spherical ground model (m).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Standard gravitational parameter of the Earth (m³/s²).
pub const MU_EARTH: f64 = 3.986_004_418e14;

/// Seconds per Earth rotation.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid constellation: {0}")]
    InvalidConstellation(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("Invalid link geometry: {0}")]
    InvalidGeometry(String),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// Cartesian position in the inertial frame (metres).
pub type Position = Vector3<f64>;

/// Dense satellite identifier in `[0, planes * nodes_per_plane)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SatelliteId(pub u32);

impl SatelliteId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SatelliteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ground station identifier. Always strictly negative: the station at
/// zero-based position `i` of the location list is `-(i + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroundId(i32);

impl GroundId {
    /// Id for the station at zero-based list position `index`.
    pub fn from_index(index: usize) -> Option<Self> {
        let ordinal = i32::try_from(index.checked_add(1)?).ok()?;
        Some(Self(-ordinal))
    }

    /// Parse a raw id as written in result files.
    pub fn from_raw(raw: i32) -> Option<Self> {
        (raw < 0).then_some(Self(raw))
    }

    pub fn get(self) -> i32 {
        self.0
    }

    /// Zero-based position in the location list.
    pub fn index(self) -> usize {
        (-(self.0 as i64) - 1) as usize
    }
}

impl fmt::Display for GroundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeodeticPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

impl GeodeticPosition {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(OrbitalError::InvalidCoordinates(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(OrbitalError::InvalidCoordinates(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            altitude_m: 0.0,
        })
    }
}

/// A satellite slot of the constellation. Plane and slot never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Satellite {
    pub id: SatelliteId,
    pub plane: u32,
    pub slot: u32,
}

pub mod transforms {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    /// Earth-fixed cartesian position of a geodetic point on a spherical Earth.
    pub fn geodetic_to_ecef(pos: &GeodeticPosition, earth_radius_m: f64) -> Position {
        let lat_rad = pos.latitude.to_radians();
        let lon_rad = pos.longitude.to_radians();
        let r = earth_radius_m + pos.altitude_m;

        Vector3::new(
            r * lat_rad.cos() * lon_rad.cos(),
            r * lat_rad.cos() * lon_rad.sin(),
            r * lat_rad.sin(),
        )
    }

    /// Rotate an Earth-fixed position into the inertial frame at `angle_rad`.
    pub fn ecef_to_inertial(ecef: &Position, angle_rad: f64) -> Position {
        Rotation3::from_axis_angle(&Vector3::z_axis(), angle_rad) * ecef
    }
}

pub mod walker {
    use super::*;
    use nalgebra::{Rotation3, Vector3};
    use std::f64::consts::TAU;

    /// Walker Delta `i:T/P/F` shell with circular orbits.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct WalkerDelta {
        pub planes: u32,
        pub nodes_per_plane: u32,
        /// Relative phasing factor F; plane `p` is offset by `2πFp/T`.
        pub phasing: u32,
        pub semi_major_axis_m: f64,
        pub inclination_deg: f64,
    }

    impl WalkerDelta {
        /// 24 × 66 shell at 550 km and 53°.
        pub fn starlink_shell() -> Self {
            WalkerDelta {
                planes: 24,
                nodes_per_plane: 66,
                phasing: 1,
                semi_major_axis_m: EARTH_RADIUS_M + 550_000.0,
                inclination_deg: 53.0,
            }
        }

        pub fn validate(&self) -> Result<()> {
            if self.planes == 0 || self.nodes_per_plane == 0 {
                return Err(OrbitalError::InvalidConstellation(format!(
                    "{} planes x {} nodes per plane",
                    self.planes, self.nodes_per_plane
                )));
            }
            if self.planes.checked_mul(self.nodes_per_plane).is_none() {
                return Err(OrbitalError::InvalidConstellation(
                    "satellite count overflows u32".to_string(),
                ));
            }
            if !self.semi_major_axis_m.is_finite() || self.semi_major_axis_m <= 0.0 {
                return Err(OrbitalError::InvalidConstellation(format!(
                    "semi-major axis {} m",
                    self.semi_major_axis_m
                )));
            }
            if !self.inclination_deg.is_finite() {
                return Err(OrbitalError::InvalidConstellation(
                    "inclination is not finite".to_string(),
                ));
            }
            Ok(())
        }

        pub fn total_satellites(&self) -> u32 {
            self.planes * self.nodes_per_plane
        }

        /// Angular rate of a circular orbit at this radius (rad/s).
        pub fn mean_motion_rad_s(&self) -> f64 {
            (MU_EARTH / self.semi_major_axis_m.powi(3)).sqrt()
        }

        pub fn period_s(&self) -> f64 {
            TAU / self.mean_motion_rad_s()
        }

        pub fn satellite_id(&self, plane: u32, slot: u32) -> SatelliteId {
            SatelliteId(plane * self.nodes_per_plane + slot)
        }

        /// All satellites, ordered by id.
        pub fn satellites(&self) -> Vec<Satellite> {
            let mut sats = Vec::with_capacity(self.total_satellites() as usize);
            for plane in 0..self.planes {
                for slot in 0..self.nodes_per_plane {
                    sats.push(Satellite {
                        id: self.satellite_id(plane, slot),
                        plane,
                        slot,
                    });
                }
            }
            sats
        }

        /// Inertial position of `sat` after `time_s` simulated seconds.
        pub fn position(&self, sat: &Satellite, time_s: f64) -> Position {
            let raan = TAU * sat.plane as f64 / self.planes as f64;
            let phase_offset = TAU * (self.phasing % self.planes) as f64 * sat.plane as f64
                / self.total_satellites() as f64;
            let u0 = TAU * sat.slot as f64 / self.nodes_per_plane as f64 + phase_offset;
            let u = (u0 + self.mean_motion_rad_s() * time_s) % TAU;

            let in_plane = Vector3::new(
                self.semi_major_axis_m * u.cos(),
                self.semi_major_axis_m * u.sin(),
                0.0,
            );
            let inclination = Rotation3::from_axis_angle(
                &Vector3::x_axis(),
                self.inclination_deg.to_radians(),
            );
            let node = Rotation3::from_axis_angle(&Vector3::z_axis(), raan);

            node * (inclination * in_plane)
        }
    }
}

pub mod limits {
    use super::*;

    /// Maximum feasible link lengths for one orbital shell.
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
    pub struct LinkLimits {
        pub max_isl_m: f64,
        pub max_gsl_m: f64,
    }

    impl LinkLimits {
        pub fn for_shell(
            semi_major_axis_m: f64,
            earth_radius_m: f64,
            min_communications_altitude_m: f64,
            min_elevation_deg: f64,
        ) -> Result<Self> {
            Ok(Self {
                max_isl_m: max_isl_distance(
                    semi_major_axis_m,
                    earth_radius_m,
                    min_communications_altitude_m,
                )?,
                max_gsl_m: max_gsl_distance(semi_major_axis_m, earth_radius_m, min_elevation_deg)?,
            })
        }
    }

    /// Longest chord between two satellites at `semi_major_axis_m` whose
    /// closest approach to the Earth's centre stays above the minimum
    /// communications altitude. Floored to whole metres.
    pub fn max_isl_distance(
        semi_major_axis_m: f64,
        earth_radius_m: f64,
        min_communications_altitude_m: f64,
    ) -> Result<f64> {
        let floor_radius = earth_radius_m + min_communications_altitude_m;
        if semi_major_axis_m <= floor_radius {
            return Err(OrbitalError::InvalidGeometry(format!(
                "orbit radius {semi_major_axis_m} m is not above the {floor_radius} m communications floor"
            )));
        }
        let half_chord = (semi_major_axis_m.powi(2) - floor_radius.powi(2)).sqrt();
        Ok((2.0 * half_chord).floor())
    }

    /// Slant range from a ground station to a satellite seen at exactly the
    /// minimum elevation. Floored to whole metres.
    pub fn max_gsl_distance(
        semi_major_axis_m: f64,
        earth_radius_m: f64,
        min_elevation_deg: f64,
    ) -> Result<f64> {
        if !(0.0..=90.0).contains(&min_elevation_deg) {
            return Err(OrbitalError::InvalidGeometry(format!(
                "minimum elevation {min_elevation_deg}° outside [0, 90]"
            )));
        }
        if semi_major_axis_m <= earth_radius_m {
            return Err(OrbitalError::InvalidGeometry(format!(
                "orbit radius {semi_major_axis_m} m is inside the Earth"
            )));
        }

        // Law of cosines in the triangle Earth centre / ground / satellite,
        // solved for the slant range. Stays exact at the zenith.
        let elevation = min_elevation_deg.to_radians();
        let horizontal = earth_radius_m * elevation.cos();
        let range = (semi_major_axis_m.powi(2) - horizontal.powi(2)).sqrt()
            - earth_radius_m * elevation.sin();
        Ok(range.floor())
    }
}

/// Inertial positions of every satellite and ground station at one instant.
/// `satellites[i]` belongs to `SatelliteId(i)`, `grounds[i]` to the ground id
/// whose [`GroundId::index`] is `i`.
#[derive(Debug, Clone)]
pub struct PositionSnapshot {
    pub time_s: f64,
    pub satellites: Vec<Position>,
    pub grounds: Vec<Position>,
}

impl PositionSnapshot {
    pub fn ground(&self, id: GroundId) -> Option<&Position> {
        self.grounds.get(id.index())
    }
}

/// Planetary model used to place ground stations in the inertial frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EarthModel {
    pub radius_m: f64,
    /// Rotate ground stations with the planet. When false they stay at their
    /// simulated-time-0 inertial position.
    pub rotates: bool,
}

impl Default for EarthModel {
    fn default() -> Self {
        Self {
            radius_m: EARTH_RADIUS_M,
            rotates: true,
        }
    }
}

impl EarthModel {
    pub fn rotation_angle_rad(&self, time_s: f64) -> f64 {
        if self.rotates {
            std::f64::consts::TAU * (time_s % SECONDS_PER_DAY) / SECONDS_PER_DAY
        } else {
            0.0
        }
    }
}

/// The full orbital model: a Walker shell plus the ground stations it serves.
#[derive(Debug, Clone)]
pub struct ConstellationModel {
    walker: walker::WalkerDelta,
    earth: EarthModel,
    satellites: Vec<Satellite>,
    grounds: Vec<Position>,
}

impl ConstellationModel {
    pub fn new(walker: walker::WalkerDelta, earth: EarthModel) -> Result<Self> {
        walker.validate()?;
        let satellites = walker.satellites();
        Ok(Self {
            walker,
            earth,
            satellites,
            grounds: Vec::new(),
        })
    }

    /// Register a ground station; ids are handed out in call order.
    pub fn add_ground(&mut self, location: &GeodeticPosition) -> Result<GroundId> {
        let id = GroundId::from_index(self.grounds.len()).ok_or_else(|| {
            OrbitalError::InvalidCoordinates("too many ground stations".to_string())
        })?;
        self.grounds
            .push(transforms::geodetic_to_ecef(location, self.earth.radius_m));
        Ok(id)
    }

    pub fn walker(&self) -> &walker::WalkerDelta {
        &self.walker
    }

    pub fn satellites(&self) -> &[Satellite] {
        &self.satellites
    }

    pub fn total_satellites(&self) -> usize {
        self.satellites.len()
    }

    pub fn ground_count(&self) -> usize {
        self.grounds.len()
    }

    pub fn positions_at(&self, time_s: f64) -> PositionSnapshot {
        let angle = self.earth.rotation_angle_rad(time_s);
        PositionSnapshot {
            time_s,
            satellites: self
                .satellites
                .iter()
                .map(|sat| self.walker.position(sat, time_s))
                .collect(),
            grounds: self
                .grounds
                .iter()
                .map(|ecef| transforms::ecef_to_inertial(ecef, angle))
                .collect(),
        }
    }
}
