//! Link topology construction
//!
//! Three connectivity policies:
//! - IDEAL: every satellite pair within ISL range, every ground/satellite pair
//!   within GSL range
//! - +GRID: in-plane ring plus cross-plane links on every k-th satellite
//! - SPARSE: +GRID with cross-plane links disabled (in-plane rings only)
//!
//! Range thresholds are closed: a link exactly at the limit is feasible.

use crate::{GslLink, IslLink, Result, Topology, TopologyError};
use orbital_mechanics::limits::LinkLimits;
use orbital_mechanics::walker::WalkerDelta;
use orbital_mechanics::{GroundId, Position, PositionSnapshot, SatelliteId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Plane layout of the constellation, needed to find grid neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstellationShape {
    pub planes: u32,
    pub nodes_per_plane: u32,
}

impl ConstellationShape {
    pub fn new(planes: u32, nodes_per_plane: u32) -> Self {
        Self {
            planes,
            nodes_per_plane,
        }
    }

    pub fn from_walker(walker: &WalkerDelta) -> Self {
        Self::new(walker.planes, walker.nodes_per_plane)
    }

    pub fn total(&self) -> usize {
        self.planes as usize * self.nodes_per_plane as usize
    }

    pub fn id(&self, plane: u32, slot: u32) -> SatelliteId {
        SatelliteId(plane * self.nodes_per_plane + slot)
    }

    pub fn plane_of(&self, id: SatelliteId) -> u32 {
        id.0 / self.nodes_per_plane
    }

    pub fn slot_of(&self, id: SatelliteId) -> u32 {
        id.0 % self.nodes_per_plane
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum LinkingPolicy {
    #[serde(rename = "IDEAL")]
    Ideal,
    #[serde(rename = "+GRID")]
    PlusGrid {
        /// Only satellites whose in-plane index is a multiple of this factor
        /// carry cross-plane links. Larger than the plane population means
        /// none do.
        #[serde(default = "default_crosslink_interpolation")]
        crosslink_interpolation: u32,
    },
    #[serde(rename = "SPARSE")]
    Sparse,
}

fn default_crosslink_interpolation() -> u32 {
    1
}

impl Default for LinkingPolicy {
    fn default() -> Self {
        LinkingPolicy::PlusGrid {
            crosslink_interpolation: 1,
        }
    }
}

impl LinkingPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            LinkingPolicy::Ideal => "IDEAL",
            LinkingPolicy::PlusGrid { .. } => "+GRID",
            LinkingPolicy::Sparse => "SPARSE",
        }
    }
}

/// Builds a fresh [`Topology`] from the positions of one tick.
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    shape: ConstellationShape,
    policy: LinkingPolicy,
}

impl TopologyBuilder {
    pub fn new(shape: ConstellationShape, policy: LinkingPolicy) -> Result<Self> {
        if shape.planes == 0 || shape.nodes_per_plane == 0 {
            return Err(TopologyError::InvalidPolicy(format!(
                "empty constellation shape {}x{}",
                shape.planes, shape.nodes_per_plane
            )));
        }
        if let LinkingPolicy::PlusGrid {
            crosslink_interpolation: 0,
        } = policy
        {
            return Err(TopologyError::InvalidPolicy(
                "crosslink interpolation must be at least 1".to_string(),
            ));
        }
        Ok(Self { shape, policy })
    }

    pub fn shape(&self) -> &ConstellationShape {
        &self.shape
    }

    pub fn build_snapshot(
        &self,
        snapshot: &PositionSnapshot,
        limits: &LinkLimits,
    ) -> Result<Topology> {
        self.build(&snapshot.satellites, &snapshot.grounds, limits)
    }

    pub fn build(
        &self,
        satellites: &[Position],
        grounds: &[Position],
        limits: &LinkLimits,
    ) -> Result<Topology> {
        if satellites.len() != self.shape.total() {
            return Err(TopologyError::ShapeMismatch {
                kind: "satellites",
                expected: self.shape.total(),
                found: satellites.len(),
            });
        }

        let isl = match self.policy {
            LinkingPolicy::Ideal => ideal_isl(satellites, limits.max_isl_m),
            LinkingPolicy::PlusGrid {
                crosslink_interpolation,
            } => self.grid_isl(satellites, limits.max_isl_m, crosslink_interpolation),
            LinkingPolicy::Sparse => {
                let interpolation = u32::try_from(self.shape.total() + 1).unwrap_or(u32::MAX);
                self.grid_isl(satellites, limits.max_isl_m, interpolation)
            }
        };
        let gsl = ground_links(satellites, grounds, limits.max_gsl_m);

        debug!(
            "{} topology: {} ISL, {} GSL",
            self.policy.name(),
            isl.len(),
            gsl.len()
        );

        Ok(Topology::new(satellites.len(), isl, gsl))
    }

    /// Each satellite links to its fore neighbour in-plane and, when eligible,
    /// to the same slot of the next plane. Links are emitted per satellite.
    fn grid_isl(
        &self,
        satellites: &[Position],
        max_isl_m: f64,
        interpolation: u32,
    ) -> Vec<IslLink> {
        let ConstellationShape {
            planes,
            nodes_per_plane,
        } = self.shape;
        let crosslinks = planes > 1 && interpolation <= nodes_per_plane;

        let mut links = Vec::with_capacity(satellites.len() * 2);
        for plane in 0..planes {
            for slot in 0..nodes_per_plane {
                let id = self.shape.id(plane, slot);

                if nodes_per_plane > 1 {
                    let fore = self.shape.id(plane, (slot + 1) % nodes_per_plane);
                    push_if_feasible(&mut links, satellites, id, fore, max_isl_m);
                }

                if crosslinks && slot % interpolation == 0 {
                    let right = self.shape.id((plane + 1) % planes, slot);
                    push_if_feasible(&mut links, satellites, id, right, max_isl_m);
                }
            }
        }
        links
    }
}

fn push_if_feasible(
    links: &mut Vec<IslLink>,
    satellites: &[Position],
    a: SatelliteId,
    b: SatelliteId,
    max_isl_m: f64,
) {
    let distance_m = (satellites[a.index()] - satellites[b.index()]).norm();
    if distance_m <= max_isl_m {
        links.push(IslLink { a, b, distance_m });
    }
}

fn ideal_isl(satellites: &[Position], max_isl_m: f64) -> Vec<IslLink> {
    let mut links = Vec::new();
    for (i, p) in satellites.iter().enumerate() {
        for (j, q) in satellites.iter().enumerate().skip(i + 1) {
            let distance_m = (p - q).norm();
            if distance_m <= max_isl_m {
                links.push(IslLink {
                    a: SatelliteId(i as u32),
                    b: SatelliteId(j as u32),
                    distance_m,
                });
            }
        }
    }
    links
}

fn ground_links(satellites: &[Position], grounds: &[Position], max_gsl_m: f64) -> Vec<GslLink> {
    let mut links = Vec::new();
    for (i, g) in grounds.iter().enumerate() {
        let Some(ground) = GroundId::from_index(i) else {
            break;
        };
        for (j, s) in satellites.iter().enumerate() {
            let distance_m = (g - s).norm();
            if distance_m <= max_gsl_m {
                links.push(GslLink {
                    ground,
                    satellite: SatelliteId(j as u32),
                    distance_m,
                });
            }
        }
    }
    links
}
