//! Constellation Network
//!
//! Graph layer for the relay constellation, rebuilt from scratch every tick:
//!
//! - Link topology (ISL + GSL) under a connectivity policy
//! - Ground-to-satellite attachment
//! - Shortest paths between the satellites serving active ground stations
//! - End-to-end request path resolution

use orbital_mechanics::{GroundId, SatelliteId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod routing;
pub mod topology;

pub use routing::{
    attach, Attachment, Attachments, ResolvedPath, RoutingError, RoutingTable, SatPath,
    SatPathTable, SatelliteGraph,
};
pub use topology::{ConstellationShape, LinkingPolicy, TopologyBuilder};

/// Topology errors
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Position count mismatch for {kind}: expected {expected}, got {found}")]
    ShapeMismatch {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Invalid linking policy: {0}")]
    InvalidPolicy(String),
}

pub type Result<T> = std::result::Result<T, TopologyError>;

/// One end of a link or path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Ground(GroundId),
    Satellite(SatelliteId),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Ground(id) => write!(f, "{id}"),
            Endpoint::Satellite(id) => write!(f, "{id}"),
        }
    }
}

/// Inter-satellite link
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IslLink {
    pub a: SatelliteId,
    pub b: SatelliteId,
    pub distance_m: f64,
}

/// Ground-to-satellite link. The ground endpoint is always first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GslLink {
    pub ground: GroundId,
    pub satellite: SatelliteId,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Link {
    Isl(IslLink),
    Gsl(GslLink),
}

impl Link {
    pub fn endpoints(&self) -> (Endpoint, Endpoint) {
        match self {
            Link::Isl(l) => (Endpoint::Satellite(l.a), Endpoint::Satellite(l.b)),
            Link::Gsl(l) => (Endpoint::Ground(l.ground), Endpoint::Satellite(l.satellite)),
        }
    }

    pub fn distance_m(&self) -> f64 {
        match self {
            Link::Isl(l) => l.distance_m,
            Link::Gsl(l) => l.distance_m,
        }
    }
}

/// All links of one tick.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    satellite_count: usize,
    isl: Vec<IslLink>,
    gsl: Vec<GslLink>,
}

impl Topology {
    pub fn new(satellite_count: usize, isl: Vec<IslLink>, gsl: Vec<GslLink>) -> Self {
        Self {
            satellite_count,
            isl,
            gsl,
        }
    }

    pub fn satellite_count(&self) -> usize {
        self.satellite_count
    }

    pub fn isl(&self) -> &[IslLink] {
        &self.isl
    }

    pub fn gsl(&self) -> &[GslLink] {
        &self.gsl
    }

    pub fn links(&self) -> impl Iterator<Item = Link> + '_ {
        self.isl
            .iter()
            .copied()
            .map(Link::Isl)
            .chain(self.gsl.iter().copied().map(Link::Gsl))
    }

    /// ISLs whose endpoints sit in different orbital planes.
    pub fn inter_plane_links<'a>(
        &'a self,
        shape: &'a ConstellationShape,
    ) -> impl Iterator<Item = &'a IslLink> + 'a {
        self.isl
            .iter()
            .filter(move |l| shape.plane_of(l.a) != shape.plane_of(l.b))
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            isl_links: self.isl.len(),
            gsl_links: self.gsl.len(),
            longest_isl_m: self.isl.iter().map(|l| l.distance_m).fold(0.0, f64::max),
            longest_gsl_m: self.gsl.iter().map(|l| l.distance_m).fold(0.0, f64::max),
        }
    }
}

/// Topology statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LinkStats {
    pub isl_links: usize,
    pub gsl_links: usize,
    pub longest_isl_m: f64,
    pub longest_gsl_m: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sat(i: u32) -> SatelliteId {
        SatelliteId(i)
    }

    fn gnd(i: usize) -> GroundId {
        GroundId::from_index(i).unwrap()
    }

    #[test]
    fn test_ground_slot_first() {
        let link = Link::Gsl(GslLink {
            ground: gnd(0),
            satellite: sat(0),
            distance_m: 700_000.0,
        });
        let (first, second) = link.endpoints();
        assert_eq!(first, Endpoint::Ground(gnd(0)));
        assert_eq!(second, Endpoint::Satellite(sat(0)));
    }

    #[test]
    fn test_endpoint_display_keeps_sign() {
        assert_eq!(Endpoint::Ground(gnd(4)).to_string(), "-5");
        assert_eq!(Endpoint::Satellite(sat(0)).to_string(), "0");
    }

    #[test]
    fn test_stats() {
        let topology = Topology::new(
            3,
            vec![
                IslLink {
                    a: sat(0),
                    b: sat(1),
                    distance_m: 10.0,
                },
                IslLink {
                    a: sat(1),
                    b: sat(2),
                    distance_m: 30.0,
                },
            ],
            vec![GslLink {
                ground: gnd(0),
                satellite: sat(2),
                distance_m: 5.0,
            }],
        );
        let stats = topology.stats();
        assert_eq!(stats.isl_links, 2);
        assert_eq!(stats.gsl_links, 1);
        assert_eq!(stats.longest_isl_m, 30.0);
        assert_eq!(stats.longest_gsl_m, 5.0);
        assert_eq!(topology.links().count(), 3);
    }
}
