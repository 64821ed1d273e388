//! Simulation driver
//!
//! `Idle -> Stepping -> Draining -> Terminated`. Each call to
//! [`Simulation::step`] runs one full tick; request-level routing failures
//! are recorded and never abort a tick.

use crate::animation::{AnimationHandle, AnimationMessage, EdgeList};
use crate::config::SimConfig;
use crate::output::ResultWriter;
use crate::workload::{Request, WorkloadSource};
use crate::{Result, SimError};
use chrono::{DateTime, Utc};
use constellation_net::{
    LinkStats, ResolvedPath, RoutingError, RoutingTable, Topology, TopologyBuilder,
};
use ground_stations::StationRegistry;
use orbital_mechanics::limits::LinkLimits;
use orbital_mechanics::{ConstellationModel, GroundId, PositionSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    Idle,
    Stepping,
    Draining,
    Terminated,
}

/// A request that could not be routed this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFailure {
    pub request: Request,
    pub error: RoutingError,
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub step: u64,
    pub time_s: f64,
    pub links: LinkStats,
    pub requests: usize,
    pub resolved: usize,
    pub attachment_failures: usize,
    pub path_failures: usize,
    pub orphaned_grounds: usize,
}

/// Per-worker totals, written as JSON when the run drains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub worker: usize,
    pub workers: usize,
    pub policy: String,
    pub satellites: usize,
    pub ground_stations: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub requests: u64,
    pub resolved: u64,
    pub attachment_failures: u64,
    pub path_failures: u64,
    pub max_isl_m: f64,
    pub max_gsl_m: f64,
}

impl RunSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.requests += report.requests as u64;
        self.resolved += report.resolved as u64;
        self.attachment_failures += report.attachment_failures as u64;
        self.path_failures += report.path_failures as u64;
    }
}

pub struct Simulation {
    config: SimConfig,
    model: ConstellationModel,
    stations: StationRegistry,
    builder: TopologyBuilder,
    limits: LinkLimits,
    workload: Box<dyn WorkloadSource>,
    writer: ResultWriter,
    animation: Option<AnimationHandle>,
    state: DriverState,
    paused: bool,
    summary: RunSummary,
}

impl Simulation {
    pub fn new(
        config: SimConfig,
        stations: StationRegistry,
        workload: Box<dyn WorkloadSource>,
        animation: Option<AnimationHandle>,
    ) -> Result<Self> {
        config.validate()?;

        let mut model = ConstellationModel::new(config.walker(), config.earth_model())?;
        stations.register(&mut model)?;
        let builder = TopologyBuilder::new(config.shape(), config.links.policy)?;
        let limits = config.link_limits()?;
        let writer = ResultWriter::new(config.run.results.clone())?;

        info!(
            "Constellation {}x{} ({} satellites), policy {}, {} ground stations",
            config.constellation.planes,
            config.constellation.nodes_per_plane,
            model.total_satellites(),
            config.links.policy.name(),
            stations.len()
        );
        info!(
            "Max ISL {:.0} m, max GSL {:.0} m",
            limits.max_isl_m, limits.max_gsl_m
        );

        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            worker: config.run.worker,
            workers: config.run.workers,
            policy: config.links.policy.name().to_string(),
            satellites: model.total_satellites(),
            ground_stations: stations.len(),
            started_at: Utc::now(),
            finished_at: None,
            ticks: 0,
            requests: 0,
            resolved: 0,
            attachment_failures: 0,
            path_failures: 0,
            max_isl_m: limits.max_isl_m,
            max_gsl_m: limits.max_gsl_m,
        };

        Ok(Self {
            config,
            model,
            stations,
            builder,
            limits,
            workload,
            writer,
            animation,
            state: DriverState::Idle,
            paused: false,
            summary,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Forwarded to the animation feed on the next tick.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Runs every step in order, then drains.
    pub fn run(&mut self, steps: &[u64]) -> Result<RunSummary> {
        info!("Running {} steps", steps.len());
        for &step in steps {
            self.step(step)?;
        }
        self.finish()
    }

    pub fn step(&mut self, step: u64) -> Result<TickReport> {
        match self.state {
            DriverState::Idle => self.state = DriverState::Stepping,
            DriverState::Stepping => {}
            state => {
                return Err(SimError::InvalidState {
                    state,
                    action: "step",
                })
            }
        }

        let step_length = self.config.run.step_length_s;
        let time_s = step as f64 * step_length;
        let snapshot = self.model.positions_at(time_s);
        let topology = self.builder.build_snapshot(&snapshot, &self.limits)?;

        let mut report = TickReport {
            step,
            time_s,
            links: topology.stats(),
            requests: 0,
            resolved: 0,
            attachment_failures: 0,
            path_failures: 0,
            orphaned_grounds: 0,
        };

        let mut path_links = Vec::new();
        if self.config.routing.enabled {
            let mut requests = self.workload.requests_between(time_s - step_length, time_s)?;
            if let Some(cap) = self.config.run.request_cap {
                if requests.len() > cap {
                    debug!("Capping {} requests to {}", requests.len(), cap);
                    requests.truncate(cap);
                }
            }

            let grounds: BTreeSet<GroundId> = if self.config.routing.attach_all_stations {
                self.stations.ids().collect()
            } else {
                requests
                    .iter()
                    .flat_map(|r| [r.source, r.destination])
                    .collect()
            };
            let table = RoutingTable::compute(&topology, grounds);

            let mut resolved: Vec<(&Request, ResolvedPath)> = Vec::new();
            let mut failures = Vec::new();
            for request in &requests {
                match table.resolve(request.source, request.destination) {
                    Ok(path) => resolved.push((request, path)),
                    Err(error) => {
                        warn!(
                            "t={} item {} from {} to {}: {}",
                            time_s, request.item, request.source, request.destination, error
                        );
                        match error {
                            RoutingError::AttachmentFailure { .. } => {
                                report.attachment_failures += 1
                            }
                            RoutingError::PathResolutionFailure { .. } => {
                                report.path_failures += 1
                            }
                        }
                        failures.push(RequestFailure {
                            request: request.clone(),
                            error,
                        });
                    }
                }
            }

            report.requests = requests.len();
            report.resolved = resolved.len();
            report.orphaned_grounds = table.attachments.orphaned().len();

            self.writer.write_tick(time_s, &table, &resolved, &failures)?;
            path_links = resolved.iter().map(|(_, path)| path.edges()).collect();
        }

        self.publish_frame(&snapshot, &topology, path_links);
        self.summary.record(&report);

        debug!(
            "Tick {} (t={}): {} ISL, {} GSL, {}/{} requests resolved",
            step,
            time_s,
            report.links.isl_links,
            report.links.gsl_links,
            report.resolved,
            report.requests
        );
        Ok(report)
    }

    fn publish_frame(
        &self,
        snapshot: &PositionSnapshot,
        topology: &Topology,
        path_links: Vec<EdgeList>,
    ) {
        let Some(animation) = &self.animation else {
            return;
        };

        let points = snapshot
            .satellites
            .iter()
            .chain(&snapshot.grounds)
            .copied()
            .collect();
        animation.publish(AnimationMessage::TotalSats(snapshot.satellites.len()));
        animation.publish(AnimationMessage::SatPositions(snapshot.satellites.clone()));
        animation.publish(AnimationMessage::GndPositions(snapshot.grounds.clone()));
        animation.publish(AnimationMessage::Points(points));
        animation.publish(AnimationMessage::Links(
            topology.links().map(|l| l.endpoints()).collect(),
        ));
        animation.publish(AnimationMessage::EnablePathCalculation(
            self.config.routing.enabled,
        ));
        animation.publish(AnimationMessage::PathLinks(path_links));
        animation.publish(AnimationMessage::Pause(self.paused));
        animation.publish(AnimationMessage::CurrentSimulationTime(snapshot.time_s));
    }

    /// Drains the run: writes the summary and stops the animation feed.
    pub fn finish(&mut self) -> Result<RunSummary> {
        match self.state {
            DriverState::Idle | DriverState::Stepping => self.state = DriverState::Draining,
            state => {
                return Err(SimError::InvalidState {
                    state,
                    action: "finish",
                })
            }
        }

        self.summary.finished_at = Some(Utc::now());
        let path: PathBuf = self.writer.write_summary(&self.summary)?;
        info!(
            "Run {} done: {} ticks, {}/{} requests resolved, summary at {:?}",
            self.summary.run_id,
            self.summary.ticks,
            self.summary.resolved,
            self.summary.requests,
            path
        );

        if let Some(animation) = self.animation.take() {
            animation.stop()?;
        }

        self.state = DriverState::Terminated;
        Ok(self.summary.clone())
    }
}
