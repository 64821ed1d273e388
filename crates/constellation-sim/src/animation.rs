//! Animation feed
//!
//! The driver publishes tick state over an unbounded channel and never waits
//! on the consumer. The consumer runs on its own thread: a listener task
//! folds incoming messages into a [`ViewState`] (last write wins, per field)
//! while the foreground loop renders the latest view at a fixed interval.

use crate::{Result, SimError};
use constellation_net::Endpoint;
use orbital_mechanics::Position;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

pub type EdgeList = Vec<(Endpoint, Endpoint)>;

#[derive(Debug, Clone, PartialEq)]
pub enum AnimationMessage {
    SatPositions(Vec<Position>),
    GndPositions(Vec<Position>),
    Links(EdgeList),
    /// Satellites followed by grounds, for point-cloud rendering.
    Points(Vec<Position>),
    TotalSats(usize),
    EnablePathCalculation(bool),
    /// One edge list per resolved request.
    PathLinks(Vec<EdgeList>),
    Pause(bool),
    CurrentSimulationTime(f64),
    Stop,
}

/// Latest value of every animated field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub sat_positions: Vec<Position>,
    pub gnd_positions: Vec<Position>,
    pub links: EdgeList,
    pub points: Vec<Position>,
    pub total_sats: usize,
    pub enable_path_calculation: bool,
    pub path_links: Vec<EdgeList>,
    pub paused: bool,
    pub current_simulation_time: f64,
}

impl ViewState {
    /// Returns `false` once the feed is stopped.
    pub fn apply(&mut self, message: AnimationMessage) -> bool {
        match message {
            AnimationMessage::SatPositions(p) => self.sat_positions = p,
            AnimationMessage::GndPositions(p) => self.gnd_positions = p,
            AnimationMessage::Links(l) => self.links = l,
            AnimationMessage::Points(p) => self.points = p,
            AnimationMessage::TotalSats(n) => self.total_sats = n,
            AnimationMessage::EnablePathCalculation(b) => self.enable_path_calculation = b,
            AnimationMessage::PathLinks(l) => self.path_links = l,
            AnimationMessage::Pause(b) => self.paused = b,
            AnimationMessage::CurrentSimulationTime(t) => self.current_simulation_time = t,
            AnimationMessage::Stop => return false,
        }
        true
    }
}

pub trait Renderer: Send + 'static {
    fn render(&mut self, view: &ViewState);
}

/// Headless renderer that logs each new simulation time once.
#[derive(Debug, Default)]
pub struct LogRenderer {
    last_time: Option<f64>,
}

impl Renderer for LogRenderer {
    fn render(&mut self, view: &ViewState) {
        if self.last_time == Some(view.current_simulation_time) {
            return;
        }
        self.last_time = Some(view.current_simulation_time);
        info!(
            time_s = view.current_simulation_time,
            satellites = view.total_sats,
            grounds = view.gnd_positions.len(),
            links = view.links.len(),
            paths = view.path_links.len(),
            paused = view.paused,
            "frame"
        );
    }
}

/// Producer side of the feed, owned by the driver.
#[derive(Debug)]
pub struct AnimationHandle {
    tx: mpsc::UnboundedSender<AnimationMessage>,
    consumer: Option<JoinHandle<Result<()>>>,
}

impl AnimationHandle {
    pub fn spawn<R: Renderer>(renderer: R, frame_interval: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = std::thread::Builder::new()
            .name("leo-animation".to_string())
            .spawn(move || -> Result<()> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()?;
                runtime.block_on(consume(rx, renderer, frame_interval));
                Ok(())
            })?;

        info!("Animation consumer started ({:?} frame interval)", frame_interval);
        Ok(Self {
            tx,
            consumer: Some(consumer),
        })
    }

    /// Never blocks. Messages sent after the consumer exited are dropped.
    pub fn publish(&self, message: AnimationMessage) {
        if self.tx.send(message).is_err() {
            debug!("Animation consumer gone, dropping message");
        }
    }

    /// Sends `Stop` and waits for the consumer to render its last frame.
    pub fn stop(mut self) -> Result<()> {
        self.publish(AnimationMessage::Stop);
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        match self.consumer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SimError::AnimationPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for AnimationHandle {
    fn drop(&mut self) {
        if self.consumer.is_some() {
            self.publish(AnimationMessage::Stop);
            if let Err(e) = self.join() {
                warn!("Animation consumer ended with error: {}", e);
            }
        }
    }
}

async fn consume<R: Renderer>(
    mut rx: mpsc::UnboundedReceiver<AnimationMessage>,
    mut renderer: R,
    frame_interval: Duration,
) {
    let view = Arc::new(RwLock::new(ViewState::default()));

    let listener_view = Arc::clone(&view);
    let mut listener = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if !listener_view.write().await.apply(message) {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(frame_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                renderer.render(&*view.read().await);
            }
            _ = &mut listener => {
                renderer.render(&*view.read().await);
                break;
            }
        }
    }
    debug!("Animation consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbital_mechanics::{GroundId, SatelliteId};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<ViewState>>>);

    impl Renderer for Recorder {
        fn render(&mut self, view: &ViewState) {
            self.0.lock().unwrap().push(view.clone());
        }
    }

    #[test]
    fn test_fields_overwrite_independently() {
        let mut view = ViewState::default();
        assert!(view.apply(AnimationMessage::TotalSats(4)));
        assert!(view.apply(AnimationMessage::CurrentSimulationTime(1.0)));
        assert!(view.apply(AnimationMessage::CurrentSimulationTime(2.0)));
        assert!(!view.apply(AnimationMessage::Stop));
        assert_eq!(view.total_sats, 4);
        assert_eq!(view.current_simulation_time, 2.0);
    }

    #[test]
    fn test_final_frame_sees_last_state() {
        let recorder = Recorder::default();
        let handle = AnimationHandle::spawn(recorder.clone(), Duration::from_millis(5)).unwrap();

        let edge = (
            Endpoint::Ground(GroundId::from_index(0).unwrap()),
            Endpoint::Satellite(SatelliteId(3)),
        );
        for t in 0..10 {
            handle.publish(AnimationMessage::CurrentSimulationTime(t as f64));
        }
        handle.publish(AnimationMessage::Links(vec![edge]));
        handle.publish(AnimationMessage::Pause(true));
        handle.stop().unwrap();

        let frames = recorder.0.lock().unwrap();
        let last = frames.last().unwrap();
        assert_eq!(last.current_simulation_time, 9.0);
        assert_eq!(last.links, vec![edge]);
        assert!(last.paused);
    }

    #[test]
    fn test_drop_stops_consumer() {
        let recorder = Recorder::default();
        let handle = AnimationHandle::spawn(recorder.clone(), Duration::from_millis(5)).unwrap();
        handle.publish(AnimationMessage::TotalSats(7));
        drop(handle);
        assert_eq!(recorder.0.lock().unwrap().last().unwrap().total_sats, 7);
    }
}
