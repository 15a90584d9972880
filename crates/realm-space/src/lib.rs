//! Maps the fused room-frame body pose into a movable game-world frame and
//! runs the headset-button setup flow (calibration, then play-space corners).

pub mod bounds;

pub use bounds::{BoundsState, PlayBounds, StatusSignal};

use glam::{Quat, Vec3};
use realm_config::SpaceConfig;
use realm_fusion::heading::{heading_from_orientation, heading_quaternion, normalize_heading};
use realm_fusion::{BodyPose, CalibrationState, Corrections, HandPose, PoseFusionEngine, TriggerEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Placement of the room inside the game world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldOffset {
    /// Game-frame translation subtracted after rotating (cm).
    pub position: Vec3,
    /// Heading of the room in the game world (degrees).
    pub rotation: f32,
}

impl WorldOffset {
    pub fn quaternion(&self) -> Quat {
        heading_quaternion(-self.rotation)
    }

    pub fn game_position(&self, room: Vec3) -> Vec3 {
        self.quaternion() * room - self.position
    }

    pub fn game_orientation(&self, room: Quat) -> Quat {
        (self.quaternion() * room).normalize()
    }

    pub fn game_pose(&self, room: &BodyPose) -> BodyPose {
        let rotation = self.quaternion();
        let hand = |hand: &HandPose| HandPose {
            position: self.game_position(hand.position),
            velocity: rotation * hand.velocity,
            active: hand.active,
        };

        let mut game = *room;
        game.head.position = self.game_position(room.head.position);
        game.head.orientation = self.game_orientation(room.head.orientation);
        game.left = room.left.as_ref().map(hand);
        game.right = room.right.as_ref().map(hand);
        game
    }
}

/// One frame of the space manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceFrame {
    pub room: BodyPose,
    pub game: BodyPose,
    pub corrections: Corrections,
    pub triggers: Vec<TriggerEvent>,
}

/// What a headset button press did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetupStep {
    Calibrated,
    SampleCollected { collected: usize, required: usize },
    BoundsDefined(PlayBounds),
    /// Setup already finished.
    Ignored,
}

/// Owns the fusion engine and places its output in the game world.
pub struct SpaceManager {
    engine: PoseFusionEngine,
    config: SpaceConfig,
    world: WorldOffset,
    bounds: BoundsState,
    status_tx: Option<mpsc::UnboundedSender<StatusSignal>>,
}

impl SpaceManager {
    pub fn new(engine: PoseFusionEngine, config: SpaceConfig) -> Self {
        let world = WorldOffset {
            position: config.initial_world_position,
            rotation: config.initial_world_rotation,
        };
        Self {
            engine,
            config,
            world,
            bounds: BoundsState::Idle,
            status_tx: None,
        }
    }

    /// Relay setup progress to a transport.
    pub fn with_status(mut self, status_tx: mpsc::UnboundedSender<StatusSignal>) -> Self {
        self.status_tx = Some(status_tx);
        self
    }

    pub fn engine(&self) -> &PoseFusionEngine {
        &self.engine
    }

    pub fn world(&self) -> WorldOffset {
        self.world
    }

    pub fn set_world(&mut self, world: WorldOffset) {
        self.world = world;
    }

    /// Move the room within the game world (game frame, cm).
    pub fn translate(&mut self, delta: Vec3) {
        self.world.position += delta;
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.world.rotation = normalize_heading(self.world.rotation + degrees);
    }

    pub fn play_bounds(&self) -> Option<&PlayBounds> {
        match &self.bounds {
            BoundsState::Defined(bounds) => Some(bounds),
            _ => None,
        }
    }

    fn signal(&self, signal: StatusSignal) {
        if let Some(tx) = &self.status_tx {
            if tx.send(signal).is_err() {
                debug!(?signal, "Status receiver dropped");
            }
        }
    }

    /// Calibrate the engine, then wait for play-space corner samples.
    pub fn calibrate(&mut self) -> CalibrationState {
        self.signal(StatusSignal::CalibrationStarted);
        let state = self.engine.calibrate();
        self.signal(StatusSignal::CalibrationFinished);
        self.bounds = BoundsState::Collecting(Vec::with_capacity(self.config.bounds_samples));
        info!(required = self.config.bounds_samples, "Calibrated, collecting play-space corners");
        state
    }

    /// Record the current head position as a play-space corner.
    ///
    /// Returns the bounds once enough corners are collected, `None` before
    /// that or when not collecting.
    pub fn collect_bounds_sample(&mut self) -> Option<PlayBounds> {
        let BoundsState::Collecting(points) = &mut self.bounds else {
            debug!("Ignoring bounds sample, not collecting");
            return None;
        };

        let head = self.engine.body().head.position;
        points.push(Vec3::new(head.x, 0.0, head.z));
        debug!(collected = points.len(), ?head, "Play-space corner");
        if points.len() < self.config.bounds_samples {
            return None;
        }

        let bounds = PlayBounds::from_points(points)?;
        self.bounds = BoundsState::Defined(bounds);
        self.signal(StatusSignal::PlayspaceFinished);
        info!(min = ?bounds.min, max = ?bounds.max, radius = bounds.radius, "Play space defined");
        Some(bounds)
    }

    /// Headset button: the first press calibrates, the following presses mark corners.
    pub fn on_headset_button(&mut self) -> SetupStep {
        match self.bounds {
            BoundsState::Idle => {
                self.calibrate();
                SetupStep::Calibrated
            }
            BoundsState::Collecting(_) => match self.collect_bounds_sample() {
                Some(bounds) => SetupStep::BoundsDefined(bounds),
                None => SetupStep::SampleCollected {
                    collected: match &self.bounds {
                        BoundsState::Collecting(points) => points.len(),
                        _ => 0,
                    },
                    required: self.config.bounds_samples,
                },
            },
            BoundsState::Defined(_) => SetupStep::Ignored,
        }
    }

    /// Nudge the world against the horizontal view direction while the user
    /// looks steeply up or down.
    fn recenter(&mut self, game_orientation: Quat, dt_ms: f32) {
        let forward = game_orientation * Vec3::NEG_Z;
        let pitch = forward.y.clamp(-1.0, 1.0).asin().to_degrees();
        if pitch.abs() <= self.config.recenter_pitch {
            return;
        }
        let heading = heading_from_orientation(game_orientation);
        let horizontal = heading_quaternion(heading) * Vec3::NEG_Z;
        self.world.position -= horizontal * self.config.recenter_rate * dt_ms;
    }

    /// Advance the engine one frame and map its pose into the game world.
    pub fn update(&mut self, dt_ms: f32) -> SpaceFrame {
        let output = self.engine.update(dt_ms);

        if self.config.recenter && dt_ms.is_finite() && dt_ms > 0.0 {
            let orientation = self.world.game_orientation(output.pose.head.orientation);
            self.recenter(orientation, dt_ms);
        }

        SpaceFrame {
            room: output.pose,
            game: self.world.game_pose(&output.pose),
            corrections: output.corrections,
            triggers: output.triggers,
        }
    }
}
