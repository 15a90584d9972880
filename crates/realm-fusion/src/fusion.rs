use crate::diagnostics::{Diagnostic, DiagnosticsSink, TracingSink};
use crate::feed::{SensorEvent, SensorFeed};
use crate::heading::{
    compass_heading, heading_delta, heading_from_orientation, heading_quaternion,
    minimal_signed_delta, normalize_heading, orientation_from_tilt,
};
use crate::integrator::AccelerationIntegrator;
use crate::predictor::{CyclicRange, ScalarPredictor, VectorPredictor};
use crate::types::{
    BodyPose, Corrections, FusionOutput, Hand, HandPose, MotionSample, TiltSample, TrackedSample,
    TriggerEvent,
};
use glam::{Quat, Vec3};
use realm_config::{FusionConfig, HoldingMode};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Fallback tilt before the device reports anything: upright, facing forward.
const DEFAULT_ALPHA: f32 = 0.0;
const DEFAULT_BETA: f32 = 90.0;
const DEFAULT_GAMMA: f32 = 0.0;

/// Weight of rotation rate (deg/s) relative to acceleration (m/s^2) in shakiness.
const SHAKINESS_ROTATION_WEIGHT: f32 = 1.0 / 90.0;

/// Heading calibration, captured when the user faces the reference direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationState {
    /// Rotation (degrees) applied to the raw device heading.
    pub heading_offset: f32,
    /// Compass heading minus world heading at calibration time.
    pub heading_divergence: f32,
    /// Slowly accumulated heading drift correction (degrees).
    pub smoothed_drift: f32,
    /// Whether `calibrate` has been called since construction or reset.
    pub calibrated: bool,
}

/// Latest tracker inputs, after staleness filtering.
#[derive(Debug, Clone, Copy, Default)]
struct TrackedPose {
    head: Option<Vec3>,
    heading: Option<f32>,
    left: Option<(Vec3, bool)>,
    right: Option<(Vec3, bool)>,
}

#[derive(Debug, Clone)]
struct HandTrack {
    position: VectorPredictor,
    active: bool,
}

/// Fuses device tilt, device motion and external tracking into a body pose.
///
/// Single threaded: sensor producers push into a [`SensorFeed`], the render
/// loop calls [`update`](Self::update) once per frame which drains the feed
/// and advances the estimate. Missing or stale signals degrade the estimate
/// to dead reckoning, they are never errors.
pub struct PoseFusionEngine {
    config: FusionConfig,
    integrator: AccelerationIntegrator,
    events: Option<mpsc::UnboundedReceiver<SensorEvent>>,
    diagnostics: Box<dyn DiagnosticsSink>,
    /// Sum of all frame deltas (ms). Time base of every predictor.
    clock_ms: f64,

    alpha: ScalarPredictor,
    beta: ScalarPredictor,
    gamma: ScalarPredictor,
    compass: Option<f32>,
    screen_rotation: f32,
    pending_motion: Vec<MotionSample>,

    tracked_head: VectorPredictor,
    tracked_heading: Option<f32>,
    left_track: Option<HandTrack>,
    right_track: Option<HandTrack>,
    last_tracked_ms: Option<f64>,
    stale_reported: bool,

    body: BodyPose,
    /// World-frame velocity (m/s).
    velocity: Vec3,
    last_fused: Option<Quat>,
    calibration: CalibrationState,
    shakiness: f32,
}

impl PoseFusionEngine {
    /// Engine fed through [`ingest`](Self::ingest) only, logging diagnostics via `tracing`.
    pub fn new(config: FusionConfig) -> Self {
        let extrapolate_tilt = config.extrapolate_tilt;
        let horizon = config.max_extrapolation_ms;
        let tilt = |range: CyclicRange| {
            ScalarPredictor::cyclic(range, extrapolate_tilt).with_horizon(horizon)
        };
        Self {
            integrator: AccelerationIntegrator::from_config(&config),
            events: None,
            diagnostics: Box::new(TracingSink),
            clock_ms: 0.0,
            alpha: tilt(CyclicRange::new(0.0, 360.0)),
            beta: tilt(CyclicRange::new(-180.0, 180.0)),
            gamma: tilt(CyclicRange::new(-90.0, 90.0)),
            compass: None,
            screen_rotation: 0.0,
            pending_motion: Vec::new(),
            tracked_head: VectorPredictor::new(config.extrapolate_tracking).with_horizon(horizon),
            tracked_heading: None,
            left_track: None,
            right_track: None,
            last_tracked_ms: None,
            stale_reported: false,
            body: BodyPose::default(),
            velocity: Vec3::ZERO,
            last_fused: None,
            calibration: CalibrationState::default(),
            shakiness: 0.0,
            config,
        }
    }

    /// Engine plus the feed its sensor producers should push into.
    pub fn connect(config: FusionConfig) -> (Self, SensorFeed) {
        let (feed, rx) = SensorFeed::channel();
        let engine = Self::new(config).with_events(rx);
        (engine, feed)
    }

    pub fn with_events(mut self, events: mpsc::UnboundedReceiver<SensorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_diagnostics(mut self, sink: impl DiagnosticsSink + 'static) -> Self {
        self.diagnostics = Box::new(sink);
        self
    }

    pub fn body(&self) -> &BodyPose {
        &self.body
    }

    /// World-frame velocity in m/s.
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    /// Phone position: in front of the eyes along the view direction (cm).
    pub fn device_position(&self) -> Vec3 {
        self.body.head.position
            + self.body.head.orientation * Vec3::new(0.0, 0.0, -self.config.device_head_distance)
    }

    /// Record one sensor event, stamped with the current frame clock.
    pub fn ingest(&mut self, event: SensorEvent) {
        let now = self.clock_ms;
        match event {
            SensorEvent::Orientation(tilt) => self.ingest_tilt(tilt, now),
            SensorEvent::Motion(motion) => {
                if motion.acceleration.is_finite()
                    && motion.rotation_rate.is_finite()
                    && motion.interval.is_finite()
                    && motion.interval >= 0.0
                {
                    self.pending_motion.push(motion);
                } else {
                    self.reject("motion");
                }
            }
            SensorEvent::ScreenRotation { degrees } => {
                if degrees.is_finite() {
                    self.screen_rotation = degrees;
                } else {
                    self.reject("screen_rotation");
                }
            }
            SensorEvent::Tracked(sample) => self.ingest_tracked(sample, now),
        }
    }

    fn ingest_tilt(&mut self, tilt: TiltSample, now: f64) {
        let alpha = self.alpha.feed(tilt.alpha, now);
        let beta = self.beta.feed(tilt.beta, now);
        let gamma = self.gamma.feed(tilt.gamma, now);
        match tilt.compass {
            Some(compass) if compass.is_finite() => self.compass = Some(compass),
            Some(_) => self.reject("compass"),
            // The platform stopped reporting a heading for this orientation.
            None => self.compass = None,
        }
        if !(alpha && beta && gamma) {
            self.reject("orientation");
        }
    }

    fn ingest_tracked(&mut self, sample: TrackedSample, now: f64) {
        // Only a sample that delivered something usable counts as fresh.
        let mut accepted = self.tracked_head.feed(sample.head.position, now);
        if !accepted {
            self.reject("tracked_head");
        }

        self.tracked_heading = match sample.head.orientation {
            Some(q) if q.is_finite() && q.length_squared() > 1e-6 => {
                accepted = true;
                Some(heading_from_orientation(q.normalize()))
            }
            Some(_) => {
                self.reject("tracked_orientation");
                None
            }
            None => None,
        };

        let extrapolate = self.config.extrapolate_tracking;
        let horizon = self.config.max_extrapolation_ms;
        for (hand, tracked) in [(Hand::Left, sample.left), (Hand::Right, sample.right)] {
            let Some(tracked) = tracked else { continue };
            let slot = match hand {
                Hand::Left => &mut self.left_track,
                Hand::Right => &mut self.right_track,
            };
            let track = slot.get_or_insert_with(|| HandTrack {
                position: VectorPredictor::new(extrapolate).with_horizon(horizon),
                active: false,
            });
            track.active = tracked.active;
            if track.position.feed(tracked.position, now) {
                accepted = true;
            } else {
                self.reject("tracked_hand");
            }
        }

        if accepted {
            self.last_tracked_ms = Some(now);
            self.stale_reported = false;
        }
    }

    fn reject(&mut self, source: &'static str) {
        self.diagnostics.record(Diagnostic::RejectedInput { source });
    }

    fn drain_events(&mut self) {
        let Some(mut events) = self.events.take() else {
            return;
        };
        loop {
            match events.try_recv() {
                Ok(event) => self.ingest(event),
                Err(TryRecvError::Empty) => {
                    self.events = Some(events);
                    return;
                }
                Err(TryRecvError::Disconnected) => {
                    self.diagnostics.record(Diagnostic::FeedDisconnected);
                    return;
                }
            }
        }
    }

    fn current_tilt(&self) -> (f32, f32, f32) {
        let now = self.clock_ms;
        (
            self.alpha.predict_or(now, DEFAULT_ALPHA),
            self.beta.predict_or(now, DEFAULT_BETA),
            self.gamma.predict_or(now, DEFAULT_GAMMA),
        )
    }

    fn instantaneous_orientation(&self) -> Quat {
        let (alpha, beta, gamma) = self.current_tilt();
        orientation_from_tilt(alpha, beta, gamma, self.screen_rotation)
    }

    fn tracked_pose(&mut self) -> TrackedPose {
        let Some(last) = self.last_tracked_ms else {
            return TrackedPose::default();
        };

        if let Some(max_age) = self.config.tracked_max_age_ms {
            let age_ms = self.clock_ms - last;
            if age_ms > max_age {
                if !self.stale_reported {
                    self.stale_reported = true;
                    self.diagnostics.record(Diagnostic::TrackingStale { age_ms });
                }
                return TrackedPose::default();
            }
        }

        let now = self.clock_ms;
        let hand = |track: &Option<HandTrack>| {
            track
                .as_ref()
                .and_then(|t| t.position.predict(now).map(|p| (p, t.active)))
        };
        TrackedPose {
            head: self.tracked_head.predict(now),
            heading: self.tracked_heading,
            left: hand(&self.left_track),
            right: hand(&self.right_track),
        }
    }

    /// Compass heading converted into the world frame, when it can be trusted.
    fn compass_world_heading(&self, beta: f32, gamma: f32) -> Option<f32> {
        let compass = self.compass?;
        let (min, max) = self.config.compass_beta_window;
        if beta <= min || beta >= max {
            return None;
        }
        Some(compass_heading(compass, beta, gamma, self.config.holding))
    }

    /// Best absolute heading: the compass when upright enough and calibrated,
    /// otherwise the tracker's estimate.
    fn absolute_heading(&self, tracked_heading: Option<f32>) -> Option<f32> {
        if self.config.compass_correction && self.calibration.calibrated {
            let (_, beta, gamma) = self.current_tilt();
            if let Some(compass) = self.compass_world_heading(beta, gamma) {
                return Some(normalize_heading(compass - self.calibration.heading_divergence));
            }
        }
        tracked_heading
    }

    /// Fold a small part of the current heading error into the drift correction.
    /// Returns the correction applied this tick (degrees).
    fn correct_heading(&mut self, instantaneous: Quat, tracked_heading: Option<f32>) -> f32 {
        let Some(absolute) = self.absolute_heading(tracked_heading) else {
            return 0.0;
        };
        if let Some(limit) = self.config.shakiness_drift_limit {
            if self.shakiness > limit {
                return 0.0;
            }
        }

        // Compare against the last fused output, not the raw device heading,
        // so uncorrected sensor noise does not feed back into the correction.
        let fused = self.last_fused.unwrap_or_else(|| self.compose(instantaneous));
        let relative = heading_from_orientation(fused);
        let correction = heading_delta(relative, absolute) * self.config.heading_convergence;
        self.calibration.smoothed_drift =
            minimal_signed_delta(self.calibration.smoothed_drift + correction);

        self.diagnostics.record(Diagnostic::HeadingDrift {
            relative,
            absolute,
            correction,
            smoothed_drift: self.calibration.smoothed_drift,
        });
        correction
    }

    /// drift * calibration * device, both heading rotations applied in world frame.
    fn compose(&self, instantaneous: Quat) -> Quat {
        let drift = heading_quaternion(self.calibration.smoothed_drift);
        let offset = heading_quaternion(self.calibration.heading_offset);
        (drift * offset * instantaneous).normalize()
    }

    fn remap_acceleration(&self, device: Vec3) -> Vec3 {
        match self.config.holding {
            HoldingMode::Portrait => device,
            HoldingMode::Landscape => Vec3::new(device.y, -device.x, -device.z),
        }
    }

    fn integrate_motion(&mut self, orientation: Quat, tracked_head: Option<Vec3>, dt_ms: f32) {
        let divergence = tracked_head.map(|tracked| tracked.distance(self.device_position()));
        let brake_factor = self.integrator.brake_factor(divergence);

        // A frame that passes without motion samples counts as a still one.
        if self.pending_motion.is_empty() && dt_ms > 0.0 {
            self.shakiness *= 1.0 - self.config.shakiness_smoothing;
        }

        for motion in std::mem::take(&mut self.pending_motion) {
            let acceleration = orientation * self.remap_acceleration(motion.acceleration);
            self.integrator
                .integrate(&mut self.velocity, acceleration, motion.interval, brake_factor);

            let intensity =
                motion.acceleration.length() + motion.rotation_rate.length() * SHAKINESS_ROTATION_WEIGHT;
            self.shakiness += (intensity - self.shakiness) * self.config.shakiness_smoothing;
        }

        if !self.velocity.is_finite() {
            tracing::warn!("Velocity diverged, resetting");
            self.velocity = Vec3::ZERO;
        }
    }

    fn update_hand(
        &mut self,
        hand: Hand,
        tracked: Option<(Vec3, bool)>,
        triggers: &mut Vec<TriggerEvent>,
    ) {
        let convergence = self.config.hand_convergence;
        let slot = match hand {
            Hand::Left => &mut self.body.left,
            Hand::Right => &mut self.body.right,
        };

        let Some((target, active)) = tracked else {
            if let Some(pose) = slot {
                pose.velocity = Vec3::ZERO;
            }
            return;
        };

        let pose = slot.get_or_insert(HandPose {
            position: target,
            velocity: Vec3::ZERO,
            active: false,
        });
        let previous = pose.position;
        pose.position = previous.lerp(target, convergence);
        pose.velocity = pose.position - previous;

        let was_active = pose.active;
        pose.active = active;
        match (was_active, active) {
            (false, true) => triggers.push(TriggerEvent::Trigger(hand)),
            (true, false) => triggers.push(TriggerEvent::TriggerEnd(hand)),
            _ => {}
        }
    }

    /// Advance the estimate by one frame of `dt_ms` milliseconds.
    pub fn update(&mut self, dt_ms: f32) -> FusionOutput {
        let dt_ms = if dt_ms.is_finite() && dt_ms > 0.0 {
            dt_ms
        } else {
            0.0
        };
        self.clock_ms += dt_ms as f64;
        self.drain_events();
        let tracked = self.tracked_pose();

        // Orientation.
        let instantaneous = self.instantaneous_orientation();
        let heading_correction = self.correct_heading(instantaneous, tracked.heading);
        let orientation = self.compose(instantaneous);
        self.body.head.orientation = orientation;
        self.last_fused = Some(orientation);

        // Velocity, rotated into the world with the fused orientation.
        self.integrate_motion(orientation, tracked.head, dt_ms);

        // Pull the device estimate toward the tracker without snapping.
        let position_correction = match tracked.head {
            Some(target) => {
                let gain = (self.config.position_convergence * dt_ms).min(1.0);
                (target - self.device_position()) * gain
            }
            None => Vec3::ZERO,
        };
        self.body.head.position +=
            self.velocity * dt_ms / self.config.velocity_scale + position_correction;

        let mut triggers = Vec::new();
        self.update_hand(Hand::Left, tracked.left, &mut triggers);
        self.update_hand(Hand::Right, tracked.right, &mut triggers);
        for trigger in &triggers {
            tracing::debug!(?trigger, "Hand trigger");
        }

        FusionOutput {
            pose: self.body,
            corrections: Corrections {
                position: position_correction,
                heading: heading_correction,
                shakiness: self.shakiness,
            },
            triggers,
        }
    }

    /// Declare that the user currently faces the reference heading.
    ///
    /// Captures the heading offset for the raw device orientation and the
    /// compass divergence used for later drift correction. Calling it twice
    /// with unchanged input yields the same calibration.
    pub fn calibrate(&mut self) -> CalibrationState {
        let (_, beta, gamma) = self.current_tilt();
        let raw = heading_from_orientation(self.instantaneous_orientation());
        let reference = self.config.reference_heading;

        let heading_offset = heading_delta(raw, reference);
        let heading_divergence = self
            .compass_world_heading(beta, gamma)
            .map(|compass| heading_delta(reference, compass))
            .unwrap_or(0.0);

        self.calibration = CalibrationState {
            heading_offset,
            heading_divergence,
            smoothed_drift: 0.0,
            calibrated: true,
        };
        self.last_fused = None;
        self.diagnostics.record(Diagnostic::Calibrated {
            heading_offset,
            heading_divergence,
        });
        self.calibration
    }

    /// Forget the fused state and calibration. Sensor inputs are kept.
    pub fn reset(&mut self) {
        self.body = BodyPose::default();
        self.velocity = Vec3::ZERO;
        self.last_fused = None;
        self.calibration = CalibrationState::default();
        self.shakiness = 0.0;
        self.pending_motion.clear();
        tracing::info!("Fusion state reset");
    }
}
