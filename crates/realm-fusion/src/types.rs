use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Device tilt reading, the angles a phone reports for its orientation (degrees).
///
/// Any field may be NaN when the platform fails to fill it in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TiltSample {
    /// Rotation about the device Z axis, 0..360.
    pub alpha: f32,
    /// Front-to-back tilt, -180..180.
    pub beta: f32,
    /// Left-to-right tilt, -90..90.
    pub gamma: f32,
    /// Absolute compass heading (clockwise from north) when the platform has one.
    #[serde(default)]
    pub compass: Option<f32>,
}

/// Linear motion reading from the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Acceleration without gravity, device frame (m/s^2).
    pub acceleration: Vec3,
    /// Rotation rate, device frame (deg/s).
    #[serde(default)]
    pub rotation_rate: Vec3,
    /// Seconds since the previous motion sample.
    pub interval: f32,
}

/// Absolute body estimate from the external optical tracker.
///
/// Positions are in the tracker's room frame (cm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedSample {
    pub head: TrackedHead,
    #[serde(default)]
    pub left: Option<TrackedHand>,
    #[serde(default)]
    pub right: Option<TrackedHand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedHead {
    /// Position of the headset marker, room frame.
    pub position: Vec3,
    /// Headset orientation when the tracker can estimate it.
    #[serde(default)]
    pub orientation: Option<Quat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedHand {
    /// Hand marker position, room frame.
    pub position: Vec3,
    /// Trigger pressed.
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Left,
    Right,
}

/// Edge transitions of a hand's trigger flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Trigger(Hand),
    TriggerEnd(Hand),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Eye point, room frame (cm).
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for HeadPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HandPose {
    /// Room frame (cm).
    pub position: Vec3,
    /// Position change over the last tick (cm per tick).
    pub velocity: Vec3,
    pub active: bool,
}

/// Best estimate of the user's body. Hands are `None` until the tracker reports them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyPose {
    pub head: HeadPose,
    pub left: Option<HandPose>,
    pub right: Option<HandPose>,
}

/// Potentially disorienting corrections applied during the last tick, so a
/// renderer can choose to hide them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Corrections {
    /// Room frame (cm).
    pub position: Vec3,
    /// Heading drift correction applied this tick (degrees).
    pub heading: f32,
    /// Smoothed motion intensity.
    pub shakiness: f32,
}

/// Result of one fusion tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FusionOutput {
    pub pose: BodyPose,
    pub corrections: Corrections,
    pub triggers: Vec<TriggerEvent>,
}
