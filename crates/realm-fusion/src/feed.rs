use crate::types::{MotionSample, TiltSample, TrackedSample};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Input delivered by the device sensors or the tracking transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Orientation(TiltSample),
    Motion(MotionSample),
    ScreenRotation { degrees: f32 },
    Tracked(TrackedSample),
}

/// Sending half of the engine's sensor channel.
///
/// Sensor callbacks only push here, they never drive the engine. Cloning is
/// cheap; the engine falls back to dead reckoning once every clone is dropped.
#[derive(Debug, Clone)]
pub struct SensorFeed {
    tx: mpsc::UnboundedSender<SensorEvent>,
}

impl SensorFeed {
    /// Create a feed and the receiver the engine drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SensorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Push an event. Returns false once the engine is gone.
    pub fn send(&self, event: SensorEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn orientation(&self, alpha: f32, beta: f32, gamma: f32, compass: Option<f32>) -> bool {
        self.send(SensorEvent::Orientation(TiltSample {
            alpha,
            beta,
            gamma,
            compass,
        }))
    }

    pub fn motion(&self, acceleration: Vec3, rotation_rate: Vec3, interval: f32) -> bool {
        self.send(SensorEvent::Motion(MotionSample {
            acceleration,
            rotation_rate,
            interval,
        }))
    }

    pub fn screen_rotation(&self, degrees: f32) -> bool {
        self.send(SensorEvent::ScreenRotation { degrees })
    }

    pub fn tracked(&self, sample: TrackedSample) -> bool {
        self.send(SensorEvent::Tracked(sample))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
