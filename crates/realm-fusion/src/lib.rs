//! Head and hand pose fusion for a phone-in-headset VR rig.
//!
//! The device's own orientation and motion sensors are combined with an
//! optional external tracker and compass into a drift-corrected [`BodyPose`].

pub mod diagnostics;
pub mod feed;
pub mod fusion;
pub mod heading;
pub mod integrator;
pub mod predictor;
pub mod types;

pub use diagnostics::{Diagnostic, DiagnosticsSink, TracingSink};
pub use feed::{SensorEvent, SensorFeed};
pub use fusion::{CalibrationState, PoseFusionEngine};
pub use integrator::AccelerationIntegrator;
pub use predictor::{CyclicRange, ScalarPredictor, VectorPredictor};
pub use types::*;
