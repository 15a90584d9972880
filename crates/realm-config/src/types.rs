use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pose fusion tuning.
    pub fusion: FusionConfig,
    /// Room-to-game space mapping.
    pub space: SpaceConfig,
}

/// How the phone sits in the headset. Selects the accelerometer axis remap
/// and the compass tilt compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingMode {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Fraction of the tracked-vs-fused position gap closed per millisecond.
    pub position_convergence: f32,
    /// Fraction of the heading error folded into the drift correction per tick.
    /// Keep tiny: visible heading corrections cause motion sickness.
    pub heading_convergence: f32,
    /// Fraction of the gap to the tracked hand position closed per tick.
    pub hand_convergence: f32,
    /// Strength of the velocity braking term (per second).
    pub braking_convergence: f32,
    /// Integrated velocity ceiling in m/s.
    pub max_velocity: f32,
    /// Tracked-vs-fused divergence (cm) at which distance braking saturates.
    pub max_brake_distance: f32,
    /// Divisor converting velocity (m/s) times frame delta (ms) into centimeters.
    pub velocity_scale: f32,
    /// Distance in cm from the eyes to the phone along the view direction.
    pub device_head_distance: f32,
    /// Exclusive device pitch (beta) range in degrees in which the compass is trusted.
    pub compass_beta_window: (f32, f32),
    /// World heading in degrees the user faces while calibrating.
    pub reference_heading: f32,
    /// Correct gyro heading drift against the compass after calibration.
    pub compass_correction: bool,
    /// Linearly extrapolate device tilt angles between samples.
    pub extrapolate_tilt: bool,
    /// Linearly extrapolate tracked positions between samples.
    pub extrapolate_tracking: bool,
    /// Extrapolation stops this long (ms) after the last sample and holds there.
    pub max_extrapolation_ms: f64,
    pub holding: HoldingMode,
    /// Tracked samples older than this are ignored. `None` keeps the last sample forever.
    pub tracked_max_age_ms: Option<f64>,
    /// Smoothing factor of the shakiness moving average.
    pub shakiness_smoothing: f32,
    /// Skip heading drift updates while shakiness exceeds this.
    pub shakiness_drift_limit: Option<f32>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            position_convergence: 0.002,
            heading_convergence: 0.01,
            hand_convergence: 0.1,
            braking_convergence: 1.5,
            max_velocity: 2.0,
            max_brake_distance: 100.0,
            velocity_scale: 10.0,
            device_head_distance: 8.0,
            compass_beta_window: (-90.0, 90.0),
            reference_heading: 90.0,
            compass_correction: true,
            extrapolate_tilt: false,
            extrapolate_tracking: false,
            max_extrapolation_ms: 100.0,
            holding: HoldingMode::Landscape,
            tracked_max_age_ms: None,
            shakiness_smoothing: 0.1,
            shakiness_drift_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Initial translation of the game world relative to the room (cm).
    #[serde(with = "vec3_serde")]
    pub initial_world_position: Vec3,
    /// Initial heading of the game world relative to the room (degrees).
    pub initial_world_rotation: f32,
    /// Nudge the world while the user looks steeply up or down.
    pub recenter: bool,
    /// View pitch in degrees beyond which recentering kicks in.
    pub recenter_pitch: f32,
    /// Recentering speed in cm per millisecond.
    pub recenter_rate: f32,
    /// Head positions collected to define the play space.
    pub bounds_samples: usize,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            initial_world_position: Vec3::ZERO,
            initial_world_rotation: 0.0,
            recenter: false,
            recenter_pitch: 60.0,
            recenter_rate: 0.05,
            bounds_samples: 3,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("compass beta window ({0}, {1}) is empty")]
    EmptyCompassWindow(f32, f32),
    #[error("at least 3 bounds samples are required, got {0}")]
    TooFewBoundsSamples(usize),
}

impl AppConfig {
    /// Reject values the fusion engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fusion.validate()?;
        self.space.validate()
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("position_convergence", self.position_convergence as f64, 0.0, 1.0)?;
        check_range("heading_convergence", self.heading_convergence as f64, 0.0, 1.0)?;
        check_range("hand_convergence", self.hand_convergence as f64, 0.0, 1.0)?;
        check_range("shakiness_smoothing", self.shakiness_smoothing as f64, 0.0, 1.0)?;
        check_range("braking_convergence", self.braking_convergence as f64, 0.0, f64::MAX)?;
        check_range("device_head_distance", self.device_head_distance as f64, 0.0, f64::MAX)?;
        check_positive("max_velocity", self.max_velocity as f64)?;
        check_positive("max_brake_distance", self.max_brake_distance as f64)?;
        check_positive("velocity_scale", self.velocity_scale as f64)?;
        check_finite("reference_heading", self.reference_heading as f64)?;
        check_positive("max_extrapolation_ms", self.max_extrapolation_ms)?;

        let (min, max) = self.compass_beta_window;
        check_finite("compass_beta_window.0", min as f64)?;
        check_finite("compass_beta_window.1", max as f64)?;
        if min >= max {
            return Err(ConfigError::EmptyCompassWindow(min, max));
        }

        if let Some(age) = self.tracked_max_age_ms {
            check_positive("tracked_max_age_ms", age)?;
        }
        if let Some(limit) = self.shakiness_drift_limit {
            check_positive("shakiness_drift_limit", limit as f64)?;
        }
        Ok(())
    }
}

impl SpaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite("initial_world_position.x", self.initial_world_position.x as f64)?;
        check_finite("initial_world_position.y", self.initial_world_position.y as f64)?;
        check_finite("initial_world_position.z", self.initial_world_position.z as f64)?;
        check_finite("initial_world_rotation", self.initial_world_rotation as f64)?;
        check_range("recenter_pitch", self.recenter_pitch as f64, 0.0, 90.0)?;
        check_range("recenter_rate", self.recenter_rate as f64, 0.0, f64::MAX)?;
        if self.bounds_samples < 3 {
            return Err(ConfigError::TooFewBoundsSamples(self.bounds_samples));
        }
        Ok(())
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field, value })
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value <= 0.0 {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min: f64::MIN_POSITIVE,
            max: f64::MAX,
        });
    }
    Ok(())
}

// glam's own serde output is fine, but a bare array reads better in TOML.
mod vec3_serde {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec3, s: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y, v.z].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec3, D::Error> {
        let [x, y, z] = <[f32; 3]>::deserialize(d)?;
        Ok(Vec3::new(x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(AppConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_per_tick_fraction_above_one() {
        let mut config = AppConfig::default();
        config.fusion.hand_convergence = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "hand_convergence",
                ..
            })
        ));
    }

    #[test]
    fn rejects_nan_and_empty_window() {
        let mut config = AppConfig::default();
        config.fusion.max_velocity = f32::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotFinite {
                field: "max_velocity",
                ..
            })
        ));

        let mut config = AppConfig::default();
        config.fusion.compass_beta_window = (30.0, -30.0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyCompassWindow(30.0, -30.0))
        );
    }

    #[test]
    fn rejects_unbounded_extrapolation_horizon() {
        let mut config = AppConfig::default();
        config.fusion.max_extrapolation_ms = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "max_extrapolation_ms",
                ..
            })
        ));

        config.fusion.max_extrapolation_ms = f64::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotFinite {
                field: "max_extrapolation_ms",
                ..
            })
        ));
    }

    #[test]
    fn rejects_too_few_bounds_samples() {
        let mut config = AppConfig::default();
        config.space.bounds_samples = 2;
        assert_eq!(config.validate(), Err(ConfigError::TooFewBoundsSamples(2)));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [fusion]
            max_velocity = 3.5
            holding = "portrait"

            [space]
            initial_world_position = [10.0, 0.0, -20.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.fusion.max_velocity, 3.5);
        assert_eq!(config.fusion.holding, HoldingMode::Portrait);
        assert_eq!(config.fusion.device_head_distance, 8.0);
        assert_eq!(config.space.initial_world_position, Vec3::new(10.0, 0.0, -20.0));
        assert_eq!(config.space.bounds_samples, 3);
    }

    #[test]
    fn toml_round_trip_keeps_optional_fields() {
        let mut config = AppConfig::default();
        config.fusion.tracked_max_age_ms = Some(750.0);
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.fusion.tracked_max_age_ms, Some(750.0));
        assert_eq!(parsed.fusion.shakiness_drift_limit, None);
    }
}
