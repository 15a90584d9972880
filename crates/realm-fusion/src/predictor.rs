//! Noisy time-series tracking under irregular sampling.

use glam::Vec3;

/// Half-open cyclic value range `[min, max)`, e.g. compass degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclicRange {
    pub min: f32,
    pub max: f32,
}

impl CyclicRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    fn span(&self) -> f32 {
        self.max - self.min
    }

    /// Wrap `value` into `[min, max)`.
    pub fn wrap(&self, value: f32) -> f32 {
        let wrapped = self.min + (value - self.min).rem_euclid(self.span());
        // rem_euclid can round up to the span itself for tiny negative inputs.
        if wrapped >= self.max {
            self.min
        } else {
            wrapped
        }
    }

    /// Shortest signed step from `from` to `to` along the cycle.
    pub fn shortest_delta(&self, from: f32, to: f32) -> f32 {
        let span = self.span();
        let delta = (to - from).rem_euclid(span);
        if delta > span / 2.0 {
            delta - span
        } else {
            delta
        }
    }
}

/// Last observation of a [`ScalarPredictor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorState {
    pub value: f32,
    pub timestamp_ms: f64,
    /// Units per millisecond. `None` until two samples with distinct timestamps arrived.
    pub rate: Option<f32>,
}

/// Tracks a single scalar series and optionally extrapolates it.
///
/// Naive linear extrapolation of gyroscope angles turned out unstable on real
/// devices, so extrapolation is opt-in; without it `predict` returns the last
/// raw sample.
#[derive(Debug, Clone, Default)]
pub struct ScalarPredictor {
    range: Option<CyclicRange>,
    extrapolate: bool,
    /// Longest stretch (ms) past the last sample that gets extrapolated.
    horizon_ms: Option<f64>,
    state: Option<PredictorState>,
}

impl ScalarPredictor {
    pub fn new(extrapolate: bool) -> Self {
        Self {
            range: None,
            extrapolate,
            horizon_ms: None,
            state: None,
        }
    }

    pub fn cyclic(range: CyclicRange, extrapolate: bool) -> Self {
        Self {
            range: Some(range),
            extrapolate,
            horizon_ms: None,
            state: None,
        }
    }

    /// Stop extrapolating `horizon_ms` after the last sample and hold the
    /// value reached there, so a stalled source cannot run away.
    pub fn with_horizon(mut self, horizon_ms: f64) -> Self {
        self.horizon_ms = Some(horizon_ms);
        self
    }

    /// Record a sample. Non-finite input is ignored.
    ///
    /// Returns whether the sample was accepted.
    pub fn feed(&mut self, value: f32, timestamp_ms: f64) -> bool {
        if !value.is_finite() || !timestamp_ms.is_finite() {
            return false;
        }

        let rate = match self.state {
            Some(prev) => {
                let elapsed = timestamp_ms - prev.timestamp_ms;
                if elapsed > 0.0 {
                    let delta = match self.range {
                        Some(range) => range.shortest_delta(prev.value, value),
                        None => value - prev.value,
                    };
                    Some(delta / elapsed as f32)
                } else {
                    // Same timestamp: keep the previous rate rather than divide by zero.
                    prev.rate
                }
            }
            None => None,
        };

        self.state = Some(PredictorState {
            value,
            timestamp_ms,
            rate,
        });
        true
    }

    /// Best estimate at `now_ms`, or `None` if never fed.
    pub fn predict(&self, now_ms: f64) -> Option<f32> {
        let state = self.state?;
        let rate = match state.rate {
            Some(rate) if self.extrapolate => rate,
            _ => return Some(state.value),
        };

        let mut elapsed = (now_ms - state.timestamp_ms).max(0.0);
        if let Some(horizon) = self.horizon_ms {
            elapsed = elapsed.min(horizon);
        }
        let elapsed = elapsed as f32;
        let value = state.value + rate * elapsed;
        Some(match self.range {
            Some(range) => range.wrap(value),
            None => value,
        })
    }

    pub fn predict_or(&self, now_ms: f64, default: f32) -> f32 {
        self.predict(now_ms).unwrap_or(default)
    }

    pub fn state(&self) -> Option<&PredictorState> {
        self.state.as_ref()
    }
}

/// Three independent scalar predictors tracking a point.
#[derive(Debug, Clone, Default)]
pub struct VectorPredictor {
    x: ScalarPredictor,
    y: ScalarPredictor,
    z: ScalarPredictor,
}

impl VectorPredictor {
    pub fn new(extrapolate: bool) -> Self {
        Self {
            x: ScalarPredictor::new(extrapolate),
            y: ScalarPredictor::new(extrapolate),
            z: ScalarPredictor::new(extrapolate),
        }
    }

    pub fn with_horizon(self, horizon_ms: f64) -> Self {
        Self {
            x: self.x.with_horizon(horizon_ms),
            y: self.y.with_horizon(horizon_ms),
            z: self.z.with_horizon(horizon_ms),
        }
    }

    /// Feed each axis. Returns false if any component was rejected.
    pub fn feed(&mut self, value: Vec3, timestamp_ms: f64) -> bool {
        let x = self.x.feed(value.x, timestamp_ms);
        let y = self.y.feed(value.y, timestamp_ms);
        let z = self.z.feed(value.z, timestamp_ms);
        x && y && z
    }

    /// `None` until every axis has been fed at least once.
    pub fn predict(&self, now_ms: f64) -> Option<Vec3> {
        Some(Vec3::new(
            self.x.predict(now_ms)?,
            self.y.predict(now_ms)?,
            self.z.predict(now_ms)?,
        ))
    }
}
