use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Status notifications a tracking transport may relay to its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSignal {
    CalibrationStarted,
    CalibrationFinished,
    PlayspaceFinished,
}

/// Floor area the user may walk in, room frame (cm). Y is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayBounds {
    pub min: Vec3,
    pub max: Vec3,
    /// Centroid of the collected corners.
    pub center: Vec3,
    /// Distance from `center` to the farthest corner.
    pub radius: f32,
}

impl PlayBounds {
    /// Bounding rectangle of `points` projected onto the floor.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = points.first()?;
        let floor = |p: &Vec3| Vec3::new(p.x, 0.0, p.z);

        let (min, max) = points
            .iter()
            .map(floor)
            .fold((floor(first), floor(first)), |(min, max), p| (min.min(p), max.max(p)));
        let center = points.iter().map(floor).sum::<Vec3>() / points.len() as f32;
        let radius = points
            .iter()
            .map(|p| floor(p).distance(center))
            .fold(0.0_f32, f32::max);

        Some(Self {
            min,
            max,
            center,
            radius,
        })
    }

    /// Inside the rectangle, ignoring height.
    pub fn contains(&self, point: Vec3) -> bool {
        (self.min.x..=self.max.x).contains(&point.x) && (self.min.z..=self.max.z).contains(&point.z)
    }

    /// Inside the circle around `center`, ignoring height.
    pub fn within_radius(&self, point: Vec3) -> bool {
        Vec3::new(point.x, 0.0, point.z).distance(self.center) <= self.radius
    }
}

/// Progress of the play-space setup.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BoundsState {
    /// Not calibrated yet.
    #[default]
    Idle,
    /// Calibrated, waiting for corner samples.
    Collecting(Vec<Vec3>),
    Defined(PlayBounds),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bounds_from_three_corners() {
        let bounds = PlayBounds::from_points(&[
            Vec3::new(-100.0, 170.0, -50.0),
            Vec3::new(100.0, 165.0, -50.0),
            Vec3::new(100.0, 172.0, 100.0),
        ])
        .unwrap();

        assert_eq!(bounds.min, Vec3::new(-100.0, 0.0, -50.0));
        assert_eq!(bounds.max, Vec3::new(100.0, 0.0, 100.0));
        assert_abs_diff_eq!(bounds.center.x, 100.0 / 3.0, epsilon = 1e-4);
        assert_eq!(bounds.center.y, 0.0);
        assert!(bounds.radius > 0.0);

        assert!(bounds.contains(Vec3::new(0.0, 200.0, 0.0)));
        assert!(bounds.contains(Vec3::new(100.0, 0.0, 100.0)));
        assert!(!bounds.contains(Vec3::new(101.0, 0.0, 0.0)));
        assert!(bounds.within_radius(bounds.center + Vec3::new(0.0, 500.0, 0.0)));
        assert!(!bounds.within_radius(Vec3::new(500.0, 0.0, 500.0)));
    }

    #[test]
    fn no_points_no_bounds() {
        assert!(PlayBounds::from_points(&[]).is_none());
    }
}
