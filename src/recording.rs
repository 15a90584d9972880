//! Recorded sensor sessions and their frame-by-frame replay.

use realm_fusion::{BodyPose, Corrections, SensorEvent, SensorFeed, TriggerEvent};
use realm_space::{SetupStep, SpaceManager, WorldOffset};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// User action captured alongside the sensor stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Calibrate,
    HeadsetButton,
    /// Place the room in the game world, as a level load would.
    SetWorld(WorldOffset),
}

/// One line of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEntry {
    /// Session time the entry was captured at (ms).
    pub at_ms: f64,
    #[serde(default)]
    pub event: Option<SensorEvent>,
    #[serde(default)]
    pub action: Option<Action>,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("line {line}: invalid entry")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: timestamp {at_ms} is not a finite, non-negative number")]
    BadTimestamp { line: usize, at_ms: f64 },
    #[error("line {line}: entry has neither an event nor an action")]
    Empty { line: usize },
}

/// Parse a JSON-lines recording. Blank lines and `#` comments are skipped.
///
/// Entries are ordered by timestamp; entries sharing one keep file order.
pub fn parse_recording(text: &str) -> Result<Vec<RecordedEntry>, ReplayError> {
    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry: RecordedEntry =
            serde_json::from_str(trimmed).map_err(|source| ReplayError::Parse { line, source })?;
        if !entry.at_ms.is_finite() || entry.at_ms < 0.0 {
            return Err(ReplayError::BadTimestamp {
                line,
                at_ms: entry.at_ms,
            });
        }
        if entry.event.is_none() && entry.action.is_none() {
            return Err(ReplayError::Empty { line });
        }
        entries.push(entry);
    }

    entries.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
    Ok(entries)
}

/// What gets printed for every replayed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub at_ms: f64,
    pub game: BodyPose,
    pub corrections: Corrections,
    pub triggers: Vec<TriggerEvent>,
}

/// Steps a [`SpaceManager`] through a recording at a fixed frame interval.
pub struct Replay {
    pending: VecDeque<RecordedEntry>,
    clock_ms: f64,
    frame_ms: f32,
}

impl Replay {
    pub fn new(entries: Vec<RecordedEntry>, frame_ms: f32) -> Self {
        Self {
            pending: entries.into(),
            clock_ms: 0.0,
            frame_ms,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    /// Advance one frame: deliver every event due by the end of it, run the
    /// manager, then apply the actions that were due.
    pub fn step(&mut self, space: &mut SpaceManager, feed: &SensorFeed) -> FrameReport {
        self.clock_ms += self.frame_ms as f64;

        let mut actions = Vec::new();
        while let Some(entry) = self.pending.front() {
            if entry.at_ms > self.clock_ms {
                break;
            }
            let Some(entry) = self.pending.pop_front() else {
                break;
            };
            if let Some(event) = entry.event {
                feed.send(event);
            }
            actions.extend(entry.action);
        }

        let frame = space.update(self.frame_ms);
        for action in actions {
            match action {
                Action::Calibrate => {
                    space.calibrate();
                }
                Action::HeadsetButton => {
                    let step = space.on_headset_button();
                    if let SetupStep::BoundsDefined(bounds) = step {
                        tracing::info!(radius = bounds.radius, "Replay defined play space");
                    }
                }
                Action::SetWorld(world) => space.set_world(world),
            }
        }

        FrameReport {
            at_ms: self.clock_ms,
            game: frame.game,
            corrections: frame.corrections,
            triggers: frame.triggers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_config::{FusionConfig, SpaceConfig};
    use realm_fusion::PoseFusionEngine;

    const SESSION: &str = r#"
# upright, facing forward
{"at_ms": 0, "event": {"type": "orientation", "alpha": 0, "beta": 90, "gamma": 0}}
{"at_ms": 10, "event": {"type": "tracked", "head": {"position": [0, 160, -50]}, "left": {"position": [-20, 120, -40], "active": true}}}

{"at_ms": 20, "action": "headset_button"}
{"at_ms": 5, "event": {"type": "screen_rotation", "degrees": 0}}
"#;

    #[test]
    fn parses_and_orders_entries() {
        let entries = parse_recording(SESSION).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].at_ms, 5.0);
        assert!(matches!(
            entries[1].event,
            Some(SensorEvent::ScreenRotation { degrees }) if degrees == 0.0
        ));
        assert_eq!(entries[3].action, Some(Action::HeadsetButton));
    }

    #[test]
    fn reports_line_of_bad_entry() {
        let err = parse_recording("# header\n{\"at_ms\": 0, \"action\": \"calibrate\"}\nnot json\n")
            .unwrap_err();
        assert!(matches!(err, ReplayError::Parse { line: 3, .. }));

        let err = parse_recording("{\"at_ms\": 3}").unwrap_err();
        assert!(matches!(err, ReplayError::Empty { line: 1 }));

        let err = parse_recording("{\"at_ms\": -1, \"action\": \"calibrate\"}").unwrap_err();
        assert!(matches!(err, ReplayError::BadTimestamp { line: 1, .. }));
    }

    #[test]
    fn replay_drives_the_manager() {
        let (engine, feed) = PoseFusionEngine::connect(FusionConfig::default());
        let mut space = SpaceManager::new(engine, SpaceConfig::default());
        let mut replay = Replay::new(parse_recording(SESSION).unwrap(), 16.0);

        let first = replay.step(&mut space, &feed);
        assert_eq!(first.at_ms, 16.0);
        assert!(first.corrections.position.length() > 0.0);
        // A hand that shows up pressed counts as a press.
        assert_eq!(first.triggers, vec![TriggerEvent::Trigger(realm_fusion::Hand::Left)]);
        assert!(first.game.left.is_some());
        assert!(!space.engine().calibration().calibrated);

        let second = replay.step(&mut space, &feed);
        assert_eq!(second.at_ms, 32.0);
        assert!(space.engine().calibration().calibrated);
        assert!(replay.is_finished());
    }

    #[test]
    fn replay_moves_the_world() {
        let session = r#"
{"at_ms": 0, "event": {"type": "tracked", "head": {"position": [0, 0, 0]}}}
{"at_ms": 20, "action": {"set_world": {"position": [0, 0, 50], "rotation": 0}}}
"#;
        let entries = parse_recording(session).unwrap();
        assert!(matches!(entries[1].action, Some(Action::SetWorld(_))));

        let config = FusionConfig {
            device_head_distance: 0.0,
            ..FusionConfig::default()
        };
        let (engine, feed) = PoseFusionEngine::connect(config);
        let mut space = SpaceManager::new(engine, SpaceConfig::default());
        let mut replay = Replay::new(entries, 16.0);

        let first = replay.step(&mut space, &feed);
        assert_eq!(first.game.head.position.z, 0.0);
        replay.step(&mut space, &feed);
        assert_eq!(space.world().position.z, 50.0);

        let third = replay.step(&mut space, &feed);
        assert_eq!(third.game.head.position.z, -50.0);
    }
}
