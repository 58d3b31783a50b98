//! Rule-based decision engine.
//!
//! `PathPlanner::plan` maps one frame's detections to one `Decision`. It is a
//! pure function of its thresholds and input: no state survives between calls.
//!
//! Rules, in order:
//! 1. No detections: `FORWARD` ("No obstacles detected").
//! 2. Detections scoring below `min_confidence` are ignored.
//! 3. The first remaining detection (input order) that is both large and
//!    central stops the platform immediately.
//! 4. Otherwise detections left of the dead zone block the left side, right
//!    of it the right side; the side flags pick the turn.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::detect::Detection;
use crate::NavError;

/// Left edge of the dead zone. Centers below it block the left side.
pub const LEFT_ZONE_EDGE: f32 = 0.4;
/// Right edge of the dead zone. Centers above it block the right side.
pub const RIGHT_ZONE_EDGE: f32 = 0.6;

/// Navigation action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavAction {
    Forward,
    TurnLeft,
    TurnRight,
    Stop,
}

impl NavAction {
    pub const ALL: [NavAction; 4] = [
        NavAction::Forward,
        NavAction::TurnLeft,
        NavAction::TurnRight,
        NavAction::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NavAction::Forward => "FORWARD",
            NavAction::TurnLeft => "TURN_LEFT",
            NavAction::TurnRight => "TURN_RIGHT",
            NavAction::Stop => "STOP",
        }
    }
}

impl std::fmt::Display for NavAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavAction {
    type Err = NavError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NavAction::ALL
            .into_iter()
            .find(|action| action.as_str() == value.trim())
            .ok_or_else(|| NavError::UnknownAction(value.to_string()))
    }
}

/// One cycle's output: the action plus which rule produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: NavAction,
    pub reasoning: String,
}

impl Decision {
    pub fn new(action: NavAction, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            reasoning: reasoning.into(),
        }
    }
}

/// Planner thresholds, fixed per planner instance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannerThresholds {
    /// Box area (fraction of the frame) above which an object is "close".
    pub stop_area_threshold: f32,
    /// Max distance of the box center from 0.5 for an object to be "ahead".
    pub center_threshold: f32,
    /// Detections scoring below this are ignored.
    pub min_confidence: f32,
}

impl Default for PlannerThresholds {
    fn default() -> Self {
        Self {
            stop_area_threshold: 0.15,
            center_threshold: 0.15,
            min_confidence: 0.5,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PathPlanner {
    thresholds: PlannerThresholds,
}

impl PathPlanner {
    pub fn new(thresholds: PlannerThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &PlannerThresholds {
        &self.thresholds
    }

    pub fn plan(&self, detections: &[Detection]) -> Decision {
        if detections.is_empty() {
            return Decision::new(NavAction::Forward, "No obstacles detected");
        }

        let confident = || {
            detections
                .iter()
                .filter(|det| det.score >= self.thresholds.min_confidence)
        };

        // First match in input order wins, not the largest or most confident.
        if let Some(det) = confident().find(|det| self.blocks_path(det)) {
            return Decision::new(
                NavAction::Stop,
                format!("Obstacle ({}) directly ahead", det.class_name),
            );
        }

        let mut left_blocked = false;
        let mut right_blocked = false;
        for det in confident() {
            let center_x = det.bbox.center_x();
            if center_x < LEFT_ZONE_EDGE {
                left_blocked = true;
            } else if center_x > RIGHT_ZONE_EDGE {
                right_blocked = true;
            }
        }

        match (left_blocked, right_blocked) {
            (true, false) => Decision::new(NavAction::TurnRight, "Obstacle on left side"),
            (false, true) => Decision::new(NavAction::TurnLeft, "Obstacle on right side"),
            (true, true) => Decision::new(NavAction::Stop, "Obstacles on both sides"),
            (false, false) => Decision::new(NavAction::Forward, "Path clear"),
        }
    }

    fn blocks_path(&self, det: &Detection) -> bool {
        det.bbox.area() > self.thresholds.stop_area_threshold
            && (det.bbox.center_x() - 0.5).abs() < self.thresholds.center_threshold
    }
}
