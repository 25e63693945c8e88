//! Learning units, per-student progress, and unit unlock sequencing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

/// A learning unit of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_unit_type")]
    pub unit_type: String,
    /// Estimated duration in minutes.
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    /// Position within the course; lower comes first.
    #[serde(default)]
    pub order: i64,
    /// Content blocks of the unit, in display order.
    #[serde(default)]
    pub content: Vec<JsonValue>,
}

/// A unit with its layout, as returned by `GET /api/unit/{unit_id}/content`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitContent {
    #[serde(flatten)]
    pub unit: Unit,
    pub structure: Option<JsonValue>,
}

fn default_unit_type() -> String {
    "lesson".to_owned()
}

fn default_duration() -> u32 {
    30
}

/// A student's progress on one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitProgress {
    pub completion_percentage: u8,
    pub score: f64,
    pub completed: bool,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<OffsetDateTime>,
}

impl UnitProgress {
    /// Fold another record for the same unit into this one.
    ///
    /// Completion never goes backwards: `completed` is sticky, score and
    /// percentage keep their maximum, and `last_updated` keeps the latest time.
    pub fn absorb(&mut self, other: &Self) {
        self.completed |= other.completed;
        self.completion_percentage = self.completion_percentage.max(other.completion_percentage);
        self.score = self.score.max(other.score);
        self.last_updated = self.last_updated.max(other.last_updated);
    }
}

/// A unit as shown to a student: the unit, whether it is open, and progress so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    #[serde(flatten)]
    pub unit: Unit,
    pub unlocked: bool,
    pub progress: UnitProgress,
}

/// Order units and decide which are open.
///
/// Units are sorted by `order` (ties keep their input order). The first unit
/// is always unlocked; every later unit is unlocked iff the unit before it is
/// completed. Units without a progress record start at zero progress.
#[must_use]
pub fn unlock_sequence(
    mut units: Vec<Unit>,
    progress: &HashMap<String, UnitProgress>,
) -> Vec<UnitView> {
    units.sort_by_key(|unit| unit.order);

    let mut previous_completed = true;
    units
        .into_iter()
        .map(|unit| {
            let unit_progress = progress.get(&unit.id).cloned().unwrap_or_default();
            let unlocked = previous_completed;
            previous_completed = unit_progress.completed;
            UnitView {
                unit,
                unlocked,
                progress: unit_progress,
            }
        })
        .collect()
}

/// Body of `POST /api/progress/update`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub unit_id: String,
    pub content_id: String,
    pub completed: bool,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub completion_percentage: Option<u8>,
}

/// Why a progress update was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidProgress {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("score {0} is outside 0-100")]
    ScoreOutOfRange(f64),

    #[error("completion percentage {0} is above 100")]
    PercentageOutOfRange(u8),
}

impl ProgressUpdate {
    /// # Errors
    ///
    /// Returns [`InvalidProgress`] for empty ids, a non-finite or out-of-range
    /// score, or a percentage above 100.
    pub fn validate(&self) -> Result<(), InvalidProgress> {
        if self.unit_id.trim().is_empty() {
            return Err(InvalidProgress::EmptyField("unitId"));
        }
        if self.content_id.trim().is_empty() {
            return Err(InvalidProgress::EmptyField("contentId"));
        }
        if let Some(score) = self.score
            && !(score.is_finite() && (0.0..=100.0).contains(&score))
        {
            return Err(InvalidProgress::ScoreOutOfRange(score));
        }
        if let Some(percentage) = self.completion_percentage
            && percentage > 100
        {
            return Err(InvalidProgress::PercentageOutOfRange(percentage));
        }
        Ok(())
    }

    /// Percentage to record: explicit value, else 100 when completed, else 0.
    #[must_use]
    pub fn effective_percentage(&self) -> u8 {
        self.completion_percentage
            .unwrap_or(if self.completed { 100 } else { 0 })
    }
}

/// A progress update attributed to a student and course, ready for the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub student_id: String,
    pub course_id: Option<String>,
    pub unit_id: String,
    pub content_id: String,
    pub completion_percentage: u8,
    pub score: Option<f64>,
    pub completed: bool,
    pub recorded_at: OffsetDateTime,
}

impl ProgressRecord {
    #[must_use]
    pub fn new(student_id: &str, course_id: Option<&str>, update: ProgressUpdate) -> Self {
        Self {
            student_id: student_id.to_owned(),
            course_id: course_id.map(str::to_owned),
            completion_percentage: update.effective_percentage(),
            unit_id: update.unit_id,
            content_id: update.content_id,
            score: update.score,
            completed: update.completed,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Gateway acknowledgement of a stored progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReceipt {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}
