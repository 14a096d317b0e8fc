//! Bench notes and stability follow-up attached to a formula version

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Stability checkpoints, in days after the start of the test
pub const STABILITY_CHECKPOINTS: &[(&str, i64)] = &[
    ("J0", 0),
    ("J1", 1),
    ("J7", 7),
    ("J15", 15),
    ("J30", 30),
    ("J60", 60),
    ("J90", 90),
];

/// Free-text observations on a formula version
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FormulaNotes {
    #[validate(length(max = 10000))]
    pub protocol: String,
    #[validate(length(max = 2000))]
    pub appearance: String,
    #[validate(length(max = 2000))]
    pub odor: String,
    #[validate(length(max = 50))]
    pub ph: String,
    #[validate(length(max = 2000))]
    pub microscope: String,
    #[validate(length(max = 10000))]
    pub remark: String,
    #[validate(length(max = 2000))]
    pub packaging: String,
    #[validate(length(max = 10000))]
    pub conclusion: String,
    /// Photo per category, as a URL or data URL
    pub photos: BTreeMap<String, String>,
}

impl FormulaNotes {
    /// True when no field carries any text
    pub fn is_empty(&self) -> bool {
        [
            &self.protocol,
            &self.appearance,
            &self.odor,
            &self.ph,
            &self.microscope,
            &self.remark,
            &self.packaging,
            &self.conclusion,
        ]
        .iter()
        .all(|s| s.trim().is_empty())
            && self.photos.is_empty()
    }
}

/// Observation recorded at one stability checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityDay {
    /// Checkpoint label, `J0` to `J90`
    pub day: String,
    pub notes: String,
}

/// Stability test of a formula version
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Stability {
    pub start_date: Option<DateTime<Utc>>,
    #[validate(length(max = 50))]
    pub days: Vec<StabilityDay>,
}

impl Stability {
    /// Start a test at `now` with one empty entry per checkpoint
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            start_date: Some(now),
            days: STABILITY_CHECKPOINTS
                .iter()
                .map(|(day, _)| StabilityDay {
                    day: day.to_string(),
                    notes: String::new(),
                })
                .collect(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.start_date.is_some()
    }

    /// Record the notes of a checkpoint. Unknown labels are ignored.
    pub fn record(&mut self, day: &str, notes: &str) -> bool {
        match self.days.iter_mut().find(|d| d.day == day) {
            Some(entry) => {
                entry.notes = notes.to_string();
                true
            }
            None => false,
        }
    }

    /// Checkpoint the test has reached at `now`.
    ///
    /// A test that has not started is at `J0`. Past `J60` it stays at `J90`.
    pub fn current_checkpoint(&self, now: DateTime<Utc>) -> &'static str {
        let Some(start) = self.start_date else {
            return "J0";
        };
        let elapsed = (now - start).num_days().max(0);
        STABILITY_CHECKPOINTS
            .iter()
            .find(|(_, days)| elapsed <= *days)
            .map(|(label, _)| *label)
            .unwrap_or("J90")
    }
}
