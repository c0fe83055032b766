use crate::domain::models::{format_clock_time, Activity};
use chrono::NaiveTime;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeField {
    Start,
    End,
}

impl std::fmt::Display for TimeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => f.write_str("start time"),
            Self::End => f.write_str("end time"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeWindowViolation {
    #[error("end time {} must not be earlier than start time {}", clock(.end), clock(.start))]
    EndBeforeStart { start: NaiveTime, end: NaiveTime },
    #[error(
        "{field} {} is earlier than {}, when the previous activity ends",
        clock(.value),
        clock(.earliest)
    )]
    BeforeEarliest {
        field: TimeField,
        value: NaiveTime,
        earliest: NaiveTime,
    },
    #[error(
        "{field} {} is later than {}, when the next activity starts",
        clock(.value),
        clock(.latest)
    )]
    AfterLatest {
        field: TimeField,
        value: NaiveTime,
        latest: NaiveTime,
    },
}

fn clock(time: &NaiveTime) -> String {
    format_clock_time(*time)
}

/// Legal interval for an activity's times, derived from its nearest
/// time-bearing neighbours. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub earliest_start: Option<NaiveTime>,
    pub latest_end: Option<NaiveTime>,
}

impl TimeWindow {
    /// Window for a new activity placed at `index`, i.e. before the activity
    /// currently there. `index == activities.len()` appends.
    pub fn for_insert(activities: &[Activity], index: usize) -> Self {
        let split = index.min(activities.len());
        Self::between(&activities[..split], &activities[split..])
    }

    /// Window for the activity at `index`, ignoring its own times.
    pub fn for_edit(activities: &[Activity], index: usize) -> Self {
        let split = index.min(activities.len());
        let following = activities.get(split + 1..).unwrap_or(&[]);
        Self::between(&activities[..split], following)
    }

    fn between(preceding: &[Activity], following: &[Activity]) -> Self {
        let earliest_start = preceding
            .iter()
            .rev()
            .find_map(|activity| activity.end_time.or(activity.start_time));
        let latest_end = following.iter().find_map(|activity| activity.start_time);
        Self {
            earliest_start,
            latest_end,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.earliest_start.is_none() && self.latest_end.is_none()
    }

    /// Checks the submitted times. Values are never clamped into the window.
    pub fn validate(
        &self,
        start: Option<NaiveTime>,
        end: Option<NaiveTime>,
    ) -> Result<(), TimeWindowViolation> {
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(TimeWindowViolation::EndBeforeStart { start, end });
            }
        }

        for (field, value) in [(TimeField::Start, start), (TimeField::End, end)] {
            let Some(value) = value else {
                continue;
            };
            if let Some(earliest) = self.earliest_start {
                if value < earliest {
                    return Err(TimeWindowViolation::BeforeEarliest {
                        field,
                        value,
                        earliest,
                    });
                }
            }
            if let Some(latest) = self.latest_end {
                if value > latest {
                    return Err(TimeWindowViolation::AfterLatest {
                        field,
                        value,
                        latest,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        match (self.earliest_start, self.latest_end) {
            (Some(earliest), Some(latest)) => format!(
                "{} – {}",
                format_clock_time(earliest),
                format_clock_time(latest)
            ),
            (Some(earliest), None) => format!("after {}", format_clock_time(earliest)),
            (None, Some(latest)) => format!("before {}", format_clock_time(latest)),
            (None, None) => "any time".to_string(),
        }
    }
}
