use crate::domain::models::{Activity, ActivityId, DayId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainIntegrityError {
    #[error("activity chain for day {day_id} revisits activity {activity_id}")]
    Cycle { day_id: DayId, activity_id: ActivityId },
    #[error("activity chain for day {day_id} walked {walked} nodes but only {total} records exist")]
    Unterminated {
        day_id: DayId,
        walked: usize,
        total: usize,
    },
    #[error("activity chain for day {day_id} points at missing activity {activity_id}")]
    DanglingPointer { day_id: DayId, activity_id: ActivityId },
    #[error("activity {activity_id} belongs to day {actual_day_id}, not day {day_id}")]
    ForeignRecord {
        day_id: DayId,
        activity_id: ActivityId,
        actual_day_id: DayId,
    },
    #[error("activity chain for day {day_id} has {heads} head records")]
    AmbiguousHead { day_id: DayId, heads: usize },
    #[error("activity {activity_id} appears more than once in the records of day {day_id}")]
    DuplicateRecord { day_id: DayId, activity_id: ActivityId },
}

/// Rebuilds the ordered activity list of `day_id` by walking `next_id` from
/// `first_activity_id`. The walk is bounded by the record count; any cycle,
/// dangling pointer or foreign record aborts without partial output.
pub fn reconstruct_day(
    day_id: DayId,
    first_activity_id: Option<ActivityId>,
    records: Vec<Activity>,
) -> Result<Vec<Activity>, ChainIntegrityError> {
    let Some(first_activity_id) = first_activity_id else {
        if !records.is_empty() {
            log::warn!(
                "day {day_id} has no head pointer but {} activity records; rendering empty",
                records.len()
            );
        }
        return Ok(Vec::new());
    };

    let total = records.len();
    let mut by_id: HashMap<ActivityId, Activity> = HashMap::with_capacity(total);
    for record in records {
        if record.day_id != day_id {
            return Err(ChainIntegrityError::ForeignRecord {
                day_id,
                activity_id: record.id,
                actual_day_id: record.day_id,
            });
        }
        let activity_id = record.id;
        if by_id.insert(activity_id, record).is_some() {
            return Err(ChainIntegrityError::DuplicateRecord {
                day_id,
                activity_id,
            });
        }
    }

    let mut ordered = Vec::with_capacity(total);
    let mut visited = HashSet::with_capacity(total);
    let mut cursor = Some(first_activity_id);

    while let Some(activity_id) = cursor {
        if !visited.insert(activity_id) {
            return Err(ChainIntegrityError::Cycle {
                day_id,
                activity_id,
            });
        }
        if ordered.len() >= total {
            return Err(ChainIntegrityError::Unterminated {
                day_id,
                walked: ordered.len() + 1,
                total,
            });
        }
        let Some(activity) = by_id.remove(&activity_id) else {
            return Err(ChainIntegrityError::DanglingPointer {
                day_id,
                activity_id,
            });
        };
        cursor = activity.next_id;
        ordered.push(activity);
    }

    if !by_id.is_empty() {
        let mut orphans = by_id.keys().copied().collect::<Vec<_>>();
        orphans.sort_unstable();
        log::warn!("day {day_id} has activities unreachable from its head: {orphans:?}");
    }

    Ok(ordered)
}

/// Finds the head of a freshly fetched record set: the single record without a
/// predecessor.
pub fn resolve_head(
    day_id: DayId,
    records: &[Activity],
) -> Result<Option<ActivityId>, ChainIntegrityError> {
    if records.is_empty() {
        return Ok(None);
    }
    let heads = records
        .iter()
        .filter(|record| record.prev_id.is_none())
        .map(|record| record.id)
        .collect::<Vec<_>>();
    match heads.as_slice() {
        [head] => Ok(Some(*head)),
        _ => Err(ChainIntegrityError::AmbiguousHead {
            day_id,
            heads: heads.len(),
        }),
    }
}
