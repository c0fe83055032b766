use crate::domain::models::{
    ActivityId, Coordinates, DayId, DayPlan, MapView, TransportMode,
};
use serde::Serialize;

/// Map projection of one plottable activity.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MapMarker {
    pub activity_id: ActivityId,
    pub day_id: DayId,
    pub day_index: usize,
    pub activity_index: usize,
    pub name: String,
    pub activity_name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub day_label: Option<String>,
    pub coordinates: Coordinates,
    /// Mode used to travel into this stop.
    pub transport_mode: TransportMode,
}

/// Adjacent pair of plottable activities within one day. `edge_index` is the
/// position of the departing activity in the day's sequence.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteEdge {
    pub day_id: DayId,
    pub day_index: usize,
    pub edge_index: usize,
    pub from: Coordinates,
    pub to: Coordinates,
    pub from_name: String,
    pub to_name: String,
    pub selected_mode: TransportMode,
}

pub fn derive_markers(plans: &[DayPlan], view: MapView) -> Vec<MapMarker> {
    let overview = matches!(view, MapView::Overview);
    plans
        .iter()
        .filter(|plan| match view {
            MapView::Overview => true,
            MapView::Day(day_id) => plan.day.id == day_id,
        })
        .flat_map(|plan| day_markers(plan, overview))
        .collect()
}

fn day_markers(plan: &DayPlan, overview: bool) -> Vec<MapMarker> {
    let day_prefix = plan
        .day
        .date
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| plan.day.day_label());

    plan.activities
        .iter()
        .enumerate()
        .filter_map(|(activity_index, activity)| {
            let coordinates = activity.coordinates()?;
            let activity_name = if activity.title.trim().is_empty() {
                format!("Activity {}", activity_index + 1)
            } else {
                activity.title.trim().to_string()
            };
            let name = if overview {
                format!("{day_prefix} - {activity_name}")
            } else {
                activity_name.clone()
            };
            let location = activity.location.as_ref();
            Some(MapMarker {
                activity_id: activity.id,
                day_id: plan.day.id,
                day_index: plan.day_index,
                activity_index,
                name,
                activity_name,
                description: Some(activity.notes.trim())
                    .filter(|notes| !notes.is_empty())
                    .map(str::to_string)
                    .or_else(|| location.map(|location| location.name.clone())),
                address: location.and_then(|location| location.address.clone()),
                day_label: overview.then(|| plan.day.day_label()),
                coordinates,
                transport_mode: activity.transport_mode,
            })
        })
        .collect()
}

/// Consecutive marker pairs that belong to the same day. Cross-day pairs get
/// neither a line nor a route request.
pub fn same_day_pairs(markers: &[MapMarker]) -> impl Iterator<Item = (&MapMarker, &MapMarker)> {
    markers
        .windows(2)
        .filter(|pair| pair[0].day_id == pair[1].day_id)
        .map(|pair| (&pair[0], &pair[1]))
}

pub fn route_edges(plan: &DayPlan) -> Vec<RouteEdge> {
    plan.activities
        .windows(2)
        .enumerate()
        .filter_map(|(edge_index, pair)| {
            let (from, to) = (&pair[0], &pair[1]);
            if from.day_id != plan.day.id || to.day_id != plan.day.id {
                return None;
            }
            Some(RouteEdge {
                day_id: plan.day.id,
                day_index: plan.day_index,
                edge_index,
                from: from.coordinates()?,
                to: to.coordinates()?,
                from_name: from.display_name().to_string(),
                to_name: to.display_name().to_string(),
                selected_mode: to.transport_mode,
            })
        })
        .collect()
}
