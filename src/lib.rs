pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    change_transport_mode_impl, delete_activity_impl, dispose_map_impl, edit_activity_impl,
    initialize_map_impl, insert_activity_impl, load_itinerary_impl, map_status_impl,
    reinitialize_map_impl, rename_day_impl, route_durations_impl, select_view_impl,
    time_window_impl, AppState, DayResponse, DayTitleResponse, EditActivityInput,
    InsertActivityInput, ItineraryResponse, MapStatusResponse, RouteDurationResponse,
    TimeWindowResponse,
};
use application::route_resolver::RouteDetail;
use domain::markers::MapMarker;
use domain::models::{ActivityId, DayId, ItineraryId};
use infrastructure::backend_client::ItineraryBackend;
use infrastructure::map_widget::MapWidgetHost;
use infrastructure::routing_provider::RoutingProvider;
use serde::Serialize;
use std::path::PathBuf;

// String-error entry points for the embedding UI. Failures are written to
// logs/commands.log before they are returned.

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub workspace_root: String,
    pub config_dir: String,
    pub logs_dir: String,
}

pub fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        config_dir: result.config_dir.display().to_string(),
        logs_dir: result.logs_dir.display().to_string(),
    })
}

pub fn initialize_map<B, H, P>(
    state: &AppState<B, H, P>,
    container_id: Option<String>,
    center: Option<[f64; 2]>,
) -> Result<MapStatusResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    initialize_map_impl(state, container_id, center)
        .map_err(|error| state.command_error("initialize_map", &error))
}

pub async fn reinitialize_map<B, H, P>(state: &AppState<B, H, P>) -> Result<MapStatusResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    reinitialize_map_impl(state)
        .await
        .map_err(|error| state.command_error("reinitialize_map", &error))
}

pub fn dispose_map<B, H, P>(state: &AppState<B, H, P>) -> Result<MapStatusResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    dispose_map_impl(state).map_err(|error| state.command_error("dispose_map", &error))
}

pub fn map_status<B, H, P>(state: &AppState<B, H, P>) -> Result<MapStatusResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    map_status_impl(state).map_err(|error| state.command_error("map_status", &error))
}

pub async fn load_itinerary<B, H, P>(
    state: &AppState<B, H, P>,
    itinerary_id: ItineraryId,
) -> Result<ItineraryResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    load_itinerary_impl(state, itinerary_id)
        .await
        .map_err(|error| state.command_error("load_itinerary", &error))
}

pub async fn insert_activity<B, H, P>(
    state: &AppState<B, H, P>,
    day_id: DayId,
    insert_before_id: Option<ActivityId>,
    input: InsertActivityInput,
) -> Result<DayResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    insert_activity_impl(state, day_id, insert_before_id, input)
        .await
        .map_err(|error| state.command_error("insert_activity", &error))
}

pub async fn delete_activity<B, H, P>(
    state: &AppState<B, H, P>,
    activity_id: ActivityId,
) -> Result<DayResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    delete_activity_impl(state, activity_id)
        .await
        .map_err(|error| state.command_error("delete_activity", &error))
}

pub async fn edit_activity<B, H, P>(
    state: &AppState<B, H, P>,
    activity_id: ActivityId,
    input: EditActivityInput,
) -> Result<DayResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    edit_activity_impl(state, activity_id, input)
        .await
        .map_err(|error| state.command_error("edit_activity", &error))
}

pub async fn change_transport_mode<B, H, P>(
    state: &AppState<B, H, P>,
    activity_id: ActivityId,
    transport_mode: String,
) -> Result<Option<RouteDetail>, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    change_transport_mode_impl(state, activity_id, transport_mode)
        .await
        .map_err(|error| state.command_error("change_transport_mode", &error))
}

pub async fn rename_day<B, H, P>(
    state: &AppState<B, H, P>,
    day_id: DayId,
    title: String,
) -> Result<DayTitleResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    rename_day_impl(state, day_id, title)
        .await
        .map_err(|error| state.command_error("rename_day", &error))
}

pub fn select_view<B, H, P>(
    state: &AppState<B, H, P>,
    day_id: Option<DayId>,
) -> Result<Vec<MapMarker>, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    select_view_impl(state, day_id).map_err(|error| state.command_error("select_view", &error))
}

pub fn time_window<B, H, P>(
    state: &AppState<B, H, P>,
    day_id: Option<DayId>,
    insert_before_id: Option<ActivityId>,
    activity_id: Option<ActivityId>,
) -> Result<TimeWindowResponse, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    time_window_impl(state, day_id, insert_before_id, activity_id)
        .map_err(|error| state.command_error("time_window", &error))
}

pub fn route_durations<B, H, P>(
    state: &AppState<B, H, P>,
    day_index: usize,
) -> Result<Vec<RouteDurationResponse>, String>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    route_durations_impl(state, day_index)
        .map_err(|error| state.command_error("route_durations", &error))
}
