use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::map_lifecycle::{MapLifecycleFailure, MapLifecycleManager, MapState};
use crate::application::mutation_coordinator::MutationCoordinator;
use crate::application::route_resolver::{format_duration_label, RouteDetail, RouteTimeResolver};
use crate::domain::markers::MapMarker;
use crate::domain::models::{
    format_clock_time, parse_clock_time, Activity, ActivityId, ActivityPatch, Coordinates, DayId,
    DayPlan, ExternalPlace, ItineraryId, MapView, NewActivity, PlaceSelection, TimeChange,
    TransportMode,
};
use crate::domain::time_window::TimeWindow;
use crate::infrastructure::backend_client::{ItineraryBackend, ReqwestItineraryBackend};
use crate::infrastructure::config::ConfigBundle;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::map_widget::MapWidgetHost;
use crate::infrastructure::route_cache::{InMemoryRouteCacheRepository, RouteCell};
use crate::infrastructure::routing_provider::RoutingProvider;
use chrono::{NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub type ItineraryCoordinator<B, H, P> =
    MutationCoordinator<B, H, P, InMemoryRouteCacheRepository>;

/// Process-wide state behind the command functions. The map host and routing
/// provider are supplied by the embedding UI.
pub struct AppState<B, H, P>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    config_dir: PathBuf,
    logs_dir: PathBuf,
    configs: ConfigBundle,
    coordinator: ItineraryCoordinator<B, H, P>,
    log_guard: Mutex<()>,
}

impl<H, P> AppState<ReqwestItineraryBackend, H, P>
where
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    pub fn new(workspace_root: PathBuf, host: Arc<H>, provider: Arc<P>) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let backend = Arc::new(ReqwestItineraryBackend::new(
            &bootstrap.configs.app.backend_base_url,
        )?);
        Ok(Self::from_bootstrap(bootstrap, backend, host, provider))
    }
}

impl<B, H, P> AppState<B, H, P>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    pub fn with_backend(
        workspace_root: PathBuf,
        backend: Arc<B>,
        host: Arc<H>,
        provider: Arc<P>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Ok(Self::from_bootstrap(bootstrap, backend, host, provider))
    }

    fn from_bootstrap(
        bootstrap: BootstrapResult,
        backend: Arc<B>,
        host: Arc<H>,
        provider: Arc<P>,
    ) -> Self {
        let configs = bootstrap.configs;

        let map = MapLifecycleManager::new(host, Arc::clone(&provider), configs.map.clone());
        let resolver =
            RouteTimeResolver::new(provider, Arc::new(InMemoryRouteCacheRepository::default()));
        let coordinator = MutationCoordinator::new(backend, map, resolver)
            .with_app_config(configs.app.clone())
            .with_refresh_delay(configs.map.timings.mutation_refresh_delay());

        Self {
            config_dir: bootstrap.config_dir,
            logs_dir: bootstrap.logs_dir,
            configs,
            coordinator,
            log_guard: Mutex::new(()),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn configs(&self) -> &ConfigBundle {
        &self.configs
    }

    pub fn coordinator(&self) -> &ItineraryCoordinator<B, H, P> {
        &self.coordinator
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityResponse {
    pub id: ActivityId,
    pub title: String,
    pub display_name: String,
    pub time_label: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub transport_mode: String,
    pub notes: String,
    pub attraction_id: Option<i64>,
    pub coordinates: Option<Coordinates>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayResponse {
    pub day_id: DayId,
    pub day_index: usize,
    pub day_number: u32,
    pub day_label: String,
    pub date: Option<String>,
    pub title: String,
    pub activities: Vec<ActivityResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItineraryResponse {
    pub itinerary_id: ItineraryId,
    pub title: String,
    pub days: Vec<DayResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayTitleResponse {
    pub day_id: DayId,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimeWindowResponse {
    pub earliest_start: Option<String>,
    pub latest_end: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteDurationResponse {
    pub edge_index: usize,
    pub mode: String,
    pub pending: bool,
    pub duration_seconds: Option<u32>,
    pub duration_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MapStatusResponse {
    pub state: MapState,
    pub scheduled_reinitializations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<MapLifecycleFailure>,
}

/// Loose input for a new activity. Exactly one of `attraction_id` and
/// `external_place` must be given.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InsertActivityInput {
    pub title: String,
    pub transport_mode: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub attraction_id: Option<i64>,
    pub external_place: Option<ExternalPlace>,
}

/// Absent fields stay untouched. The two time fields travel together: giving
/// either one replaces both, and a blank value clears that side.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditActivityInput {
    pub title: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub notes: Option<String>,
    pub attraction_id: Option<i64>,
    pub external_place: Option<ExternalPlace>,
}

pub fn initialize_map_impl<B, H, P>(
    state: &AppState<B, H, P>,
    container_id: Option<String>,
    center: Option<[f64; 2]>,
) -> Result<MapStatusResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let container_id = container_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| state.configs.map.container_id.clone());
    let center = match center {
        Some([longitude, latitude]) => {
            let center = Coordinates::new(longitude, latitude);
            if !center.is_plottable() {
                return Err(InfraError::InvalidInput(format!(
                    "map center [{longitude}, {latitude}] is not a valid position"
                )));
            }
            Some(center)
        }
        None => None,
    };

    let map = state.coordinator.map();
    let map_state = map.initialize(&container_id, center);
    state.log_info(
        "initialize_map",
        &format!("container={container_id} state={map_state:?}"),
    );
    Ok(map_status(map))
}

pub async fn reinitialize_map_impl<B, H, P>(
    state: &AppState<B, H, P>,
) -> Result<MapStatusResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let map = state.coordinator.map();
    let map_state = map.reinitialize().await;
    if let Some(failure) = map.last_failure() {
        return Err(InfraError::MapLifecycle(format!(
            "{} after {} consecutive failures",
            failure.message, failure.consecutive_failures
        )));
    }
    state.log_info("reinitialize_map", &format!("state={map_state:?}"));
    Ok(map_status(map))
}

pub fn dispose_map_impl<B, H, P>(state: &AppState<B, H, P>) -> Result<MapStatusResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let map = state.coordinator.map();
    map.dispose();
    state.coordinator.resolver().shutdown();
    state.log_info("dispose_map", "map disposed, route lookups stopped");
    Ok(map_status(map))
}

pub fn map_status_impl<B, H, P>(state: &AppState<B, H, P>) -> Result<MapStatusResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let status = map_status(state.coordinator.map());
    if let Some(failure) = &status.last_failure {
        state.log_error("map_status", &failure.message);
    }
    Ok(status)
}

pub async fn load_itinerary_impl<B, H, P>(
    state: &AppState<B, H, P>,
    itinerary_id: ItineraryId,
) -> Result<ItineraryResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let plans = state.coordinator.load_itinerary(itinerary_id).await?;
    let title = state
        .coordinator
        .itinerary()?
        .map(|itinerary| itinerary.title)
        .unwrap_or_default();
    let corrupted = plans.iter().filter(|plan| plan.is_corrupted()).count();
    state.log_info(
        "load_itinerary",
        &format!(
            "itinerary={itinerary_id} days={} corrupted_days={corrupted}",
            plans.len()
        ),
    );
    Ok(ItineraryResponse {
        itinerary_id,
        title,
        days: plans.iter().map(to_day_response).collect(),
    })
}

pub async fn insert_activity_impl<B, H, P>(
    state: &AppState<B, H, P>,
    day_id: DayId,
    insert_before_id: Option<ActivityId>,
    input: InsertActivityInput,
) -> Result<DayResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let title = input.title.trim().to_string();
    if title.is_empty() {
        return Err(InfraError::InvalidInput("title must not be empty".to_string()));
    }
    let place = match (input.attraction_id, input.external_place) {
        (Some(attraction_id), None) => PlaceSelection::Catalog { attraction_id },
        (None, Some(place)) => PlaceSelection::External(place),
        (Some(_), Some(_)) => {
            return Err(InfraError::InvalidInput(
                "choose either attraction_id or external_place, not both".to_string(),
            ))
        }
        (None, None) => {
            return Err(InfraError::InvalidInput(
                "a place is required: attraction_id or external_place".to_string(),
            ))
        }
    };
    let transport_mode = match input.transport_mode.as_deref() {
        Some(value) => parse_transport_mode(value)?,
        None => TransportMode::default(),
    };
    let payload = NewActivity {
        title,
        transport_mode,
        start_time: parse_optional_time(input.start_time.as_deref(), "start_time")?,
        end_time: parse_optional_time(input.end_time.as_deref(), "end_time")?,
        place,
    };

    let plan = state
        .coordinator
        .insert_activity(day_id, insert_before_id, payload)
        .await?;
    state.log_info(
        "insert_activity",
        &format!(
            "day={day_id} before={insert_before_id:?} activities={}",
            plan.activities.len()
        ),
    );
    Ok(to_day_response(&plan))
}

pub async fn delete_activity_impl<B, H, P>(
    state: &AppState<B, H, P>,
    activity_id: ActivityId,
) -> Result<DayResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let plan = state.coordinator.delete_activity(activity_id).await?;
    state.log_info(
        "delete_activity",
        &format!("activity={activity_id} day={}", plan.day.id),
    );
    Ok(to_day_response(&plan))
}

pub async fn edit_activity_impl<B, H, P>(
    state: &AppState<B, H, P>,
    activity_id: ActivityId,
    input: EditActivityInput,
) -> Result<DayResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let time = if input.start_time.is_some() || input.end_time.is_some() {
        Some(TimeChange {
            start: parse_optional_time(input.start_time.as_deref(), "start_time")?,
            end: parse_optional_time(input.end_time.as_deref(), "end_time")?,
        })
    } else {
        None
    };
    let patch = ActivityPatch {
        title: input.title,
        time,
        notes: input.notes,
        attraction_id: input.attraction_id,
        external_place: input.external_place,
    };

    let plan = state.coordinator.edit_activity(activity_id, patch).await?;
    state.log_info(
        "edit_activity",
        &format!("activity={activity_id} day={}", plan.day.id),
    );
    Ok(to_day_response(&plan))
}

pub async fn change_transport_mode_impl<B, H, P>(
    state: &AppState<B, H, P>,
    activity_id: ActivityId,
    transport_mode: String,
) -> Result<Option<RouteDetail>, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let mode = parse_transport_mode(&transport_mode)?;
    let detail = state
        .coordinator
        .change_transport_mode(activity_id, mode)
        .await?;
    state.log_info(
        "change_transport_mode",
        &format!(
            "activity={activity_id} mode={mode} duration={}",
            detail
                .as_ref()
                .and_then(|detail| detail.duration_label.clone())
                .unwrap_or_else(|| "unknown".to_string())
        ),
    );
    Ok(detail)
}

pub async fn rename_day_impl<B, H, P>(
    state: &AppState<B, H, P>,
    day_id: DayId,
    title: String,
) -> Result<DayTitleResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let title = title.trim();
    if title.is_empty() {
        return Err(InfraError::InvalidInput("title must not be empty".to_string()));
    }
    let day = state.coordinator.rename_day(day_id, title).await?;
    state.log_info("rename_day", &format!("day={day_id}"));
    Ok(DayTitleResponse {
        day_id: day.id,
        title: day.title,
    })
}

/// `day_id = None` shows the whole itinerary.
pub fn select_view_impl<B, H, P>(
    state: &AppState<B, H, P>,
    day_id: Option<DayId>,
) -> Result<Vec<MapMarker>, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let view = day_id.map_or(MapView::Overview, MapView::Day);
    let markers = state.coordinator.select_view(view)?;
    state.log_info(
        "select_view",
        &format!("view={view:?} markers={}", markers.len()),
    );
    Ok(markers)
}

/// Window for editing `activity_id` when given, otherwise for inserting into
/// `day_id` before `insert_before_id` (or at the end).
pub fn time_window_impl<B, H, P>(
    state: &AppState<B, H, P>,
    day_id: Option<DayId>,
    insert_before_id: Option<ActivityId>,
    activity_id: Option<ActivityId>,
) -> Result<TimeWindowResponse, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let window = match (activity_id, day_id) {
        (Some(activity_id), _) => state.coordinator.time_window_for_edit(activity_id)?,
        (None, Some(day_id)) => state
            .coordinator
            .time_window_for_insert(day_id, insert_before_id)?,
        (None, None) => {
            return Err(InfraError::InvalidInput(
                "either activity_id or day_id is required".to_string(),
            ))
        }
    };
    Ok(to_time_window_response(window))
}

pub fn route_durations_impl<B, H, P>(
    state: &AppState<B, H, P>,
    day_index: usize,
) -> Result<Vec<RouteDurationResponse>, InfraError>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    let durations = state.coordinator.route_durations(day_index)?;
    Ok(durations
        .into_iter()
        .map(|(key, cell)| RouteDurationResponse {
            edge_index: key.edge_index,
            mode: key.mode.as_str().to_string(),
            pending: cell == RouteCell::Pending,
            duration_seconds: cell.duration_seconds(),
            duration_label: cell.duration_seconds().map(format_duration_label),
        })
        .collect())
}

fn map_status<H, P>(map: &MapLifecycleManager<H, P>) -> MapStatusResponse
where
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    MapStatusResponse {
        state: map.state(),
        scheduled_reinitializations: map.scheduled_reinitializations(),
        last_failure: map.last_failure(),
    }
}

fn parse_transport_mode(value: &str) -> Result<TransportMode, InfraError> {
    TransportMode::parse_label(value).ok_or_else(|| {
        InfraError::InvalidInput(format!("unknown transport mode '{}'", value.trim()))
    })
}

fn parse_optional_time(value: Option<&str>, field: &str) -> Result<Option<NaiveTime>, InfraError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    parse_clock_time(value)
        .map(Some)
        .ok_or_else(|| InfraError::InvalidInput(format!("{field} must be HH:MM, got '{value}'")))
}

fn to_activity_response(activity: &Activity) -> ActivityResponse {
    ActivityResponse {
        id: activity.id,
        title: activity.title.clone(),
        display_name: activity.display_name().to_string(),
        time_label: activity.time_label(),
        start_time: activity.start_time.map(format_clock_time),
        end_time: activity.end_time.map(format_clock_time),
        transport_mode: activity.transport_mode.as_str().to_string(),
        notes: activity.notes.clone(),
        attraction_id: activity
            .location
            .as_ref()
            .and_then(|location| location.attraction_id),
        coordinates: activity.coordinates(),
        address: activity
            .location
            .as_ref()
            .and_then(|location| location.address.clone()),
    }
}

fn to_day_response(plan: &DayPlan) -> DayResponse {
    DayResponse {
        day_id: plan.day.id,
        day_index: plan.day_index,
        day_number: plan.day.day_number,
        day_label: plan.day.day_label(),
        date: plan.day.date.map(|date| date.format("%Y-%m-%d").to_string()),
        title: plan.day.title.clone(),
        activities: plan.activities.iter().map(to_activity_response).collect(),
        integrity_error: plan.integrity_error.clone(),
    }
}

fn to_time_window_response(window: TimeWindow) -> TimeWindowResponse {
    TimeWindowResponse {
        earliest_start: window.earliest_start.map(format_clock_time),
        latest_end: window.latest_end.map(format_clock_time),
        description: window.describe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::backend_client::testing::FakeItineraryBackend;
    use crate::infrastructure::map_widget::testing::FakeMapHost;
    use crate::infrastructure::routing_provider::testing::ScriptedRoutingProvider;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestState = AppState<FakeItineraryBackend, FakeMapHost, ScriptedRoutingProvider>;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "itinerary-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self, backend: FakeItineraryBackend) -> (TestState, FakeMapHost) {
            let host = FakeMapHost::with_container("container");
            let state = AppState::with_backend(
                self.path.clone(),
                Arc::new(backend),
                Arc::new(host.clone()),
                Arc::new(ScriptedRoutingProvider::default()),
            )
            .expect("initialize app state");
            (state, host)
        }

        fn log_lines(&self) -> Vec<serde_json::Value> {
            fs::read_to_string(self.path.join("logs").join("commands.log"))
                .unwrap_or_default()
                .lines()
                .map(|line| serde_json::from_str(line).expect("json log line"))
                .collect()
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn backend() -> (FakeItineraryBackend, ActivityId, ActivityId) {
        let backend = FakeItineraryBackend::new(3, &[10, 11]);
        let tower = backend.seed(10, "TV Tower", Some("09:00"), Some("10:30"), TransportMode::Walking);
        let dinner = backend.seed(10, "Dinner", Some("18:00"), None, TransportMode::PublicTransit);
        (backend, tower, dinner)
    }

    #[tokio::test(start_paused = true)]
    async fn insert_flow_parses_loose_input_and_logs() {
        let workspace = TempWorkspace::new();
        let (backend, tower, dinner) = backend();
        let (state, _host) = workspace.app_state(backend);
        initialize_map_impl(&state, None, None).expect("initialize map");

        let itinerary = load_itinerary_impl(&state, 3).await.expect("load");
        assert_eq!(itinerary.days.len(), 2);
        assert_eq!(itinerary.days[0].activities[0].start_time.as_deref(), Some("09:00"));

        let day = insert_activity_impl(
            &state,
            10,
            Some(dinner),
            InsertActivityInput {
                title: "Yu Garden".to_string(),
                transport_mode: Some("public-transit".to_string()),
                start_time: Some("13:00".to_string()),
                end_time: Some("15:00".to_string()),
                attraction_id: Some(42),
                external_place: None,
            },
        )
        .await
        .expect("insert");

        let order = day.activities.iter().map(|activity| activity.id).collect::<Vec<_>>();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], tower);
        assert_eq!(order[2], dinner);
        assert_eq!(day.activities[1].transport_mode, "public-transit");

        let lines = workspace.log_lines();
        let commands = lines
            .iter()
            .filter_map(|line| line["command"].as_str())
            .collect::<Vec<_>>();
        assert_eq!(commands, vec!["initialize_map", "load_itinerary", "insert_activity"]);
        assert!(lines.iter().all(|line| line["level"] == "info"));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_inputs_are_rejected_before_the_backend() {
        let workspace = TempWorkspace::new();
        let (backend, tower, _) = backend();
        let (state, _host) = workspace.app_state(backend);
        load_itinerary_impl(&state, 3).await.expect("load");

        let bad_time = insert_activity_impl(
            &state,
            10,
            None,
            InsertActivityInput {
                title: "Night market".to_string(),
                start_time: Some("late".to_string()),
                attraction_id: Some(8),
                ..InsertActivityInput::default()
            },
        )
        .await;
        assert!(matches!(bad_time, Err(InfraError::InvalidInput(_))));

        let no_place = insert_activity_impl(
            &state,
            10,
            None,
            InsertActivityInput {
                title: "Night market".to_string(),
                ..InsertActivityInput::default()
            },
        )
        .await;
        assert!(matches!(no_place, Err(InfraError::InvalidInput(_))));

        let bad_mode = change_transport_mode_impl(&state, tower, "teleport".to_string()).await;
        assert!(matches!(bad_mode, Err(InfraError::InvalidInput(_))));

        let message = state.command_error(
            "change_transport_mode",
            &bad_mode.expect_err("bad mode"),
        );
        assert!(message.contains("teleport"));
        let lines = workspace.log_lines();
        assert_eq!(lines.last().expect("error line")["level"], "error");
    }

    #[tokio::test(start_paused = true)]
    async fn time_window_and_edit_round_trip() {
        let workspace = TempWorkspace::new();
        let (backend, tower, dinner) = backend();
        let (state, _host) = workspace.app_state(backend);
        load_itinerary_impl(&state, 3).await.expect("load");

        let window = time_window_impl(&state, Some(10), Some(dinner), None).expect("window");
        assert_eq!(
            window,
            TimeWindowResponse {
                earliest_start: Some("10:30".to_string()),
                latest_end: Some("18:00".to_string()),
                description: "10:30 – 18:00".to_string(),
            }
        );
        let edit_window = time_window_impl(&state, None, None, Some(tower)).expect("window");
        assert_eq!(edit_window.earliest_start, None);
        assert_eq!(edit_window.latest_end.as_deref(), Some("18:00"));

        let day = edit_activity_impl(
            &state,
            tower,
            EditActivityInput {
                start_time: Some("08:30".to_string()),
                end_time: Some("10:00".to_string()),
                ..EditActivityInput::default()
            },
        )
        .await
        .expect("edit");
        assert_eq!(day.activities[0].time_label, "08:30-10:00");

        let rejected = edit_activity_impl(
            &state,
            tower,
            EditActivityInput {
                start_time: Some("08:30".to_string()),
                end_time: Some("19:00".to_string()),
                ..EditActivityInput::default()
            },
        )
        .await;
        assert!(matches!(rejected, Err(InfraError::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn day_view_and_route_durations() {
        let workspace = TempWorkspace::new();
        let (backend, _, dinner) = backend();
        let (state, host) = workspace.app_state(backend);
        initialize_map_impl(&state, Some("container".to_string()), Some([121.47, 31.23]))
            .expect("initialize map");
        load_itinerary_impl(&state, 3).await.expect("load");

        let markers = select_view_impl(&state, Some(10)).expect("day view");
        assert_eq!(markers.len(), 2);
        assert!(markers.iter().all(|marker| marker.day_label.is_none()));
        state.coordinator().wait_for_background_work().await;
        state.coordinator().map().wait_for_routes().await;
        assert_eq!(host.polylines().len(), 1);

        let durations = route_durations_impl(&state, 0).expect("durations");
        assert_eq!(durations.len(), TransportMode::ALL.len());
        assert!(durations.iter().all(|duration| !duration.pending));
        assert!(durations
            .iter()
            .all(|duration| duration.duration_label.as_deref() == Some("10m")));

        let detail = change_transport_mode_impl(&state, dinner, "driving".to_string())
            .await
            .expect("change")
            .expect("detail");
        assert_eq!(detail.duration_seconds, Some(600));

        let status = dispose_map_impl(&state).expect("dispose");
        assert_eq!(status.state, MapState::Destroyed);
        assert!(!state.coordinator().resolver().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn reinitialize_surfaces_repeated_widget_failures() {
        let workspace = TempWorkspace::new();
        let (backend, _, _) = backend();
        let (state, host) = workspace.app_state(backend);
        host.lock().failing_creates = 100;

        initialize_map_impl(&state, None, None).expect("initialize map");
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        let status = map_status_impl(&state).expect("status");
        assert!(status.last_failure.is_some());

        let error = reinitialize_map_impl(&state)
            .await
            .expect_err("failure surfaced");
        assert!(matches!(error, InfraError::MapLifecycle(_)));
    }

    #[tokio::test]
    async fn rename_day_trims_and_requires_title() {
        let workspace = TempWorkspace::new();
        let (backend, _, _) = backend();
        let (state, _host) = workspace.app_state(backend);
        load_itinerary_impl(&state, 3).await.expect("load");

        assert!(matches!(
            rename_day_impl(&state, 11, "   ".to_string()).await,
            Err(InfraError::InvalidInput(_))
        ));
        let renamed = rename_day_impl(&state, 11, " Day trip to Suzhou ".to_string())
            .await
            .expect("rename");
        assert_eq!(renamed.title, "Day trip to Suzhou");
        assert_eq!(
            map_status_impl(&state).expect("status").state,
            MapState::Uninitialized
        );
    }
}
