use crate::application::map_lifecycle::MapLifecycleManager;
use crate::application::route_resolver::{RouteDetail, RouteTimeResolver};
use crate::domain::activity_chain::{reconstruct_day, resolve_head};
use crate::domain::markers::{derive_markers, route_edges, MapMarker};
use crate::domain::models::{
    Activity, ActivityId, ActivityPatch, DayId, DayPlan, Itinerary, ItineraryDay, ItineraryId,
    MapView, NewActivity, TransportMode,
};
use crate::domain::time_window::TimeWindow;
use crate::infrastructure::activity_mapper::{encode_create_request, ActivityFieldUpdate};
use crate::infrastructure::backend_client::ItineraryBackend;
use crate::infrastructure::config::{AppConfig, MapTimingsConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::map_widget::MapWidgetHost;
use crate::infrastructure::route_cache::{RouteCacheRepository, RouteCell, RouteKey};
use crate::infrastructure::routing_provider::RoutingProvider;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};

type DayFetch = Result<Vec<Activity>, InfraError>;

#[derive(Debug, Default)]
struct PlanState {
    itinerary: Option<Itinerary>,
    plans: Vec<DayPlan>,
    view: MapView,
}

/// Applies itinerary edits against the backend and keeps the local plans,
/// the map and the route cache in step with what the server returns.
///
/// Local state only changes after a successful round-trip; every mutation
/// ends with a refetch of the affected day instead of patching the local
/// sequence.
pub struct MutationCoordinator<B, H, P, C>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
    C: RouteCacheRepository + 'static,
{
    backend: Arc<B>,
    map: MapLifecycleManager<H, P>,
    resolver: RouteTimeResolver<P, C>,
    config: AppConfig,
    refresh_delay: Duration,
    state: Mutex<PlanState>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl<B, H, P, C> MutationCoordinator<B, H, P, C>
where
    B: ItineraryBackend + 'static,
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
    C: RouteCacheRepository + 'static,
{
    pub fn new(
        backend: Arc<B>,
        map: MapLifecycleManager<H, P>,
        resolver: RouteTimeResolver<P, C>,
    ) -> Self {
        Self {
            backend,
            map,
            resolver,
            config: AppConfig::default(),
            refresh_delay: MapTimingsConfig::default().mutation_refresh_delay(),
            state: Mutex::new(PlanState::default()),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn with_app_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_refresh_delay(mut self, refresh_delay: Duration) -> Self {
        self.refresh_delay = refresh_delay;
        self
    }

    pub fn map(&self) -> &MapLifecycleManager<H, P> {
        &self.map
    }

    pub fn resolver(&self) -> &RouteTimeResolver<P, C> {
        &self.resolver
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, PlanState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::poisoned("itinerary plan", error))
    }

    /// Fetches the itinerary and every day's activities, bounded by
    /// `fetchConcurrency`. A day whose fetch fails is shown empty.
    pub async fn load_itinerary(&self, itinerary_id: ItineraryId) -> Result<Vec<DayPlan>, InfraError> {
        let itinerary = self.backend.fetch_itinerary(itinerary_id).await?;
        let fetched = self.fetch_days(&itinerary.days).await?;

        let plans = itinerary
            .days
            .iter()
            .zip(fetched)
            .enumerate()
            .map(|(day_index, (day, records))| match records {
                Ok(records) => build_plan(day.clone(), day_index, day.first_activity_id, records),
                Err(error) => {
                    log::warn!("showing day {} empty, fetch failed: {error}", day.id);
                    DayPlan {
                        day: day.clone(),
                        day_index,
                        activities: Vec::new(),
                        integrity_error: None,
                    }
                }
            })
            .collect::<Vec<_>>();

        let (markers, overview) = {
            let mut state = self.lock_state()?;
            state.itinerary = Some(itinerary);
            state.plans = plans.clone();
            if let MapView::Day(day_id) = state.view {
                if !state.plans.iter().any(|plan| plan.day.id == day_id) {
                    state.view = MapView::Overview;
                }
            }
            (
                derive_markers(&state.plans, state.view),
                state.view == MapView::Overview,
            )
        };
        self.map.update_markers(markers, overview);

        let edges = plans.iter().flat_map(route_edges).collect::<Vec<_>>();
        self.track(self.resolver.resolve_edges(&edges));
        Ok(plans)
    }

    async fn fetch_days(&self, days: &[ItineraryDay]) -> Result<Vec<DayFetch>, InfraError> {
        let limit = self.config.fetch_concurrency.max(1);
        let mut fetched: Vec<Option<DayFetch>> = (0..days.len()).map(|_| None).collect();
        let mut tasks: JoinSet<(usize, DayFetch)> = JoinSet::new();

        for (index, day) in days.iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let day_id = day.id;
            tasks.spawn(async move { (index, backend.list_day_activities(day_id).await) });

            if tasks.len() >= limit {
                collect_day_fetch(&mut tasks, &mut fetched).await?;
            }
        }
        while !tasks.is_empty() {
            collect_day_fetch(&mut tasks, &mut fetched).await?;
        }

        Ok(fetched
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| {
                    Err(InfraError::Network("day fetch did not complete".to_string()))
                })
            })
            .collect())
    }

    pub async fn insert_activity(
        &self,
        day_id: DayId,
        insert_before_id: Option<ActivityId>,
        payload: NewActivity,
    ) -> Result<DayPlan, InfraError> {
        payload.validate().map_err(InfraError::InvalidInput)?;
        {
            let state = self.lock_state()?;
            let plan = find_plan(&state.plans, day_id)?;
            let index = match insert_before_id {
                Some(before_id) => plan.position_of(before_id).ok_or_else(|| {
                    InfraError::InvalidInput(format!(
                        "activity {before_id} is not part of day {day_id}"
                    ))
                })?,
                None => plan.activities.len(),
            };
            TimeWindow::for_insert(&plan.activities, index)
                .validate(payload.start_time, payload.end_time)?;
        }

        let request = encode_create_request(day_id, insert_before_id, &payload);
        let created = self.backend.create_activity(&request).await?;
        log::debug!("created activity {} on day {day_id}", created.id);

        let plan = self.refetch_day(day_id).await?;
        self.after_mutation(&plan)?;
        Ok(plan)
    }

    pub async fn delete_activity(&self, activity_id: ActivityId) -> Result<DayPlan, InfraError> {
        let (plan, _) = self.locate(activity_id)?;
        self.backend.delete_activity(activity_id).await?;

        let plan = self.refetch_day(plan.day.id).await?;
        self.after_mutation(&plan)?;
        Ok(plan)
    }

    /// Sends one field update per changed field. A patch that matches the
    /// current values is a no-op.
    pub async fn edit_activity(
        &self,
        activity_id: ActivityId,
        patch: ActivityPatch,
    ) -> Result<DayPlan, InfraError> {
        if patch.attraction_id.is_some() && patch.external_place.is_some() {
            return Err(InfraError::InvalidInput(
                "choose either attraction_id or external_place, not both".to_string(),
            ));
        }
        let (plan, index) = self.locate(activity_id)?;
        let changes = patch.changes_against(&plan.activities[index]);
        if changes.is_empty() {
            log::debug!("edit of activity {activity_id} matches current values");
            return Ok(plan);
        }
        if changes.title.as_deref().is_some_and(str::is_empty) {
            return Err(InfraError::InvalidInput(
                "activity title must not be empty".to_string(),
            ));
        }
        if let Some(place) = &changes.external_place {
            place.validate().map_err(InfraError::InvalidInput)?;
        }
        if let Some(time) = changes.time {
            TimeWindow::for_edit(&plan.activities, index).validate(time.start, time.end)?;
        }

        let mut applied = 0;
        for update in field_updates(changes) {
            if let Err(error) = self.backend.update_activity_field(activity_id, &update).await {
                if applied > 0 {
                    self.resync_after_partial_edit(plan.day.id, activity_id).await;
                }
                return Err(error);
            }
            applied += 1;
        }

        let plan = self.refetch_day(plan.day.id).await?;
        self.after_mutation(&plan)?;
        Ok(plan)
    }

    /// Stores the mode used to reach `activity_id` and returns the route from
    /// the previous stop, if both ends can be plotted.
    pub async fn change_transport_mode(
        &self,
        activity_id: ActivityId,
        mode: TransportMode,
    ) -> Result<Option<RouteDetail>, InfraError> {
        let (plan, _) = self.locate(activity_id)?;
        let current_mode = plan.activity(activity_id).map(|activity| activity.transport_mode);
        let plan = if current_mode == Some(mode) {
            plan
        } else {
            self.backend
                .update_activity_field(activity_id, &ActivityFieldUpdate::Transport(mode))
                .await?;
            let plan = self.refetch_day(plan.day.id).await?;
            self.after_mutation(&plan)?;
            plan
        };

        let Some(position) = plan.position_of(activity_id) else {
            return Ok(None);
        };
        let Some(edge) = route_edges(&plan)
            .into_iter()
            .find(|edge| edge.edge_index + 1 == position)
        else {
            return Ok(None);
        };
        Ok(Some(self.resolver.request_route_detail(&edge, mode).await))
    }

    pub async fn rename_day(&self, day_id: DayId, title: &str) -> Result<ItineraryDay, InfraError> {
        let itinerary_id = {
            let state = self.lock_state()?;
            find_plan(&state.plans, day_id)?;
            state
                .itinerary
                .as_ref()
                .map(|itinerary| itinerary.id)
                .ok_or_else(|| InfraError::InvalidInput("no itinerary loaded".to_string()))?
        };
        let title = self
            .backend
            .update_day_title(itinerary_id, day_id, title)
            .await?;

        let mut state = self.lock_state()?;
        if let Some(day) = state
            .itinerary
            .as_mut()
            .and_then(|itinerary| itinerary.days.iter_mut().find(|day| day.id == day_id))
        {
            day.title = title.clone();
        }
        let plan = state
            .plans
            .iter_mut()
            .find(|plan| plan.day.id == day_id)
            .ok_or_else(|| InfraError::InvalidInput(format!("unknown day {day_id}")))?;
        plan.day.title = title;
        Ok(plan.day.clone())
    }

    /// Switches between the overview and a single day. A day view centres the
    /// map on its first stop and starts route time lookups for its edges.
    pub fn select_view(&self, view: MapView) -> Result<Vec<MapMarker>, InfraError> {
        let (markers, edges) = {
            let mut state = self.lock_state()?;
            let edges = match view {
                MapView::Overview => Vec::new(),
                MapView::Day(day_id) => route_edges(find_plan(&state.plans, day_id)?),
            };
            state.view = view;
            (derive_markers(&state.plans, view), edges)
        };

        self.map
            .update_markers(markers.clone(), view == MapView::Overview);
        if let (MapView::Day(_), Some(first)) = (view, markers.first()) {
            self.map.set_center(first.coordinates);
        }
        if !edges.is_empty() {
            self.track(self.resolver.resolve_edges(&edges));
        }
        Ok(markers)
    }

    pub fn plans(&self) -> Result<Vec<DayPlan>, InfraError> {
        Ok(self.lock_state()?.plans.clone())
    }

    pub fn plan(&self, day_id: DayId) -> Result<DayPlan, InfraError> {
        let state = self.lock_state()?;
        find_plan(&state.plans, day_id).cloned()
    }

    pub fn itinerary(&self) -> Result<Option<Itinerary>, InfraError> {
        Ok(self.lock_state()?.itinerary.clone())
    }

    pub fn view(&self) -> Result<MapView, InfraError> {
        Ok(self.lock_state()?.view)
    }

    pub fn markers(&self) -> Result<Vec<MapMarker>, InfraError> {
        let state = self.lock_state()?;
        Ok(derive_markers(&state.plans, state.view))
    }

    pub fn time_window_for_insert(
        &self,
        day_id: DayId,
        insert_before_id: Option<ActivityId>,
    ) -> Result<TimeWindow, InfraError> {
        let state = self.lock_state()?;
        let plan = find_plan(&state.plans, day_id)?;
        let index = match insert_before_id {
            Some(before_id) => plan.position_of(before_id).ok_or_else(|| {
                InfraError::InvalidInput(format!("activity {before_id} is not part of day {day_id}"))
            })?,
            None => plan.activities.len(),
        };
        Ok(TimeWindow::for_insert(&plan.activities, index))
    }

    pub fn time_window_for_edit(&self, activity_id: ActivityId) -> Result<TimeWindow, InfraError> {
        let (plan, index) = self.locate(activity_id)?;
        Ok(TimeWindow::for_edit(&plan.activities, index))
    }

    pub fn route_durations(&self, day_index: usize) -> Result<Vec<(RouteKey, RouteCell)>, InfraError> {
        self.resolver.durations_for_day(day_index)
    }

    /// Waits for scheduled map refreshes and route lookups started so far.
    pub async fn wait_for_background_work(&self) {
        loop {
            let pending = match self.background.lock() {
                Ok(mut background) => std::mem::take(&mut *background),
                Err(error) => {
                    log::warn!("background task list unavailable: {error}");
                    return;
                }
            };
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(error) = handle.await {
                    log::warn!("background task failed: {error}");
                }
            }
        }
    }

    /// Some field updates of an edit reached the server before one failed;
    /// pull the day again so the plan matches what the server holds.
    async fn resync_after_partial_edit(&self, day_id: DayId, activity_id: ActivityId) {
        log::warn!("edit of activity {activity_id} applied partially; refetching day {day_id}");
        let resynced = match self.refetch_day(day_id).await {
            Ok(plan) => self.after_mutation(&plan),
            Err(error) => Err(error),
        };
        if let Err(error) = resynced {
            log::error!("could not refetch day {day_id} after partial edit: {error}");
        }
    }

    fn locate(&self, activity_id: ActivityId) -> Result<(DayPlan, usize), InfraError> {
        let state = self.lock_state()?;
        state
            .plans
            .iter()
            .find_map(|plan| {
                plan.position_of(activity_id)
                    .map(|index| (plan.clone(), index))
            })
            .ok_or_else(|| {
                InfraError::InvalidInput(format!(
                    "activity {activity_id} is not in the loaded itinerary"
                ))
            })
    }

    /// Replaces the local plan of `day_id` with the server's current chain.
    /// The head is taken from the fetched records since the day's stored
    /// head may predate the mutation.
    async fn refetch_day(&self, day_id: DayId) -> Result<DayPlan, InfraError> {
        let (day, day_index) = {
            let state = self.lock_state()?;
            let plan = find_plan(&state.plans, day_id)?;
            (plan.day.clone(), plan.day_index)
        };
        let records = self.backend.list_day_activities(day_id).await?;
        let plan = match resolve_head(day_id, &records) {
            Ok(head) => build_plan(day, day_index, head, records),
            Err(error) => corrupted_plan(day, day_index, &error),
        };

        let mut state = self.lock_state()?;
        if let Some(slot) = state.plans.iter_mut().find(|slot| slot.day.id == day_id) {
            *slot = plan.clone();
        }
        if let Some(day) = state
            .itinerary
            .as_mut()
            .and_then(|itinerary| itinerary.days.iter_mut().find(|day| day.id == day_id))
        {
            day.first_activity_id = plan.day.first_activity_id;
        }
        Ok(plan)
    }

    fn after_mutation(&self, plan: &DayPlan) -> Result<(), InfraError> {
        let (markers, overview) = {
            let state = self.lock_state()?;
            (
                derive_markers(&state.plans, state.view),
                state.view == MapView::Overview,
            )
        };

        let map = self.map.clone();
        let delay = self.refresh_delay;
        let reinitialize = self.config.reinitialize_map_after_mutation;
        match Handle::try_current() {
            Ok(runtime) => {
                let refresh = runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    map.update_markers(markers, overview);
                    if reinitialize {
                        map.reinitialize().await;
                    }
                });
                self.track(Ok(vec![refresh]));
            }
            Err(error) => log::warn!("map refresh skipped: {error}"),
        }

        self.track(self.resolver.refresh_edges(&route_edges(plan)));
        Ok(())
    }

    fn track(&self, started: Result<Vec<JoinHandle<()>>, InfraError>) {
        let handles = match started {
            Ok(handles) => handles,
            Err(error) => {
                log::warn!("route time lookup not started: {error}");
                return;
            }
        };
        match self.background.lock() {
            Ok(mut background) => {
                background.retain(|handle| !handle.is_finished());
                background.extend(handles);
            }
            Err(error) => log::warn!("background task list unavailable: {error}"),
        }
    }
}

async fn collect_day_fetch(
    tasks: &mut JoinSet<(usize, DayFetch)>,
    fetched: &mut [Option<DayFetch>],
) -> Result<(), InfraError> {
    let Some(join_result) = tasks.join_next().await else {
        return Ok(());
    };
    let (index, result) = join_result.map_err(|error| {
        InfraError::Network(format!("failed to join day fetch task: {error}"))
    })?;
    if let Some(slot) = fetched.get_mut(index) {
        *slot = Some(result);
    }
    Ok(())
}

fn find_plan(plans: &[DayPlan], day_id: DayId) -> Result<&DayPlan, InfraError> {
    plans
        .iter()
        .find(|plan| plan.day.id == day_id)
        .ok_or_else(|| InfraError::InvalidInput(format!("unknown day {day_id}")))
}

fn build_plan(
    mut day: ItineraryDay,
    day_index: usize,
    head: Option<ActivityId>,
    records: Vec<Activity>,
) -> DayPlan {
    day.first_activity_id = head;
    match reconstruct_day(day.id, head, records) {
        Ok(activities) => DayPlan {
            day,
            day_index,
            activities,
            integrity_error: None,
        },
        Err(error) => corrupted_plan(day, day_index, &error),
    }
}

fn corrupted_plan(
    day: ItineraryDay,
    day_index: usize,
    error: &impl std::fmt::Display,
) -> DayPlan {
    log::error!("showing day {} empty: {error}", day.id);
    DayPlan {
        day,
        day_index,
        activities: Vec::new(),
        integrity_error: Some(error.to_string()),
    }
}

fn field_updates(changes: ActivityPatch) -> Vec<ActivityFieldUpdate> {
    let mut updates = Vec::new();
    if let Some(title) = changes.title {
        updates.push(ActivityFieldUpdate::Title(title));
    }
    if let Some(time) = changes.time {
        updates.push(ActivityFieldUpdate::Time(time));
    }
    if let Some(notes) = changes.notes {
        updates.push(ActivityFieldUpdate::Notes(notes));
    }
    if let Some(attraction_id) = changes.attraction_id {
        updates.push(ActivityFieldUpdate::Attraction(attraction_id));
    }
    if let Some(place) = changes.external_place {
        updates.push(ActivityFieldUpdate::ExternalAttraction(place));
    }
    updates
}
