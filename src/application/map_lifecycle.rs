use crate::domain::markers::{same_day_pairs, MapMarker};
use crate::domain::models::Coordinates;
use crate::infrastructure::config::MapConfig;
use crate::infrastructure::map_widget::{
    InfoWindowSpec, MapOptions, MapWidget, MapWidgetHost, MarkerSpec, OverlayId, PolylineSpec,
    WidgetError,
};
use crate::infrastructure::routing_provider::{search_route, RouteRequest, RoutingProvider};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapState {
    Uninitialized,
    Initializing,
    Ready,
    Reinitializing,
    Destroyed,
}

/// Surfaced once recovery has failed `maxConsecutiveFailures` times in a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapLifecycleFailure {
    pub message: String,
    pub consecutive_failures: u32,
}

struct MapRuntime {
    state: MapState,
    widget: Option<Box<dyn MapWidget>>,
    container_id: String,
    center: Option<Coordinates>,
    markers: Vec<MapMarker>,
    overview: bool,
    overlays: Vec<OverlayId>,
    mounted: bool,
    /// Bumped on every redraw and teardown; route drawing tasks from an older
    /// epoch stop touching the widget.
    epoch: u64,
    reinit_scheduled: bool,
    container_retry_pending: bool,
    scheduled_reinits: usize,
    consecutive_failures: u32,
    last_failure: Option<MapLifecycleFailure>,
    route_task: Option<JoinHandle<()>>,
}

struct Inner<H, P> {
    host: Arc<H>,
    provider: Arc<P>,
    config: MapConfig,
    runtime: Mutex<MapRuntime>,
}

/// Owns one map widget and keeps it consistent with the current markers.
///
/// All widget access goes through the runtime lock and only while the state is
/// `Ready`; failures inside widget calls are logged and answered with a single
/// delayed reinitialization instead of being returned to the caller. One
/// manager per container: two managers pointed at the same container will
/// destroy each other's widgets.
pub struct MapLifecycleManager<H, P>
where
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    inner: Arc<Inner<H, P>>,
}

impl<H, P> Clone for MapLifecycleManager<H, P>
where
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H, P> MapLifecycleManager<H, P>
where
    H: MapWidgetHost + 'static,
    P: RoutingProvider + 'static,
{
    pub fn new(host: Arc<H>, provider: Arc<P>, config: MapConfig) -> Self {
        let runtime = MapRuntime {
            state: MapState::Uninitialized,
            widget: None,
            container_id: config.container_id.clone(),
            center: None,
            markers: Vec::new(),
            overview: true,
            overlays: Vec::new(),
            mounted: true,
            epoch: 0,
            reinit_scheduled: false,
            container_retry_pending: false,
            scheduled_reinits: 0,
            consecutive_failures: 0,
            last_failure: None,
            route_task: None,
        };
        Self {
            inner: Arc::new(Inner {
                host,
                provider,
                config,
                runtime: Mutex::new(runtime),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MapRuntime> {
        self.inner
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> MapState {
        self.lock().state
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().mounted
    }

    pub fn markers(&self) -> Vec<MapMarker> {
        self.lock().markers.clone()
    }

    pub fn last_failure(&self) -> Option<MapLifecycleFailure> {
        self.lock().last_failure.clone()
    }

    pub fn scheduled_reinitializations(&self) -> usize {
        self.lock().scheduled_reinits
    }

    /// Creates the widget in `container_id`. A manager that is already
    /// `Ready` or rebuilding ignores the call. A missing container leaves the
    /// state `Uninitialized` and polls for it until it appears or the manager
    /// is disposed.
    pub fn initialize(&self, container_id: &str, center: Option<Coordinates>) -> MapState {
        let mut guard = self.lock();
        let runtime = &mut *guard;
        if !runtime.mounted {
            return runtime.state;
        }
        match runtime.state {
            MapState::Initializing | MapState::Ready | MapState::Reinitializing => {
                if runtime.container_id != container_id.trim() {
                    log::warn!(
                        "map already bound to container '{}'; ignoring initialize for '{}'",
                        runtime.container_id,
                        container_id
                    );
                }
                return runtime.state;
            }
            MapState::Destroyed => runtime.state = MapState::Uninitialized,
            MapState::Uninitialized => {}
        }

        let container_id = container_id.trim();
        if !container_id.is_empty() {
            runtime.container_id = container_id.to_string();
        }
        if let Some(center) = center.filter(Coordinates::is_plottable) {
            runtime.center = Some(center);
        }
        self.create_widget(runtime)
    }

    /// Replaces the marker set and redraws. Day views also get one route per
    /// same-day adjacent pair.
    pub fn update_markers(&self, markers: Vec<MapMarker>, overview: bool) {
        let mut guard = self.lock();
        let runtime = &mut *guard;
        runtime.markers = markers;
        runtime.overview = overview;
        if !runtime.mounted {
            return;
        }
        if runtime.state == MapState::Ready && runtime.widget.is_some() {
            self.render(runtime);
        } else {
            log::debug!("map not ready ({:?}); deferring marker update", runtime.state);
            self.schedule_reinit(runtime);
        }
    }

    pub fn set_center(&self, center: Coordinates) {
        if !center.is_plottable() {
            log::debug!("ignoring unplottable map center {center:?}");
            return;
        }
        self.lock().center = Some(center);
        let zoom = self.inner.config.focused_zoom;
        self.safe_operation(|widget| widget.set_center(center, zoom));
    }

    /// Runs `operation` against the live widget. When the map is not `Ready`
    /// or the widget call fails, returns `None` and schedules one
    /// reinitialization.
    pub fn safe_operation<T, F>(&self, operation: F) -> Option<T>
    where
        F: FnOnce(&mut dyn MapWidget) -> Result<T, WidgetError>,
    {
        let mut guard = self.lock();
        let runtime = &mut *guard;
        if !runtime.mounted {
            return None;
        }
        if runtime.state != MapState::Ready {
            log::debug!("skipping map operation while {:?}", runtime.state);
            self.schedule_reinit(runtime);
            return None;
        }
        let Some(widget) = runtime.widget.as_mut() else {
            self.schedule_reinit(runtime);
            return None;
        };
        match operation(&mut **widget) {
            Ok(value) => Some(value),
            Err(error) => {
                self.record_failure(runtime, format!("map operation failed: {error}"));
                self.schedule_reinit(runtime);
                None
            }
        }
    }

    /// Removes markers, routes and the widget. Safe to call repeatedly.
    pub fn cleanup(&self) {
        let mut guard = self.lock();
        let runtime = &mut *guard;
        if runtime.state == MapState::Destroyed && runtime.widget.is_none() {
            return;
        }
        self.teardown(runtime);
        runtime.state = MapState::Destroyed;
    }

    /// Final teardown. Pending retries and route results find the manager
    /// unmounted and do nothing.
    pub fn dispose(&self) {
        let mut guard = self.lock();
        let runtime = &mut *guard;
        runtime.mounted = false;
        self.teardown(runtime);
        runtime.state = MapState::Destroyed;
    }

    /// Tears the widget down, waits for the provider to settle, then creates
    /// it again and redraws the current markers.
    pub async fn reinitialize(&self) -> MapState {
        {
            let mut guard = self.lock();
            let runtime = &mut *guard;
            if !runtime.mounted {
                return runtime.state;
            }
            self.teardown(runtime);
            runtime.state = MapState::Reinitializing;
        }

        tokio::time::sleep(self.inner.config.timings.forced_reinit_settle()).await;

        let mut guard = self.lock();
        let runtime = &mut *guard;
        if !runtime.mounted || runtime.state != MapState::Reinitializing {
            return runtime.state;
        }
        self.create_widget(runtime)
    }

    /// Waits for the route drawing started by the latest redraw, if any.
    pub async fn wait_for_routes(&self) {
        let task = self.lock().route_task.take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                if !error.is_cancelled() {
                    log::warn!("route drawing task failed: {error}");
                }
            }
        }
    }

    fn max_failures(&self) -> u32 {
        self.inner.config.max_consecutive_failures.max(1)
    }

    fn create_widget(&self, runtime: &mut MapRuntime) -> MapState {
        runtime.state = MapState::Initializing;
        if !self.inner.host.container_exists(&runtime.container_id) {
            log::debug!("map container '{}' not present yet", runtime.container_id);
            runtime.state = MapState::Uninitialized;
            self.schedule_container_retry(runtime);
            return runtime.state;
        }

        let options = match runtime.center {
            Some(center) => MapOptions {
                center,
                zoom: self.inner.config.focused_zoom,
            },
            None => MapOptions {
                center: self.inner.config.default_center(),
                zoom: self.inner.config.default_zoom,
            },
        };
        match self.inner.host.create_map(&runtime.container_id, &options) {
            Ok(widget) => {
                runtime.widget = Some(widget);
                runtime.state = MapState::Ready;
                self.render(runtime);
            }
            Err(WidgetError::ContainerMissing(container_id)) => {
                log::debug!("map container '{container_id}' vanished during creation");
                runtime.state = MapState::Uninitialized;
                self.schedule_container_retry(runtime);
            }
            Err(error) => {
                runtime.state = MapState::Uninitialized;
                self.record_failure(runtime, format!("map creation failed: {error}"));
                self.schedule_reinit(runtime);
            }
        }
        runtime.state
    }

    fn render(&self, runtime: &mut MapRuntime) {
        if let Some(task) = runtime.route_task.take() {
            task.abort();
        }
        self.clear_overlays(runtime);
        runtime.epoch += 1;

        let Some(widget) = runtime.widget.as_mut() else {
            return;
        };
        let mut drawn = Vec::with_capacity(runtime.markers.len());
        let mut failure = None;
        for (index, marker) in runtime.markers.iter().enumerate() {
            let spec = MarkerSpec {
                position: marker.coordinates,
                label: (index + 1).to_string(),
                title: marker.name.clone(),
            };
            let marker_id = match widget.add_marker(&spec) {
                Ok(marker_id) => marker_id,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            };
            drawn.push(marker_id);
            let info = InfoWindowSpec::for_marker(marker, index + 1);
            if let Err(error) = widget.bind_info_window(marker_id, &info) {
                failure = Some(error);
                break;
            }
        }
        runtime.overlays.extend(drawn);

        if let Some(error) = failure {
            self.record_failure(runtime, format!("drawing markers failed: {error}"));
            self.schedule_reinit(runtime);
            return;
        }
        runtime.consecutive_failures = 0;
        runtime.last_failure = None;

        if runtime.overview {
            return;
        }
        let legs = same_day_pairs(&runtime.markers)
            .map(|(from, to)| RouteRequest {
                from: from.coordinates,
                to: to.coordinates,
                mode: to.transport_mode,
            })
            .collect::<Vec<_>>();
        if legs.is_empty() {
            return;
        }
        let manager = self.clone();
        let epoch = runtime.epoch;
        runtime.route_task = spawn_detached(async move {
            manager.draw_routes(epoch, legs).await;
        });
    }

    async fn draw_routes(self, epoch: u64, legs: Vec<RouteRequest>) {
        for leg in legs {
            if !self.is_current(epoch) {
                return;
            }
            let paths = match search_route(self.inner.provider.as_ref(), leg).await {
                Ok(result) => result.paths(),
                Err(error) => {
                    log::debug!("no drawable {} route, using straight line: {error}", leg.mode);
                    Vec::new()
                }
            };
            if !self.draw_leg(epoch, leg, paths) {
                return;
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        let runtime = self.lock();
        runtime.mounted && runtime.epoch == epoch && runtime.state == MapState::Ready
    }

    fn draw_leg(&self, epoch: u64, leg: RouteRequest, paths: Vec<Vec<Coordinates>>) -> bool {
        let mut guard = self.lock();
        let runtime = &mut *guard;
        if !runtime.mounted || runtime.epoch != epoch || runtime.state != MapState::Ready {
            return false;
        }
        let lines = if paths.is_empty() {
            vec![PolylineSpec::straight(leg.from, leg.to, leg.mode)]
        } else {
            paths
                .into_iter()
                .map(|path| PolylineSpec::route(path, leg.mode))
                .collect()
        };
        let Some(widget) = runtime.widget.as_mut() else {
            return false;
        };

        let mut failure = None;
        for line in &lines {
            match widget.add_polyline(line) {
                Ok(line_id) => runtime.overlays.push(line_id),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }
        if let Some(error) = failure {
            self.record_failure(runtime, format!("drawing route failed: {error}"));
            self.schedule_reinit(runtime);
            return false;
        }
        true
    }

    fn clear_overlays(&self, runtime: &mut MapRuntime) {
        let overlays = std::mem::take(&mut runtime.overlays);
        let Some(widget) = runtime.widget.as_mut() else {
            return;
        };
        for overlay in overlays {
            if let Err(error) = widget.remove(overlay) {
                log::debug!("failed to remove overlay {overlay}: {error}");
            }
        }
    }

    fn teardown(&self, runtime: &mut MapRuntime) {
        if let Some(task) = runtime.route_task.take() {
            task.abort();
        }
        self.clear_overlays(runtime);
        if let Some(mut widget) = runtime.widget.take() {
            if let Err(error) = widget.destroy() {
                log::warn!("failed to destroy map widget: {error}");
            }
        }
        runtime.epoch += 1;
    }

    fn record_failure(&self, runtime: &mut MapRuntime, message: String) {
        runtime.consecutive_failures += 1;
        log::warn!(
            "{message} ({} consecutive failures)",
            runtime.consecutive_failures
        );
        if runtime.consecutive_failures >= self.max_failures() {
            log::error!("map recovery abandoned: {message}");
            runtime.last_failure = Some(MapLifecycleFailure {
                message,
                consecutive_failures: runtime.consecutive_failures,
            });
        }
    }

    /// At most one reinitialization is pending at a time.
    fn schedule_reinit(&self, runtime: &mut MapRuntime) {
        if !runtime.mounted || runtime.reinit_scheduled {
            return;
        }
        if runtime.consecutive_failures >= self.max_failures() {
            log::debug!("not scheduling map reinitialization after repeated failures");
            return;
        }
        let manager = self.clone();
        let delay = self.inner.config.timings.failure_reinit_delay();
        let scheduled = spawn_detached(async move {
            tokio::time::sleep(delay).await;
            manager.run_scheduled_reinit();
        });
        if scheduled.is_some() {
            runtime.reinit_scheduled = true;
            runtime.scheduled_reinits += 1;
        }
    }

    fn run_scheduled_reinit(&self) {
        let mut guard = self.lock();
        let runtime = &mut *guard;
        runtime.reinit_scheduled = false;
        if !runtime.mounted {
            return;
        }
        self.teardown(runtime);
        runtime.state = MapState::Reinitializing;
        self.create_widget(runtime);
    }

    fn schedule_container_retry(&self, runtime: &mut MapRuntime) {
        if !runtime.mounted || runtime.container_retry_pending {
            return;
        }
        let manager = self.clone();
        let delay = self.inner.config.timings.container_retry_delay();
        let scheduled = spawn_detached(async move {
            tokio::time::sleep(delay).await;
            manager.retry_container();
        });
        runtime.container_retry_pending = scheduled.is_some();
    }

    fn retry_container(&self) {
        let mut guard = self.lock();
        let runtime = &mut *guard;
        runtime.container_retry_pending = false;
        if runtime.mounted && runtime.state == MapState::Uninitialized {
            self.create_widget(runtime);
        }
    }
}

fn spawn_detached<F>(future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Some(handle.spawn(future)),
        Err(error) => {
            log::warn!("no async runtime for map task: {error}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TransportMode;
    use crate::infrastructure::config::MapTimingsConfig;
    use crate::infrastructure::map_widget::testing::FakeMapHost;
    use crate::infrastructure::map_widget::LineStyle;
    use crate::infrastructure::routing_provider::testing::{Reply, ScriptedRoutingProvider};
    use std::time::Duration;

    type TestManager = MapLifecycleManager<FakeMapHost, ScriptedRoutingProvider>;

    fn config(max_consecutive_failures: u32) -> MapConfig {
        MapConfig {
            timings: MapTimingsConfig::default(),
            max_consecutive_failures,
            ..MapConfig::default()
        }
    }

    fn manager_with(host: &FakeMapHost, provider: ScriptedRoutingProvider) -> TestManager {
        MapLifecycleManager::new(Arc::new(host.clone()), Arc::new(provider), config(5))
    }

    fn marker(activity_id: i64, day_id: i64, mode: TransportMode) -> MapMarker {
        MapMarker {
            activity_id,
            day_id,
            day_index: 0,
            activity_index: activity_id as usize,
            name: format!("Stop {activity_id}"),
            activity_name: format!("Stop {activity_id}"),
            description: None,
            address: None,
            day_label: None,
            coordinates: Coordinates::new(121.40 + activity_id as f64 / 100.0, 31.20),
            transport_mode: mode,
        }
    }

    async fn settle(duration_ms: u64) {
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_creates_widget_and_draws_labelled_markers() {
        let host = FakeMapHost::with_container("container");
        let manager = manager_with(&host, ScriptedRoutingProvider::default());
        manager.update_markers(
            vec![marker(1, 1, TransportMode::Walking), marker(2, 1, TransportMode::Walking)],
            true,
        );
        assert_eq!(manager.initialize("container", None), MapState::Ready);

        let state = host.lock();
        assert_eq!(state.created, 1);
        let options = state.last_options.expect("options");
        assert_eq!(options.zoom, 4.0);
        let mut labels = state
            .markers
            .values()
            .map(|marker| marker.label.clone())
            .collect::<Vec<_>>();
        labels.sort();
        assert_eq!(labels, vec!["1".to_string(), "2".to_string()]);
        let mut footers = state
            .info_windows
            .values()
            .map(|info| info.footer.clone())
            .collect::<Vec<_>>();
        footers.sort();
        assert_eq!(footers, vec!["Marker #1".to_string(), "Marker #2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_center_uses_focused_zoom_and_initialize_is_deduplicated() {
        let host = FakeMapHost::with_container("container");
        let manager = manager_with(&host, ScriptedRoutingProvider::default());
        let center = Coordinates::new(121.47, 31.23);

        assert_eq!(manager.initialize("container", Some(center)), MapState::Ready);
        assert_eq!(manager.initialize("container", Some(center)), MapState::Ready);
        assert_eq!(host.lock().created, 1);
        assert_eq!(host.lock().last_options.expect("options").zoom, 11.0);

        manager.set_center(Coordinates::new(121.50, 31.25));
        assert_eq!(host.lock().centers.len(), 1);
        assert_eq!(manager.scheduled_reinitializations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_container_is_polled_until_it_appears() {
        let host = FakeMapHost::default();
        let manager = manager_with(&host, ScriptedRoutingProvider::default());

        assert_eq!(manager.initialize("container", None), MapState::Uninitialized);
        settle(350).await;
        assert_eq!(manager.state(), MapState::Uninitialized);
        assert_eq!(host.lock().created, 0);

        host.add_container("container");
        settle(150).await;
        assert_eq!(manager.state(), MapState::Ready);
        assert_eq!(host.lock().created, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_stops_container_polling() {
        let host = FakeMapHost::default();
        let manager = manager_with(&host, ScriptedRoutingProvider::default());

        manager.initialize("container", None);
        manager.dispose();
        host.add_container("container");
        settle(500).await;

        assert_eq!(manager.state(), MapState::Destroyed);
        assert!(!manager.is_mounted());
        assert_eq!(host.lock().created, 0);
        assert_eq!(manager.initialize("container", None), MapState::Destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_while_not_ready_schedule_exactly_one_reinit() {
        let host = FakeMapHost::with_container("container");
        let manager = manager_with(&host, ScriptedRoutingProvider::default());

        manager.update_markers(vec![marker(1, 1, TransportMode::Walking)], true);
        manager.set_center(Coordinates::new(121.47, 31.23));
        let skipped = manager.safe_operation(|widget| widget.set_center(Coordinates::new(121.0, 31.0), 9.0));
        assert!(skipped.is_none());
        assert_eq!(manager.scheduled_reinitializations(), 1);
        assert_eq!(host.lock().created, 0);

        settle(150).await;
        assert_eq!(manager.state(), MapState::Ready);
        assert_eq!(host.marker_titles(), vec!["Stop 1".to_string()]);
        assert_eq!(manager.scheduled_reinitializations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn widget_failure_inside_operation_triggers_rebuild() {
        let host = FakeMapHost::with_container("container");
        let manager = manager_with(&host, ScriptedRoutingProvider::default());
        manager.initialize("container", None);

        host.lock().failing_operations = 1;
        let result = manager.safe_operation(|widget| widget.set_center(Coordinates::new(121.0, 31.0), 11.0));
        assert!(result.is_none());
        assert_eq!(manager.scheduled_reinitializations(), 1);

        settle(150).await;
        assert_eq!(manager.state(), MapState::Ready);
        assert_eq!(host.lock().created, 2);
        assert_eq!(manager.last_failure(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_is_idempotent_and_map_can_come_back() {
        let host = FakeMapHost::with_container("container");
        let manager = manager_with(&host, ScriptedRoutingProvider::default());
        manager.initialize("container", None);
        manager.update_markers(vec![marker(1, 1, TransportMode::Walking)], true);

        manager.cleanup();
        manager.cleanup();
        assert_eq!(manager.state(), MapState::Destroyed);
        assert_eq!(host.lock().destroyed, 1);
        assert!(host.lock().markers.is_empty());

        assert_eq!(manager.initialize("container", None), MapState::Ready);
        assert_eq!(host.marker_titles(), vec!["Stop 1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn day_view_draws_same_day_routes_with_fallback() {
        let host = FakeMapHost::with_container("container");
        let provider = ScriptedRoutingProvider::default()
            .with_reply(TransportMode::Driving, Reply::Duration(900))
            .with_reply(TransportMode::Cycling, Reply::NoData);
        let manager = manager_with(&host, provider);
        manager.initialize("container", None);

        manager.update_markers(
            vec![
                marker(1, 1, TransportMode::Walking),
                marker(2, 1, TransportMode::Driving),
                marker(3, 1, TransportMode::Cycling),
                marker(4, 2, TransportMode::Driving),
            ],
            false,
        );
        manager.wait_for_routes().await;

        let lines = host.polylines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].style, LineStyle::Solid);
        assert_eq!(lines[0].color, "#ff0000");
        assert_eq!(lines[1].style, LineStyle::Dashed);
        assert_eq!(lines[1].color, "#2196f3");
    }

    #[tokio::test(start_paused = true)]
    async fn overview_draws_no_routes() {
        let host = FakeMapHost::with_container("container");
        let provider = Arc::new(ScriptedRoutingProvider::default());
        let manager = MapLifecycleManager::new(Arc::new(host.clone()), Arc::clone(&provider), config(5));
        manager.initialize("container", None);

        manager.update_markers(
            vec![marker(1, 1, TransportMode::Walking), marker(2, 1, TransportMode::Walking)],
            true,
        );
        manager.wait_for_routes().await;
        assert!(host.polylines().is_empty());
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_creation_failures_surface_a_lifecycle_failure() {
        let host = FakeMapHost::with_container("container");
        host.lock().failing_creates = 100;
        let manager = MapLifecycleManager::new(
            Arc::new(host.clone()),
            Arc::new(ScriptedRoutingProvider::default()),
            config(3),
        );

        assert_eq!(manager.initialize("container", None), MapState::Uninitialized);
        settle(1_000).await;

        let failure = manager.last_failure().expect("failure surfaced");
        assert_eq!(failure.consecutive_failures, 3);
        assert_eq!(manager.scheduled_reinitializations(), 2);
        assert_eq!(host.lock().created, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_reinitialize_waits_for_settle_and_redraws() {
        let host = FakeMapHost::with_container("container");
        let manager = manager_with(&host, ScriptedRoutingProvider::default());
        manager.initialize("container", None);
        manager.update_markers(vec![marker(1, 1, TransportMode::Walking)], true);

        let rebuilding = manager.clone();
        let task = tokio::spawn(async move { rebuilding.reinitialize().await });
        tokio::task::yield_now().await;
        assert_eq!(manager.state(), MapState::Reinitializing);
        assert_eq!(manager.initialize("container", None), MapState::Reinitializing);
        assert!(host.lock().markers.is_empty());

        assert_eq!(task.await.expect("reinitialize task"), MapState::Ready);
        assert_eq!(host.lock().created, 2);
        assert_eq!(host.marker_titles(), vec!["Stop 1".to_string()]);
    }
}
