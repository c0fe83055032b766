use crate::domain::markers::RouteEdge;
use crate::domain::models::{Coordinates, TransportMode};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::route_cache::{RouteCacheRepository, RouteCell, RouteKey};
use crate::infrastructure::routing_provider::{
    search_route, RouteRequest, RouteSearchResult, RoutingProvider, TransitSegment,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub type RouteUpdateListener = Arc<dyn Fn(RouteKey, RouteCell) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteGeometry {
    Steps { paths: Vec<Vec<Coordinates>> },
    StraightLine { from: Coordinates, to: Coordinates },
}

/// What the UI shows once a transport mode is chosen for an edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDetail {
    pub key: RouteKey,
    pub from_name: String,
    pub to_name: String,
    pub duration_seconds: Option<u32>,
    pub duration_label: Option<String>,
    pub instructions: Vec<String>,
    pub transit_segments: Vec<TransitSegment>,
    pub geometry: RouteGeometry,
}

/// Fills the route cache with per-mode travel times. Requests are
/// fire-and-forget: no retry, no timeout, results landing after
/// [`RouteTimeResolver::shutdown`] are dropped.
pub struct RouteTimeResolver<P, C>
where
    P: RoutingProvider + 'static,
    C: RouteCacheRepository + 'static,
{
    provider: Arc<P>,
    cache: Arc<C>,
    active: Arc<AtomicBool>,
    listener: Option<RouteUpdateListener>,
}

impl<P, C> Clone for RouteTimeResolver<P, C>
where
    P: RoutingProvider + 'static,
    C: RouteCacheRepository + 'static,
{
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            cache: Arc::clone(&self.cache),
            active: Arc::clone(&self.active),
            listener: self.listener.clone(),
        }
    }
}

impl<P, C> RouteTimeResolver<P, C>
where
    P: RoutingProvider + 'static,
    C: RouteCacheRepository + 'static,
{
    pub fn new(provider: Arc<P>, cache: Arc<C>) -> Self {
        Self {
            provider,
            cache,
            active: Arc::new(AtomicBool::new(true)),
            listener: None,
        }
    }

    pub fn with_update_listener(mut self, listener: RouteUpdateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stops accepting results. In-flight searches are not cancelled.
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn durations_for_day(&self, day_index: usize) -> Result<Vec<(RouteKey, RouteCell)>, InfraError> {
        self.cache.list_day(day_index)
    }

    /// Requests every mode of every edge that has no pending or successful
    /// cell yet.
    pub fn resolve_edges(&self, edges: &[RouteEdge]) -> Result<Vec<JoinHandle<()>>, InfraError> {
        self.dispatch(edges, true)
    }

    /// Requests every mode of every edge again, overwriting whatever the
    /// positional keys currently hold.
    pub fn refresh_edges(&self, edges: &[RouteEdge]) -> Result<Vec<JoinHandle<()>>, InfraError> {
        self.dispatch(edges, false)
    }

    fn dispatch(
        &self,
        edges: &[RouteEdge],
        skip_known: bool,
    ) -> Result<Vec<JoinHandle<()>>, InfraError> {
        if !self.is_active() {
            return Ok(Vec::new());
        }
        let runtime = Handle::try_current().map_err(|error| {
            InfraError::RouteResolution(format!("no async runtime for route requests: {error}"))
        })?;

        let mut handles = Vec::with_capacity(edges.len() * TransportMode::ALL.len());
        for edge in edges {
            for mode in TransportMode::ALL {
                let key = RouteKey::new(edge.day_index, edge.edge_index, mode);
                if skip_known {
                    match self.cache.get(&key)? {
                        Some(RouteCell::Pending) | Some(RouteCell::Resolved(Some(_))) => continue,
                        Some(RouteCell::Resolved(None)) | None => {}
                    }
                }
                self.cache.put(key, RouteCell::Pending)?;

                let request = RouteRequest {
                    from: edge.from,
                    to: edge.to,
                    mode,
                };
                let resolver = self.clone();
                handles.push(runtime.spawn(async move {
                    let duration = match search_route(resolver.provider.as_ref(), request).await {
                        Ok(result) => result.duration_seconds(),
                        Err(error) => {
                            log::debug!("route time for {key:?} unavailable: {error}");
                            None
                        }
                    };
                    resolver.store(key, RouteCell::Resolved(duration));
                }));
            }
        }
        Ok(handles)
    }

    fn store(&self, key: RouteKey, cell: RouteCell) {
        if !self.is_active() {
            log::debug!("discarding route result for {key:?} after shutdown");
            return;
        }
        if let Err(error) = self.cache.put(key, cell) {
            log::warn!("failed to cache route result for {key:?}: {error}");
            return;
        }
        if let Some(listener) = &self.listener {
            listener(key, cell);
        }
    }

    /// Full route for one edge in `mode`. Falls back to a straight line when
    /// the provider has no drawable route.
    pub async fn request_route_detail(&self, edge: &RouteEdge, mode: TransportMode) -> RouteDetail {
        let key = RouteKey::new(edge.day_index, edge.edge_index, mode);
        let request = RouteRequest {
            from: edge.from,
            to: edge.to,
            mode,
        };
        let result = match search_route(self.provider.as_ref(), request).await {
            Ok(result) => Some(result),
            Err(error) => {
                log::debug!("route geometry for {key:?} unavailable: {error}");
                None
            }
        };

        let duration_seconds = result.as_ref().and_then(RouteSearchResult::duration_seconds);
        self.store(key, RouteCell::Resolved(duration_seconds));

        let paths = result.as_ref().map(RouteSearchResult::paths).unwrap_or_default();
        let geometry = if paths.is_empty() {
            RouteGeometry::StraightLine {
                from: edge.from,
                to: edge.to,
            }
        } else {
            RouteGeometry::Steps { paths }
        };
        let instructions = result
            .as_ref()
            .and_then(|result| result.routes.first())
            .map(|route| {
                route
                    .steps
                    .iter()
                    .map(|step| step.instruction.trim().to_string())
                    .filter(|instruction| !instruction.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let transit_segments = result
            .as_ref()
            .and_then(|result| result.plans.first())
            .map(|plan| plan.segments.clone())
            .unwrap_or_default();

        RouteDetail {
            key,
            from_name: edge.from_name.clone(),
            to_name: edge.to_name.clone(),
            duration_seconds,
            duration_label: duration_seconds.map(format_duration_label),
            instructions,
            transit_segments,
            geometry,
        }
    }
}

pub fn format_duration_label(seconds: u32) -> String {
    let minutes = if seconds == 0 {
        0
    } else {
        (seconds.saturating_add(30) / 60).max(1)
    };
    match (minutes / 60, minutes % 60) {
        (0, minutes) => format!("{minutes}m"),
        (hours, 0) => format!("{hours}h"),
        (hours, minutes) => format!("{hours}h {minutes}m"),
    }
}
