use crate::domain::models::{Coordinates, TransportMode};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Complete,
    NoData,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub from: Coordinates,
    pub to: Coordinates,
    pub mode: TransportMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    pub distance_meters: Option<u32>,
    pub duration_seconds: Option<u32>,
    pub path: Vec<Coordinates>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub duration_seconds: Option<u32>,
    pub distance_meters: Option<u32>,
    pub steps: Vec<RouteStep>,
}

/// One leg of a public-transit plan (walk, bus line, metro line).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitSegment {
    pub transit_mode: String,
    pub line_name: Option<String>,
    pub instruction: String,
    pub duration_seconds: Option<u32>,
    pub path: Vec<Coordinates>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitPlan {
    pub duration_seconds: Option<u32>,
    pub segments: Vec<TransitSegment>,
}

/// Provider payload. Walking, cycling and driving fill `routes`; public transit
/// fills `plans`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSearchResult {
    pub routes: Vec<RoutePlan>,
    pub plans: Vec<TransitPlan>,
}

impl RouteSearchResult {
    pub fn duration_seconds(&self) -> Option<u32> {
        if let Some(route) = self.routes.first() {
            return route.duration_seconds;
        }
        self.plans.first().and_then(|plan| plan.duration_seconds)
    }

    /// Drawable paths of the preferred route, skipping legs without geometry.
    pub fn paths(&self) -> Vec<Vec<Coordinates>> {
        let paths = if let Some(route) = self.routes.first() {
            route
                .steps
                .iter()
                .map(|step| step.path.clone())
                .collect::<Vec<_>>()
        } else if let Some(plan) = self.plans.first() {
            plan.segments
                .iter()
                .map(|segment| segment.path.clone())
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };
        paths.into_iter().filter(|path| path.len() >= 2).collect()
    }
}

pub type SearchCallback = Box<dyn FnOnce(SearchStatus, Option<RouteSearchResult>) + Send + 'static>;

/// Callback-style routing service. Implementations may invoke the callback
/// synchronously, later from another task, or never.
pub trait RoutingProvider: Send + Sync {
    fn search(&self, request: RouteRequest, callback: SearchCallback);
}

/// Future-shaped view of [`RoutingProvider::search`]. A provider that drops the
/// callback without calling it yields an error; one that never answers never
/// resolves.
pub async fn search_route<P>(provider: &P, request: RouteRequest) -> Result<RouteSearchResult, InfraError>
where
    P: RoutingProvider + ?Sized,
{
    let (sender, receiver) = oneshot::channel();
    provider.search(
        request,
        Box::new(move |status, result| {
            let _ = sender.send((status, result));
        }),
    );

    let (status, result) = receiver.await.map_err(|_| {
        InfraError::RouteResolution(format!(
            "{} search dropped its callback without answering",
            request.mode
        ))
    })?;

    match (status, result) {
        (SearchStatus::Complete, Some(result)) => Ok(result),
        (SearchStatus::Complete, None) => Err(InfraError::RouteResolution(format!(
            "{} search completed without a result",
            request.mode
        ))),
        (SearchStatus::NoData, _) => Err(InfraError::RouteResolution(format!(
            "no {} route found",
            request.mode
        ))),
        (SearchStatus::Error(message), _) => Err(InfraError::RouteResolution(format!(
            "{} search failed: {message}",
            request.mode
        ))),
    }
}
