use crate::domain::markers::MapMarker;
use crate::domain::models::{Coordinates, TransportMode};
use serde::Serialize;
use thiserror::Error;

pub type OverlayId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WidgetError {
    #[error("map container '{0}' is not present")]
    ContainerMissing(String),
    #[error("map widget has been destroyed")]
    Destroyed,
    #[error("map widget rejected the operation: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapOptions {
    pub center: Coordinates,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSpec {
    pub position: Coordinates,
    pub label: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dashed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolylineSpec {
    pub path: Vec<Coordinates>,
    pub color: &'static str,
    pub style: LineStyle,
    pub weight: u32,
}

impl PolylineSpec {
    pub fn route(path: Vec<Coordinates>, mode: TransportMode) -> Self {
        Self {
            path,
            color: mode.stroke_color(),
            style: LineStyle::Solid,
            weight: 5,
        }
    }

    /// Fallback when the provider has no usable route for the pair.
    pub fn straight(from: Coordinates, to: Coordinates, mode: TransportMode) -> Self {
        Self {
            path: vec![from, to],
            color: mode.stroke_color(),
            style: LineStyle::Dashed,
            weight: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoWindowSpec {
    pub title: String,
    pub day_label: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub footer: String,
}

impl InfoWindowSpec {
    /// `position` is 1-based.
    pub fn for_marker(marker: &MapMarker, position: usize) -> Self {
        Self {
            title: marker.activity_name.clone(),
            day_label: marker.day_label.clone(),
            description: marker.description.clone(),
            address: marker.address.clone(),
            footer: format!("Marker #{position}"),
        }
    }
}

/// Locates containers and creates widget instances inside them.
pub trait MapWidgetHost: Send + Sync {
    fn container_exists(&self, container_id: &str) -> bool;

    fn create_map(
        &self,
        container_id: &str,
        options: &MapOptions,
    ) -> Result<Box<dyn MapWidget>, WidgetError>;
}

/// One live map instance. Every call may fail if the widget was torn down
/// underneath its owner.
pub trait MapWidget: Send {
    fn add_marker(&mut self, marker: &MarkerSpec) -> Result<OverlayId, WidgetError>;
    fn bind_info_window(
        &mut self,
        marker: OverlayId,
        info: &InfoWindowSpec,
    ) -> Result<(), WidgetError>;
    fn add_polyline(&mut self, line: &PolylineSpec) -> Result<OverlayId, WidgetError>;
    fn remove(&mut self, overlay: OverlayId) -> Result<(), WidgetError>;
    fn set_center(&mut self, center: Coordinates, zoom: f64) -> Result<(), WidgetError>;
    fn destroy(&mut self) -> Result<(), WidgetError>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DayId;

    fn marker(day_id: DayId) -> MapMarker {
        MapMarker {
            activity_id: 9,
            day_id,
            day_index: 0,
            activity_index: 2,
            name: "2025-05-01 - Museum".to_string(),
            activity_name: "Museum".to_string(),
            description: Some("Closed Mondays".to_string()),
            address: Some("1 Museum Rd".to_string()),
            day_label: Some("Day 1".to_string()),
            coordinates: Coordinates::new(121.47, 31.23),
            transport_mode: TransportMode::Walking,
        }
    }

    #[test]
    fn info_window_lists_marker_details() {
        let info = InfoWindowSpec::for_marker(&marker(1), 3);
        assert_eq!(info.title, "Museum");
        assert_eq!(info.day_label.as_deref(), Some("Day 1"));
        assert_eq!(info.footer, "Marker #3");
    }

    #[test]
    fn straight_fallback_is_dashed_in_mode_color() {
        let line = PolylineSpec::straight(
            Coordinates::new(121.47, 31.23),
            Coordinates::new(121.49, 31.24),
            TransportMode::PublicTransit,
        );
        assert_eq!(line.style, LineStyle::Dashed);
        assert_eq!(line.color, "#ff9800");
        assert_eq!(line.path.len(), 2);
    }
}
