use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub type ItineraryId = i64;
pub type DayId = i64;
pub type ActivityId = i64;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    #[default]
    Walking,
    Cycling,
    Driving,
    PublicTransit,
}

impl TransportMode {
    pub const ALL: [TransportMode; 4] = [
        TransportMode::Walking,
        TransportMode::Cycling,
        TransportMode::Driving,
        TransportMode::PublicTransit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Walking => "walking",
            Self::Cycling => "cycling",
            Self::Driving => "driving",
            Self::PublicTransit => "public-transit",
        }
    }

    /// Accepts the wire labels plus the localized labels older backend rows
    /// were stored with.
    pub fn parse_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "walking" | "walk" | "步行" => Some(Self::Walking),
            "cycling" | "riding" | "骑行" | "骑乘" => Some(Self::Cycling),
            "driving" | "drive" | "驾车" => Some(Self::Driving),
            "public-transit" | "public_transit" | "public" | "transit" | "公交"
            | "公共交通" => Some(Self::PublicTransit),
            _ => None,
        }
    }

    pub fn stroke_color(self) -> &'static str {
        match self {
            Self::Walking => "#4caf50",
            Self::Cycling => "#2196f3",
            Self::Driving => "#ff0000",
            Self::PublicTransit => "#ff9800",
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Zero on either axis means the place was never geocoded.
    pub fn is_plottable(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && self.longitude != 0.0
            && self.latitude != 0.0
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationRef {
    pub attraction_id: Option<i64>,
    pub name: String,
    pub coordinates: Option<Coordinates>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalPlace {
    pub poi_id: String,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub description: Option<String>,
    pub coordinates: Coordinates,
    pub tel: Option<String>,
    pub kind: Option<String>,
}

impl ExternalPlace {
    /// Same name and position as `location`.
    pub fn matches_location(&self, location: Option<&LocationRef>) -> bool {
        location.is_some_and(|location| {
            location.name.trim() == self.name.trim()
                && location.coordinates == Some(self.coordinates)
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.poi_id, "place.poi_id")?;
        validate_non_empty(&self.name, "place.name")?;
        if !self.coordinates.is_plottable() {
            return Err("place.coordinates must be a valid longitude/latitude pair".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PlaceSelection {
    Catalog { attraction_id: i64 },
    External(ExternalPlace),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: ActivityId,
    pub day_id: DayId,
    pub title: String,
    pub location: Option<LocationRef>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub transport_mode: TransportMode,
    pub notes: String,
    pub prev_id: Option<ActivityId>,
    pub next_id: Option<ActivityId>,
}

impl Activity {
    pub fn display_name(&self) -> &str {
        self.location
            .as_ref()
            .map(|location| location.name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(self.title.as_str())
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.location
            .as_ref()
            .and_then(|location| location.coordinates)
            .filter(Coordinates::is_plottable)
    }

    pub fn time_label(&self) -> String {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => {
                format!("{}-{}", format_clock_time(start), format_clock_time(end))
            }
            (Some(start), None) => format_clock_time(start),
            (None, Some(end)) => format!("until {}", format_clock_time(end)),
            (None, None) => "time to be decided".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "activity.title")?;
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end < start {
                return Err("activity.end_time must be >= activity.start_time".to_string());
            }
        }
        if self.prev_id == Some(self.id) || self.next_id == Some(self.id) {
            return Err("activity must not link to itself".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItineraryDay {
    pub id: DayId,
    pub day_number: u32,
    pub date: Option<NaiveDate>,
    pub title: String,
    pub first_activity_id: Option<ActivityId>,
}

impl ItineraryDay {
    pub fn day_label(&self) -> String {
        format!("Day {}", self.day_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Itinerary {
    pub id: ItineraryId,
    pub title: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days: Vec<ItineraryDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewActivity {
    pub title: String,
    pub transport_mode: TransportMode,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub place: PlaceSelection,
}

impl NewActivity {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "activity.title")?;
        if let PlaceSelection::External(place) = &self.place {
            place.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeChange {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

/// Field-scoped edit. `None` leaves a field untouched; each present field maps
/// to one backend update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityPatch {
    pub title: Option<String>,
    pub time: Option<TimeChange>,
    pub notes: Option<String>,
    pub attraction_id: Option<i64>,
    /// Relocates the activity to a provider place outside the catalogue.
    pub external_place: Option<ExternalPlace>,
}

impl ActivityPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.time.is_none()
            && self.notes.is_none()
            && self.attraction_id.is_none()
            && self.external_place.is_none()
    }

    /// Drops every field that already matches `current`.
    pub fn changes_against(&self, current: &Activity) -> ActivityPatch {
        let current_attraction = current
            .location
            .as_ref()
            .and_then(|location| location.attraction_id);
        ActivityPatch {
            title: self
                .title
                .as_ref()
                .map(|title| title.trim().to_string())
                .filter(|title| title != current.title.trim()),
            time: self.time.filter(|time| {
                time.start != current.start_time || time.end != current.end_time
            }),
            notes: self
                .notes
                .clone()
                .filter(|notes| notes.trim() != current.notes.trim()),
            attraction_id: self
                .attraction_id
                .filter(|attraction_id| Some(*attraction_id) != current_attraction),
            external_place: self
                .external_place
                .clone()
                .filter(|place| !place.matches_location(current.location.as_ref())),
        }
    }
}

/// Reconstructed, render-ready view of one day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayPlan {
    pub day: ItineraryDay,
    pub day_index: usize,
    pub activities: Vec<Activity>,
    pub integrity_error: Option<String>,
}

impl DayPlan {
    pub fn position_of(&self, activity_id: ActivityId) -> Option<usize> {
        self.activities
            .iter()
            .position(|activity| activity.id == activity_id)
    }

    pub fn activity(&self, activity_id: ActivityId) -> Option<&Activity> {
        self.activities
            .iter()
            .find(|activity| activity.id == activity_id)
    }

    pub fn is_corrupted(&self) -> bool {
        self.integrity_error.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MapView {
    #[default]
    Overview,
    Day(DayId),
}

pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub fn format_clock_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(value: &str) -> NaiveTime {
        parse_clock_time(value).expect("valid clock time")
    }

    fn sample_activity() -> Activity {
        Activity {
            id: 7,
            day_id: 1,
            title: "Morning walk".to_string(),
            location: Some(LocationRef {
                attraction_id: Some(42),
                name: "The Bund".to_string(),
                coordinates: Some(Coordinates::new(121.490317, 31.241701)),
                address: Some("Zhongshan East 1st Rd".to_string()),
            }),
            start_time: Some(clock("09:00")),
            end_time: Some(clock("10:30")),
            transport_mode: TransportMode::Walking,
            notes: String::new(),
            prev_id: None,
            next_id: Some(8),
        }
    }

    #[test]
    fn transport_mode_parses_wire_and_legacy_labels() {
        assert_eq!(TransportMode::parse_label("public-transit"), Some(TransportMode::PublicTransit));
        assert_eq!(TransportMode::parse_label(" Driving "), Some(TransportMode::Driving));
        assert_eq!(TransportMode::parse_label("步行"), Some(TransportMode::Walking));
        assert_eq!(TransportMode::parse_label("公共交通"), Some(TransportMode::PublicTransit));
        assert_eq!(TransportMode::parse_label("teleport"), None);
    }

    #[test]
    fn transport_mode_serializes_as_kebab_case() {
        let encoded = serde_json::to_string(&TransportMode::PublicTransit).expect("encode");
        assert_eq!(encoded, "\"public-transit\"");
    }

    #[test]
    fn clock_time_accepts_minutes_and_seconds() {
        assert_eq!(parse_clock_time("09:30"), parse_clock_time("09:30:00"));
        assert!(parse_clock_time("25:00").is_none());
        assert_eq!(format_clock_time(clock("07:05:59")), "07:05");
    }

    #[test]
    fn coordinates_with_zero_axis_are_not_plottable() {
        assert!(!Coordinates::new(0.0, 31.2).is_plottable());
        assert!(!Coordinates::new(f64::NAN, 31.2).is_plottable());
        assert!(Coordinates::new(121.4, 31.2).is_plottable());
    }

    #[test]
    fn activity_time_label_covers_partial_times() {
        let mut activity = sample_activity();
        assert_eq!(activity.time_label(), "09:00-10:30");
        activity.end_time = None;
        assert_eq!(activity.time_label(), "09:00");
        activity.start_time = None;
        activity.end_time = Some(clock("12:00"));
        assert_eq!(activity.time_label(), "until 12:00");
        activity.end_time = None;
        assert_eq!(activity.time_label(), "time to be decided");
    }

    #[test]
    fn activity_validate_rejects_reverse_time_and_self_links() {
        let mut activity = sample_activity();
        assert!(activity.validate().is_ok());
        activity.end_time = Some(clock("08:00"));
        assert!(activity.validate().is_err());

        let mut looped = sample_activity();
        looped.next_id = Some(looped.id);
        assert!(looped.validate().is_err());
    }

    #[test]
    fn patch_identical_to_current_values_is_empty() {
        let activity = sample_activity();
        let patch = ActivityPatch {
            title: Some("Morning walk".to_string()),
            time: Some(TimeChange {
                start: activity.start_time,
                end: activity.end_time,
            }),
            notes: Some(String::new()),
            attraction_id: Some(42),
            external_place: None,
        };
        assert!(patch.changes_against(&activity).is_empty());
    }

    #[test]
    fn patch_keeps_only_changed_fields() {
        let activity = sample_activity();
        let patch = ActivityPatch {
            title: Some("Evening walk".to_string()),
            time: Some(TimeChange {
                start: activity.start_time,
                end: activity.end_time,
            }),
            notes: None,
            attraction_id: Some(43),
            external_place: None,
        };
        let changes = patch.changes_against(&activity);
        assert_eq!(changes.title.as_deref(), Some("Evening walk"));
        assert!(changes.time.is_none());
        assert_eq!(changes.attraction_id, Some(43));
    }

    #[test]
    fn external_place_patch_is_dropped_when_already_located_there() {
        let activity = sample_activity();
        let mut place = ExternalPlace {
            poi_id: "B00155L3FZ".to_string(),
            name: " The Bund ".to_string(),
            address: None,
            city: Some("Shanghai".to_string()),
            description: None,
            coordinates: Coordinates::new(121.490317, 31.241701),
            tel: None,
            kind: None,
        };
        let patch = ActivityPatch {
            external_place: Some(place.clone()),
            ..ActivityPatch::default()
        };
        assert!(patch.changes_against(&activity).is_empty());

        place.coordinates = Coordinates::new(121.4737, 31.2304);
        let moved = ActivityPatch {
            external_place: Some(place.clone()),
            ..ActivityPatch::default()
        };
        assert_eq!(moved.changes_against(&activity).external_place, Some(place));
    }

    #[test]
    fn external_place_requires_coordinates() {
        let place = ExternalPlace {
            poi_id: "B0FFG".to_string(),
            name: "Yu Garden".to_string(),
            address: None,
            city: Some("Shanghai".to_string()),
            description: None,
            coordinates: Coordinates::new(0.0, 0.0),
            tel: None,
            kind: None,
        };
        assert!(place.validate().is_err());
    }
}
