use crate::domain::models::{
    format_clock_time, parse_clock_time, Activity, ActivityId, Coordinates, DayId,
    ExternalPlace, Itinerary, ItineraryDay, LocationRef, NewActivity, PlaceSelection,
    TimeChange, TransportMode,
};
use crate::infrastructure::error::InfraError;
use chrono::{NaiveDate, NaiveTime};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttractionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: ActivityId,
    pub itinerary_day_id: DayId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_id: Option<ActivityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<ActivityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attraction: Option<AttractionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attraction_notes: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryDayRecord {
    pub id: DayId,
    #[serde(default)]
    pub day_number: Option<u32>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub first_activity_id: Option<ActivityId>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryRecord {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub itinerary_days: Vec<ItineraryDayRecord>,
}

#[derive(Debug, Clone, serde::Serialize, PartialEq)]
pub struct AttractionInfoRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tel: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Body of `POST /activities` and `POST /activities/amap`. The server inserts
/// before `nextId`, or appends when it is absent.
#[derive(Debug, Clone, serde::Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivityRequest {
    pub itinerary_day_id: DayId,
    pub title: String,
    pub transport_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_id: Option<ActivityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attraction_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attraction_info: Option<AttractionInfoRecord>,
}

impl CreateActivityRequest {
    pub fn is_external(&self) -> bool {
        self.attraction_info.is_some()
    }
}

/// One field-scoped `PUT /activities/{id}/<field>` update.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityFieldUpdate {
    Title(String),
    Time(TimeChange),
    Notes(String),
    Attraction(i64),
    ExternalAttraction(ExternalPlace),
    Transport(TransportMode),
}

impl ActivityFieldUpdate {
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Title(_) => "title",
            Self::Time(_) => "time",
            Self::Notes(_) => "notes",
            Self::Attraction(_) => "attraction",
            Self::ExternalAttraction(_) => "amap-attraction",
            Self::Transport(_) => "transport",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            Self::Title(title) => serde_json::json!({ "title": title }),
            Self::Time(change) => serde_json::json!({
                "startTime": change.start.map(format_clock_time),
                "endTime": change.end.map(format_clock_time),
            }),
            Self::Notes(notes) => serde_json::json!({ "attractionNotes": notes }),
            Self::Attraction(attraction_id) => serde_json::json!({ "attractionId": attraction_id }),
            Self::ExternalAttraction(place) => {
                serde_json::json!({ "attractionInfo": encode_external_place(place) })
            }
            Self::Transport(mode) => serde_json::json!({ "transportMode": mode.as_str() }),
        }
    }
}

pub fn decode_activity(record: ActivityRecord) -> Result<Activity, InfraError> {
    let start_time = parse_optional_time(record.start_time.as_deref(), "startTime", record.id)?;
    let end_time = parse_optional_time(record.end_time.as_deref(), "endTime", record.id)?;
    let transport_mode = decode_transport_mode(record.transport_mode.as_deref(), record.id);
    let location = record.attraction.map(|attraction| {
        let coordinates = match (attraction.longitude, attraction.latitude) {
            (Some(longitude), Some(latitude)) => Some(Coordinates::new(longitude, latitude)),
            _ => None,
        };
        LocationRef {
            attraction_id: attraction.id,
            name: attraction.name.unwrap_or_default(),
            coordinates,
            address: attraction
                .address
                .or(attraction.description)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    });

    Ok(Activity {
        id: record.id,
        day_id: record.itinerary_day_id,
        title: record.title.unwrap_or_default().trim().to_string(),
        location,
        start_time,
        end_time,
        transport_mode,
        notes: record.attraction_notes.unwrap_or_default(),
        prev_id: record.prev_id,
        next_id: record.next_id,
    })
}

pub fn decode_activities(records: Vec<ActivityRecord>) -> Result<Vec<Activity>, InfraError> {
    records.into_iter().map(decode_activity).collect()
}

/// Days keep the backend's ordering by `dayNumber`; their position is the
/// day index used for route cache keys.
pub fn decode_itinerary(record: ItineraryRecord) -> Itinerary {
    let mut days = record
        .itinerary_days
        .into_iter()
        .enumerate()
        .map(|(index, day)| ItineraryDay {
            id: day.id,
            day_number: day.day_number.unwrap_or(index as u32 + 1),
            date: day.date,
            title: day.title.unwrap_or_default(),
            first_activity_id: day.first_activity_id,
        })
        .collect::<Vec<_>>();
    days.sort_by_key(|day| day.day_number);

    Itinerary {
        id: record.id,
        title: record.title.unwrap_or_default(),
        start_date: record.start_date,
        end_date: record.end_date,
        days,
    }
}

pub fn encode_create_request(
    day_id: DayId,
    insert_before_id: Option<ActivityId>,
    activity: &NewActivity,
) -> CreateActivityRequest {
    let (attraction_id, attraction_info) = match &activity.place {
        PlaceSelection::Catalog { attraction_id } => (Some(*attraction_id), None),
        PlaceSelection::External(place) => (None, Some(encode_external_place(place))),
    };
    CreateActivityRequest {
        itinerary_day_id: day_id,
        title: activity.title.trim().to_string(),
        transport_mode: activity.transport_mode.as_str().to_string(),
        start_time: activity.start_time.map(format_clock_time),
        end_time: activity.end_time.map(format_clock_time),
        next_id: insert_before_id,
        attraction_id,
        attraction_info,
    }
}

fn encode_external_place(place: &ExternalPlace) -> AttractionInfoRecord {
    AttractionInfoRecord {
        id: place.poi_id.trim().to_string(),
        name: place.name.trim().to_string(),
        address: place.address.clone(),
        city: place.city.clone(),
        description: place.description.clone(),
        longitude: place.coordinates.longitude,
        latitude: place.coordinates.latitude,
        tel: place.tel.clone(),
        kind: place.kind.clone(),
    }
}

fn parse_optional_time(
    value: Option<&str>,
    field_name: &str,
    activity_id: ActivityId,
) -> Result<Option<NaiveTime>, InfraError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    parse_clock_time(value).map(Some).ok_or_else(|| {
        InfraError::InvalidInput(format!(
            "activity {activity_id} has invalid {field_name} '{value}'"
        ))
    })
}

fn decode_transport_mode(value: Option<&str>, activity_id: ActivityId) -> TransportMode {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return TransportMode::default();
    };
    TransportMode::parse_label(value).unwrap_or_else(|| {
        log::debug!("activity {activity_id} has unknown transport mode '{value}'; using walking");
        TransportMode::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_json() -> &'static str {
        r#"{
            "id": 12,
            "itineraryDayId": 3,
            "dayNumber": 1,
            "date": "2025-05-01",
            "prevId": 11,
            "nextId": null,
            "title": " Lunch ",
            "transportMode": "公共交通",
            "transportNotes": null,
            "attraction": {
                "id": 77,
                "name": "Yu Garden",
                "description": "Classical garden",
                "longitude": 121.492,
                "latitude": 31.227,
                "joinCount": 3
            },
            "startTime": "12:00:00",
            "endTime": "13:30:00",
            "attractionNotes": "book ahead",
            "createdAt": "2025-04-01T10:00:00"
        }"#
    }

    #[test]
    fn decode_activity_maps_backend_record() {
        let record: ActivityRecord = serde_json::from_str(record_json()).expect("parse record");
        let activity = decode_activity(record).expect("decode");

        assert_eq!(activity.id, 12);
        assert_eq!(activity.day_id, 3);
        assert_eq!(activity.title, "Lunch");
        assert_eq!(activity.transport_mode, TransportMode::PublicTransit);
        assert_eq!(activity.prev_id, Some(11));
        assert_eq!(activity.next_id, None);
        assert_eq!(activity.time_label(), "12:00-13:30");
        let location = activity.location.expect("location");
        assert_eq!(location.attraction_id, Some(77));
        assert_eq!(location.address.as_deref(), Some("Classical garden"));
        assert!(location.coordinates.expect("coordinates").is_plottable());
    }

    #[test]
    fn unknown_transport_mode_falls_back_to_walking() {
        let mut record: ActivityRecord =
            serde_json::from_str(record_json()).expect("parse record");
        record.transport_mode = Some("hovercraft".to_string());
        assert_eq!(
            decode_activity(record).expect("decode").transport_mode,
            TransportMode::Walking
        );
    }

    #[test]
    fn invalid_time_is_rejected() {
        let mut record: ActivityRecord =
            serde_json::from_str(record_json()).expect("parse record");
        record.start_time = Some("noon".to_string());
        assert!(matches!(
            decode_activity(record),
            Err(InfraError::InvalidInput(_))
        ));
    }

    #[test]
    fn decode_itinerary_orders_days_by_number() {
        let record: ItineraryRecord = serde_json::from_str(
            r#"{
                "id": 5,
                "title": "Shanghai weekend",
                "startDate": "2025-05-01",
                "endDate": "2025-05-02",
                "itineraryDays": [
                    {"id": 31, "dayNumber": 2, "date": "2025-05-02", "title": "Old town", "firstActivityId": null},
                    {"id": 30, "dayNumber": 1, "date": "2025-05-01", "title": "Arrival", "firstActivityId": 100}
                ]
            }"#,
        )
        .expect("parse itinerary");
        let itinerary = decode_itinerary(record);
        let ids = itinerary.days.iter().map(|day| day.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![30, 31]);
        assert_eq!(itinerary.days[0].first_activity_id, Some(100));
    }

    #[test]
    fn create_request_for_external_place_carries_attraction_info() {
        let activity = NewActivity {
            title: "Metro hop".to_string(),
            transport_mode: TransportMode::PublicTransit,
            start_time: parse_clock_time("09:00"),
            end_time: None,
            place: PlaceSelection::External(ExternalPlace {
                poi_id: "BV10820968".to_string(),
                name: "Yongde Rd".to_string(),
                address: Some("Line 15".to_string()),
                city: Some("Shanghai".to_string()),
                description: None,
                coordinates: Coordinates::new(121.443203, 31.039147),
                tel: None,
                kind: Some("subway station".to_string()),
            }),
        };
        let request = encode_create_request(3, Some(12), &activity);
        assert!(request.is_external());

        let encoded = serde_json::to_value(&request).expect("encode");
        assert_eq!(encoded["itineraryDayId"], 3);
        assert_eq!(encoded["nextId"], 12);
        assert_eq!(encoded["transportMode"], "public-transit");
        assert_eq!(encoded["startTime"], "09:00");
        assert_eq!(encoded["attractionInfo"]["type"], "subway station");
        assert!(encoded.get("attractionId").is_none());
        assert!(encoded.get("endTime").is_none());
    }

    #[test]
    fn field_updates_target_scoped_endpoints() {
        let clear_end = ActivityFieldUpdate::Time(TimeChange {
            start: parse_clock_time("10:00"),
            end: None,
        });
        assert_eq!(clear_end.path_segment(), "time");
        assert_eq!(
            clear_end.body(),
            serde_json::json!({ "startTime": "10:00", "endTime": null })
        );
        assert_eq!(
            ActivityFieldUpdate::Notes("bring cash".to_string()).body(),
            serde_json::json!({ "attractionNotes": "bring cash" })
        );
    }

    #[test]
    fn external_attraction_update_sends_attraction_info() {
        let update = ActivityFieldUpdate::ExternalAttraction(ExternalPlace {
            poi_id: " B0FFFAB6J2 ".to_string(),
            name: "Tianzifang".to_string(),
            address: Some("Taikang Rd".to_string()),
            city: Some("Shanghai".to_string()),
            description: None,
            coordinates: Coordinates::new(121.466, 31.209),
            tel: None,
            kind: Some("scenic spot".to_string()),
        });
        assert_eq!(update.path_segment(), "amap-attraction");

        let body = update.body();
        assert_eq!(body["attractionInfo"]["id"], "B0FFFAB6J2");
        assert_eq!(body["attractionInfo"]["name"], "Tianzifang");
        assert_eq!(body["attractionInfo"]["longitude"], 121.466);
        assert_eq!(body["attractionInfo"]["type"], "scenic spot");
        assert!(body["attractionInfo"].get("tel").is_none());
        assert!(body.get("attractionId").is_none());
    }
}
