use crate::domain::models::{Activity, ActivityId, DayId, Itinerary, ItineraryId};
use crate::infrastructure::activity_mapper::{
    decode_activities, decode_activity, decode_itinerary, ActivityFieldUpdate, ActivityRecord,
    CreateActivityRequest, ItineraryRecord,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

#[async_trait]
pub trait ItineraryBackend: Send + Sync {
    async fn fetch_itinerary(&self, itinerary_id: ItineraryId) -> Result<Itinerary, InfraError>;

    async fn list_day_activities(&self, day_id: DayId) -> Result<Vec<Activity>, InfraError>;

    async fn create_activity(&self, request: &CreateActivityRequest)
        -> Result<Activity, InfraError>;

    async fn update_activity_field(
        &self,
        activity_id: ActivityId,
        update: &ActivityFieldUpdate,
    ) -> Result<Activity, InfraError>;

    async fn delete_activity(&self, activity_id: ActivityId) -> Result<(), InfraError>;

    async fn update_day_title(
        &self,
        itinerary_id: ItineraryId,
        day_id: DayId,
        title: &str,
    ) -> Result<String, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestItineraryBackend {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct DayTitleResponse {
    title: Option<String>,
}

impl ReqwestItineraryBackend {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid backend base url '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "backend base url '{base_url}' cannot be a base"
            )));
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("backend base url cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    /// Sends the request and returns the raw body of a successful response.
    async fn send(&self, request: RequestBuilder, operation: &'static str) -> Result<String, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while {operation}: {error}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Network(format!("failed reading response while {operation}: {error}"))
        })?;

        if !status.is_success() {
            return Err(InfraError::HttpStatus {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, InfraError> {
        let body = self.send(request, operation).await?;
        serde_json::from_str(&body).map_err(|error| {
            InfraError::Network(format!("invalid payload while {operation}: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl ItineraryBackend for ReqwestItineraryBackend {
    async fn fetch_itinerary(&self, itinerary_id: ItineraryId) -> Result<Itinerary, InfraError> {
        let url = self.endpoint(&["itineraries", &itinerary_id.to_string()])?;
        let record: ItineraryRecord = self
            .send_json(self.client.get(url), "fetching itinerary")
            .await?;
        Ok(decode_itinerary(record))
    }

    async fn list_day_activities(&self, day_id: DayId) -> Result<Vec<Activity>, InfraError> {
        let url = self.endpoint(&["activities", "day", &day_id.to_string()])?;
        let records: Vec<ActivityRecord> = self
            .send_json(self.client.get(url), "listing day activities")
            .await?;
        decode_activities(records)
    }

    async fn create_activity(
        &self,
        request: &CreateActivityRequest,
    ) -> Result<Activity, InfraError> {
        Self::ensure_non_empty(&request.title, "activity title")?;
        let url = if request.is_external() {
            self.endpoint(&["activities", "amap"])?
        } else {
            self.endpoint(&["activities"])?
        };
        let record: ActivityRecord = self
            .send_json(self.client.post(url).json(request), "creating activity")
            .await?;
        decode_activity(record)
    }

    async fn update_activity_field(
        &self,
        activity_id: ActivityId,
        update: &ActivityFieldUpdate,
    ) -> Result<Activity, InfraError> {
        if let ActivityFieldUpdate::Title(title) = update {
            Self::ensure_non_empty(title, "activity title")?;
        }
        let url = self.endpoint(&[
            "activities",
            &activity_id.to_string(),
            update.path_segment(),
        ])?;
        let request = self.client.request(Method::PUT, url).json(&update.body());
        let record: ActivityRecord = self.send_json(request, "updating activity").await?;
        decode_activity(record)
    }

    async fn delete_activity(&self, activity_id: ActivityId) -> Result<(), InfraError> {
        let url = self.endpoint(&["activities", &activity_id.to_string()])?;
        self.send(self.client.delete(url), "deleting activity").await?;
        Ok(())
    }

    async fn update_day_title(
        &self,
        itinerary_id: ItineraryId,
        day_id: DayId,
        title: &str,
    ) -> Result<String, InfraError> {
        Self::ensure_non_empty(title, "day title")?;
        let title = title.trim();
        let url = self.endpoint(&[
            "itineraries",
            &itinerary_id.to_string(),
            "days",
            &day_id.to_string(),
            "title",
        ])?;
        let request = self
            .client
            .put(url)
            .json(&serde_json::json!({ "title": title }));
        let response: DayTitleResponse = self.send_json(request, "renaming day").await?;
        Ok(response
            .title
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| title.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_append_to_base_path() {
        let backend = ReqwestItineraryBackend::new("http://localhost:8080/api/").expect("backend");
        let url = backend
            .endpoint(&["activities", "day", "42"])
            .expect("endpoint");
        assert_eq!(url.as_str(), "http://localhost:8080/api/activities/day/42");

        let backend = ReqwestItineraryBackend::new("http://localhost:8080/api").expect("backend");
        let url = backend
            .endpoint(&["itineraries", "5", "days", "7", "title"])
            .expect("endpoint");
        assert_eq!(url.as_str(), "http://localhost:8080/api/itineraries/5/days/7/title");
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(matches!(
            ReqwestItineraryBackend::new("mailto:trips@example.com"),
            Err(InfraError::InvalidConfig(_))
        ));
        assert!(ReqwestItineraryBackend::new("not a url").is_err());
    }

    #[tokio::test]
    async fn empty_title_is_rejected_before_any_request() {
        let backend = ReqwestItineraryBackend::new("http://127.0.0.1:9/api").expect("backend");
        let error = backend
            .update_day_title(1, 2, "   ")
            .await
            .expect_err("empty title");
        assert!(matches!(error, InfraError::InvalidInput(_)));
    }
}
