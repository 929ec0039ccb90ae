use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{SchedulingApi, SchedulingError};

#[derive(Debug, Deserialize)]
struct SchedulingLinkResponse {
    resource: SchedulingLinkResource,
}

#[derive(Debug, Deserialize)]
struct SchedulingLinkResource {
    booking_url: String,
}

#[derive(Debug, Clone)]
pub struct CalendlyClient {
    client: Client,
    api_url: String,
}

impl CalendlyClient {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Accepts either a bare uuid or a full `.../scheduled_events/{uuid}` URI.
fn event_uuid(event: &str) -> &str {
    event
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(event)
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, SchedulingError> {
    match response.status() {
        s if s.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SchedulingError::Unauthorized),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(SchedulingError::Api(format!("HTTP {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl SchedulingApi for CalendlyClient {
    async fn create_single_use_link(
        &self,
        owner: &str,
        token: &str,
    ) -> Result<String, SchedulingError> {
        let response = self
            .client
            .post(format!("{}/scheduling_links", self.api_url))
            .bearer_auth(token)
            .json(&json!({
                "max_event_count": 1,
                "owner": owner,
                "owner_type": "EventType",
            }))
            .send()
            .await
            .map_err(|e| SchedulingError::Api(e.to_string()))?;

        let link: SchedulingLinkResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| SchedulingError::Decode(e.to_string()))?;

        Ok(link.resource.booking_url)
    }

    async fn cancel_event(
        &self,
        event: &str,
        token: &str,
        reason: &str,
    ) -> Result<(), SchedulingError> {
        let response = self
            .client
            .post(format!(
                "{}/scheduled_events/{}/cancellation",
                self.api_url,
                event_uuid(event)
            ))
            .bearer_auth(token)
            .json(&json!({ "reason": reason }))
            .send()
            .await
            .map_err(|e| SchedulingError::Api(e.to_string()))?;

        check(response).await?;
        Ok(())
    }
}
