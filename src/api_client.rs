use crate::auth::{fingerprint, AuthEvent, AuthEvents, FileTokenStore, TokenStore};
use crate::config::Config;
use crate::errors::ClientError;
use crate::models::{
    Ack, Lead, LeadBatchRequest, LeadId, LeadUpdate, Plan, PlanTier, PlanUsage, ProcessResponse,
    UpgradeResponse,
};
use reqwest::{self, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing;
use url::Url;

/// Longest slice of a raw error body carried into an error message.
const MAX_ERROR_BODY: usize = 500;

/// Client for the LeadBoost REST API (`/api/v2`).
///
/// Every request goes through [`ApiClient::send`], which attaches the bearer
/// token and handles 401 for the whole client: the stored token is cleared,
/// [`AuthEvent::SessionExpired`] is broadcast and the call fails with
/// [`ClientError::Unauthorized`].
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
    events: AuthEvents,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root of the service, e.g. `https://api.leadboost.io`.
    /// * `timeout` - Per-request timeout.
    /// * `tokens` - Where the bearer token lives.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidInput(format!("Invalid API URL '{}': {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            tokens,
            events: AuthEvents::default(),
        })
    }

    /// Builds a client backed by the token file named in `config`.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&config.token_file));
        Self::new(&config.api_url, config.timeout(), tokens)
    }

    /// Session notifications (currently only expiry).
    pub fn auth_events(&self) -> &AuthEvents {
        &self.events
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Joins `segments` under `<base>/api/v2`, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::InvalidInput(format!("API URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "v2"])
            .extend(segments);
        Ok(url)
    }

    /// Sends a request with the bearer token attached.
    ///
    /// Non-success statuses become errors here so call sites only see 2xx responses.
    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response, ClientError> {
        let request = match self.tokens.load() {
            Some(token) => {
                tracing::debug!("{}: using token {}", operation, fingerprint(&token));
                request.bearer_auth(token)
            }
            None => {
                tracing::debug!("{}: no stored token", operation);
                request
            }
        };

        let response = request.send().await.map_err(|e| {
            tracing::warn!("{} request failed: {}", operation, e);
            ClientError::from(e)
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let message = error_message(status, response.text().await.unwrap_or_default());
            self.expire_session();
            return Err(ClientError::Unauthorized(message));
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = error_message(status, body);
            tracing::error!("{} returned {}: {}", operation, status, message);
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    fn expire_session(&self) {
        tracing::warn!("Session expired; clearing stored token");
        if let Err(e) = self.tokens.clear() {
            tracing::error!("Failed to clear stored token: {}", e);
        }
        self.events.publish(AuthEvent::SessionExpired);
    }

    async fn decode<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T, ClientError> {
        response.json().await.map_err(|e| {
            ClientError::Decode(format!("Failed to parse {} response: {}", operation, e))
        })
    }

    /// Ack bodies may be empty; an empty body reads as a default ack.
    async fn decode_ack(response: Response, operation: &str) -> Result<Ack, ClientError> {
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Ack::default());
        }
        serde_json::from_str(&body).map_err(|e| {
            ClientError::Decode(format!("Failed to parse {} response: {}", operation, e))
        })
    }

    /// Submits a batch of URLs to the processing pipeline.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<Lead>, ClientError>` - The created leads, in server order.
    pub async fn submit_leads(&self, batch: &LeadBatchRequest) -> Result<Vec<Lead>, ClientError> {
        let url = self.endpoint(&["leads"])?;
        tracing::info!(
            "Submitting {} URL(s) with {} style",
            batch.len(),
            batch.message_style()
        );

        let response = self
            .send(self.client.post(url).json(batch), "Submit leads")
            .await?;
        let leads: Vec<Lead> = Self::decode(response, "submit leads").await?;

        tracing::info!("✓ Pipeline accepted batch, {} lead(s) created", leads.len());
        Ok(leads)
    }

    /// Lists one page of the organization's leads.
    pub async fn list_leads(&self, skip: u32, limit: u32) -> Result<Vec<Lead>, ClientError> {
        let url = self.endpoint(&["leads"])?;
        tracing::info!("Fetching leads (skip={}, limit={})", skip, limit);

        let response = self
            .send(
                self.client.get(url).query(&[("skip", skip), ("limit", limit)]),
                "List leads",
            )
            .await?;
        Self::decode(response, "list leads").await
    }

    /// Fetches a single lead.
    pub async fn get_lead(&self, lead_id: &LeadId) -> Result<Lead, ClientError> {
        let id = lead_id.to_string();
        let url = self.endpoint(&["leads", &id])?;
        tracing::info!("Fetching lead {}", lead_id);

        let response = self.send(self.client.get(url), "Get lead").await?;
        Self::decode(response, "get lead").await
    }

    /// Updates a lead and returns the server's canonical record.
    pub async fn update_lead(&self, lead_id: &LeadId, patch: &LeadUpdate) -> Result<Lead, ClientError> {
        let id = lead_id.to_string();
        let url = self.endpoint(&["leads", &id])?;
        tracing::info!("Updating lead {}", lead_id);

        let response = self
            .send(self.client.put(url).json(patch), "Update lead")
            .await?;
        Self::decode(response, "update lead").await
    }

    /// Deletes a lead.
    pub async fn delete_lead(&self, lead_id: &LeadId) -> Result<Ack, ClientError> {
        let id = lead_id.to_string();
        let url = self.endpoint(&["leads", &id])?;
        tracing::info!("Deleting lead {}", lead_id);

        let response = self.send(self.client.delete(url), "Delete lead").await?;
        let ack = Self::decode_ack(response, "delete lead").await?;
        tracing::info!("✓ Lead {} deleted", lead_id);
        Ok(ack)
    }

    /// Re-runs scrape, enrichment, scoring and outreach for one lead.
    pub async fn process_lead(&self, lead_id: &LeadId) -> Result<ProcessResponse, ClientError> {
        let id = lead_id.to_string();
        let url = self.endpoint(&["leads", &id, "process"])?;
        tracing::info!("Reprocessing lead {}", lead_id);

        let response = self.send(self.client.post(url), "Process lead").await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(ProcessResponse::Ack(Ack::default()));
        }
        serde_json::from_str(&body)
            .map_err(|e| ClientError::Decode(format!("Failed to parse process lead response: {}", e)))
    }

    /// Current plan and daily quota.
    pub async fn get_usage(&self) -> Result<PlanUsage, ClientError> {
        let url = self.endpoint(&["usage"])?;
        tracing::debug!("Fetching plan usage");

        let response = self.send(self.client.get(url), "Get usage").await?;
        let usage: PlanUsage = Self::decode(response, "usage").await?;
        if !usage.is_consistent() {
            tracing::warn!(
                "Usage snapshot is inconsistent: max={} used={} remaining={}",
                usage.max_leads_per_day,
                usage.current_usage,
                usage.remaining_daily_leads
            );
        }
        Ok(usage)
    }

    /// Available subscription plans.
    pub async fn list_plans(&self) -> Result<Vec<Plan>, ClientError> {
        let url = self.endpoint(&["plans"])?;
        let response = self.send(self.client.get(url), "List plans").await?;
        Self::decode(response, "plans").await
    }

    /// Moves the organization to `plan`.
    pub async fn upgrade_plan(&self, plan: PlanTier) -> Result<UpgradeResponse, ClientError> {
        let url = self.endpoint(&["upgrade"])?;
        tracing::info!("Upgrading subscription to {}", plan);

        let response = self
            .send(
                self.client.post(url).query(&[("plan_name", plan.as_str())]),
                "Upgrade plan",
            )
            .await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(UpgradeResponse::Ack(Ack::default()));
        }
        serde_json::from_str(&body)
            .map_err(|e| ClientError::Decode(format!("Failed to parse upgrade response: {}", e)))
    }

    /// Cancels the subscription, at period end unless `immediate`.
    pub async fn cancel_subscription(&self, immediate: bool) -> Result<Ack, ClientError> {
        let url = self.endpoint(&["cancel"])?;
        tracing::info!("Cancelling subscription (immediate={})", immediate);

        let response = self
            .send(
                self.client.post(url).query(&[("immediate", immediate)]),
                "Cancel subscription",
            )
            .await?;
        Self::decode_ack(response, "cancel").await
    }
}

/// Pulls a human-readable message out of an error body.
///
/// Understands `{"detail": "..."}`, validation lists
/// (`{"detail": [{"msg": "..."}]}`) and `{"error"|"message": "..."}`; anything
/// else is passed through, truncated.
fn error_message(status: StatusCode, body: String) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    };

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return fallback();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        match value.get("detail") {
            Some(serde_json::Value::String(detail)) => return detail.clone(),
            Some(serde_json::Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if !messages.is_empty() {
                    return messages.join("; ");
                }
            }
            _ => {}
        }
        for key in ["error", "message"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }

    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
