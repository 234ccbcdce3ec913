use std::sync::{Mutex, MutexGuard};

use crate::api_client::ApiClient;
use crate::errors::{ClientError, ResultExt};
use crate::lead_store::{LeadStore, ReprocessOutcome};
use crate::models::{Ack, Lead, LeadBatchRequest, LeadId, Plan, PlanTier, PlanUsage, UpgradeResponse};
use crate::usage_gate::{self, GateDecision};

/// Ties the lead cache to the caller's plan.
///
/// Holds the latest usage snapshot, runs the usage gate before anything that
/// spends quota, and refreshes the snapshot after quota has been spent.
pub struct LeadSession {
    api: ApiClient,
    store: LeadStore,
    usage: Mutex<Option<PlanUsage>>,
}

impl LeadSession {
    pub fn new(api: ApiClient) -> Self {
        Self {
            store: LeadStore::new(api.clone()),
            api,
            usage: Mutex::new(None),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &LeadStore {
        &self.store
    }

    fn usage_slot(&self) -> MutexGuard<'_, Option<PlanUsage>> {
        self.usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last usage snapshot, if one has been fetched.
    pub fn usage(&self) -> Option<PlanUsage> {
        self.usage_slot().clone()
    }

    /// Fetches a fresh usage snapshot and keeps it.
    pub async fn refresh_usage(&self) -> Result<PlanUsage, ClientError> {
        let usage = self.api.get_usage().await.context("Failed to fetch usage")?;
        *self.usage_slot() = Some(usage.clone());
        Ok(usage)
    }

    /// Fresh snapshot for a gate check.
    ///
    /// A failed fetch yields `None` (the gate then assumes the free tier),
    /// except for auth failures, which end the session and are returned.
    async fn fetch_usage_for_gate(&self) -> Result<Option<PlanUsage>, ClientError> {
        match self.refresh_usage().await {
            Ok(usage) => Ok(Some(usage)),
            Err(e) if e.is_unauthorized() => Err(e),
            Err(e) => {
                tracing::warn!("Usage unavailable, assuming free plan limits: {}", e);
                Ok(None)
            }
        }
    }

    /// Runs `check` against the cached snapshot, else a fresh one.
    ///
    /// A rejection by the cached snapshot is re-checked once against a fresh
    /// fetch; the daily quota resets and the plan can change elsewhere.
    async fn run_gate<F>(&self, check: F) -> Result<GateDecision, ClientError>
    where
        F: Fn(Option<&PlanUsage>) -> GateDecision,
    {
        let Some(cached) = self.usage() else {
            let usage = self.fetch_usage_for_gate().await?;
            return Ok(check(usage.as_ref()));
        };

        let decision = check(Some(&cached));
        if decision.is_accepted() {
            return Ok(decision);
        }

        tracing::debug!("Cached usage rejected the request; re-checking with fresh usage");
        let usage = self.fetch_usage_for_gate().await?;
        Ok(check(usage.as_ref()))
    }

    /// Gates, submits, and then refreshes usage.
    ///
    /// A gate rejection returns `QuotaExceeded` without any request to the
    /// leads endpoint.
    pub async fn submit_batch(&self, batch: &LeadBatchRequest) -> Result<Vec<Lead>, ClientError> {
        let requested = batch.len();
        let decision = self
            .run_gate(|usage| usage_gate::evaluate_batch(usage, requested))
            .await?;

        if let Err(e) = decision.into_quota_result() {
            tracing::warn!("Submission of {} URL(s) blocked: {}", requested, e);
            return Err(e);
        }

        let result = self.store.submit(batch).await;

        // The request reached the service, so the snapshot no longer holds.
        if !matches!(result, Err(ClientError::SubmissionInFlight)) {
            *self.usage_slot() = None;
            if let Err(e) = self.refresh_usage().await {
                tracing::warn!("Could not refresh usage after submission: {}", e);
            }
        }

        result
    }

    /// Reprocesses one lead if the plan includes AI features.
    pub async fn reprocess(&self, id: &LeadId) -> Result<ReprocessOutcome, ClientError> {
        let usage = self.usage();
        usage_gate::check_ai_features(usage.as_ref()).into_feature_result()?;
        self.store.reprocess(id).await
    }

    /// Cached leads as JSON, if the plan allows exporting.
    pub async fn export(&self) -> Result<String, ClientError> {
        self.run_gate(usage_gate::check_export).await?.into_feature_result()?;
        self.store.export_json()
    }

    pub async fn plans(&self) -> Result<Vec<Plan>, ClientError> {
        self.api.list_plans().await.context("Failed to fetch plans")
    }

    /// Switches plan and returns the resulting usage.
    pub async fn upgrade(&self, tier: PlanTier) -> Result<PlanUsage, ClientError> {
        let response = self
            .api
            .upgrade_plan(tier)
            .await
            .with_context(|| format!("Failed to upgrade to {}", tier))?;

        match response {
            UpgradeResponse::Usage(usage) => {
                *self.usage_slot() = Some(usage.clone());
                Ok(usage)
            }
            UpgradeResponse::Ack(ack) => {
                if let Some(message) = ack.message {
                    tracing::info!("{}", message);
                }
                self.refresh_usage().await
            }
        }
    }

    /// Cancels the subscription and drops the cached snapshot.
    pub async fn cancel(&self, immediate: bool) -> Result<Ack, ClientError> {
        let ack = self
            .api
            .cancel_subscription(immediate)
            .await
            .context("Failed to cancel subscription")?;
        *self.usage_slot() = None;
        Ok(ack)
    }
}
