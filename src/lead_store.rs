//! Session-scoped lead cache.
//!
//! `LeadStore` owns the client-side view of the organization's leads. Every
//! mutation goes through the service first and the cache only changes once the
//! service has answered:
//!
//! - `load` replaces the whole cache (and empties it on failure)
//! - `submit` prepends the created leads, newest first
//! - `update` swaps in the server's canonical record
//! - `remove` drops the entry after the delete succeeded
//! - `reprocess` tracks a per-lead busy flag and refreshes the entry
//!
//! Operations may overlap. A list response that was overtaken by a newer list
//! request is discarded, and mutations committed while a list request was in
//! flight are replayed on top of its snapshot so they are never lost.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::api_client::ApiClient;
use crate::errors::{ClientError, ResultExt};
use crate::models::{Ack, Lead, LeadBatchRequest, LeadId, LeadUpdate, ProcessResponse};

/// Default `skip` for [`LeadStore::load`].
pub const DEFAULT_SKIP: u32 = 0;
/// Default `limit` for [`LeadStore::load`].
pub const DEFAULT_LIMIT: u32 = 100;

/// Batch submission state. `Success` and `Failed` are transient and fall
/// straight back to `Idle`, with the outcome left in the cache or `error()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
}

/// What happened to a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The cache now holds this many leads.
    Applied(usize),
    /// A newer list request was issued meanwhile; this response was dropped.
    Superseded,
}

/// Result of a single-lead reprocess.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprocessOutcome {
    /// Acknowledgement text from the service, if any.
    pub message: Option<String>,
    /// The lead as it stands after reprocessing, when it could be fetched.
    pub refreshed: Option<Lead>,
}

/// Cache change committed while a list request may be in flight.
#[derive(Debug, Clone)]
enum Mutation {
    Prepended(Vec<Lead>),
    Replaced(Lead),
    Removed(LeadId),
}

#[derive(Debug)]
struct StoreState {
    leads: Vec<Lead>,
    error: Option<String>,
    submission: SubmissionState,
    processing: HashMap<LeadId, bool>,
    /// Ticket of the most recently issued list request.
    latest_load: u64,
    /// List requests still waiting for a response.
    pending_loads: usize,
    /// Mutations committed since the oldest pending list request was issued,
    /// tagged with the load ticket current at commit time.
    journal: Vec<(u64, Mutation)>,
}

impl StoreState {
    fn new() -> Self {
        Self {
            leads: Vec::new(),
            error: None,
            submission: SubmissionState::Idle,
            processing: HashMap::new(),
            latest_load: 0,
            pending_loads: 0,
            journal: Vec::new(),
        }
    }

    fn position(&self, id: &LeadId) -> Option<usize> {
        self.leads.iter().position(|lead| &lead.id == id)
    }

    fn commit(&mut self, mutation: Mutation) {
        apply_mutation(&mut self.leads, &mutation);
        if self.pending_loads > 0 {
            self.journal.push((self.latest_load, mutation));
        }
    }

    fn finish_load(&mut self) {
        self.pending_loads = self.pending_loads.saturating_sub(1);
        if self.pending_loads == 0 {
            self.journal.clear();
        }
    }
}

fn apply_mutation(leads: &mut Vec<Lead>, mutation: &Mutation) {
    match mutation {
        Mutation::Prepended(new_leads) => {
            let mut merged: Vec<Lead> = new_leads
                .iter()
                .filter(|lead| !leads.iter().any(|existing| existing.id == lead.id))
                .cloned()
                .collect();
            merged.append(leads);
            *leads = merged;
        }
        Mutation::Replaced(updated) => {
            if let Some(slot) = leads.iter_mut().find(|lead| lead.id == updated.id) {
                *slot = updated.clone();
            }
        }
        Mutation::Removed(id) => {
            if let Some(index) = leads.iter().position(|lead| &lead.id == id) {
                leads.remove(index);
            }
        }
    }
}

/// Client-side lead cache backed by the LeadBoost API.
pub struct LeadStore {
    api: ApiClient,
    state: Mutex<StoreState>,
}

impl LeadStore {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: Mutex::new(StoreState::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        // The lock is never held across an await, so a poisoned state is still coherent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============ Read accessors ============

    /// Snapshot of the cached leads, in display order.
    pub fn leads(&self) -> Vec<Lead> {
        self.state().leads.clone()
    }

    pub fn get(&self, id: &LeadId) -> Option<Lead> {
        let state = self.state();
        state.position(id).map(|i| state.leads[i].clone())
    }

    pub fn len(&self) -> usize {
        self.state().leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().leads.is_empty()
    }

    /// Message of the last recorded failure.
    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn clear_error(&self) {
        self.state().error = None;
    }

    /// True while a list request is outstanding.
    pub fn is_loading(&self) -> bool {
        self.state().pending_loads > 0
    }

    pub fn submission_state(&self) -> SubmissionState {
        self.state().submission
    }

    /// True while `id` is being reprocessed.
    pub fn is_processing(&self, id: &LeadId) -> bool {
        self.state().processing.get(id).copied().unwrap_or(false)
    }

    /// Busy flags of leads currently being reprocessed.
    pub fn processing(&self) -> HashMap<LeadId, bool> {
        self.state().processing.clone()
    }

    /// Cached leads as pretty-printed JSON.
    pub fn export_json(&self) -> Result<String, ClientError> {
        let leads = self.leads();
        Ok(serde_json::to_string_pretty(&leads)?)
    }

    // ============ Operations ============

    /// Replaces the cache with one page of leads.
    ///
    /// On failure the cache is emptied and the error recorded, unless a newer
    /// list request has been issued meanwhile, in which case the state is left
    /// to that request and only the error is returned.
    pub async fn load(&self, skip: u32, limit: u32) -> Result<LoadOutcome, ClientError> {
        let ticket = {
            let mut state = self.state();
            state.latest_load += 1;
            state.pending_loads += 1;
            state.latest_load
        };

        let result = self.api.list_leads(skip, limit).await;

        let mut state = self.state();
        let superseded = state.latest_load != ticket;

        let outcome = match result {
            Ok(_) if superseded => {
                tracing::debug!("Discarding list response #{} (latest is #{})", ticket, state.latest_load);
                Ok(LoadOutcome::Superseded)
            }
            Ok(mut leads) => {
                // replay what was committed after this request went out
                for (at, mutation) in &state.journal {
                    if *at >= ticket {
                        apply_mutation(&mut leads, mutation);
                    }
                }
                state.leads = leads;
                state.error = None;
                tracing::info!("Loaded {} lead(s)", state.leads.len());
                Ok(LoadOutcome::Applied(state.leads.len()))
            }
            Err(e) if superseded => {
                tracing::debug!("Ignoring failure of superseded list request #{}: {}", ticket, e);
                Err(e).context("Failed to load leads")
            }
            Err(e) => {
                tracing::error!("Failed to load leads: {}", e);
                state.leads.clear();
                state.error = Some(e.to_string());
                Err(e).context("Failed to load leads")
            }
        };

        state.finish_load();
        outcome
    }

    /// Sends one batch to the pipeline and prepends the created leads.
    ///
    /// Rejected with `SubmissionInFlight`, without a request, while another
    /// batch is running. Nothing is applied on failure.
    pub async fn submit(&self, batch: &LeadBatchRequest) -> Result<Vec<Lead>, ClientError> {
        {
            let mut state = self.state();
            if state.submission == SubmissionState::Submitting {
                tracing::warn!("Submission rejected: another batch is still running");
                return Err(ClientError::SubmissionInFlight);
            }
            state.submission = SubmissionState::Submitting;
        }
        let _submitting = SubmissionGuard { store: self };

        let result = self.api.submit_leads(batch).await;

        let mut state = self.state();
        match result {
            Ok(created) => {
                state.commit(Mutation::Prepended(created.clone()));
                state.error = None;
                tracing::info!(
                    "Submission succeeded: {} new lead(s), {} cached",
                    created.len(),
                    state.leads.len()
                );
                Ok(created)
            }
            Err(e) => {
                tracing::error!("Submission failed: {}", e);
                state.error = Some(e.to_string());
                Err(e).context("Failed to submit leads")
            }
        }
    }

    /// Deletes a lead remotely, then drops it from the cache.
    pub async fn remove(&self, id: &LeadId) -> Result<Ack, ClientError> {
        match self.api.delete_lead(id).await {
            Ok(ack) => {
                self.state().commit(Mutation::Removed(id.clone()));
                Ok(ack)
            }
            Err(e) => {
                tracing::error!("Failed to delete lead {}: {}", id, e);
                self.record_failure(&e);
                Err(e).with_context(|| format!("Failed to delete lead {}", id))
            }
        }
    }

    /// Sends the edited fields and caches the record the server returns.
    pub async fn update(&self, id: &LeadId, patch: &LeadUpdate) -> Result<Lead, ClientError> {
        if patch.is_empty() {
            return Err(ClientError::InvalidInput("no fields to update".to_string()));
        }

        match self.api.update_lead(id, patch).await {
            Ok(lead) => {
                self.state().commit(Mutation::Replaced(lead.clone()));
                Ok(lead)
            }
            Err(e) => {
                tracing::error!("Failed to update lead {}: {}", id, e);
                self.record_failure(&e);
                Err(e).with_context(|| format!("Failed to update lead {}", id))
            }
        }
    }

    /// Fetches one lead and refreshes its cache entry if it is cached.
    pub async fn fetch(&self, id: &LeadId) -> Result<Lead, ClientError> {
        match self.api.get_lead(id).await {
            Ok(lead) => {
                self.state().commit(Mutation::Replaced(lead.clone()));
                Ok(lead)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e).with_context(|| format!("Failed to fetch lead {}", id))
            }
        }
    }

    /// Re-runs the pipeline for one lead.
    ///
    /// `is_processing(id)` is true from before the request until the
    /// operation ends, whatever the outcome. After a successful run the entry
    /// is refreshed from the response or, for a bare acknowledgement, with a
    /// follow-up fetch; a failed refresh leaves the old entry in place and is
    /// only reported when the session has expired.
    pub async fn reprocess(&self, id: &LeadId) -> Result<ReprocessOutcome, ClientError> {
        {
            let mut state = self.state();
            if state.processing.get(id).copied().unwrap_or(false) {
                return Err(ClientError::InvalidInput(format!(
                    "Lead {} is already being processed",
                    id
                )));
            }
            state.processing.insert(id.clone(), true);
        }
        let _busy = ProcessingGuard {
            store: self,
            id: id.clone(),
        };

        let response = match self.api.process_lead(id).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed to reprocess lead {}: {}", id, e);
                self.record_failure(&e);
                return Err(e).with_context(|| format!("Failed to reprocess lead {}", id));
            }
        };

        let (message, refreshed) = match response {
            ProcessResponse::Lead(lead) => (None, Some(*lead)),
            ProcessResponse::Ack(ack) => {
                let refreshed = match self.api.get_lead(id).await {
                    Ok(lead) => Some(lead),
                    Err(e) if e.is_unauthorized() => {
                        self.record_failure(&e);
                        return Err(e).with_context(|| format!("Failed to refresh lead {}", id));
                    }
                    Err(e) => {
                        tracing::warn!("Lead {} reprocessed but refresh failed: {}", id, e);
                        None
                    }
                };
                (ack.message, refreshed)
            }
        };

        if let Some(lead) = &refreshed {
            self.state().commit(Mutation::Replaced(lead.clone()));
        }

        tracing::info!("✓ Lead {} reprocessed", id);
        Ok(ReprocessOutcome { message, refreshed })
    }

    fn record_failure(&self, err: &ClientError) {
        self.state().error = Some(err.to_string());
    }
}

/// Returns the store to `Idle` when a submission ends, including when its
/// future is dropped mid-request.
struct SubmissionGuard<'a> {
    store: &'a LeadStore,
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.store.state().submission = SubmissionState::Idle;
    }
}

/// Clears a lead's busy flag when its reprocess ends.
struct ProcessingGuard<'a> {
    store: &'a LeadStore,
    id: LeadId,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.store.state().processing.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lead(id: i64) -> Lead {
        serde_json::from_value(json!({"id": id, "website": format!("https://{}.com", id)})).unwrap()
    }

    fn ids(leads: &[Lead]) -> Vec<LeadId> {
        leads.iter().map(|l| l.id.clone()).collect()
    }

    #[test]
    fn test_prepend_skips_ids_already_present() {
        let mut leads = vec![lead(1), lead(2)];
        apply_mutation(&mut leads, &Mutation::Prepended(vec![lead(3), lead(1)]));
        assert_eq!(ids(&leads), vec![3.into(), 1.into(), 2.into()]);
    }

    #[test]
    fn test_replace_and_remove_touch_one_entry() {
        let mut leads = vec![lead(1), lead(2), lead(3)];
        let mut updated = lead(2);
        updated.company_name = Some("Two Inc".to_string());
        apply_mutation(&mut leads, &Mutation::Replaced(updated));
        assert_eq!(leads[1].company_name.as_deref(), Some("Two Inc"));

        apply_mutation(&mut leads, &Mutation::Removed(2.into()));
        assert_eq!(ids(&leads), vec![1.into(), 3.into()]);

        // unknown ids are ignored
        apply_mutation(&mut leads, &Mutation::Removed(9.into()));
        apply_mutation(&mut leads, &Mutation::Replaced(lead(9)));
        assert_eq!(leads.len(), 2);
    }

    #[test]
    fn test_journal_only_kept_while_loads_pending() {
        let mut state = StoreState::new();
        state.commit(Mutation::Prepended(vec![lead(1)]));
        assert!(state.journal.is_empty());

        state.latest_load = 1;
        state.pending_loads = 1;
        state.commit(Mutation::Prepended(vec![lead(2)]));
        assert_eq!(state.journal.len(), 1);

        state.finish_load();
        assert!(state.journal.is_empty());
        assert_eq!(ids(&state.leads), vec![2.into(), 1.into()]);
    }
}
