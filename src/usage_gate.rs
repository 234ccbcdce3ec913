//! Client-side quota and capability pre-checks.
//!
//! These checks are advisory. They save a round-trip and give immediate
//! feedback, but the service stays the final arbiter: a snapshot can be stale
//! by the time a request lands, so an accepted batch may still be refused
//! with a 429.

use crate::errors::ClientError;
use crate::models::PlanUsage;

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Reject { reason: String },
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }

    /// Converts a rejection into `ClientError::QuotaExceeded`.
    pub fn into_quota_result(self) -> Result<(), ClientError> {
        match self {
            GateDecision::Accept => Ok(()),
            GateDecision::Reject { reason } => Err(ClientError::QuotaExceeded(reason)),
        }
    }

    /// Converts a rejection into `ClientError::FeatureUnavailable`.
    pub fn into_feature_result(self) -> Result<(), ClientError> {
        match self {
            GateDecision::Accept => Ok(()),
            GateDecision::Reject { reason } => Err(ClientError::FeatureUnavailable(reason)),
        }
    }
}

/// Decides whether a batch of `requested` URLs may be submitted.
///
/// Without a snapshot the free-tier fallback is assumed, so the user can still
/// try a small batch.
pub fn evaluate_batch(usage: Option<&PlanUsage>, requested: usize) -> GateDecision {
    let fallback;
    let usage = match usage {
        Some(usage) => usage,
        None => {
            fallback = PlanUsage::fallback();
            &fallback
        }
    };

    if !usage.can_process_more_today {
        return GateDecision::Reject {
            reason: format!(
                "Daily lead limit reached: the {} plan allows {} leads per day and {} remain today.",
                usage.plan_name, usage.max_leads_per_day, usage.remaining_daily_leads
            ),
        };
    }

    if requested > usage.remaining_daily_leads as usize {
        return GateDecision::Reject {
            reason: format!(
                "Cannot create {} leads. Only {} leads remaining for today.",
                requested, usage.remaining_daily_leads
            ),
        };
    }

    GateDecision::Accept
}

/// Whether single-lead reprocessing (an AI feature) should be attempted.
///
/// Unknown usage is let through; the service answers 403 if the plan lacks it.
pub fn check_ai_features(usage: Option<&PlanUsage>) -> GateDecision {
    match usage {
        Some(usage) if !usage.can_use_ai => GateDecision::Reject {
            reason: format!(
                "AI features are not available on the {} plan",
                usage.plan_name
            ),
        },
        _ => GateDecision::Accept,
    }
}

/// Whether the lead cache may be exported.
///
/// Export happens locally with no server check, so unknown usage falls back
/// to the free tier.
pub fn check_export(usage: Option<&PlanUsage>) -> GateDecision {
    let fallback;
    let usage = match usage {
        Some(usage) => usage,
        None => {
            fallback = PlanUsage::fallback();
            &fallback
        }
    };

    if usage.can_export {
        GateDecision::Accept
    } else {
        GateDecision::Reject {
            reason: format!("Export is not available on the {} plan", usage.plan_name),
        }
    }
}
