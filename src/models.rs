use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::ClientError;

// ============ Lead Models ============

/// Server-assigned lead identifier.
///
/// The service hands out integers today, but the client treats the id as
/// opaque and accepts string ids as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LeadId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeadId::Numeric(n) => write!(f, "{}", n),
            LeadId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for LeadId {
    fn from(id: i64) -> Self {
        LeadId::Numeric(id)
    }
}

impl From<&str> for LeadId {
    fn from(id: &str) -> Self {
        id.parse().unwrap_or_else(|_| LeadId::Text(id.to_string()))
    }
}

impl FromStr for LeadId {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ClientError::InvalidInput("lead id cannot be empty".to_string()));
        }
        Ok(match trimmed.parse::<i64>() {
            Ok(n) => LeadId::Numeric(n),
            Err(_) => LeadId::Text(trimmed.to_string()),
        })
    }
}

/// Outreach message tone requested from the generation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStyle {
    #[default]
    Professional,
    Friendly,
    Short,
}

impl MessageStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStyle::Professional => "professional",
            MessageStyle::Friendly => "friendly",
            MessageStyle::Short => "short",
        }
    }
}

impl fmt::Display for MessageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStyle {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(MessageStyle::Professional),
            "friendly" => Ok(MessageStyle::Friendly),
            "short" => Ok(MessageStyle::Short),
            other => Err(ClientError::InvalidInput(format!(
                "unknown message style '{}' (expected professional, friendly or short)",
                other
            ))),
        }
    }
}

/// A prospect record produced by the processing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Identifier assigned by the service on creation.
    pub id: LeadId,
    /// Source website; the service de-duplicates on it.
    pub website: String,

    // Company profile
    pub company_name: Option<String>,
    pub industry: Option<String>,
    pub about_text: Option<String>,
    /// Employee band, e.g. "11-50".
    pub employees: Option<String>,
    /// Revenue band, e.g. "$1M-10M".
    pub revenue_band: Option<String>,
    pub founded_year: Option<i32>,

    // Contact
    pub contact_name: Option<String>,
    pub contact_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,

    // Scoring (always produced by the pipeline, never computed here)
    pub score: Option<f64>,
    pub qualification_label: Option<String>,
    pub scrape_confidence: Option<f64>,
    pub email_confidence: Option<f64>,
    pub enrichment_confidence: Option<f64>,
    pub scrape_source: Option<String>,
    pub email_source: Option<String>,
    pub enrichment_source: Option<String>,

    // Outreach
    pub outreach_message: Option<String>,
    pub message_style: Option<MessageStyle>,
    #[serde(default)]
    pub outreach_sent: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub outreach_sent_at: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Accepts RFC 3339 timestamps and offset-less ones (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

/// Score and label as a pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Scoring<'a> {
    pub score: f64,
    pub label: &'a str,
}

impl Lead {
    /// Returns the score/label pair, or `None` unless both are present.
    pub fn scoring(&self) -> Option<Scoring<'_>> {
        match (self.score, self.qualification_label.as_deref()) {
            (Some(score), Some(label)) => Some(Scoring { score, label }),
            (None, None) => None,
            _ => {
                tracing::warn!(
                    "Lead {} has a partial score (score={:?}, label={:?}); treating as unscored",
                    self.id,
                    self.score,
                    self.qualification_label
                );
                None
            }
        }
    }

    /// Display name used by listings: company name, falling back to the website.
    pub fn display_name(&self) -> &str {
        self.company_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.website)
    }
}

/// Edited-field set sent to `PUT /api/v2/leads/{id}`.
///
/// Identity and timestamps are not editable, so they are not represented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employees: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_band: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub founded_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outreach_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl LeadUpdate {
    /// Names accepted by [`LeadUpdate::set`].
    pub const FIELDS: &'static [&'static str] = &[
        "company_name",
        "industry",
        "about_text",
        "contact_name",
        "contact_title",
        "email",
        "phone",
        "address",
        "linkedin_url",
        "twitter_url",
        "facebook_url",
        "employees",
        "revenue_band",
        "founded_year",
        "outreach_message",
        "is_active",
    ];

    /// True when no field has been edited.
    pub fn is_empty(&self) -> bool {
        *self == LeadUpdate::default()
    }

    /// Sets a single field from its textual form (used by `leadctl leads update`).
    pub fn set(&mut self, field: &str, value: &str) -> Result<(), ClientError> {
        let text = Some(value.to_string());
        match field {
            "company_name" => self.company_name = text,
            "industry" => self.industry = text,
            "about_text" => self.about_text = text,
            "contact_name" => self.contact_name = text,
            "contact_title" => self.contact_title = text,
            "email" => self.email = text,
            "phone" => self.phone = text,
            "address" => self.address = text,
            "linkedin_url" => self.linkedin_url = text,
            "twitter_url" => self.twitter_url = text,
            "facebook_url" => self.facebook_url = text,
            "employees" => self.employees = text,
            "revenue_band" => self.revenue_band = text,
            "outreach_message" => self.outreach_message = text,
            "founded_year" => {
                let year = value.trim().parse::<i32>().map_err(|_| {
                    ClientError::InvalidInput(format!("founded_year must be a number, got '{}'", value))
                })?;
                self.founded_year = Some(year);
            }
            "is_active" => {
                let flag = value.trim().parse::<bool>().map_err(|_| {
                    ClientError::InvalidInput(format!("is_active must be true or false, got '{}'", value))
                })?;
                self.is_active = Some(flag);
            }
            other => {
                return Err(ClientError::InvalidInput(format!(
                    "'{}' is not an editable lead field",
                    other
                )))
            }
        }
        Ok(())
    }
}

/// Body of `POST /api/v2/leads`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadBatchRequest {
    urls: Vec<String>,
    message_style: MessageStyle,
}

impl LeadBatchRequest {
    /// Builds a batch from already-split URLs.
    ///
    /// Entries are trimmed and blank ones dropped; order is preserved. Fails if
    /// nothing is left.
    pub fn new<I, S>(urls: I, message_style: MessageStyle) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.as_ref().trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();

        if urls.is_empty() {
            return Err(ClientError::InvalidInput("No URLs provided".to_string()));
        }

        Ok(Self {
            urls,
            message_style,
        })
    }

    /// Builds a batch from free text with one URL per line.
    ///
    /// Blank lines are ignored and repeated URLs keep only their first occurrence.
    pub fn from_text(text: &str, message_style: MessageStyle) -> Result<Self, ClientError> {
        let mut seen = HashSet::new();
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| seen.insert(*line));
        Self::new(lines, message_style)
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn message_style(&self) -> MessageStyle {
        self.message_style
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Acknowledgement body returned by delete, process, upgrade and cancel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub lead_id: Option<LeadId>,
}

/// `POST /leads/{id}/process` answers either with the refreshed lead or an ack.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProcessResponse {
    Lead(Box<Lead>),
    Ack(Ack),
}

// ============ Subscription Models ============

/// `POST /api/v2/upgrade` answers with the new usage snapshot or a plain ack.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UpgradeResponse {
    Usage(PlanUsage),
    Ack(Ack),
}


/// Subscription tiers known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            other => Err(ClientError::InvalidInput(format!(
                "Invalid plan name: {}",
                other
            ))),
        }
    }
}

/// Point-in-time snapshot of the caller's plan and daily quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanUsage {
    pub plan_name: String,
    pub max_leads_per_day: u32,
    #[serde(default)]
    pub can_export: bool,
    #[serde(default)]
    pub can_use_ai: bool,
    #[serde(default)]
    pub current_usage: u32,
    pub remaining_daily_leads: u32,
    pub can_process_more_today: bool,
}

impl PlanUsage {
    /// Snapshot assumed when the usage endpoint is unavailable: the free tier,
    /// untouched.
    pub fn fallback() -> Self {
        Self {
            plan_name: "free".to_string(),
            max_leads_per_day: 10,
            can_export: false,
            can_use_ai: false,
            current_usage: 0,
            remaining_daily_leads: 10,
            can_process_more_today: true,
        }
    }

    /// Parsed tier, `None` for names this client does not know.
    pub fn tier(&self) -> Option<PlanTier> {
        self.plan_name.parse().ok()
    }

    /// `remaining + used == max`, as the service computes it.
    pub fn is_consistent(&self) -> bool {
        self.remaining_daily_leads as u64 + self.current_usage as u64
            == self.max_leads_per_day as u64
    }
}

/// Plan descriptor from `GET /api/v2/plans`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub max_leads_per_day: u32,
    #[serde(default)]
    pub can_export: bool,
    #[serde(default)]
    pub can_use_ai: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}
