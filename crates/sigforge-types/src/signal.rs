//! Signal entities passed between pipeline stages.
//!
//! Every entity is produced once by the stage that owns it and handed by
//! value to the next stage. Field names serialize in camelCase, which is the
//! shape the completion service is asked to honour.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, SignalError};

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, plus the offset-less forms that browser
/// `datetime-local` inputs and models commonly emit (interpreted as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// SignalRequest
// ---------------------------------------------------------------------------

/// What the caller asked for: an asset and an approximate time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub asset: String,
    pub approximate_timestamp: String,
}

impl SignalRequest {
    /// Build a request, trimming the asset and rejecting unusable input.
    pub fn new(asset: impl Into<String>, approximate_timestamp: impl Into<String>) -> Result<Self> {
        let request = Self {
            asset: asset.into().trim().to_string(),
            approximate_timestamp: approximate_timestamp.into().trim().to_string(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the inbound contract: non-empty asset, parseable timestamp.
    pub fn validate(&self) -> Result<()> {
        if self.asset.trim().is_empty() {
            return Err(SignalError::InvalidRequest("asset must not be empty".into()));
        }
        if parse_timestamp(&self.approximate_timestamp).is_none() {
            return Err(SignalError::InvalidRequest(format!(
                "'{}' is not an ISO-8601 timestamp",
                self.approximate_timestamp
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Generation output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade parameters as returned by the generation stage.
///
/// Carries no asset: the asset of a proposal always comes from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalParameters {
    pub signal_identifier: String,
    pub timeframe: String,
    pub trade_direction: TradeDirection,
    pub entry_price: f64,
    pub take_profit1: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit2: Option<f64>,
    pub stop_loss: f64,
    pub reason: String,
    pub exact_timestamp: String,
}

/// A generated signal attributed to the request that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedSignal {
    pub signal_identifier: String,
    pub timeframe: String,
    pub trade_direction: TradeDirection,
    pub entry_price: f64,
    pub take_profit1: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit2: Option<f64>,
    pub stop_loss: f64,
    pub reason: String,
    pub exact_timestamp: String,
    pub asset: String,
}

impl ProposedSignal {
    /// Combine generated parameters with the request's asset.
    pub fn from_parameters(params: SignalParameters, request: &SignalRequest) -> Self {
        Self {
            signal_identifier: params.signal_identifier,
            timeframe: params.timeframe,
            trade_direction: params.trade_direction,
            entry_price: params.entry_price,
            take_profit1: params.take_profit1,
            take_profit2: params.take_profit2,
            stop_loss: params.stop_loss,
            reason: params.reason,
            exact_timestamp: params.exact_timestamp,
            asset: request.asset.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// Medium and High confidence pass the gate.
    pub fn is_actionable(&self) -> bool {
        matches!(self, ConfidenceLevel::High | ConfidenceLevel::Medium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub confidence_level: ConfidenceLevel,
    pub reasoning: String,
    pub is_valid: bool,
}

impl ValidationOutcome {
    /// Returns `true` if `is_valid` agrees with the confidence level.
    pub fn is_consistent(&self) -> bool {
        self.is_valid == self.confidence_level.is_actionable()
    }

    /// Re-derive `is_valid` from the confidence level.
    pub fn normalized(self) -> Self {
        let is_valid = self.confidence_level.is_actionable();
        Self { is_valid, ..self }
    }
}

// ---------------------------------------------------------------------------
// Summary / PipelineResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSummary {
    pub short_message: String,
}

/// The terminal output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub proposed_signal: ProposedSignal,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_outcome: Option<ValidationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SignalSummary>,
}
