// Line status models shared by the normalizer, aggregator and history tracker.
//
// Upstream payload shape (TfL Line/Mode/{modes}/Status):
// [{ "id": "central", "name": "Central",
//    "lineStatuses": [{ "statusSeverity": 4,
//                       "statusSeverityDescription": "Severe Delays",
//                       "reason": "..." }] }]

use serde::{Deserialize, Serialize};

// ============================================================================
// Raw Upstream Payload
// ============================================================================

/// One line as reported by the upstream status endpoint.
///
/// Every field defaults so a partially filled record still decodes; the
/// normalizer applies the remaining fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawLine {
    pub id: String,
    pub name: String,
    pub line_statuses: Vec<RawLineStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawLineStatus {
    pub status_severity: i64,
    pub status_severity_description: String,
    pub reason: Option<String>,
}

impl RawLine {
    /// Pull a line out of an arbitrary JSON value. Wrongly typed or missing
    /// fields become their defaults instead of failing the whole payload.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let line_statuses = value["lineStatuses"]
            .as_array()
            .map(|arr| arr.iter().map(RawLineStatus::from_json).collect())
            .unwrap_or_default();

        RawLine {
            id: value["id"].as_str().unwrap_or_default().to_string(),
            name: value["name"].as_str().unwrap_or_default().to_string(),
            line_statuses,
        }
    }
}

impl RawLineStatus {
    pub fn from_json(value: &serde_json::Value) -> Self {
        RawLineStatus {
            status_severity: value["statusSeverity"]
                .as_i64()
                .or_else(|| value["statusSeverity"].as_f64().map(|f| f as i64))
                .unwrap_or_default(),
            status_severity_description: value["statusSeverityDescription"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            reason: value["reason"].as_str().map(String::from),
        }
    }
}

// ============================================================================
// Normalized Data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineStatus {
    pub id: String,
    pub name: String,
    pub status: String,
    pub reason: String,
    pub status_severity: i64,
    pub status_severity_description: String,
    pub delay_minutes: u32,
}

impl LineStatus {
    pub fn is_affected(&self) -> bool {
        self.delay_minutes > 0
    }

    pub fn service_level(&self) -> ServiceLevel {
        ServiceLevel::from_severity(self.status_severity)
    }
}

/// Colour band a line is shown in, derived from its severity code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceLevel {
    Severe,
    Disrupted,
    Good,
}

impl ServiceLevel {
    pub fn from_severity(severity: i64) -> Self {
        if severity <= 5 {
            ServiceLevel::Severe
        } else if severity <= 8 {
            ServiceLevel::Disrupted
        } else {
            ServiceLevel::Good
        }
    }
}

impl std::fmt::Display for ServiceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceLevel::Severe => write!(f, "severe"),
            ServiceLevel::Disrupted => write!(f, "disrupted"),
            ServiceLevel::Good => write!(f, "good"),
        }
    }
}

// ============================================================================
// Delay Statistics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorstLine {
    pub name: String,
    pub delay_minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayStats {
    pub total_delay_minutes: u32,
    pub affected_lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_line: Option<WorstLine>,
}

/// One retained day of delay statistics. `date` is `YYYY-MM-DD` and
/// `timestamp` is the epoch milliseconds of the last write for that day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDelayRecord {
    pub date: String,
    pub total_delay_minutes: u32,
    pub affected_lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_line: Option<WorstLine>,
    pub timestamp: i64,
}

impl DailyDelayRecord {
    pub fn from_stats(date: String, stats: &DelayStats, timestamp: i64) -> Self {
        DailyDelayRecord {
            date,
            total_delay_minutes: stats.total_delay_minutes,
            affected_lines: stats.affected_lines,
            worst_line: stats.worst_line.clone(),
            timestamp,
        }
    }
}
