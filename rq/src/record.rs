//! Request record types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned request identifier (monotonically increasing, never reused)
pub type RequestId = i64;

/// Lifecycle status of a request
///
/// The only legal transition is `Pending -> Responded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for a human answer
    Pending,
    /// Answered; response text and timestamp are set
    Responded,
}

impl RequestStatus {
    /// Column value used in the `status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "responded" => Ok(Self::Responded),
            _ => Err(format!("Unknown status: {}. Use: pending or responded", s)),
        }
    }
}

/// A question asked by an agent integration and, once answered, its response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    /// Agent integration that owns the request (e.g. the IDE name)
    pub source_name: String,
    /// Caller-supplied context label
    pub app_name: String,
    pub question: String,
    /// Empty until answered
    pub response: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    /// Present iff `status` is `Responded`
    pub responded_at: Option<DateTime<Utc>>,
}

impl Request {
    /// True while the request still awaits an answer
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// Fields supplied by the caller when creating a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub source_name: String,
    pub app_name: String,
    pub question: String,
}

impl NewRequest {
    pub fn new(source_name: impl Into<String>, app_name: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            app_name: app_name.into(),
            question: question.into(),
        }
    }
}

/// Equality filters for listing requests; `None` matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub source_name: Option<String>,
    pub app_name: Option<String>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    pub fn app(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_str() {
        assert_eq!("pending".parse::<RequestStatus>(), Ok(RequestStatus::Pending));
        assert_eq!("Responded".parse::<RequestStatus>(), Ok(RequestStatus::Responded));
        assert!("done".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&RequestStatus::Responded).unwrap();
        assert_eq!(json, r#""responded""#);
    }

    #[test]
    fn test_pending_request_json_has_null_responded_at() {
        let req = Request {
            id: 7,
            source_name: "ide-x".to_string(),
            app_name: "app1".to_string(),
            question: "pick a color".to_string(),
            response: String::new(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["status"], "pending");
        assert_eq!(value["response"], "");
        assert!(value["responded_at"].is_null());
    }

    #[test]
    fn test_filter_builder() {
        let filter = RequestFilter::default().source("ide-x").status(RequestStatus::Pending);
        assert_eq!(filter.source_name.as_deref(), Some("ide-x"));
        assert!(filter.app_name.is_none());
        assert_eq!(filter.status, Some(RequestStatus::Pending));
    }
}
