//! HTTP wire bodies shared by the primary's API and its clients
//!
//! All bodies are JSON. Request records themselves travel as
//! [`requeststore::Request`].

use requeststore::{RequestId, RequestStatus};
use serde::{Deserialize, Serialize};

/// Identity marker returned by `GET /api/health`
pub const HEALTH_MARKER: &str = "askhuman-ok";

/// `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthBody {
    pub status: String,
}

impl HealthBody {
    pub fn ok() -> Self {
        Self {
            status: HEALTH_MARKER.to_string(),
        }
    }

    pub fn is_askhuman(&self) -> bool {
        self.status == HEALTH_MARKER
    }
}

/// `POST /api/requests` body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRequestBody {
    pub source_name: String,
    pub app_name: String,
    pub question: String,
}

/// `POST /api/requests` reply
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedBody {
    pub id: RequestId,
}

/// `GET /api/requests/{id}/poll` reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollBody {
    pub id: RequestId,
    pub status: RequestStatus,
    #[serde(default)]
    pub response: String,
}

impl PollBody {
    /// The answer, once the request is responded with non-empty text
    pub fn answer(&self) -> Option<&str> {
        (self.status == RequestStatus::Responded && !self.response.is_empty()).then_some(self.response.as_str())
    }
}

/// `POST /api/requests/{id}/respond` body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RespondBody {
    pub response: String,
}

/// Generic `{status: "..."}` acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusBody {
    pub status: String,
}

impl StatusBody {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Error reply for every non-success status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

/// `GET /api/source` reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceBody {
    pub source_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_marker() {
        let json = serde_json::to_string(&HealthBody::ok()).unwrap();
        assert_eq!(json, r#"{"status":"askhuman-ok"}"#);

        let other: HealthBody = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(!other.is_askhuman());
    }

    #[test]
    fn test_create_body_requires_all_fields() {
        let body: CreateRequestBody =
            serde_json::from_str(r#"{"source_name":"ide-x","app_name":"app1","question":"q"}"#).unwrap();
        assert_eq!(body.source_name, "ide-x");
        assert!(serde_json::from_str::<CreateRequestBody>(r#"{"app_name":"app1","question":"q"}"#).is_err());
    }

    #[test]
    fn test_poll_answer() {
        let pending: PollBody = serde_json::from_str(r#"{"id":1,"status":"pending","response":""}"#).unwrap();
        assert_eq!(pending.answer(), None);

        let empty = PollBody {
            id: 1,
            status: RequestStatus::Responded,
            response: String::new(),
        };
        assert_eq!(empty.answer(), None);

        let done: PollBody = serde_json::from_str(r#"{"id":1,"status":"responded","response":"blue"}"#).unwrap();
        assert_eq!(done.answer(), Some("blue"));
    }
}
