use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Health Check Types
// ============================================================================
//
// Stores report their health through these types so the /health endpoint
// can render any backend without knowing which one is configured.
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    /// Degraded components still serve requests.
    pub fn is_available(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded(_) => "degraded",
            HealthStatus::Unhealthy(_) => "unhealthy",
        }
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_health_serializes_status_and_details() {
        let health = ComponentHealth::new("postgres", HealthStatus::Unhealthy("timeout".to_string()))
            .with_details("pool exhausted");

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["name"], "postgres");
        assert_eq!(json["status"]["state"], "unhealthy");
        assert_eq!(json["status"]["reason"], "timeout");
        assert_eq!(json["details"], "pool exhausted");
        assert!(!health.status.is_available());
    }

    #[test]
    fn test_degraded_is_available_but_not_healthy() {
        let status = HealthStatus::Degraded("connection pool exhausted".to_string());
        assert!(status.is_available());
        assert_ne!(status, HealthStatus::Healthy);
        assert_eq!(status.label(), "degraded");
        assert!(!HealthStatus::Unhealthy("down".to_string()).is_available());
    }
}
