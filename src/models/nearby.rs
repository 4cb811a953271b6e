use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::notification::{Category, NotificationRequest, Priority};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub recipient_id: String,

    #[serde(alias = "distance")]
    pub distance_km: f64,
}

impl Candidate {
    pub fn new(recipient_id: impl Into<String>, distance_km: f64) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            distance_km,
        }
    }
}

/// The event broadcast to every selected candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyEvent {
    pub title: String,
    pub message: String,
    pub category: Category,

    #[serde(default)]
    pub payload: HashMap<String, JsonValue>,

    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default = "default_true")]
    pub vibration_enabled: bool,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl NearbyEvent {
    pub fn new(title: impl Into<String>, message: impl Into<String>, category: Category) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            category,
            payload: HashMap::new(),
            sound_enabled: true,
            vibration_enabled: true,
            timeout_seconds: None,
        }
    }

    pub fn to_request(&self, recipient_id: &str, priority: Priority) -> NotificationRequest {
        let mut request = NotificationRequest::new(
            recipient_id,
            self.title.clone(),
            self.message.clone(),
            self.category,
            priority,
        )
        .with_payload(self.payload.clone())
        .with_alerts(self.sound_enabled, self.vibration_enabled);
        request.timeout_seconds = self.timeout_seconds;
        request
    }
}

#[derive(Debug, Clone)]
pub struct NearbyConfig {
    pub max_recipients: usize,
    pub urgent_radius_km: f64,
    pub high_radius_km: f64,
    pub pacing: Duration,
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self {
            max_recipients: 5,
            urgent_radius_km: 1.0,
            high_radius_km: 2.0,
            pacing: Duration::from_millis(200),
        }
    }
}

impl NearbyConfig {
    pub fn priority_for(&self, distance_km: f64) -> Priority {
        if distance_km < self.urgent_radius_km {
            Priority::Urgent
        } else if distance_km < self.high_radius_km {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    pub fn is_paced(&self, distance_km: f64) -> bool {
        distance_km >= self.urgent_radius_km
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_bands() {
        let config = NearbyConfig::default();
        assert_eq!(config.priority_for(0.0), Priority::Urgent);
        assert_eq!(config.priority_for(0.99), Priority::Urgent);
        assert_eq!(config.priority_for(1.0), Priority::High);
        assert_eq!(config.priority_for(1.99), Priority::High);
        assert_eq!(config.priority_for(2.0), Priority::Normal);
        assert_eq!(config.priority_for(40.0), Priority::Normal);
    }

    #[test]
    fn test_pacing_starts_at_urgent_radius() {
        let config = NearbyConfig::default();
        assert!(!config.is_paced(0.9));
        assert!(config.is_paced(1.0));
    }

    #[test]
    fn test_candidate_accepts_distance_alias() {
        let candidate: Candidate =
            serde_json::from_value(serde_json::json!({"recipient_id": "d1", "distance": 0.4}))
                .unwrap();
        assert_eq!(candidate.distance_km, 0.4);
    }
}
