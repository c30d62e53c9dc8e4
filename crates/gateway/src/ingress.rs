//! Notification ingress: envelope dispatch and the alert pipeline.
//!
//! ```text
//! delivery ─┬─ SubscriptionConfirmation → SubscriptionConfirmer (spawned)
//!           ├─ Notification → subject filter → Classifier
//!           │                    ├─ emergency → AlertHistory + hub.broadcast_emergency
//!           │                    └─ routine   → hub.broadcast_data_update
//!           ├─ UnsubscribeConfirmation → log
//!           └─ anything else → warn
//! ```
//!
//! Once the body parses as an envelope the delivery is acknowledged no
//! matter what happens downstream, because the provider redelivers on any
//! non-2xx and redeliveries would broadcast twice. Identical redeliveries
//! are not deduplicated.

use crate::envelope::{Envelope, MessageKind, MESSAGE_TYPE_HEADER, TOPIC_HEADER};
use crate::error::Result;
use crate::handshake::SubscriptionConfirmer;
use crate::hub::RealtimeHub;
use alerts::{AlertHistory, Classifier, EmergencyAssessment, ProcessedAlert};
use axum::http::HeaderMap;
use metrics::counter;
use sensor_store::{GeoPoint, SensorRecord};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default case-insensitive subject keyword for emergency notifications.
pub const DEFAULT_EMERGENCY_KEYWORD: &str = "fire";

/// Transport headers relevant to dispatch.
#[derive(Debug, Clone, Default)]
pub struct DeliveryHeaders {
    pub message_type: Option<String>,
    pub topic: Option<String>,
}

impl DeliveryHeaders {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            message_type: get(MESSAGE_TYPE_HEADER),
            topic: get(TOPIC_HEADER),
        }
    }
}

/// Acknowledgment returned to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// What the classify → broadcast pipeline did with one payload.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Emergency(ProcessedAlert),
    Routine(SensorRecord),
}

/// What happened to one delivery.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    ConfirmationRequested { url: Option<String> },
    Processed(PipelineOutcome),
    SkippedSubject { subject: Option<String> },
    Unsubscribed,
    Unrecognized(String),
}

impl DeliveryOutcome {
    fn describe(&self) -> String {
        match self {
            DeliveryOutcome::ConfirmationRequested { url: Some(_) } => {
                "Subscription confirmation started".to_string()
            }
            DeliveryOutcome::ConfirmationRequested { url: None } => {
                "Subscription confirmation without URL".to_string()
            }
            DeliveryOutcome::Processed(PipelineOutcome::Emergency(alert)) => format!(
                "Emergency alert {} processed ({})",
                alert.id, alert.assessment.severity
            ),
            DeliveryOutcome::Processed(PipelineOutcome::Routine(_)) => {
                "Notification processed, no emergency".to_string()
            }
            DeliveryOutcome::SkippedSubject { .. } => {
                "Notification skipped: subject is not emergency related".to_string()
            }
            DeliveryOutcome::Unsubscribed => "Unsubscribe confirmation received".to_string(),
            DeliveryOutcome::Unrecognized(kind) => format!("Unrecognized message type: {}", kind),
        }
    }
}

/// Ingress configuration.
#[derive(Debug, Clone)]
pub struct IngressConfig {
    pub emergency_keyword: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            emergency_keyword: DEFAULT_EMERGENCY_KEYWORD.to_string(),
        }
    }
}

/// Accepts webhook deliveries and drives the alert pipeline.
pub struct NotificationIngress {
    classifier: Classifier,
    history: Arc<AlertHistory>,
    /// Absent until the real-time transport is up.
    hub: Option<Arc<RealtimeHub>>,
    confirmer: Arc<SubscriptionConfirmer>,
    config: IngressConfig,
}

impl NotificationIngress {
    pub fn new(
        classifier: Classifier,
        history: Arc<AlertHistory>,
        hub: Option<Arc<RealtimeHub>>,
        confirmer: Arc<SubscriptionConfirmer>,
        config: IngressConfig,
    ) -> Self {
        Self {
            classifier,
            history,
            hub,
            confirmer,
            config,
        }
    }

    pub fn history(&self) -> &Arc<AlertHistory> {
        &self.history
    }

    /// Handle one delivery. Errors only when the body is not an envelope.
    pub fn handle_delivery(&self, headers: &DeliveryHeaders, body: &[u8]) -> Result<Ack> {
        counter!("gateway_webhook_deliveries_total").increment(1);

        let envelope = Envelope::parse(body)?;
        let kind = envelope.kind(headers.message_type.as_deref());
        counter!("gateway_webhook_messages_total", "kind" => kind.as_str().to_string())
            .increment(1);

        let outcome = self.dispatch(&envelope, kind, headers.topic.as_deref());

        Ok(Ack {
            success: true,
            message: outcome.describe(),
            message_id: envelope.message_id().map(str::to_string),
        })
    }

    fn dispatch(&self, envelope: &Envelope, kind: MessageKind, topic: Option<&str>) -> DeliveryOutcome {
        let topic = envelope.topic(topic).map(str::to_string);

        match kind {
            MessageKind::SubscriptionConfirmation => {
                let url = envelope.confirmation_url().map(str::to_string);
                match &url {
                    Some(url) => self.start_handshake(topic, url.clone()),
                    None => warn!(
                        "Subscription confirmation without URL; envelope keys: {:?}",
                        envelope.keys()
                    ),
                }
                DeliveryOutcome::ConfirmationRequested { url }
            }
            MessageKind::Notification => {
                let subject = envelope.subject().map(str::to_string);
                if !self.is_emergency_subject(subject.as_deref()) {
                    info!(
                        "Skipping notification {:?} with subject {:?}",
                        envelope.message_id(),
                        subject
                    );
                    counter!("gateway_notifications_skipped_total").increment(1);
                    return DeliveryOutcome::SkippedSubject { subject };
                }

                let message = envelope.message();
                if message.is_null() {
                    warn!(
                        "Notification without Message; envelope keys: {:?}",
                        envelope.keys()
                    );
                }
                DeliveryOutcome::Processed(self.process_payload(&message))
            }
            MessageKind::UnsubscribeConfirmation => {
                info!("Unsubscribe confirmation received for {:?}", topic);
                DeliveryOutcome::Unsubscribed
            }
            MessageKind::Unrecognized(raw) => {
                warn!(
                    "Unrecognized message type {:?}; envelope keys: {:?}",
                    raw,
                    envelope.keys()
                );
                DeliveryOutcome::Unrecognized(raw)
            }
        }
    }

    fn start_handshake(&self, topic: Option<String>, url: String) {
        let confirmer = self.confirmer.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    confirmer.confirm(topic.as_deref(), &url).await;
                });
            }
            Err(_) => warn!(
                "No runtime to confirm subscription; confirm manually by visiting: {}",
                url
            ),
        }
    }

    /// Case-insensitive keyword match on the subject line.
    pub fn is_emergency_subject(&self, subject: Option<&str>) -> bool {
        let keyword = self.config.emergency_keyword.to_lowercase();
        subject.is_some_and(|s| s.to_lowercase().contains(&keyword))
    }

    /// Classify a payload, record emergencies and broadcast the result.
    pub fn process_payload(&self, raw: &Value) -> PipelineOutcome {
        let assessment = self.classifier.assess(raw);
        debug!(
            "Assessed {}: {} (emergency: {})",
            assessment.device_id, assessment.severity, assessment.is_emergency
        );

        if assessment.is_emergency {
            let alert = ProcessedAlert::new(assessment);
            self.history.add(alert.clone());
            match &self.hub {
                Some(hub) => hub.broadcast_emergency(&alert),
                None => warn!(
                    "Real-time hub unavailable; emergency {} recorded but not broadcast",
                    alert.id
                ),
            }
            PipelineOutcome::Emergency(alert)
        } else {
            let record = record_from_assessment(&assessment);
            match &self.hub {
                Some(hub) => hub.broadcast_data_update(&record),
                None => warn!(
                    "Real-time hub unavailable; update for {} not broadcast",
                    record.device_id
                ),
            }
            PipelineOutcome::Routine(record)
        }
    }
}

/// Routine reading derived from an assessment.
pub fn record_from_assessment(assessment: &EmergencyAssessment) -> SensorRecord {
    SensorRecord {
        device_id: assessment.device_id.clone(),
        timestamp: assessment.observed_at.timestamp_millis(),
        temperature: assessment.temperature,
        humidity: assessment.humidity,
        smoke_level: assessment.smoke_level,
        air_quality: assessment.air_quality,
        is_emergency: assessment.is_emergency,
        location: Some(GeoPoint {
            latitude: assessment.location.latitude,
            longitude: assessment.location.longitude,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::DEFAULT_CONFIRMATION_TIMEOUT;
    use crate::subscription::device_room;
    use axum::extract::ws::Message;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn ingress(hub: Option<Arc<RealtimeHub>>) -> NotificationIngress {
        NotificationIngress::new(
            Classifier::default(),
            Arc::new(AlertHistory::new(10)),
            hub,
            Arc::new(SubscriptionConfirmer::new(DEFAULT_CONFIRMATION_TIMEOUT).unwrap()),
            IngressConfig::default(),
        )
    }

    fn fire_notification(subject: &str) -> Vec<u8> {
        let message = json!({
            "device": "Node-1",
            "payload": {
                "temperature": 95.5,
                "humidity": 15.2,
                "smoke_level": 950,
                "is_emergency": true,
                "gps": {"latitude": 36.0064, "longitude": 10.1715}
            }
        });
        json!({
            "Type": "Notification",
            "MessageId": "msg-1",
            "TopicArn": "arn:aws:sns:fire",
            "Subject": subject,
            "Message": message.to_string()
        })
        .to_string()
        .into_bytes()
    }

    fn frame_events(rx: &mut mpsc::Receiver<Message>) -> Vec<String> {
        let mut events = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            let v: Value = serde_json::from_str(text.as_str()).unwrap();
            events.push(v["event"].as_str().unwrap().to_string());
        }
        events
    }

    #[test]
    fn test_fire_notification_broadcasts_and_records() {
        let hub = Arc::new(RealtimeHub::new());
        let (tx, mut rx) = mpsc::channel(16);
        let client = hub.connect(tx);
        hub.join(&client.id, &device_room("Node-1")).unwrap();
        frame_events(&mut rx);

        let ingress = ingress(Some(hub));
        let ack = ingress
            .handle_delivery(&DeliveryHeaders::default(), &fire_notification("Fire Alert"))
            .unwrap();

        assert!(ack.success);
        assert_eq!(ack.message_id.as_deref(), Some("msg-1"));
        assert!(ack.message.contains("EXTREME"));
        assert_eq!(ingress.history().len(), 1);
        assert_eq!(frame_events(&mut rx), vec!["fire-emergency", "device-emergency"]);
    }

    #[test]
    fn test_subject_without_keyword_is_skipped() {
        let hub = Arc::new(RealtimeHub::new());
        let (tx, mut rx) = mpsc::channel(16);
        hub.connect(tx);
        frame_events(&mut rx);

        let ingress = ingress(Some(hub));
        let ack = ingress
            .handle_delivery(&DeliveryHeaders::default(), &fire_notification("Routine Check"))
            .unwrap();

        assert!(ack.success);
        assert!(ack.message.contains("skipped"));
        assert!(ingress.history().is_empty());
        assert!(frame_events(&mut rx).is_empty());
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let ingress = ingress(None);
        assert!(ingress.is_emergency_subject(Some("FIRE ALERT")));
        assert!(ingress.is_emergency_subject(Some("wildfire detected")));
        assert!(!ingress.is_emergency_subject(Some("Routine Check")));
        assert!(!ingress.is_emergency_subject(None));
    }

    #[test]
    fn test_missing_hub_still_acknowledges() {
        let ingress = ingress(None);
        let ack = ingress
            .handle_delivery(&DeliveryHeaders::default(), &fire_notification("Fire Alert"))
            .unwrap();
        assert!(ack.success);
        assert_eq!(ingress.history().len(), 1);
    }

    #[test]
    fn test_duplicate_delivery_is_not_deduplicated() {
        let hub = Arc::new(RealtimeHub::new());
        let (tx, mut rx) = mpsc::channel(16);
        hub.connect(tx);
        frame_events(&mut rx);

        let ingress = ingress(Some(hub));
        let body = fire_notification("Fire Alert");
        ingress.handle_delivery(&DeliveryHeaders::default(), &body).unwrap();
        ingress.handle_delivery(&DeliveryHeaders::default(), &body).unwrap();

        assert_eq!(ingress.history().len(), 2);
        assert_eq!(frame_events(&mut rx), vec!["fire-emergency", "fire-emergency"]);
        let recent = ingress.history().recent(2);
        assert_ne!(recent[0].id, recent[1].id);
    }

    #[test]
    fn test_routine_reading_broadcasts_data_update() {
        let hub = Arc::new(RealtimeHub::new());
        let (tx, mut rx) = mpsc::channel(16);
        hub.connect(tx);
        frame_events(&mut rx);

        let ingress = ingress(Some(hub));
        let outcome = ingress.process_payload(&json!({"deviceId": "Node-3", "temperature": 22, "humidity": 60}));

        assert!(matches!(outcome, PipelineOutcome::Routine(_)));
        assert!(ingress.history().is_empty());
        assert_eq!(frame_events(&mut rx), vec!["new-data", "device-update"]);
    }

    #[test]
    fn test_malformed_body_is_error() {
        let ingress = ingress(None);
        assert!(ingress
            .handle_delivery(&DeliveryHeaders::default(), b"<xml/>")
            .is_err());
    }

    #[test]
    fn test_confirmation_without_url_is_acknowledged() {
        let ingress = ingress(None);
        let headers = DeliveryHeaders {
            message_type: Some("SubscriptionConfirmation".to_string()),
            topic: None,
        };
        let ack = ingress.handle_delivery(&headers, br#"{"Token":"t"}"#).unwrap();
        assert!(ack.success);
        assert!(ack.message.contains("without URL"));
    }

    #[test]
    fn test_unsubscribe_and_unknown_kinds() {
        let ingress = ingress(None);
        let ack = ingress
            .handle_delivery(&DeliveryHeaders::default(), br#"{"Type":"UnsubscribeConfirmation"}"#)
            .unwrap();
        assert!(ack.success);

        let ack = ingress
            .handle_delivery(&DeliveryHeaders::default(), br#"{"Type":"Bogus"}"#)
            .unwrap();
        assert!(ack.success);
        assert!(ack.message.contains("Bogus"));
    }

    #[test]
    fn test_opaque_message_still_classified() {
        let ingress = ingress(None);
        let body = json!({"Type": "Notification", "Subject": "fire", "Message": "smoke seen"})
            .to_string();
        let ack = ingress
            .handle_delivery(&DeliveryHeaders::default(), body.as_bytes())
            .unwrap();
        assert!(ack.success);
    }

    #[test]
    fn test_record_from_assessment() {
        let assessment = alerts::assess(&json!({"deviceId": "n", "temperature": 30, "humidity": 70}));
        let record = record_from_assessment(&assessment);
        assert_eq!(record.device_id, "n");
        assert_eq!(record.temperature, 30.0);
        assert_eq!(record.timestamp, assessment.observed_at.timestamp_millis());
        assert!(record.location.is_some());
    }

    #[test]
    fn test_headers_from_map() {
        let mut map = HeaderMap::new();
        map.insert(MESSAGE_TYPE_HEADER, "Notification".parse().unwrap());
        map.insert(TOPIC_HEADER, "arn:fire".parse().unwrap());
        let headers = DeliveryHeaders::from_header_map(&map);
        assert_eq!(headers.message_type.as_deref(), Some("Notification"));
        assert_eq!(headers.topic.as_deref(), Some("arn:fire"));
    }
}
