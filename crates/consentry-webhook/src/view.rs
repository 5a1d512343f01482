//! Presentation shapes for webhooks and deliveries.

use std::collections::HashMap;

use consentry_core::{time::format_timestamp, Webhook, WebhookDelivery};
use serde::Serialize;

const SECRET_MASK: &str = "********";

/// Webhook as returned to API callers, with the secret masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookView {
    /// Webhook identifier.
    pub id: String,
    /// Owning organisation.
    pub organisation_id: String,
    /// Endpoint URL.
    pub payload_url: String,
    /// `json` or `form`.
    pub content_type: String,
    /// Subscribed event types.
    pub subscribed_events: Vec<String>,
    /// Whether deliveries are paused.
    pub disabled: bool,
    /// Masked secret, or empty when unsigned.
    pub secret_key: String,
    /// Whether TLS verification is skipped.
    pub skip_ssl_verification: bool,
    /// Creation time.
    pub timestamp: String,
    /// Outcome of the newest delivery, or empty if none was made.
    pub last_delivery_status: String,
    /// Whether the newest delivery succeeded.
    pub last_delivery_successful: bool,
}

impl WebhookView {
    /// Builds the view from a webhook and its newest delivery.
    pub fn new(webhook: &Webhook, last_delivery: Option<&WebhookDelivery>) -> Self {
        Self {
            id: webhook.id.to_string(),
            organisation_id: webhook.organisation_id.to_string(),
            payload_url: webhook.payload_url.clone(),
            content_type: webhook.content_type.as_str().to_string(),
            subscribed_events: webhook
                .subscribed_events
                .iter()
                .map(|event| event.as_str().to_string())
                .collect(),
            disabled: webhook.disabled,
            secret_key: if webhook.has_secret() { SECRET_MASK.to_string() } else { String::new() },
            skip_ssl_verification: webhook.skip_ssl_verification,
            timestamp: format_timestamp(&webhook.timestamp),
            last_delivery_status: last_delivery
                .map(|delivery| delivery.status.as_str().to_string())
                .unwrap_or_default(),
            last_delivery_successful: last_delivery.is_some_and(WebhookDelivery::is_successful),
        }
    }
}

/// Delivery record as returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryView {
    /// Delivery identifier.
    pub id: String,
    /// Target webhook.
    pub webhook_id: String,
    /// Actor whose action raised the event.
    pub user_id: String,
    /// Event type.
    pub webhook_event_type: String,
    /// Headers sent.
    pub request_headers: HashMap<String, String>,
    /// Envelope sent.
    pub request_payload: String,
    /// Headers received.
    pub response_headers: HashMap<String, String>,
    /// Body received.
    pub response_body: String,
    /// Status code received, 0 when the request failed.
    pub response_status_code: u16,
    /// Status line received.
    pub response_status_str: String,
    /// When the request started.
    pub execution_start_timestamp: String,
    /// When the request finished.
    pub execution_end_timestamp: String,
    /// `completed` or `failed`.
    pub status: String,
    /// Failure detail.
    pub status_description: String,
    /// Completed with a 2xx success status.
    pub successful: bool,
}

impl From<&WebhookDelivery> for DeliveryView {
    fn from(delivery: &WebhookDelivery) -> Self {
        Self {
            id: delivery.id.to_string(),
            webhook_id: delivery.webhook_id.to_string(),
            user_id: delivery.user_id.clone(),
            webhook_event_type: delivery.webhook_event_type.as_str().to_string(),
            request_headers: delivery.request_headers.clone(),
            request_payload: delivery.request_payload.clone(),
            response_headers: delivery.response_headers.clone(),
            response_body: delivery.response_body.clone(),
            response_status_code: delivery.response_status_code.unwrap_or_default(),
            response_status_str: delivery.response_status_str.clone(),
            execution_start_timestamp: format_timestamp(&delivery.execution_start_timestamp),
            execution_end_timestamp: format_timestamp(&delivery.execution_end_timestamp),
            status: delivery.status.as_str().to_string(),
            status_description: delivery.status_description.clone(),
            successful: delivery.is_successful(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use consentry_core::{
        DeliveryId, DeliveryStatus, OrganisationId, WebhookContentType, WebhookEventType, WebhookId,
    };

    use super::*;

    fn webhook(secret: &str) -> Webhook {
        Webhook {
            id: WebhookId::new(),
            organisation_id: OrganisationId::new(),
            payload_url: "https://example.com/hook".to_string(),
            content_type: WebhookContentType::Form,
            subscribed_events: vec![WebhookEventType::ConsentAllowed],
            disabled: false,
            secret_key: secret.to_string(),
            skip_ssl_verification: false,
            timestamp: Utc::now(),
            is_deleted: false,
        }
    }

    fn failed_delivery(webhook_id: WebhookId) -> WebhookDelivery {
        WebhookDelivery {
            id: DeliveryId::new(),
            webhook_id,
            user_id: "actor".to_string(),
            webhook_event_type: WebhookEventType::ConsentAllowed,
            request_headers: HashMap::new(),
            request_payload: "{}".to_string(),
            response_headers: HashMap::new(),
            response_body: String::new(),
            response_status_code: None,
            response_status_str: String::new(),
            execution_start_timestamp: Utc::now(),
            execution_end_timestamp: Utc::now(),
            status: DeliveryStatus::Failed,
            status_description: "network connection failed".to_string(),
        }
    }

    #[test]
    fn secret_is_never_exposed() {
        let view = WebhookView::new(&webhook("s3cr3t"), None);
        assert_eq!(view.secret_key, SECRET_MASK);
        assert_eq!(view.content_type, "form");
        assert_eq!(view.last_delivery_status, "");

        assert_eq!(WebhookView::new(&webhook(""), None).secret_key, "");
    }

    #[test]
    fn failed_delivery_is_reported_as_unsuccessful() {
        let webhook = webhook("");
        let delivery = failed_delivery(webhook.id);

        let view = WebhookView::new(&webhook, Some(&delivery));
        assert_eq!(view.last_delivery_status, "failed");
        assert!(!view.last_delivery_successful);

        let delivery_view = DeliveryView::from(&delivery);
        assert_eq!(delivery_view.response_status_code, 0);
        assert!(!delivery_view.successful);
    }
}
