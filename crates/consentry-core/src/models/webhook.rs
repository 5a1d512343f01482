//! Webhook subscriptions, the delivery audit log and the dispatch queue.

use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DeliveryId, DispatchJobId, OrganisationId, WebhookId};
use crate::error::{CoreError, Result};

type PgRow = sqlx::postgres::PgRow;

/// Domain event types a webhook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEventType {
    /// An individual opted in to a data agreement.
    #[serde(rename = "consent.allowed")]
    ConsentAllowed,
    /// An individual opted out of a data agreement.
    #[serde(rename = "consent.disallowed")]
    ConsentDisallowed,
    /// A data deletion request was raised.
    #[serde(rename = "data.delete.initiated")]
    DataDeleteInitiated,
    /// A data deletion request was withdrawn.
    #[serde(rename = "data.delete.cancelled")]
    DataDeleteCancelled,
    /// A data download request was raised.
    #[serde(rename = "data.download.initiated")]
    DataDownloadInitiated,
    /// A data download request was withdrawn.
    #[serde(rename = "data.download.cancelled")]
    DataDownloadCancelled,
    /// A data update request was raised.
    #[serde(rename = "data.update.initiated")]
    DataUpdateInitiated,
    /// A data update request was withdrawn.
    #[serde(rename = "data.update.cancelled")]
    DataUpdateCancelled,
    /// An individual subscribed to the organisation.
    #[serde(rename = "org.subscribed")]
    OrgSubscribed,
    /// An individual unsubscribed from the organisation.
    #[serde(rename = "org.unsubscribed")]
    OrgUnsubscribed,
}

impl WebhookEventType {
    /// Every supported event type.
    pub const ALL: [Self; 10] = [
        Self::ConsentAllowed,
        Self::ConsentDisallowed,
        Self::DataDeleteInitiated,
        Self::DataDeleteCancelled,
        Self::DataDownloadInitiated,
        Self::DataDownloadCancelled,
        Self::DataUpdateInitiated,
        Self::DataUpdateCancelled,
        Self::OrgSubscribed,
        Self::OrgUnsubscribed,
    ];

    /// Wire representation, e.g. `consent.allowed`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConsentAllowed => "consent.allowed",
            Self::ConsentDisallowed => "consent.disallowed",
            Self::DataDeleteInitiated => "data.delete.initiated",
            Self::DataDeleteCancelled => "data.delete.cancelled",
            Self::DataDownloadInitiated => "data.download.initiated",
            Self::DataDownloadCancelled => "data.download.cancelled",
            Self::DataUpdateInitiated => "data.update.initiated",
            Self::DataUpdateCancelled => "data.update.cancelled",
            Self::OrgSubscribed => "org.subscribed",
            Self::OrgUnsubscribed => "org.unsubscribed",
        }
    }

    /// Consent event matching an opt-in decision.
    pub const fn for_opt_in(opt_in: bool) -> Self {
        if opt_in {
            Self::ConsentAllowed
        } else {
            Self::ConsentDisallowed
        }
    }
}

impl fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown webhook event type: {s}")))
    }
}

text_enum_sqlx!(WebhookEventType);

/// Body encoding of outbound webhook requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookContentType {
    /// Raw JSON body.
    Json,
    /// Form body with the JSON under a `payload` key.
    Form,
}

impl WebhookContentType {
    /// Storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Form => "form",
        }
    }

    /// Value for the `Content-Type` request header.
    pub const fn mime(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Form => "application/x-www-form-urlencoded",
        }
    }
}

impl FromStr for WebhookContentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "form" => Ok(Self::Form),
            other => Err(CoreError::InvalidInput(format!("unknown content type: {other}"))),
        }
    }
}

text_enum_sqlx!(WebhookContentType);

/// An organisation's subscription to domain events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    /// Webhook identifier.
    pub id: WebhookId,
    /// Owning organisation.
    pub organisation_id: OrganisationId,
    /// Endpoint events are POSTed to.
    pub payload_url: String,
    /// Body encoding.
    pub content_type: WebhookContentType,
    /// Event types delivered to this endpoint.
    pub subscribed_events: Vec<WebhookEventType>,
    /// Disabled webhooks receive nothing.
    pub disabled: bool,
    /// HMAC key. Requests are unsigned when empty.
    pub secret_key: String,
    /// Accept invalid TLS certificates from the endpoint.
    pub skip_ssl_verification: bool,
    /// When the subscription was created.
    pub timestamp: DateTime<Utc>,
    /// Soft-delete flag.
    pub is_deleted: bool,
}

impl Webhook {
    /// Returns true if the webhook is neither deleted nor disabled.
    pub fn is_active(&self) -> bool {
        !self.is_deleted && !self.disabled
    }

    /// Returns true if the webhook subscribes to the given event type.
    pub fn is_subscribed(&self, event_type: WebhookEventType) -> bool {
        self.subscribed_events.contains(&event_type)
    }

    /// Returns true if outbound requests should carry a signature.
    pub fn has_secret(&self) -> bool {
        !self.secret_key.is_empty()
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for Webhook {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let raw_events: Vec<String> = row.try_get("subscribed_events")?;
        let subscribed_events = raw_events
            .iter()
            .map(|event| event.parse())
            .collect::<Result<Vec<WebhookEventType>>>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self {
            id: row.try_get("id")?,
            organisation_id: row.try_get("organisation_id")?,
            payload_url: row.try_get("payload_url")?,
            content_type: row.try_get("content_type")?,
            subscribed_events,
            disabled: row.try_get("disabled")?,
            secret_key: row.try_get("secret_key")?,
            skip_ssl_verification: row.try_get("skip_ssl_verification")?,
            timestamp: row.try_get("timestamp")?,
            is_deleted: row.try_get("is_deleted")?,
        })
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// The endpoint returned an HTTP response, whatever its status.
    Completed,
    /// No response was received.
    Failed,
}

impl DeliveryStatus {
    /// Storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::InvalidInput(format!("unknown delivery status: {other}"))),
        }
    }
}

text_enum_sqlx!(DeliveryStatus);

/// Immutable audit record of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDelivery {
    /// Delivery identifier, also stamped into the sent envelope.
    pub id: DeliveryId,
    /// Target webhook.
    pub webhook_id: WebhookId,
    /// Actor whose action triggered the event.
    pub user_id: String,
    /// Event type delivered.
    pub webhook_event_type: WebhookEventType,
    /// Headers sent with the request.
    pub request_headers: HashMap<String, String>,
    /// Body sent with the request.
    pub request_payload: String,
    /// Headers returned by the endpoint.
    pub response_headers: HashMap<String, String>,
    /// Body returned by the endpoint, truncated for storage.
    pub response_body: String,
    /// HTTP status code, absent when no response arrived.
    pub response_status_code: Option<u16>,
    /// Status line text such as `200 OK`.
    pub response_status_str: String,
    /// When the request was started.
    pub execution_start_timestamp: DateTime<Utc>,
    /// When the request finished or failed.
    pub execution_end_timestamp: DateTime<Utc>,
    /// Outcome of the attempt.
    pub status: DeliveryStatus,
    /// Human-readable outcome detail.
    pub status_description: String,
}

impl WebhookDelivery {
    /// Whether the delivery counts as successful.
    ///
    /// Only completed deliveries with a status of 200 to 208 or 226 count.
    pub fn is_successful(&self) -> bool {
        self.status == DeliveryStatus::Completed
            && matches!(self.response_status_code, Some(200..=208 | 226))
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for WebhookDelivery {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let request_headers: sqlx::types::Json<HashMap<String, String>> =
            row.try_get("request_headers")?;
        let response_headers: sqlx::types::Json<HashMap<String, String>> =
            row.try_get("response_headers")?;
        let response_status_code = row
            .try_get::<Option<i32>, _>("response_status_code")?
            .map(|code| {
                u16::try_from(code)
                    .map_err(|_| sqlx::Error::Decode("response_status_code out of range".into()))
            })
            .transpose()?;

        Ok(Self {
            id: row.try_get("id")?,
            webhook_id: row.try_get("webhook_id")?,
            user_id: row.try_get("user_id")?,
            webhook_event_type: row.try_get("webhook_event_type")?,
            request_headers: request_headers.0,
            request_payload: row.try_get("request_payload")?,
            response_headers: response_headers.0,
            response_body: row.try_get("response_body")?,
            response_status_code,
            response_status_str: row.try_get("response_status_str")?,
            execution_start_timestamp: row.try_get("execution_start_timestamp")?,
            execution_end_timestamp: row.try_get("execution_end_timestamp")?,
            status: row.try_get("status")?,
            status_description: row.try_get("status_description")?,
        })
    }
}

/// Lifecycle of a queued dispatch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    /// Waiting for a worker.
    Pending,
    /// Held by a worker.
    Claimed,
    /// Processed; a delivery record exists or the webhook was gone.
    Done,
}

impl DispatchStatus {
    /// Storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Done => "done",
        }
    }
}

impl FromStr for DispatchStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            "done" => Ok(Self::Done),
            other => Err(CoreError::InvalidInput(format!("unknown dispatch status: {other}"))),
        }
    }
}

text_enum_sqlx!(DispatchStatus);

/// One event queued for delivery to one webhook.
///
/// The envelope is stored as the exact JSON that will be signed and sent,
/// minus the delivery id which is assigned per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    /// Job identifier.
    pub id: DispatchJobId,
    /// Organisation owning the webhook.
    pub organisation_id: OrganisationId,
    /// Target webhook.
    pub webhook_id: WebhookId,
    /// Actor whose action triggered the event.
    pub user_id: String,
    /// Event type being delivered.
    pub event_type: WebhookEventType,
    /// Serialized event envelope.
    pub envelope: String,
    /// Queue state.
    pub status: DispatchStatus,
    /// When the job was queued.
    pub enqueued_at: DateTime<Utc>,
    /// When a worker last claimed the job.
    pub claimed_at: Option<DateTime<Utc>>,
}

impl DispatchJob {
    /// Creates a pending job.
    pub fn new(
        organisation_id: OrganisationId,
        webhook_id: WebhookId,
        user_id: impl Into<String>,
        event_type: WebhookEventType,
        envelope: impl Into<String>,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DispatchJobId::new(),
            organisation_id,
            webhook_id,
            user_id: user_id.into(),
            event_type,
            envelope: envelope.into(),
            status: DispatchStatus::Pending,
            enqueued_at,
            claimed_at: None,
        }
    }
}
