//! Core domain models and strongly-typed identifiers.
//!
//! Covers the versioned entities, their revisions, signatures, webhook
//! subscriptions and the delivery audit log, together with the Postgres
//! encodings used by the storage layer.

/// Implements Postgres `TEXT` encoding for an enum with `as_str` and a
/// `FromStr` impl.
macro_rules! text_enum_sqlx {
    ($name:ident) => {
        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <&str as sqlx::Type<sqlx::Postgres>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(s.parse()?)
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

pub mod entities;
pub mod ids;
pub mod revision;
pub mod signature;
pub mod webhook;

pub use entities::{
    ConsentRecord, ConsentState, DataAgreement, DataAttribute, LawfulBasis, Lifecycle, Policy,
};
pub use ids::{
    DeliveryId, DispatchJobId, IndividualId, OrganisationId, RevisionId, SignatureId, WebhookId,
};
pub use revision::{Actor, Revision, RevisionSnapshot, SchemaName, Versioned};
pub use signature::{Signature, SignatureMaterial};
pub use webhook::{
    DeliveryStatus, DispatchJob, DispatchStatus, Webhook, WebhookContentType, WebhookDelivery,
    WebhookEventType,
};
