//! Strongly-typed identifiers.
//!
//! Every identifier wraps a UUID so that a webhook id can never be passed
//! where a revision id is expected. All of them encode as Postgres `UUID`
//! and serialize as the bare UUID string.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult = Result<sqlx::encode::IsNull, sqlx::error::BoxDynError>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The all-zero identifier.
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Returns true for the all-zero identifier.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl sqlx::Type<PgDb> for $name {
            fn type_info() -> PgTypeInfo {
                <Uuid as sqlx::Type<PgDb>>::type_info()
            }
        }

        impl sqlx::postgres::PgHasArrayType for $name {
            fn array_type_info() -> PgTypeInfo {
                <Uuid as sqlx::postgres::PgHasArrayType>::array_type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, PgDb> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                <Uuid as sqlx::Decode<PgDb>>::decode(value).map(Self)
            }
        }

        impl sqlx::Encode<'_, PgDb> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
                <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

uuid_id!(
    /// Identifier of one revision in a hash chain.
    ///
    /// Draft revisions carry the nil id and are never persisted.
    RevisionId
);

uuid_id!(
    /// Identifier of a signature attestation.
    SignatureId
);

uuid_id!(
    /// Identifier of a webhook subscription.
    WebhookId
);

uuid_id!(
    /// Identifier of one recorded webhook delivery.
    DeliveryId
);

uuid_id!(
    /// Identifier of a queued dispatch job.
    DispatchJobId
);

uuid_id!(
    /// Identifier of an organisation.
    OrganisationId
);

uuid_id!(
    /// Identifier of an individual (data subject or operator).
    IndividualId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_uuid() {
        let id = WebhookId(Uuid::parse_str("5f0a3f0e-8a55-4c2d-9a57-0c61e1d7e0a1").unwrap());
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""5f0a3f0e-8a55-4c2d-9a57-0c61e1d7e0a1""#);
    }

    #[test]
    fn nil_is_distinct_from_new() {
        assert!(RevisionId::nil().is_nil());
        assert!(!RevisionId::new().is_nil());
    }

    #[test]
    fn parses_from_string() {
        let id = DeliveryId::new();
        assert_eq!(id.to_string().parse::<DeliveryId>().unwrap(), id);
        assert!("not-a-uuid".parse::<DeliveryId>().is_err());
    }
}
