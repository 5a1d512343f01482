//! Repository for signature attestations.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Signature, SignatureId},
};

/// Repository for signature database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Stores a new signature, signed or blank.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails.
    pub async fn insert(&self, signature: &Signature) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO signatures (
                id, payload, signature, verification_method,
                verification_payload, verification_payload_hash,
                verification_artifact, verification_signed_by,
                verification_signed_as, verification_jws_header,
                timestamp, signed_without_object_reference,
                object_type, object_reference
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(signature.id)
        .bind(&signature.payload)
        .bind(&signature.signature)
        .bind(&signature.verification_method)
        .bind(&signature.verification_payload)
        .bind(&signature.verification_payload_hash)
        .bind(&signature.verification_artifact)
        .bind(&signature.verification_signed_by)
        .bind(&signature.verification_signed_as)
        .bind(&signature.verification_jws_header)
        .bind(signature.timestamp)
        .bind(signature.signed_without_object_reference)
        .bind(&signature.object_type)
        .bind(&signature.object_reference)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds a signature by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, id: SignatureId) -> Result<Option<Signature>> {
        let signature = sqlx::query_as::<_, Signature>(
            r"
            SELECT id, payload, signature, verification_method,
                   verification_payload, verification_payload_hash,
                   verification_artifact, verification_signed_by,
                   verification_signed_as, verification_jws_header,
                   timestamp, signed_without_object_reference,
                   object_type, object_reference
            FROM signatures
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(signature)
    }

    /// Writes the final signature fields of a blank signature.
    ///
    /// Returns `false` without writing when the row is missing or was
    /// already signed. The bound payload and hash are never changed.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn complete(&self, signature: &Signature) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE signatures
            SET payload = $2,
                signature = $3,
                verification_method = $4,
                verification_artifact = $5,
                verification_signed_by = $6,
                verification_signed_as = $7,
                verification_jws_header = $8,
                timestamp = $9
            WHERE id = $1 AND signature = ''
            ",
        )
        .bind(signature.id)
        .bind(&signature.payload)
        .bind(&signature.signature)
        .bind(&signature.verification_method)
        .bind(&signature.verification_artifact)
        .bind(&signature.verification_signed_by)
        .bind(&signature.verification_signed_as)
        .bind(&signature.verification_jws_header)
        .bind(signature.timestamp)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
