//! Repository for `UserStorageProfile` rows.

use chrono::{DateTime, Utc};
use revaer_jobs_core::{ProviderType, StorageCredentials, UserStorageProfile};
use sqlx::{FromRow, PgPool, Row};

use crate::error::{DataError, Result, query_failed};

fn provider_type_to_str(provider: ProviderType) -> &'static str {
    match provider {
        ProviderType::GoogleDrive => "google_drive",
        ProviderType::S3 => "s3",
    }
}

fn provider_type_from_str(label: &str) -> Result<ProviderType> {
    Ok(match label {
        "google_drive" => ProviderType::GoogleDrive,
        "s3" => ProviderType::S3,
        other => {
            return Err(DataError::QueryFailed {
                operation: "decode provider_type",
                source: sqlx::Error::Decode(format!("unknown provider type '{other}'").into()),
            });
        }
    })
}

#[derive(Debug, Clone, FromRow)]
struct StorageProfileRow {
    id: i64,
    user_id: i64,
    provider_type: String,
    is_active: bool,
    needs_reauth: bool,
    gdrive_client_id: Option<String>,
    gdrive_client_secret: Option<String>,
    gdrive_refresh_token: Option<String>,
    gdrive_access_token: Option<String>,
    gdrive_expires_at: Option<DateTime<Utc>>,
    s3_access_key_id: Option<String>,
    s3_secret_access_key: Option<String>,
    s3_endpoint: Option<String>,
    s3_bucket: Option<String>,
}

impl TryFrom<StorageProfileRow> for UserStorageProfile {
    type Error = DataError;

    fn try_from(row: StorageProfileRow) -> Result<Self> {
        let provider_type = provider_type_from_str(&row.provider_type)?;
        let credentials = match provider_type {
            ProviderType::GoogleDrive => StorageCredentials::GoogleDrive {
                client_id: row.gdrive_client_id.ok_or(DataError::QueryFailed {
                    operation: "decode google_drive credentials",
                    source: sqlx::Error::Decode("missing gdrive_client_id".into()),
                })?,
                client_secret: row.gdrive_client_secret.ok_or(DataError::QueryFailed {
                    operation: "decode google_drive credentials",
                    source: sqlx::Error::Decode("missing gdrive_client_secret".into()),
                })?,
                refresh_token: row.gdrive_refresh_token.ok_or(DataError::QueryFailed {
                    operation: "decode google_drive credentials",
                    source: sqlx::Error::Decode("missing gdrive_refresh_token".into()),
                })?,
                access_token: row.gdrive_access_token,
                expires_at: row.gdrive_expires_at,
            },
            ProviderType::S3 => StorageCredentials::S3 {
                access_key_id: row.s3_access_key_id.ok_or(DataError::QueryFailed {
                    operation: "decode s3 credentials",
                    source: sqlx::Error::Decode("missing s3_access_key_id".into()),
                })?,
                secret_access_key: row.s3_secret_access_key.ok_or(DataError::QueryFailed {
                    operation: "decode s3 credentials",
                    source: sqlx::Error::Decode("missing s3_secret_access_key".into()),
                })?,
                endpoint: row.s3_endpoint.ok_or(DataError::QueryFailed {
                    operation: "decode s3 credentials",
                    source: sqlx::Error::Decode("missing s3_endpoint".into()),
                })?,
                bucket: row.s3_bucket.ok_or(DataError::QueryFailed {
                    operation: "decode s3 credentials",
                    source: sqlx::Error::Decode("missing s3_bucket".into()),
                })?,
            },
        };
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            provider_type,
            credentials,
            is_active: row.is_active,
            needs_reauth: row.needs_reauth,
        })
    }
}

/// Repository for `UserStorageProfile` rows.
pub struct StorageProfilesRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StorageProfilesRepository<'a> {
    pub(crate) const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a single profile by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn fetch(&self, profile_id: i64) -> Result<Option<UserStorageProfile>> {
        let row = sqlx::query_as::<_, StorageProfileRow>(
            "SELECT * FROM revaer_jobs.user_storage_profiles WHERE id = $1",
        )
        .bind(profile_id)
        .fetch_optional(self.pool)
        .await
        .map_err(query_failed("fetch storage profile"))?;
        row.map(UserStorageProfile::try_from).transpose()
    }

    /// Refresh a Google Drive profile's cached access token after an OAuth refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_gdrive_access_token(
        &self,
        profile_id: i64,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE revaer_jobs.user_storage_profiles
            SET gdrive_access_token = $2, gdrive_expires_at = $3
            WHERE id = $1
            ",
        )
        .bind(profile_id)
        .bind(access_token)
        .bind(expires_at)
        .execute(self.pool)
        .await
        .map_err(query_failed("update gdrive access token"))?;
        Ok(())
    }

    /// Flag a profile as needing re-authentication, e.g. after an authorization error surfaces
    /// from an upload executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_needs_reauth(&self, profile_id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE revaer_jobs.user_storage_profiles SET needs_reauth = true WHERE id = $1",
        )
        .bind(profile_id)
        .execute(self.pool)
        .await
        .map_err(query_failed("mark needs_reauth"))?;
        if result.rows_affected() == 0 {
            return Err(DataError::NotFound {
                entity: "storage_profile",
                id: profile_id,
            });
        }
        Ok(())
    }

    /// Fetch the raw provider label for a profile, without decoding full credentials. Used by
    /// callers that only need to route by provider (e.g. choosing which upload executor owns a
    /// job) without touching secrets.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the label is not recognized.
    pub async fn provider_for(&self, profile_id: i64) -> Result<Option<ProviderType>> {
        let row = sqlx::query(
            "SELECT provider_type FROM revaer_jobs.user_storage_profiles WHERE id = $1",
        )
        .bind(profile_id)
        .fetch_optional(self.pool)
        .await
        .map_err(query_failed("fetch provider_type"))?;
        row.map(|row| {
            provider_type_from_str(
                row.try_get::<String, _>("provider_type")
                    .map_err(query_failed("decode provider_type"))?
                    .as_str(),
            )
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_type_round_trips_through_strings() {
        for provider in [ProviderType::GoogleDrive, ProviderType::S3] {
            let label = provider_type_to_str(provider);
            assert_eq!(provider_type_from_str(label).unwrap(), provider);
        }
    }

    #[test]
    fn unknown_provider_label_errors() {
        assert!(provider_type_from_str("dropbox").is_err());
    }
}
