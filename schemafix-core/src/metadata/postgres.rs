use std::collections::{BTreeSet, HashMap};

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use super::{MetadataError, MetadataStore};
use crate::config::MetadataStoreConfig;
use crate::naming::DatasetId;

const MAX_CONNECTIONS: u32 = 2;

/// PostgreSQL-backed metadata store.
///
/// The pool connects lazily, so an unreachable database is reported by the
/// first query rather than at construction.
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Must be called from within a tokio runtime.
    pub fn new(config: &MetadataStoreConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .application_name("schemafix");
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(config.connect_timeout())
            .connect_lazy_with(options);
        Self { pool }
    }
}

fn map_sqlx_error(e: sqlx::Error) -> MetadataError {
    match e {
        sqlx::Error::PoolTimedOut => {
            MetadataError::Connectivity("timed out waiting for a database connection".into())
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
            MetadataError::Connectivity(e.to_string())
        }
        other => MetadataError::Query(other.to_string()),
    }
}

impl MetadataStore for PgMetadataStore {
    async fn list_dataset_ids(&self) -> Result<BTreeSet<DatasetId>, MetadataError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id::text FROM datasets")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(ids.iter().map(|id| DatasetId::new(id)).collect())
    }

    async fn dataset_names(
        &self,
        ids: &[DatasetId],
    ) -> Result<HashMap<DatasetId, String>, MetadataError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id::text, name FROM datasets WHERE id::text = ANY($1)")
                .bind(&keys)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| (DatasetId::new(&id), name))
            .collect())
    }

    async fn segment_count(&self, id: &DatasetId) -> Result<u64, MetadataError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_segments WHERE dataset_id::text = $1")
                .bind(id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
