//! SQLite key-value store on Sea-ORM

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use sea_orm_migration::MigratorTrait;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::entities::kv_entries;
use crate::error::StoreError;
use crate::kv_store::KeyValueStore;

/// Key-value store persisted in a SQLite file
#[derive(Clone)]
pub struct SqliteKvStore {
    db: DatabaseConnection,
}

impl SqliteKvStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub async fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        let db_path_str = db_path
            .to_str()
            .ok_or_else(|| StoreError::InvalidPath(db_path.display().to_string()))?
            .replace("\\", "/");

        let db_url = format!("sqlite:{}?mode=rwc", db_path_str);
        let db = Database::connect(db_url.as_str()).await?;

        crate::migration::Migrator::up(&db, None).await?;

        info!("Chat store initialized at {}", db_path.display());

        Ok(Self { db })
    }

    /// Remove every entry
    pub async fn clear_all(&self) -> Result<u64, StoreError> {
        info!("Clearing all chat store entries");

        let result = kv_entries::Entity::delete_many().exec(&self.db).await?;

        Ok(result.rows_affected)
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        debug!("Getting entry: {}", key);

        let result = kv_entries::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?;

        Ok(result.map(|model| model.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        debug!("Setting entry: {}", key);

        let now = chrono::Utc::now().timestamp_millis();

        let existing = kv_entries::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?;

        if let Some(model) = existing {
            let mut active_model: kv_entries::ActiveModel = model.into();
            active_model.value = Set(value.to_string());
            active_model.updated_at = Set(now);
            active_model.update(&self.db).await?;
        } else {
            let new_entry = kv_entries::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value.to_string()),
                updated_at: Set(now),
            };
            // Some SQLite builds cannot read the row back after insert
            match new_entry.insert(&self.db).await {
                Ok(_) => {}
                Err(DbErr::RecordNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        debug!("Deleting entry: {}", key);

        let result = kv_entries::Entity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = kv_entries::Entity::find()
            .filter(kv_entries::Column::Key.starts_with(prefix))
            .order_by_asc(kv_entries::Column::Key)
            .all(&self.db)
            .await?;

        // LIKE treats '_' as a wildcard, so re-check the literal prefix
        Ok(entries
            .into_iter()
            .map(|e| e.key)
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}
