use crate::database::entities::{ApiKeyRecord, api_keys};
use crate::database::{DatabaseError, DatabaseResult};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::Expr,
};
use uuid::Uuid;

/// API Keys DAO for database operations
#[derive(Clone)]
pub struct ApiKeysDao {
    db: DatabaseConnection,
}

impl ApiKeysDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Store a new API key
    pub async fn store(&self, api_key: &ApiKeyRecord) -> DatabaseResult<Uuid> {
        let active_model = api_keys::ActiveModel {
            id: Set(api_key.id),
            customer_id: Set(api_key.customer_id),
            name: Set(api_key.name.clone()),
            key_hash: Set(api_key.key_hash.clone()),
            key_prefix: Set(api_key.key_prefix.clone()),
            created_at: Set(api_key.created_at),
            last_used_at: Set(api_key.last_used_at),
            revoked_at: Set(api_key.revoked_at),
        };

        let result = active_model.insert(&self.db).await.map_err(DatabaseError::from)?;

        Ok(result.id)
    }

    pub async fn find_by_id(&self, key_id: Uuid) -> DatabaseResult<Option<ApiKeyRecord>> {
        let key = api_keys::Entity::find_by_id(key_id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(key)
    }

    /// Usable keys sharing a display prefix
    pub async fn find_active_by_prefix(&self, key_prefix: &str) -> DatabaseResult<Vec<ApiKeyRecord>> {
        let keys = api_keys::Entity::find()
            .filter(api_keys::Column::KeyPrefix.eq(key_prefix))
            .filter(api_keys::Column::RevokedAt.is_null())
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(keys)
    }

    /// Revoked keys sharing a display prefix
    pub async fn find_revoked_by_prefix(
        &self,
        key_prefix: &str,
    ) -> DatabaseResult<Vec<ApiKeyRecord>> {
        let keys = api_keys::Entity::find()
            .filter(api_keys::Column::KeyPrefix.eq(key_prefix))
            .filter(api_keys::Column::RevokedAt.is_not_null())
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(keys)
    }

    /// All keys of a customer, revoked ones included, newest first
    pub async fn find_by_customer(&self, customer_id: Uuid) -> DatabaseResult<Vec<ApiKeyRecord>> {
        let keys = api_keys::Entity::find()
            .filter(api_keys::Column::CustomerId.eq(customer_id))
            .order_by_desc(api_keys::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(keys)
    }

    pub async fn touch_last_used(&self, key_id: Uuid) -> DatabaseResult<()> {
        api_keys::Entity::update_many()
            .col_expr(api_keys::Column::LastUsedAt, Expr::value(Utc::now()))
            .filter(api_keys::Column::Id.eq(key_id))
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }

    /// Revoke an API key. The first revocation time is kept if called again.
    pub async fn revoke(&self, key_id: Uuid) -> DatabaseResult<ApiKeyRecord> {
        api_keys::Entity::update_many()
            .col_expr(api_keys::Column::RevokedAt, Expr::value(Utc::now()))
            .filter(api_keys::Column::Id.eq(key_id))
            .filter(api_keys::Column::RevokedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        self.find_by_id(key_id).await?.ok_or(DatabaseError::NotFound)
    }
}
