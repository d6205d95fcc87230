use crate::database::entities::{CustomerRecord, customers};
use crate::database::{DatabaseError, DatabaseResult};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

/// Customers DAO for database operations
#[derive(Clone)]
pub struct CustomersDao {
    db: DatabaseConnection,
}

impl CustomersDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a customer. A duplicate email is a `Constraint` error.
    pub async fn create(&self, email: &str, plan: &str) -> DatabaseResult<CustomerRecord> {
        let customer = CustomerRecord::new(email.to_string(), plan.to_string());
        let active_model = customers::ActiveModel {
            id: Set(customer.id),
            email: Set(customer.email.clone()),
            plan: Set(customer.plan.clone()),
            created_at: Set(customer.created_at),
        };

        active_model.insert(&self.db).await.map_err(DatabaseError::from)
    }

    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<CustomerRecord>> {
        let customer = customers::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(customer)
    }

    pub async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<CustomerRecord>> {
        let customer = customers::Entity::find()
            .filter(customers::Column::Email.eq(email))
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(customer)
    }

    /// Delete a customer; keys, events and rollups go with it through cascading FKs
    pub async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        let result = customers::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }
}
