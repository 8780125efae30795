//! Database primitives: connection settings, pool wiring, and the single-row
//! employee store operations. Every mutation runs inside its own transaction
//! which commits on success and rolls back on any failure path.

use entity::employees;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, DbErr, EntityTrait,
    QueryOrder, TransactionTrait,
};
use serde::Deserialize;
use thiserror::Error;

/// Shared SQLite pool alias.
pub type DbPool = DatabaseConnection;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing")]
    MissingUrl,
    #[error(transparent)]
    Db(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment-driven connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
}

impl DatabaseSettings {
    /// Reads `DATABASE_URL`, falling back to a file-backed database in the
    /// working directory.
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://emp.db?mode=rwc".to_string());
        Self { url }
    }
}

pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    if settings.url.is_empty() {
        return Err(DbError::MissingUrl);
    }
    Database::connect(settings.url.as_str())
        .await
        .map_err(Into::into)
}

/// The four mutable employee columns, validated upstream at the HTTP
/// boundary. The store assigns `id` on insert.
#[derive(Clone, Debug)]
pub struct NewEmployee {
    pub firstname: String,
    pub lastname: String,
    pub gender: String,
    pub salary: Option<f64>,
}

/// All stored employees, ordered by id.
pub async fn list_employees(pool: &DbPool) -> DbResult<Vec<employees::Model>> {
    employees::Entity::find()
        .order_by_asc(employees::Column::Id)
        .all(pool)
        .await
        .map_err(Into::into)
}

/// Persists a new record and returns it with its store-assigned id.
pub async fn insert_employee(pool: &DbPool, record: NewEmployee) -> DbResult<employees::Model> {
    let txn = pool.begin().await?;
    let created = employees::ActiveModel {
        firstname: Set(record.firstname),
        lastname: Set(record.lastname),
        gender: Set(record.gender),
        salary: Set(record.salary),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;
    Ok(created)
}

/// Overwrites all four mutable columns of the row with the given id.
/// Returns `None` without writing anything when the row does not exist.
pub async fn update_employee(
    pool: &DbPool,
    id: i32,
    record: NewEmployee,
) -> DbResult<Option<employees::Model>> {
    let txn = pool.begin().await?;
    let Some(existing) = employees::Entity::find_by_id(id).one(&txn).await? else {
        txn.rollback().await?;
        return Ok(None);
    };
    let mut active: employees::ActiveModel = existing.into();
    active.firstname = Set(record.firstname);
    active.lastname = Set(record.lastname);
    active.gender = Set(record.gender);
    active.salary = Set(record.salary);
    let updated = active.update(&txn).await?;
    txn.commit().await?;
    Ok(Some(updated))
}

/// Removes the row with the given id. Returns `false` when no such row
/// exists, leaving the store untouched.
pub async fn delete_employee(pool: &DbPool, id: i32) -> DbResult<bool> {
    let txn = pool.begin().await?;
    if employees::Entity::find_by_id(id).one(&txn).await?.is_none() {
        txn.rollback().await?;
        return Ok(false);
    }
    employees::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};

    async fn setup_pool() -> DbPool {
        let pool = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&pool, None).await.unwrap();
        pool
    }

    fn ada() -> NewEmployee {
        NewEmployee {
            firstname: "Ada".into(),
            lastname: "Lovelace".into(),
            gender: "F".into(),
            salary: Some(1000.0),
        }
    }

    #[tokio::test]
    async fn insert_assigns_fresh_id_and_list_round_trips() {
        let pool = setup_pool().await;
        let created = insert_employee(&pool, ada()).await.unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.firstname, "Ada");
        assert_eq!(created.salary, Some(1000.0));

        let all = list_employees(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], created);
    }

    #[tokio::test]
    async fn list_on_empty_store_is_empty() {
        let pool = setup_pool().await;
        assert!(list_employees(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_overwrites_every_mutable_column() {
        let pool = setup_pool().await;
        let created = insert_employee(&pool, ada()).await.unwrap();

        let replacement = NewEmployee {
            firstname: "Ada2".into(),
            lastname: "L2".into(),
            gender: "F".into(),
            salary: Some(2000.0),
        };
        let updated = update_employee(&pool, created.id, replacement)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.firstname, "Ada2");
        assert_eq!(updated.lastname, "L2");
        assert_eq!(updated.salary, Some(2000.0));
    }

    #[tokio::test]
    async fn update_missing_id_leaves_store_unchanged() {
        let pool = setup_pool().await;
        insert_employee(&pool, ada()).await.unwrap();

        let outcome = update_employee(&pool, 9999, ada()).await.unwrap();
        assert!(outcome.is_none());
        let all = list_employees(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].firstname, "Ada");
    }

    #[tokio::test]
    async fn delete_removes_row_and_reports_missing_ids() {
        let pool = setup_pool().await;
        let created = insert_employee(&pool, ada()).await.unwrap();

        assert!(delete_employee(&pool, created.id).await.unwrap());
        assert!(list_employees(&pool).await.unwrap().is_empty());
        assert!(!delete_employee(&pool, created.id).await.unwrap());
    }

    #[tokio::test]
    async fn salary_is_nullable() {
        let pool = setup_pool().await;
        let created = insert_employee(
            &pool,
            NewEmployee {
                salary: None,
                ..ada()
            },
        )
        .await
        .unwrap();
        assert_eq!(created.salary, None);
    }
}
