//! # Customer Repository
//!
//! Loyalty customers, keyed by phone number.
//!
//! A customer row is created the first time a phone number is given at the
//! register (`attach_or_create`), with name "Unknown" and the phone as the
//! contact. Points are stored in hundredths and never go below zero.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use till_core::{Customer, LoyaltyPoints};

const CUSTOMER_COLUMNS: &str = "id, phone, name, contact, loyalty_points, created_at, updated_at";

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get_by_phone(&self, phone: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE phone = ?1");
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(phone.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    /// All customers, ordered by phone.
    pub async fn list_all(&self) -> DbResult<Vec<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY phone");
        let customers = sqlx::query_as::<_, Customer>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(customers)
    }

    /// Customers whose id, name, phone or contact contains `query`.
    ///
    /// Matching is the same case-insensitive rule as [`Customer::matches`].
    pub async fn search(&self, query: &str) -> DbResult<Vec<Customer>> {
        let customers = self.list_all().await?;
        Ok(customers.into_iter().filter(|c| c.matches(query)).collect())
    }

    /// Returns the customer for `phone`, creating a first-seen record if
    /// there is none.
    pub async fn attach_or_create(&self, phone: &str) -> DbResult<Customer> {
        if let Some(existing) = self.get_by_phone(phone).await? {
            return Ok(existing);
        }

        let customer = Customer::first_seen(phone.trim());
        self.insert(&customer).await?;
        info!(phone = %customer.phone, id = %customer.id, "Created customer on first visit");
        Ok(customer)
    }

    /// Creates the customer, or updates name and contact of an existing one.
    pub async fn create_or_update(&self, phone: &str, name: &str, contact: &str) -> DbResult<Customer> {
        match self.get_by_phone(phone).await? {
            Some(mut existing) => {
                let now = Utc::now();
                sqlx::query(
                    "UPDATE customers SET name = ?2, contact = ?3, updated_at = ?4 WHERE phone = ?1",
                )
                .bind(&existing.phone)
                .bind(name.trim())
                .bind(contact.trim())
                .bind(now)
                .execute(&self.pool)
                .await?;

                existing.name = name.trim().to_string();
                existing.contact = contact.trim().to_string();
                existing.updated_at = now;
                Ok(existing)
            }
            None => {
                let customer = Customer::new(phone.trim(), name.trim(), contact.trim());
                self.insert(&customer).await?;
                Ok(customer)
            }
        }
    }

    /// Inserts a fully formed customer, e.g. one read from a legacy file.
    ///
    /// An existing phone keeps its id but takes the given name, contact and
    /// points.
    pub async fn import(&self, customer: &Customer) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, phone, name, contact, loyalty_points, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (phone) DO UPDATE SET
                name = excluded.name,
                contact = excluded.contact,
                loyalty_points = excluded.loyalty_points,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.phone)
        .bind(&customer.name)
        .bind(&customer.contact)
        .bind(customer.loyalty_points.max(0))
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(phone = %customer.phone, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, phone, name, contact, loyalty_points, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.phone)
        .bind(&customer.name)
        .bind(&customer.contact)
        .bind(customer.loyalty_points)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &customer.phone),
            other => other,
        })?;

        Ok(())
    }

    /// Adds points. Returns the new balance.
    pub async fn add_points(&self, phone: &str, points: LoyaltyPoints) -> DbResult<LoyaltyPoints> {
        self.adjust_points(phone, points.hundredths()).await
    }

    /// Removes points, clamping the balance at zero. Returns the new balance.
    pub async fn redeem_points(&self, phone: &str, points: LoyaltyPoints) -> DbResult<LoyaltyPoints> {
        self.adjust_points(phone, -points.hundredths()).await
    }

    async fn adjust_points(&self, phone: &str, delta: i64) -> DbResult<LoyaltyPoints> {
        debug!(phone = %phone, delta = %delta, "Adjusting loyalty points");

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE customers
            SET loyalty_points = MAX(loyalty_points + ?2, 0), updated_at = ?3
            WHERE phone = ?1
            RETURNING loyalty_points
            "#,
        )
        .bind(phone.trim())
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        balance
            .map(LoyaltyPoints::from_hundredths)
            .ok_or_else(|| DbError::not_found("Customer", phone.trim()))
    }

    /// Deletes a customer. Past sales keep their phone snapshot.
    pub async fn delete(&self, phone: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM customers WHERE phone = ?1")
            .bind(phone.trim())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", phone.trim()));
        }

        info!(phone = %phone.trim(), "Deleted customer");
        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn repo() -> CustomerRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().customers()
    }

    #[tokio::test]
    async fn test_attach_or_create_is_stable() {
        let repo = repo().await;

        let first = repo.attach_or_create("03001234567").await.unwrap();
        assert_eq!(first.name, "Unknown");
        assert_eq!(first.contact, "03001234567");
        assert_eq!(first.loyalty_points, 0);

        let again = repo.attach_or_create("03001234567").await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(repo.count().await.unwrap(), 1);

        assert_eq!(repo.get_by_id(&first.id).await.unwrap().unwrap().phone, "03001234567");
    }

    #[tokio::test]
    async fn test_create_or_update() {
        let repo = repo().await;
        let created = repo.create_or_update("0300", "Ayesha", "ayesha@example.com").await.unwrap();
        let updated = repo.create_or_update("0300", "Ayesha K", "0300").await.unwrap();

        assert_eq!(updated.id, created.id);
        let stored = repo.get_by_phone("0300").await.unwrap().unwrap();
        assert_eq!(stored.name, "Ayesha K");
        assert_eq!(stored.contact, "0300");
    }

    #[tokio::test]
    async fn test_points_clamp_at_zero() {
        let repo = repo().await;
        repo.attach_or_create("0311").await.unwrap();

        let balance = repo.add_points("0311", LoyaltyPoints::from_points(3)).await.unwrap();
        assert_eq!(balance.hundredths(), 300);

        let balance = repo.redeem_points("0311", LoyaltyPoints::from_points(5)).await.unwrap();
        assert_eq!(balance, LoyaltyPoints::zero());

        assert!(matches!(
            repo.add_points("0999", LoyaltyPoints::from_points(1)).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_and_delete() {
        let repo = repo().await;
        repo.create_or_update("0300", "Ayesha", "ayesha@example.com").await.unwrap();
        repo.create_or_update("0322", "Bilal", "0322").await.unwrap();

        assert_eq!(repo.search("AYE").await.unwrap().len(), 1);
        assert_eq!(repo.search("03").await.unwrap().len(), 2);

        repo.delete("0300").await.unwrap();
        assert!(repo.get_by_phone("0300").await.unwrap().is_none());
        assert!(repo.delete("0300").await.is_err());
    }
}
