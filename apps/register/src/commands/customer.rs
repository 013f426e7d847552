//! # Customer Commands

use serde::Serialize;
use tracing::info;

use till_core::validation::{validate_customer_name, validate_phone};
use till_core::Customer;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDto {
    pub id: String,
    pub phone: String,
    pub name: String,
    pub contact: String,
    /// Hundredths of a point
    pub loyalty_points: i64,
}

impl From<&Customer> for CustomerDto {
    fn from(c: &Customer) -> Self {
        CustomerDto {
            id: c.id.clone(),
            phone: c.phone.clone(),
            name: c.name.clone(),
            contact: c.contact.clone(),
            loyalty_points: c.loyalty_points,
        }
    }
}

/// Lists customers, optionally filtered by id, name, phone or contact.
pub async fn list_customers(state: &AppState, query: Option<&str>) -> Result<Vec<CustomerDto>, ApiError> {
    state.session.with_session(|s| s.user().map(|_| ()))?;

    let repo = state.db.inner().customers();
    let customers = match query {
        Some(q) => repo.search(q).await?,
        None => repo.list_all().await?,
    };
    Ok(customers.iter().map(CustomerDto::from).collect())
}

/// Creates a customer or updates the name and contact of an existing one.
pub async fn save_customer(
    state: &AppState,
    phone: &str,
    name: &str,
    contact: &str,
) -> Result<CustomerDto, ApiError> {
    let username = state
        .session
        .with_session(|s| s.user().map(|u| u.username.clone()))?;
    validate_phone(phone)?;
    validate_customer_name(name)?;

    let customer = state
        .db
        .inner()
        .customers()
        .create_or_update(phone, name, contact)
        .await?;

    info!(phone = %customer.phone, by = %username, "Customer saved");
    Ok(CustomerDto::from(&customer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::logged_in;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_save_then_search() {
        let state = logged_in("cashier1").await;

        save_customer(&state, "5550001", "Ayesha Khan", "ayesha@example.com")
            .await
            .unwrap();
        save_customer(&state, "5550002", "Bilal", "5550002").await.unwrap();
        let updated = save_customer(&state, "5550002", "Bilal Ahmed", "bilal@example.com")
            .await
            .unwrap();
        assert_eq!(updated.name, "Bilal Ahmed");

        let all = list_customers(&state, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let found = list_customers(&state, Some("AHMED")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].phone, "5550002");
    }

    #[tokio::test]
    async fn test_save_validates_input() {
        let state = logged_in("cashier1").await;

        let err = save_customer(&state, "12ab", "Someone", "").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err = save_customer(&state, "5550003", "  ", "").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}
