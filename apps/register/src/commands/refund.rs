//! # Refund Commands
//!
//! Full and partial refunds of completed sales. Admin and Manager only.
//!
//! ## Refund Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  refund <sale-id>            refund-lines <sale-id> 1 3                 │
//! │         │                              │                                │
//! │         ▼                              ▼                                │
//! │  authorize(Refund) ──► load Sale from SQLite                            │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  plan_full / plan_partial   (AlreadyRefunded, NothingToRefund)          │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  SaleRepository::apply_refund   (one SQL transaction: sale, lines,      │
//! │         │                        stock credit, refund_log row)          │
//! │         ▼                                                               │
//! │  RefundPlan::release_into(in-memory inventory)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A second refund of the same sale fails with `CONFLICT` and moves no
//! stock. Loyalty points earned on the sale are kept.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use till_core::refund::{plan_full, plan_partial};
use till_core::{CoreError, Permission, RefundKind, RefundLogEntry, RefundPlan, Role, Sale, User};

use crate::error::ApiError;
use crate::state::AppState;

/// Refund log rows listed when no limit is given.
pub const DEFAULT_REFUND_LIST_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundLogDto {
    pub id: String,
    pub sale_id: String,
    pub kind: RefundKind,
    pub processed_by: String,
    pub role: Role,
    pub amount_cents: i64,
    pub items: String,
    pub created_at: DateTime<Utc>,
}

impl From<&RefundLogEntry> for RefundLogDto {
    fn from(e: &RefundLogEntry) -> Self {
        RefundLogDto {
            id: e.id.clone(),
            sale_id: e.sale_id.clone(),
            kind: e.kind,
            processed_by: e.processed_by.clone(),
            role: e.role,
            amount_cents: e.amount_cents,
            items: e.items.clone(),
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub entry: RefundLogDto,
    /// Whether the sale has no active lines left.
    pub sale_refunded: bool,
    pub remaining_total_cents: i64,
}

/// Refunds every remaining line of a sale.
pub async fn refund_sale(state: &AppState, sale_id: &str) -> Result<RefundResponse, ApiError> {
    let user = authorize_refund(state)?;
    let sale = load_sale(state, sale_id).await?;

    let plan = plan_full(&sale, Utc::now())?;
    apply(state, &plan, &user).await
}

/// Refunds the given 1-based line numbers of a sale.
///
/// Unknown or already refunded numbers are skipped; if none remain the
/// request fails with nothing changed.
pub async fn refund_lines(state: &AppState, sale_id: &str, line_nos: &[i64]) -> Result<RefundResponse, ApiError> {
    let user = authorize_refund(state)?;
    let sale = load_sale(state, sale_id).await?;

    let plan = plan_partial(&sale, line_nos, &state.config.promotions, Utc::now())?;
    apply(state, &plan, &user).await
}

/// Refund log, newest first, or every entry for one sale.
pub async fn list_refunds(
    state: &AppState,
    sale_id: Option<&str>,
    limit: Option<u32>,
) -> Result<Vec<RefundLogDto>, ApiError> {
    state.session.with_session(|s| s.user().map(|_| ()))?;

    let repo = state.db.inner().refund_log();
    let entries = match sale_id {
        Some(id) => repo.for_sale(id.trim()).await?,
        None => repo.list_recent(limit.unwrap_or(DEFAULT_REFUND_LIST_LIMIT)).await?,
    };
    Ok(entries.iter().map(RefundLogDto::from).collect())
}

fn authorize_refund(state: &AppState) -> Result<User, ApiError> {
    let user = state
        .session
        .with_session(|s| s.authorize(Permission::Refund).cloned());

    if let Err(CoreError::PermissionDenied { username, .. }) = &user {
        warn!(target: "audit", event = "refund_denied", username = %username);
    }
    Ok(user?)
}

async fn load_sale(state: &AppState, sale_id: &str) -> Result<Sale, ApiError> {
    let sale_id = sale_id.trim();
    state
        .db
        .inner()
        .sales()
        .get_sale(sale_id)
        .await?
        .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()).into())
}

async fn apply(state: &AppState, plan: &RefundPlan, user: &User) -> Result<RefundResponse, ApiError> {
    let entry = state.db.inner().sales().apply_refund(plan, user).await?;

    let missing = state
        .inventory
        .with_inventory_mut(|inventory| plan.release_into(inventory));
    if !missing.is_empty() {
        warn!(?missing, sale_id = %plan.record.id, "Refunded products not in memory");
    }

    info!(
        target: "audit",
        event = "refund",
        kind = %plan.kind,
        sale_id = %plan.record.id,
        username = %user.username,
        role = %user.role,
        amount_cents = plan.amount.cents(),
        items = %plan.items
    );

    Ok(RefundResponse {
        entry: RefundLogDto::from(&entry),
        sale_refunded: plan.record.refunded,
        remaining_total_cents: plan.record.total_cents,
    })
}
