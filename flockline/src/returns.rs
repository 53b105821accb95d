//! Return requests against delivered orders.
//!
//! The refund is computed once, at request time, from the prices the order
//! captured. Returned stock goes back to inventory exactly once: when the
//! return is both `completed` and physically received, whichever of the two
//! happens last. Both setters call the same [`settle`] step, and the
//! `restocked` flag makes it idempotent.

use crate::actor::Actor;
use crate::errors::{CommandError, CommandResult};
use crate::executor::{Command, Decision};
use crate::inventory::{merge_quantities, StockLedger};
use crate::order::{Order, OrderStatus};
use crate::store::{Collection, Document, DocumentStore, DocumentWrites, Versioned};
use crate::types::{Money, OrderId, ProductId, Quantity, RequiredText, ReturnId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// How returned goods travel back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// The company collects the goods
    CompanyPickup,
    /// The agent brings the goods in
    AgentDelivery,
}

/// Review status of a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnStatus {
    /// Awaiting review
    Pending,
    /// Accepted, refund in progress
    Approved,
    /// Refused
    Rejected,
    /// Finished
    Completed,
}

impl ReturnStatus {
    /// Lower-case wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    /// Statuses that cannot be left.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Pending, Self::Approved, Self::Rejected, Self::Completed]
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| {
                CommandError::validation("status", format!("unknown return status '{s}'"))
            })
    }
}

/// Progress of the refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    /// Not started
    Pending,
    /// Return approved, refund under way
    Processing,
    /// Refund paid and stock restored
    Completed,
}

/// One returned product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItem {
    /// Returned product
    pub product_id: ProductId,
    /// Units returned
    pub quantity: Quantity,
    /// Price captured on the order, `None` when the order never held the product
    pub unit_price: Option<Money>,
}

/// A return request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnOrder {
    /// Return id
    pub id: ReturnId,
    /// Order being returned against
    pub order_id: OrderId,
    /// Requesting user
    pub user_id: UserId,
    /// Why the goods are returned
    pub reason: RequiredText,
    /// Returned lines
    pub items: Vec<ReturnItem>,
    /// How the goods come back
    pub delivery_method: DeliveryMethod,
    /// Review status
    pub status: ReturnStatus,
    /// Refund progress
    pub refund_status: RefundStatus,
    /// Notes left by administrators
    pub admin_notes: Option<String>,
    /// Whether the goods arrived
    pub product_received: bool,
    /// Whether stock was put back
    pub restocked: bool,
    /// Refund owed, from captured order prices
    pub refund_amount: Money,
    /// Creation time
    pub created_at: Timestamp,
    /// Last modification time
    pub updated_at: Timestamp,
}

impl Document for ReturnOrder {
    type Id = ReturnId;
    const COLLECTION: Collection = Collection::Returns;

    fn id(&self) -> ReturnId {
        self.id
    }
}

impl ReturnOrder {
    /// Completed, received and not yet restocked.
    pub fn due_for_restock(&self) -> bool {
        self.status == ReturnStatus::Completed && self.product_received && !self.restocked
    }
}

/// Puts every returned item back into stock if it is due, and marks it
/// restocked and refunded. Does nothing otherwise.
pub async fn settle<S: DocumentStore>(
    store: &S,
    return_order: &mut ReturnOrder,
) -> CommandResult<Option<StockLedger>> {
    if !return_order.due_for_restock() {
        return Ok(None);
    }

    let items = &return_order.items;
    let mut ledger = StockLedger::load(store, items.iter().map(|item| item.product_id)).await?;
    for item in items {
        ledger.release(item.product_id, item.quantity)?;
    }

    return_order.restocked = true;
    return_order.refund_status = RefundStatus::Completed;
    info!(
        return_id = %return_order.id,
        items = return_order.items.len(),
        "[returns.settle] returned stock released"
    );
    Ok(Some(ledger))
}

/// Requested product and quantity on a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnLine {
    /// Product being returned
    pub product_id: ProductId,
    /// Units returned
    pub quantity: Quantity,
}

/// Opens a return against a delivered order owned by the requester.
///
/// For products on the order, the quantity returned across all non-rejected
/// returns may not exceed what was ordered. Products the order never held are
/// accepted and refund nothing. They are still restocked once received.
#[derive(Debug, Clone)]
pub struct RequestReturn {
    /// Requesting user
    pub actor: Actor,
    /// Order being returned against
    pub order_id: OrderId,
    /// Why the goods are returned
    pub reason: RequiredText,
    /// Returned lines
    pub lines: Vec<ReturnLine>,
    /// How the goods come back
    pub delivery_method: DeliveryMethod,
}

impl Command for RequestReturn {
    type Output = ReturnOrder;

    fn name(&self) -> &'static str {
        "request_return"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<ReturnOrder>> {
        let order = store
            .load::<Order>(&self.order_id)
            .await?
            .ok_or_else(|| CommandError::not_found("Order", self.order_id))?;
        if order.document.user_id != self.actor.user_id {
            return Err(CommandError::Forbidden(
                "returns can only be requested by the customer who placed the order".to_string(),
            ));
        }
        if order.document.status != OrderStatus::Delivered {
            return Err(CommandError::InvalidState(format!(
                "returns can only be requested for delivered orders, this order is {}",
                order.document.status
            )));
        }
        if self.lines.is_empty() {
            return Err(CommandError::validation("items", "at least one item is required"));
        }
        let lines = merge_quantities(self.lines.iter().map(|line| (line.product_id, line.quantity)))?;

        let already_returned = returned_so_far(store, self.order_id).await?;

        let mut items = Vec::with_capacity(lines.len());
        for (product_id, quantity) in lines {
            let unit_price = match order.document.line(product_id) {
                Some(line) => {
                    let ordered = order.document.quantity_of(product_id);
                    let previous = already_returned.get(&product_id).copied().unwrap_or(0);
                    let remaining = ordered.saturating_sub(previous);
                    if quantity.get() > remaining {
                        return Err(CommandError::validation(
                            "items",
                            format!(
                                "cannot return {quantity} of {}: only {remaining} left to return",
                                line.product_name
                            ),
                        ));
                    }
                    Some(line.unit_price)
                }
                None => None,
            };
            items.push(ReturnItem {
                product_id,
                quantity,
                unit_price,
            });
        }

        let refund_amount = refund_for(&items)?;
        let now = Timestamp::now();
        let return_order = ReturnOrder {
            id: ReturnId::new(),
            order_id: self.order_id,
            user_id: self.actor.user_id,
            reason: self.reason.clone(),
            items,
            delivery_method: self.delivery_method,
            status: ReturnStatus::Pending,
            refund_status: RefundStatus::Pending,
            admin_notes: None,
            product_received: false,
            restocked: false,
            refund_amount,
            created_at: now,
            updated_at: now,
        };
        debug!(
            return_id = %return_order.id,
            order_id = %self.order_id,
            refund = %return_order.refund_amount,
            "[returns.request] return drafted"
        );

        // Re-writing the unchanged order serialises concurrent requests
        // against it, so the remaining-quantity check cannot be raced.
        let writes = DocumentWrites::new()
            .insert(&return_order)
            .update(&order.document, order.version)
            .build()?;
        Ok(Decision::new(writes, return_order))
    }
}

fn refund_for(items: &[ReturnItem]) -> CommandResult<Money> {
    let amounts = items
        .iter()
        .filter_map(|item| item.unit_price.map(|price| price.times(item.quantity)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| CommandError::validation("items", error))?;
    Money::sum(amounts).map_err(|error| CommandError::validation("items", error))
}

async fn returned_so_far<S: DocumentStore>(
    store: &S,
    order_id: OrderId,
) -> CommandResult<BTreeMap<ProductId, u32>> {
    let mut totals = BTreeMap::new();
    for existing in store.load_all::<ReturnOrder>().await? {
        let existing = existing.document;
        if existing.order_id != order_id || existing.status == ReturnStatus::Rejected {
            continue;
        }
        for item in existing.items {
            let total = totals.entry(item.product_id).or_insert(0u32);
            *total = total.saturating_add(item.quantity.get());
        }
    }
    Ok(totals)
}

async fn load_return<S: DocumentStore>(
    store: &S,
    return_id: ReturnId,
) -> CommandResult<Versioned<ReturnOrder>> {
    store
        .load::<ReturnOrder>(&return_id)
        .await?
        .ok_or_else(|| CommandError::not_found("Return", return_id))
}

async fn finish<S: DocumentStore>(
    store: &S,
    Versioned { version, mut document }: Versioned<ReturnOrder>,
) -> CommandResult<Decision<ReturnOrder>> {
    let mut writes = DocumentWrites::new();
    if let Some(ledger) = settle(store, &mut document).await? {
        writes = ledger.stage(writes);
    }
    document.updated_at = Timestamp::now();
    let writes = writes.update(&document, version).build()?;
    Ok(Decision::new(writes, document))
}

/// Sets a return's status and notes. `completed` and `rejected` are final.
#[derive(Debug, Clone)]
pub struct UpdateReturnStatus {
    /// Acting administrator
    pub actor: Actor,
    /// Target return
    pub return_id: ReturnId,
    /// New status
    pub status: ReturnStatus,
    /// Replacement notes, unchanged when absent
    pub admin_notes: Option<String>,
}

impl Command for UpdateReturnStatus {
    type Output = ReturnOrder;

    fn name(&self) -> &'static str {
        "update_return_status"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<ReturnOrder>> {
        self.actor.require_admin()?;
        let mut current = load_return(store, self.return_id).await?;
        let document = &mut current.document;

        if document.status.is_terminal() && document.status != self.status {
            return Err(CommandError::InvalidState(format!(
                "return is already {} and cannot become {}",
                document.status, self.status
            )));
        }

        document.status = self.status;
        match (self.status, document.refund_status) {
            (ReturnStatus::Approved, RefundStatus::Pending) => {
                document.refund_status = RefundStatus::Processing;
            }
            (ReturnStatus::Pending, RefundStatus::Processing) => {
                document.refund_status = RefundStatus::Pending;
            }
            _ => {}
        }
        if let Some(notes) = &self.admin_notes {
            document.admin_notes = Some(notes.clone());
        }

        finish(store, current).await
    }
}

/// Records that the returned goods arrived.
#[derive(Debug, Clone)]
pub struct ConfirmReturnReceived {
    /// Acting administrator
    pub actor: Actor,
    /// Target return
    pub return_id: ReturnId,
}

impl Command for ConfirmReturnReceived {
    type Output = ReturnOrder;

    fn name(&self) -> &'static str {
        "confirm_return_received"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<ReturnOrder>> {
        self.actor.require_admin()?;
        let mut current = load_return(store, self.return_id).await?;
        current.document.product_received = true;
        finish(store, current).await
    }
}

fn newest_first(mut returns: Vec<ReturnOrder>) -> Vec<ReturnOrder> {
    returns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    returns
}

/// Every return, newest first. Administrators only.
pub async fn list_returns<S: DocumentStore>(store: &S, actor: &Actor) -> CommandResult<Vec<ReturnOrder>> {
    actor.require_admin()?;
    let returns = store.load_all::<ReturnOrder>().await?;
    Ok(newest_first(returns.into_iter().map(|r| r.document).collect()))
}

/// The given user's returns, newest first.
pub async fn list_returns_for_user<S: DocumentStore>(
    store: &S,
    user_id: UserId,
) -> CommandResult<Vec<ReturnOrder>> {
    let returns = store.load_all::<ReturnOrder>().await?;
    Ok(newest_first(
        returns
            .into_iter()
            .map(|r| r.document)
            .filter(|r| r.user_id == user_id)
            .collect(),
    ))
}
