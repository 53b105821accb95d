//! Orders and their lifecycle.
//!
//! Every status change goes through one transition table,
//! [`OrderStatus::can_transition_to`]. The named transitions (confirm, deny,
//! cancel) and the generic administrator status setter are all the same
//! [`ChangeOrderStatus`] command, so they cannot disagree.
//!
//! Stock is reserved when an order is placed and released when it is denied,
//! cancelled or deleted. The order write and the product writes always commit
//! in one batch.

use crate::actor::Actor;
use crate::catalog::{Category, Product};
use crate::errors::{CommandError, CommandResult};
use crate::executor::{Command, Decision};
use crate::inventory::{merge_quantities, StockLedger};
use crate::store::{Collection, Document, DocumentStore, DocumentWrites, Versioned};
use crate::types::{Money, OrderId, ProductId, ProductName, Quantity, RequiredText, Timestamp, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Country assumed when an address does not name one.
pub const DEFAULT_COUNTRY: &str = "Ethiopia";

/// Order status.
///
/// ```text
/// pending    -> confirmed | denied | cancelled
/// confirmed  -> processing | shipped | cancelled
/// processing -> shipped
/// shipped    -> delivered
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed, awaiting an administrator
    Pending,
    /// Accepted by an administrator
    Confirmed,
    /// Being prepared
    Processing,
    /// Handed to a carrier
    Shipped,
    /// Received by the customer
    Delivered,
    /// Refused by an administrator
    Denied,
    /// Withdrawn before shipping
    Cancelled,
}

impl OrderStatus {
    /// Lower-case wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
        }
    }

    /// The transition table.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Denied | Self::Cancelled)
                | (
                    Self::Confirmed,
                    Self::Processing | Self::Shipped | Self::Cancelled
                )
                | (Self::Processing, Self::Shipped)
                | (Self::Shipped, Self::Delivered)
        )
    }

    /// Checks the table and returns `next`, or fails with `InvalidState`.
    pub fn transition_to(self, next: Self) -> CommandResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CommandError::InvalidState(format!(
                "cannot change order status from {self} to {next}"
            )))
        }
    }

    /// Statuses in which reserved stock is returned to inventory.
    pub const fn releases_stock(self) -> bool {
        matches!(self, Self::Denied | Self::Cancelled)
    }

    /// Statuses from which shipment details may be recorded.
    pub const fn accepts_shipment(self) -> bool {
        matches!(self, Self::Confirmed | Self::Shipped)
    }

    /// Whether the order's revenue counts.
    pub const fn is_revenue(self) -> bool {
        !self.releases_stock()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Pending,
            Self::Confirmed,
            Self::Processing,
            Self::Shipped,
            Self::Delivered,
            Self::Denied,
            Self::Cancelled,
        ]
        .into_iter()
        .find(|status| status.as_str() == s.trim())
        .ok_or_else(|| CommandError::validation("status", format!("unknown order status '{s}'")))
    }
}

/// How the customer pays. A label only; no payment is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Commercial Bank of Ethiopia transfer
    CbeTransfer,
    /// Telebirr mobile money
    Telebirr,
}

/// Delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    /// Street and number
    pub street: RequiredText,
    /// City
    pub city: RequiredText,
    /// Region
    pub region: RequiredText,
    /// Country
    pub country: RequiredText,
}

impl ShippingAddress {
    /// Builds an address, defaulting the country.
    pub fn new(
        street: RequiredText,
        city: RequiredText,
        region: RequiredText,
        country: Option<RequiredText>,
    ) -> CommandResult<Self> {
        let country = match country {
            Some(country) => country,
            None => RequiredText::try_new(DEFAULT_COUNTRY)
                .map_err(|error| CommandError::Internal(error.to_string()))?,
        };
        Ok(Self {
            street,
            city,
            region,
            country,
        })
    }
}

/// Carrier information recorded when an order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetails {
    /// Carrier tracking number
    pub tracking_number: RequiredText,
    /// Carrier name
    pub carrier: RequiredText,
    /// When the details were recorded
    pub shipped_at: Timestamp,
}

/// One product line on an order, with the price captured when it was priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Product ordered
    pub product_id: ProductId,
    /// Product name at order time
    pub product_name: ProductName,
    /// Product line at order time
    pub category: Category,
    /// Units ordered
    pub quantity: Quantity,
    /// Unit price at order time
    pub unit_price: Money,
}

impl LineItem {
    fn capture(product: &Product, quantity: Quantity) -> Self {
        Self {
            product_id: product.id,
            product_name: product.name.clone(),
            category: product.category,
            quantity,
            unit_price: product.price,
        }
    }

    /// Unit price times quantity.
    pub fn subtotal(&self) -> CommandResult<Money> {
        self.unit_price
            .times(self.quantity)
            .map_err(|error| CommandError::validation("orderItems", error))
    }
}

fn total_of(items: &[LineItem]) -> CommandResult<Money> {
    let subtotals = items
        .iter()
        .map(LineItem::subtotal)
        .collect::<CommandResult<Vec<_>>>()?;
    Money::sum(subtotals).map_err(|error| CommandError::validation("orderItems", error))
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order id
    pub id: OrderId,
    /// Ordering user
    pub user_id: UserId,
    /// Ordered lines
    #[serde(rename = "orderItems")]
    pub items: Vec<LineItem>,
    /// Delivery address
    pub shipping_address: ShippingAddress,
    /// Payment label
    pub payment_method: PaymentMethod,
    /// Sum of line subtotals
    pub total_price: Money,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Requested delivery date
    pub delivery_date: NaiveDate,
    /// Present once shipment details were recorded
    pub shipping_details: Option<ShippingDetails>,
    /// Creation time
    pub created_at: Timestamp,
    /// Last modification time
    pub updated_at: Timestamp,
}

impl Document for Order {
    type Id = OrderId;
    const COLLECTION: Collection = Collection::Orders;

    fn id(&self) -> OrderId {
        self.id
    }
}

impl Order {
    /// Units of `product_id` on the order.
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.items
            .iter()
            .filter(|item| item.product_id == product_id)
            .map(|item| item.quantity.get())
            .sum()
    }

    /// The line for `product_id`, if any.
    pub fn line(&self, product_id: ProductId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

/// Requested product and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    /// Product to order
    pub product_id: ProductId,
    /// Units wanted
    pub quantity: Quantity,
}

fn merge_lines(lines: &[OrderLine]) -> CommandResult<Vec<(ProductId, Quantity)>> {
    if lines.is_empty() {
        return Err(CommandError::validation(
            "orderItems",
            "at least one item is required",
        ));
    }
    merge_quantities(lines.iter().map(|line| (line.product_id, line.quantity)))
}

fn check_available(product: &Product) -> CommandResult<()> {
    if product.is_available {
        Ok(())
    } else {
        Err(CommandError::BusinessRuleViolation(format!(
            "{} is not available for ordering",
            product.name
        )))
    }
}

fn check_minimum(product: &Product, quantity: Quantity) -> CommandResult<()> {
    if quantity < product.minimum_order {
        return Err(CommandError::BusinessRuleViolation(format!(
            "minimum order for {} is {}",
            product.name, product.minimum_order
        )));
    }
    Ok(())
}

async fn load_order<S: DocumentStore>(store: &S, order_id: OrderId) -> CommandResult<Versioned<Order>> {
    store
        .load::<Order>(&order_id)
        .await?
        .ok_or_else(|| CommandError::not_found("Order", order_id))
}

/// Release every line's quantity back to stock.
async fn release_all<S: DocumentStore>(store: &S, order: &Order) -> CommandResult<StockLedger> {
    let mut ledger = StockLedger::load(store, order.items.iter().map(|item| item.product_id)).await?;
    for item in &order.items {
        ledger.release(item.product_id, item.quantity)?;
    }
    Ok(ledger)
}

/// Places a new order, reserving stock for every line.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// Ordering user
    pub actor: Actor,
    /// Requested lines
    pub lines: Vec<OrderLine>,
    /// Delivery address
    pub shipping_address: ShippingAddress,
    /// Payment label
    pub payment_method: PaymentMethod,
    /// Requested delivery date
    pub delivery_date: NaiveDate,
}

impl Command for PlaceOrder {
    type Output = Order;

    fn name(&self) -> &'static str {
        "place_order"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<Order>> {
        let lines = merge_lines(&self.lines)?;
        let mut ledger = StockLedger::load(store, lines.iter().map(|(id, _)| *id)).await?;

        let mut items = Vec::with_capacity(lines.len());
        for (product_id, quantity) in lines {
            let product = ledger
                .product(product_id)
                .ok_or_else(|| CommandError::not_found("Product", product_id))?;
            check_available(product)?;
            check_minimum(product, quantity)?;
            items.push(LineItem::capture(product, quantity));
            ledger.reserve(product_id, quantity)?;
        }

        let now = Timestamp::now();
        let order = Order {
            id: OrderId::new(),
            user_id: self.actor.user_id,
            total_price: total_of(&items)?,
            items,
            shipping_address: self.shipping_address.clone(),
            payment_method: self.payment_method,
            status: OrderStatus::Pending,
            delivery_date: self.delivery_date,
            shipping_details: None,
            created_at: now,
            updated_at: now,
        };
        debug!(
            order_id = %order.id,
            lines = order.items.len(),
            total = %order.total_price,
            "[order.place] reserving stock"
        );

        let writes = ledger.stage(DocumentWrites::new().insert(&order)).build()?;
        Ok(Decision::new(writes, order))
    }
}

/// Moves an order to another status through the transition table.
///
/// Cancellation is open to the order's owner; every other status change needs
/// an administrator. Denial and cancellation release the reserved stock.
#[derive(Debug, Clone)]
pub struct ChangeOrderStatus {
    /// Acting user
    pub actor: Actor,
    /// Target order
    pub order_id: OrderId,
    /// Requested status
    pub status: OrderStatus,
}

impl ChangeOrderStatus {
    /// Confirm a pending order.
    pub const fn confirm(actor: Actor, order_id: OrderId) -> Self {
        Self {
            actor,
            order_id,
            status: OrderStatus::Confirmed,
        }
    }

    /// Deny a pending order.
    pub const fn deny(actor: Actor, order_id: OrderId) -> Self {
        Self {
            actor,
            order_id,
            status: OrderStatus::Denied,
        }
    }

    /// Cancel a pending or confirmed order.
    pub const fn cancel(actor: Actor, order_id: OrderId) -> Self {
        Self {
            actor,
            order_id,
            status: OrderStatus::Cancelled,
        }
    }
}

impl Command for ChangeOrderStatus {
    type Output = Order;

    fn name(&self) -> &'static str {
        "change_order_status"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<Order>> {
        if self.status != OrderStatus::Cancelled {
            self.actor.require_admin()?;
        }
        let Versioned { version, mut document } = load_order(store, self.order_id).await?;
        self.actor.require_owner_or_admin(document.user_id, "order")?;

        document.status = document.status.transition_to(self.status)?;
        document.touch();

        let mut writes = DocumentWrites::new().update(&document, version);
        if self.status.releases_stock() {
            writes = release_all(store, &document).await?.stage(writes);
        }
        Ok(Decision::new(writes.build()?, document))
    }
}

/// Records carrier details and marks the order shipped.
#[derive(Debug, Clone)]
pub struct UpdateShipment {
    /// Acting administrator
    pub actor: Actor,
    /// Target order
    pub order_id: OrderId,
    /// Carrier tracking number
    pub tracking_number: RequiredText,
    /// Carrier name
    pub carrier: RequiredText,
}

impl Command for UpdateShipment {
    type Output = Order;

    fn name(&self) -> &'static str {
        "update_shipment"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<Order>> {
        self.actor.require_admin()?;
        let Versioned { version, mut document } = load_order(store, self.order_id).await?;
        if !document.status.accepts_shipment() {
            return Err(CommandError::InvalidState(format!(
                "cannot record shipment for an order that is {}",
                document.status
            )));
        }

        document.status = OrderStatus::Shipped;
        document.shipping_details = Some(ShippingDetails {
            tracking_number: self.tracking_number.clone(),
            carrier: self.carrier.clone(),
            shipped_at: Timestamp::now(),
        });
        document.touch();

        let writes = DocumentWrites::new().update(&document, version).build()?;
        Ok(Decision::new(writes, document))
    }
}

/// Edits a pending order.
///
/// Replacing the lines reserves or releases the difference per product.
/// Products already on the order keep their captured price; only new products
/// are priced from the catalog. The total is summed from those prices.
#[derive(Debug, Clone)]
pub struct UpdateOrder {
    /// Acting user
    pub actor: Actor,
    /// Target order
    pub order_id: OrderId,
    /// Replacement lines
    pub lines: Option<Vec<OrderLine>>,
    /// Replacement address
    pub shipping_address: Option<ShippingAddress>,
    /// Replacement payment label
    pub payment_method: Option<PaymentMethod>,
    /// Replacement delivery date
    pub delivery_date: Option<NaiveDate>,
}

impl Command for UpdateOrder {
    type Output = Order;

    fn name(&self) -> &'static str {
        "update_order"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<Order>> {
        let Versioned { version, mut document } = load_order(store, self.order_id).await?;
        self.actor.require_owner_or_admin(document.user_id, "order")?;
        if document.status != OrderStatus::Pending {
            return Err(CommandError::InvalidState(format!(
                "only pending orders can be edited, this order is {}",
                document.status
            )));
        }

        if let Some(address) = &self.shipping_address {
            document.shipping_address = address.clone();
        }
        if let Some(method) = self.payment_method {
            document.payment_method = method;
        }
        if let Some(date) = self.delivery_date {
            document.delivery_date = date;
        }

        let mut writes = DocumentWrites::new();
        if let Some(lines) = &self.lines {
            let lines = merge_lines(lines)?;
            let previous: BTreeMap<ProductId, u32> = document
                .items
                .iter()
                .map(|item| (item.product_id, document.quantity_of(item.product_id)))
                .collect();

            let mut ledger = StockLedger::load(
                store,
                previous.keys().copied().chain(lines.iter().map(|(id, _)| *id)),
            )
            .await?;

            let mut items = Vec::with_capacity(lines.len());
            for &(product_id, quantity) in &lines {
                let before = previous.get(&product_id).copied().unwrap_or(0);
                let product = ledger
                    .product(product_id)
                    .ok_or_else(|| CommandError::not_found("Product", product_id))?;
                check_minimum(product, quantity)?;
                if quantity.get() > before {
                    check_available(product)?;
                }
                let item = match document.line(product_id) {
                    Some(kept) => LineItem {
                        quantity,
                        ..kept.clone()
                    },
                    None => LineItem::capture(product, quantity),
                };
                items.push(item);
                adjust(&mut ledger, product_id, before, quantity.get())?;
            }
            for (&product_id, &before) in &previous {
                if !lines.iter().any(|(id, _)| *id == product_id) {
                    adjust(&mut ledger, product_id, before, 0)?;
                }
            }

            document.total_price = total_of(&items)?;
            document.items = items;
            writes = ledger.stage(writes);
        }

        document.touch();
        let writes = writes.update(&document, version).build()?;
        Ok(Decision::new(writes, document))
    }
}

fn adjust(ledger: &mut StockLedger, product_id: ProductId, before: u32, after: u32) -> CommandResult<()> {
    let delta = |n: u32| Quantity::new(n).map_err(|error| CommandError::validation("quantity", error));
    if after > before {
        ledger.reserve(product_id, delta(after - before)?)
    } else if before > after {
        ledger.release(product_id, delta(before - after)?).map(|_| ())
    } else {
        Ok(())
    }
}

/// Deletes a pending order and releases its stock.
#[derive(Debug, Clone)]
pub struct DeleteOrder {
    /// Acting user
    pub actor: Actor,
    /// Target order
    pub order_id: OrderId,
}

impl Command for DeleteOrder {
    type Output = ();

    fn name(&self) -> &'static str {
        "delete_order"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<()>> {
        let order = load_order(store, self.order_id).await?;
        self.actor.require_owner_or_admin(order.document.user_id, "order")?;
        if order.document.status != OrderStatus::Pending {
            return Err(CommandError::InvalidState(format!(
                "only pending orders can be deleted, this order is {}",
                order.document.status
            )));
        }

        let ledger = release_all(store, &order.document).await?;
        let writes = ledger
            .stage(DocumentWrites::new().delete(&order.document, order.version))
            .build()?;
        Ok(Decision::new(writes, ()))
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

/// Every order, newest first. Administrators only.
pub async fn list_orders<S: DocumentStore>(store: &S, actor: &Actor) -> CommandResult<Vec<Order>> {
    actor.require_admin()?;
    let orders = store.load_all::<Order>().await?;
    Ok(newest_first(orders.into_iter().map(|o| o.document).collect()))
}

/// The given user's orders, newest first.
pub async fn list_orders_for_user<S: DocumentStore>(store: &S, user_id: UserId) -> CommandResult<Vec<Order>> {
    let orders = store.load_all::<Order>().await?;
    Ok(newest_first(
        orders
            .into_iter()
            .map(|o| o.document)
            .filter(|order| order.user_id == user_id)
            .collect(),
    ))
}

/// One order, visible to its owner and to administrators.
pub async fn get_order<S: DocumentStore>(store: &S, actor: &Actor, order_id: OrderId) -> CommandResult<Order> {
    let order = load_order(store, order_id).await?.document;
    actor.require_owner_or_admin(order.user_id, "order")?;
    Ok(order)
}
