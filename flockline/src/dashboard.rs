//! Administrator dashboard aggregates.

use crate::actor::{Actor, Role};
use crate::catalog::{Category, Product};
use crate::errors::{CommandError, CommandResult};
use crate::order::{Order, OrderStatus};
use crate::store::DocumentStore;
use crate::types::Money;
use crate::user::User;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rand::Rng;
use serde::Serialize;

/// Number of months shown on the revenue chart.
pub const CHART_MONTHS: u32 = 7;

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Sum of totals of every order that was not denied or cancelled
    pub total_revenue: Money,
    /// Registered agents
    pub total_agents: u64,
    /// Chick units across revenue orders
    pub chicks_ordered: u64,
    /// Chick units on delivered orders
    pub chicks_delivered: u64,
    /// Feed units across revenue orders
    pub feeds_sold: u64,
    /// Units currently in stock over all products
    pub stock_available: u64,
    /// Chart series
    pub revenue_data: RevenueChart,
    /// Referral channel breakdown
    pub referral_stats: Vec<ReferralStat>,
}

/// Line chart data in the shape the dashboard front end plots directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueChart {
    /// Abbreviated month names, oldest first
    pub labels: Vec<String>,
    /// Plotted series
    pub datasets: Vec<ChartDataset>,
}

/// One plotted series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    /// Legend label
    pub label: String,
    /// One value per label
    pub data: Vec<u64>,
    /// Line colour
    pub border_color: String,
    /// Fill colour
    pub background_color: String,
    /// Fill under the line
    pub fill: bool,
}

/// Share of customers arriving through one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferralStat {
    /// Channel name
    pub name: String,
    /// Percentage
    pub value: u32,
    /// Chart colour
    pub color: String,
}

/// Short names of the `count` months ending with the month of `now`, oldest
/// first.
pub fn month_labels(now: DateTime<Utc>, count: u32) -> Vec<String> {
    let first_of_month =
        NaiveDate::from_ymd_opt(now.year(), now.month(), 1).unwrap_or_else(|| now.date_naive());
    (0..count)
        .rev()
        .filter_map(|back| first_of_month.checked_sub_months(Months::new(back)))
        .map(|month| month.format("%b").to_string())
        .collect()
}

fn revenue_chart(now: DateTime<Utc>) -> RevenueChart {
    let labels = month_labels(now, CHART_MONTHS);
    let mut rng = rand::rng();
    // No per-month revenue history is kept; the series is placeholder data.
    let data = labels
        .iter()
        .map(|_| rng.random_range(50_000..150_000))
        .collect();
    RevenueChart {
        labels,
        datasets: vec![ChartDataset {
            label: "Revenue".to_string(),
            data,
            border_color: "rgb(220, 38, 38)".to_string(),
            background_color: "rgba(220, 38, 38, 0.1)".to_string(),
            fill: true,
        }],
    }
}

fn referral_stats() -> Vec<ReferralStat> {
    [
        ("Direct Referrals", 45, "red"),
        ("Social Media", 30, "blue"),
        ("Website", 15, "yellow"),
        ("Trade Shows", 10, "green"),
    ]
    .into_iter()
    .map(|(name, value, color)| ReferralStat {
        name: name.to_string(),
        value,
        color: color.to_string(),
    })
    .collect()
}

fn units_of(order: &Order, category: Category) -> u64 {
    order
        .items
        .iter()
        .filter(|item| item.category == category)
        .map(|item| u64::from(item.quantity.get()))
        .sum()
}

/// Computes the dashboard. Administrators only.
pub async fn dashboard_stats<S: DocumentStore>(
    store: &S,
    actor: &Actor,
) -> CommandResult<DashboardStats> {
    actor.require_admin()?;

    let orders: Vec<Order> = store
        .load_all::<Order>()
        .await?
        .into_iter()
        .map(|o| o.document)
        .filter(|o| o.status.is_revenue())
        .collect();
    let products = store.load_all::<Product>().await?;
    let users = store.load_all::<User>().await?;

    let total_revenue = Money::sum(orders.iter().map(|o| o.total_price))
        .map_err(|error| CommandError::Internal(format!("revenue total out of range: {error}")))?;

    Ok(DashboardStats {
        total_revenue,
        total_agents: users
            .iter()
            .filter(|u| u.document.role() == Role::Agent)
            .count() as u64,
        chicks_ordered: orders.iter().map(|o| units_of(o, Category::Chicks)).sum(),
        chicks_delivered: orders
            .iter()
            .filter(|o| o.status == OrderStatus::Delivered)
            .map(|o| units_of(o, Category::Chicks))
            .sum(),
        feeds_sold: orders.iter().map(|o| units_of(o, Category::Feeds)).sum(),
        stock_available: products.iter().map(|p| u64::from(p.document.stock)).sum(),
        revenue_data: revenue_chart(Utc::now()),
        referral_stats: referral_stats(),
    })
}
