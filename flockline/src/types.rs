//! Core value types for Flockline.
//!
//! Every type here is constructed through a smart constructor, so a value that
//! exists is a value that is valid. Document fields use these types directly,
//! which means a stored document that deserializes is also a valid one.

use chrono::{DateTime, Utc};
use nutype::nutype;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Errors raised by the hand-written value constructors in this module.
///
/// Types generated with `nutype` report their own error enums; those are
/// converted at the command boundary together with these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// Invalid money amount
    #[error("Invalid money amount: {0}")]
    InvalidMoney(String),
    /// Invalid quantity value
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wraps an existing UUID.
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID.
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(
    /// Identifier of a catalog product.
    ProductId
);
entity_id!(
    /// Identifier of an order.
    OrderId
);
entity_id!(
    /// Identifier of a return request.
    ReturnId
);
entity_id!(
    /// Identifier of a product review.
    ReviewId
);
entity_id!(
    /// Identifier of a registered user.
    UserId
);

/// Display name of a product.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 200),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ProductName(String);

/// Free text that must not be blank.
///
/// Used for descriptions, reasons, comments, address lines and the other
/// human-entered fields that only need to be present.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 2000),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct RequiredText(String);

/// Email address, normalised to lower case so lookups are case-insensitive.
#[nutype(
    sanitize(trim, lowercase),
    validate(
        not_empty,
        len_char_max = 255,
        regex = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct Email(String);

/// Plain-text password as submitted by a user. Never stored.
#[nutype(validate(len_char_min = 6, len_char_max = 128), derive(Clone, AsRef))]
pub struct Password(String);

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Review rating between 1 and 5 stars.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 5),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct Rating(u8);

/// A strictly positive item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest count accepted for a single line.
    pub const MAX: u32 = 1_000_000;

    /// One unit.
    pub const ONE: Self = Self(1);

    /// Create a new quantity
    pub fn new(value: u32) -> Result<Self, ValueError> {
        if value == 0 {
            return Err(ValueError::InvalidQuantity(
                "Quantity must be greater than 0".to_string(),
            ));
        }
        if value > Self::MAX {
            return Err(ValueError::InvalidQuantity(format!(
                "Quantity {value} exceeds maximum {}",
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    /// Get the underlying value
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Add quantities, checking for overflow
    pub fn checked_add(self, other: Self) -> Result<Self, ValueError> {
        let total = self
            .0
            .checked_add(other.0)
            .ok_or_else(|| ValueError::InvalidQuantity("Quantity overflow".to_string()))?;
        Self::new(total)
    }
}

impl TryFrom<u32> for Quantity {
    type Error = ValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Money amount in the platform currency.
///
/// Uses `Decimal` for exact arithmetic. Amounts are non-negative and carry at
/// most two decimal places.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Maximum money amount (one billion)
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

    /// Create money from cents (avoids floating point issues)
    pub fn from_cents(cents: u64) -> Result<Self, ValueError> {
        let cents = i64::try_from(cents)
            .map_err(|_| ValueError::InvalidMoney(format!("{cents} cents is out of range")))?;
        Self::new(Decimal::new(cents, 2))
    }

    /// Create money from decimal amount
    pub fn new(amount: Decimal) -> Result<Self, ValueError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValueError::InvalidMoney(format!(
                "Money amount cannot be negative: {amount}"
            )));
        }
        let amount = amount.normalize();
        if amount.scale() > 2 {
            return Err(ValueError::InvalidMoney(format!(
                "Money amount cannot have more than 2 decimal places: {amount}"
            )));
        }
        if amount > Self::MAX_AMOUNT {
            return Err(ValueError::InvalidMoney(format!(
                "Money amount {amount} exceeds maximum {}",
                Self::MAX_AMOUNT
            )));
        }
        Ok(Self(amount))
    }

    /// Get the underlying decimal value
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Add money amounts
    pub fn checked_add(self, other: Self) -> Result<Self, ValueError> {
        let total = self
            .0
            .checked_add(other.0)
            .ok_or_else(|| ValueError::InvalidMoney("Money overflow".to_string()))?;
        Self::new(total)
    }

    /// Multiply by quantity
    pub fn times(self, quantity: Quantity) -> Result<Self, ValueError> {
        let total = self
            .0
            .checked_mul(Decimal::from(quantity.get()))
            .ok_or_else(|| ValueError::InvalidMoney("Money overflow".to_string()))?;
        Self::new(total)
    }

    /// Sum an iterator of amounts.
    pub fn sum<I: IntoIterator<Item = Self>>(amounts: I) -> Result<Self, ValueError> {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |total, amount| total.checked_add(amount))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = ValueError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = s.trim().parse::<Decimal>().map_err(|e| {
            ValueError::InvalidMoney(format!("Failed to parse money amount '{s}': {e}"))
        })?;
        Self::new(decimal)
    }
}

/// A UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
