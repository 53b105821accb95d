//! Inventory adjustment.
//!
//! The functions here are the only code that changes a product's stock
//! counter. They are pure: each returns the adjusted product, and callers stage
//! it in their write batch with the version they read. Two commands adjusting
//! the same product therefore cannot both commit.

use crate::catalog::Product;
use crate::errors::{CommandError, CommandResult};
use crate::store::{DocumentStore, DocumentWrites, Versioned};
use crate::types::{ProductId, Quantity, Timestamp};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Takes `quantity` units out of stock.
///
/// Fails with `InsufficientStock` when the product holds fewer units.
pub fn reserve(product: &Product, quantity: Quantity) -> CommandResult<Product> {
    let requested = quantity.get();
    let remaining = product
        .stock
        .checked_sub(requested)
        .ok_or_else(|| CommandError::InsufficientStock {
            product: product.name.to_string(),
            requested,
            available: product.stock,
        })?;
    Ok(with_stock(product, remaining))
}

/// Puts `quantity` units back into stock.
pub fn release(product: &Product, quantity: Quantity) -> CommandResult<Product> {
    let restored = product.stock.checked_add(quantity.get()).ok_or_else(|| {
        CommandError::validation("stock", format!("stock for {} would overflow", product.name))
    })?;
    Ok(with_stock(product, restored))
}

/// Sets the stock level outright.
pub fn set_level(product: &Product, stock: u32) -> Product {
    with_stock(product, stock)
}

fn with_stock(product: &Product, stock: u32) -> Product {
    Product {
        stock,
        updated_at: Timestamp::now(),
        ..product.clone()
    }
}

/// Sums the quantities of repeated products, keeping first-seen order.
pub fn merge_quantities<I>(lines: I) -> CommandResult<Vec<(ProductId, Quantity)>>
where
    I: IntoIterator<Item = (ProductId, Quantity)>,
{
    let mut merged: Vec<(ProductId, Quantity)> = Vec::new();
    for (product_id, quantity) in lines {
        if let Some((_, existing)) = merged.iter_mut().find(|(id, _)| *id == product_id) {
            *existing = existing
                .checked_add(quantity)
                .map_err(|error| CommandError::validation("quantity", error))?;
        } else {
            merged.push((product_id, quantity));
        }
    }
    Ok(merged)
}

/// Stock changes accumulated by one command across several products.
///
/// Loads each product once, applies any number of reservations and releases,
/// and stages one versioned update per touched product.
#[derive(Debug, Default)]
pub struct StockLedger {
    products: BTreeMap<ProductId, Versioned<Product>>,
    touched: BTreeSet<ProductId>,
}

impl StockLedger {
    /// Loads the given products. Ids that do not exist are simply absent.
    pub async fn load<S, I>(store: &S, product_ids: I) -> CommandResult<Self>
    where
        S: DocumentStore,
        I: IntoIterator<Item = ProductId>,
    {
        let mut products = BTreeMap::new();
        for product_id in product_ids {
            if products.contains_key(&product_id) {
                continue;
            }
            if let Some(product) = store.load::<Product>(&product_id).await? {
                products.insert(product_id, product);
            }
        }
        Ok(Self {
            products,
            touched: BTreeSet::new(),
        })
    }

    /// Current (possibly already adjusted) state of a product.
    pub fn product(&self, product_id: ProductId) -> Option<&Product> {
        self.products.get(&product_id).map(|p| &p.document)
    }

    /// Reserves stock; the product must exist.
    pub fn reserve(&mut self, product_id: ProductId, quantity: Quantity) -> CommandResult<()> {
        let entry = self
            .products
            .get_mut(&product_id)
            .ok_or_else(|| CommandError::not_found("Product", product_id))?;
        entry.document = reserve(&entry.document, quantity)?;
        self.touched.insert(product_id);
        Ok(())
    }

    /// Releases stock. Returns `false`, without failing, for products that no
    /// longer exist.
    pub fn release(&mut self, product_id: ProductId, quantity: Quantity) -> CommandResult<bool> {
        let Some(entry) = self.products.get_mut(&product_id) else {
            warn!(
                product_id = %product_id,
                quantity = quantity.get(),
                "[inventory.release] product no longer exists, skipping restock"
            );
            return Ok(false);
        };
        entry.document = release(&entry.document, quantity)?;
        self.touched.insert(product_id);
        Ok(true)
    }

    /// Adds an update for every adjusted product to `writes`.
    #[must_use]
    pub fn stage(self, writes: DocumentWrites) -> DocumentWrites {
        let Self {
            mut products,
            touched,
        } = self;
        touched.into_iter().fold(writes, |writes, product_id| {
            match products.remove(&product_id) {
                Some(product) => writes.update(&product.document, product.version),
                None => writes,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;
    use crate::types::{Money, ProductName, RequiredText};
    use proptest::prelude::*;

    fn product(stock: u32) -> Product {
        let now = Timestamp::now();
        Product {
            id: ProductId::new(),
            name: ProductName::try_new("Koekoek chicks").unwrap(),
            category: Category::Chicks,
            description: RequiredText::try_new("Dual purpose breed").unwrap(),
            price: Money::from_cents(8_500).unwrap(),
            image_url: String::new(),
            stock,
            specifications: BTreeMap::new(),
            minimum_order: Quantity::ONE,
            is_available: true,
            created_at: now,
            updated_at: now,
        }
    }

    proptest! {
        #[test]
        fn reserve_succeeds_exactly_when_stock_suffices(stock in 0u32..10_000, wanted in 1u32..10_000) {
            let product = product(stock);
            let quantity = Quantity::new(wanted).unwrap();

            match reserve(&product, quantity) {
                Ok(updated) => {
                    prop_assert!(wanted <= stock);
                    prop_assert_eq!(updated.stock, stock - wanted);
                }
                Err(CommandError::InsufficientStock { requested, available, .. }) => {
                    prop_assert!(wanted > stock);
                    prop_assert_eq!(requested, wanted);
                    prop_assert_eq!(available, stock);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }

        #[test]
        fn release_undoes_reserve(stock in 1u32..10_000, wanted in 1u32..10_000) {
            prop_assume!(wanted <= stock);
            let product = product(stock);
            let quantity = Quantity::new(wanted).unwrap();

            let reserved = reserve(&product, quantity).unwrap();
            let released = release(&reserved, quantity).unwrap();

            prop_assert_eq!(released.stock, stock);
        }
    }

    #[test]
    fn merge_sums_repeated_products_in_first_seen_order() {
        let a = ProductId::new();
        let b = ProductId::new();
        let q = |n| Quantity::new(n).unwrap();

        let merged = merge_quantities([(a, q(2)), (b, q(1)), (a, q(3))]).unwrap();

        assert_eq!(merged, vec![(a, q(5)), (b, q(1))]);
    }

    #[test]
    fn release_reports_overflow_instead_of_wrapping() {
        let product = product(u32::MAX);
        assert!(release(&product, Quantity::ONE).is_err());
    }
}
