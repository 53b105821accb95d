//! Product catalog.
//!
//! Products are managed by administrators and browsed by everyone. Stock is
//! part of the product document, but only [`crate::inventory`] changes it after
//! creation.

use crate::actor::Actor;
use crate::errors::{CommandError, CommandResult};
use crate::executor::{Command, Decision};
use crate::inventory;
use crate::store::{Collection, Document, DocumentStore, DocumentWrites, Versioned};
use crate::types::{Money, ProductId, ProductName, Quantity, RequiredText, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Product line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Day-old chicks
    Chicks,
    /// Poultry feeds
    Feeds,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Chicks => "chicks",
            Self::Feeds => "feeds",
        })
    }
}

impl FromStr for Category {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "chicks" => Ok(Self::Chicks),
            "feeds" => Ok(Self::Feeds),
            other => Err(CommandError::validation(
                "category",
                format!("unknown category '{other}'"),
            )),
        }
    }
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product id
    pub id: ProductId,
    /// Display name
    pub name: ProductName,
    /// Product line
    pub category: Category,
    /// Marketing description
    pub description: RequiredText,
    /// Current unit price
    pub price: Money,
    /// Image location
    pub image_url: String,
    /// Units in stock
    pub stock: u32,
    /// Free-form attributes such as breed or protein content
    pub specifications: BTreeMap<String, String>,
    /// Smallest quantity accepted on one order line
    pub minimum_order: Quantity,
    /// Whether the product can currently be ordered
    pub is_available: bool,
    /// Creation time
    pub created_at: Timestamp,
    /// Last modification time
    pub updated_at: Timestamp,
}

impl Document for Product {
    type Id = ProductId;
    const COLLECTION: Collection = Collection::Products;

    fn id(&self) -> ProductId {
        self.id
    }
}

/// Validated fields of a new product.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    /// Display name
    pub name: ProductName,
    /// Product line
    pub category: Category,
    /// Marketing description
    pub description: RequiredText,
    /// Unit price
    pub price: Money,
    /// Image location
    pub image_url: String,
    /// Opening stock
    pub stock: u32,
    /// Free-form attributes
    pub specifications: BTreeMap<String, String>,
    /// Smallest quantity per order line, 1 when absent
    pub minimum_order: Option<Quantity>,
    /// Availability, true when absent
    pub is_available: Option<bool>,
}

impl Product {
    /// Builds a new product from a draft.
    pub fn from_draft(draft: ProductDraft) -> Self {
        let now = Timestamp::now();
        Self {
            id: ProductId::new(),
            name: draft.name,
            category: draft.category,
            description: draft.description,
            price: draft.price,
            image_url: draft.image_url,
            stock: draft.stock,
            specifications: draft.specifications,
            minimum_order: draft.minimum_order.unwrap_or(Quantity::ONE),
            is_available: draft.is_available.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial product update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    /// New name
    pub name: Option<ProductName>,
    /// New category
    pub category: Option<Category>,
    /// New description
    pub description: Option<RequiredText>,
    /// New price. Existing orders keep the price they captured.
    pub price: Option<Money>,
    /// New image location
    pub image_url: Option<String>,
    /// Replacement attribute map
    pub specifications: Option<BTreeMap<String, String>>,
    /// New minimum order quantity
    pub minimum_order: Option<Quantity>,
    /// New availability
    pub is_available: Option<bool>,
}

impl ProductPatch {
    fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(image_url) = self.image_url {
            product.image_url = image_url;
        }
        if let Some(specifications) = self.specifications {
            product.specifications = specifications;
        }
        if let Some(minimum_order) = self.minimum_order {
            product.minimum_order = minimum_order;
        }
        if let Some(is_available) = self.is_available {
            product.is_available = is_available;
        }
        product.updated_at = Timestamp::now();
    }
}

async fn load_product<S: DocumentStore>(
    store: &S,
    product_id: ProductId,
) -> CommandResult<Versioned<Product>> {
    store
        .load::<Product>(&product_id)
        .await?
        .ok_or_else(|| CommandError::not_found("Product", product_id))
}

/// Adds a product to the catalog.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    /// Acting administrator
    pub actor: Actor,
    /// Product fields
    pub draft: ProductDraft,
}

impl Command for CreateProduct {
    type Output = Product;

    fn name(&self) -> &'static str {
        "create_product"
    }

    async fn decide<S: DocumentStore + Sync>(&self, _store: &S) -> CommandResult<Decision<Product>> {
        self.actor.require_admin()?;
        let product = Product::from_draft(self.draft.clone());
        debug!(product_id = %product.id, "[catalog.create] product drafted");
        let writes = DocumentWrites::new().insert(&product).build()?;
        Ok(Decision::new(writes, product))
    }
}

/// Applies a partial update to a product.
#[derive(Debug, Clone)]
pub struct UpdateProduct {
    /// Acting administrator
    pub actor: Actor,
    /// Target product
    pub product_id: ProductId,
    /// Fields to change
    pub patch: ProductPatch,
}

impl Command for UpdateProduct {
    type Output = Product;

    fn name(&self) -> &'static str {
        "update_product"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<Product>> {
        self.actor.require_admin()?;
        let Versioned { version, mut document } = load_product(store, self.product_id).await?;
        self.patch.clone().apply(&mut document);
        let writes = DocumentWrites::new().update(&document, version).build()?;
        Ok(Decision::new(writes, document))
    }
}

/// Removes a product from the catalog.
///
/// Orders and returns keep their captured copies of name and price.
#[derive(Debug, Clone)]
pub struct DeleteProduct {
    /// Acting administrator
    pub actor: Actor,
    /// Target product
    pub product_id: ProductId,
}

impl Command for DeleteProduct {
    type Output = ();

    fn name(&self) -> &'static str {
        "delete_product"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<()>> {
        self.actor.require_admin()?;
        let product = load_product(store, self.product_id).await?;
        let writes = DocumentWrites::new()
            .delete(&product.document, product.version)
            .build()?;
        Ok(Decision::new(writes, ()))
    }
}

/// Overrides a product's stock level.
#[derive(Debug, Clone)]
pub struct SetStock {
    /// Acting administrator
    pub actor: Actor,
    /// Target product
    pub product_id: ProductId,
    /// New stock level
    pub stock: u32,
}

impl Command for SetStock {
    type Output = Product;

    fn name(&self) -> &'static str {
        "set_stock"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<Product>> {
        self.actor.require_admin()?;
        let product = load_product(store, self.product_id).await?;
        let updated = inventory::set_level(&product.document, self.stock);
        let writes = DocumentWrites::new()
            .update(&updated, product.version)
            .build()?;
        Ok(Decision::new(writes, updated))
    }
}

/// Lists products, newest first, optionally restricted to one category.
pub async fn list_products<S: DocumentStore>(
    store: &S,
    category: Option<Category>,
) -> CommandResult<Vec<Product>> {
    let mut products: Vec<Product> = store
        .load_all::<Product>()
        .await?
        .into_iter()
        .map(|versioned| versioned.document)
        .filter(|product| category.is_none_or(|category| product.category == category))
        .collect();
    products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(products)
}

/// Fetches one product.
pub async fn get_product<S: DocumentStore>(store: &S, product_id: ProductId) -> CommandResult<Product> {
    Ok(load_product(store, product_id).await?.document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::executor::CommandExecutor;
    use crate::memory::InMemoryDocumentStore;
    use crate::types::UserId;

    fn admin() -> Actor {
        Actor::new(UserId::new(), Role::Admin)
    }

    fn draft(name: &str, category: Category) -> ProductDraft {
        ProductDraft {
            name: ProductName::try_new(name).unwrap(),
            category,
            description: RequiredText::try_new("Healthy stock").unwrap(),
            price: Money::from_cents(12_000).unwrap(),
            image_url: "/images/product.jpg".to_string(),
            stock: 40,
            specifications: BTreeMap::from([("breed".to_string(), "Sasso".to_string())]),
            minimum_order: None,
            is_available: None,
        }
    }

    #[tokio::test]
    async fn created_products_get_defaults() {
        let executor = CommandExecutor::new(InMemoryDocumentStore::new());

        let product = executor
            .execute(&CreateProduct {
                actor: admin(),
                draft: draft("Sasso chicks", Category::Chicks),
            })
            .await
            .unwrap();

        assert_eq!(product.minimum_order, Quantity::ONE);
        assert!(product.is_available);
        assert_eq!(
            get_product(executor.store(), product.id).await.unwrap(),
            product
        );
    }

    #[tokio::test]
    async fn agents_cannot_manage_the_catalog() {
        let executor = CommandExecutor::new(InMemoryDocumentStore::new());
        let agent = Actor::new(UserId::new(), Role::Agent);

        let result = executor
            .execute(&CreateProduct {
                actor: agent,
                draft: draft("Layer mash", Category::Feeds),
            })
            .await;

        assert!(matches!(result, Err(CommandError::Forbidden(_))));
    }

    #[tokio::test]
    async fn patch_leaves_absent_fields_unchanged_and_honours_false() {
        let executor = CommandExecutor::new(InMemoryDocumentStore::new());
        let product = executor
            .execute(&CreateProduct {
                actor: admin(),
                draft: draft("Layer mash", Category::Feeds),
            })
            .await
            .unwrap();

        let updated = executor
            .execute(&UpdateProduct {
                actor: admin(),
                product_id: product.id,
                patch: ProductPatch {
                    is_available: Some(false),
                    price: Some(Money::from_cents(9_950).unwrap()),
                    ..ProductPatch::default()
                },
            })
            .await
            .unwrap();

        assert!(!updated.is_available);
        assert_eq!(updated.price, Money::from_cents(9_950).unwrap());
        assert_eq!(updated.name, product.name);
        assert_eq!(updated.stock, product.stock);
    }

    #[tokio::test]
    async fn list_filters_by_category() {
        let executor = CommandExecutor::new(InMemoryDocumentStore::new());
        for (name, category) in [
            ("Sasso chicks", Category::Chicks),
            ("Layer mash", Category::Feeds),
            ("Broiler chicks", Category::Chicks),
        ] {
            executor
                .execute(&CreateProduct {
                    actor: admin(),
                    draft: draft(name, category),
                })
                .await
                .unwrap();
        }

        let chicks = list_products(executor.store(), Some(Category::Chicks))
            .await
            .unwrap();
        let all = list_products(executor.store(), None).await.unwrap();

        assert_eq!(chicks.len(), 2);
        assert!(chicks.iter().all(|p| p.category == Category::Chicks));
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn deleted_products_are_gone() {
        let executor = CommandExecutor::new(InMemoryDocumentStore::new());
        let product = executor
            .execute(&CreateProduct {
                actor: admin(),
                draft: draft("Starter crumbs", Category::Feeds),
            })
            .await
            .unwrap();

        executor
            .execute(&DeleteProduct {
                actor: admin(),
                product_id: product.id,
            })
            .await
            .unwrap();

        assert!(matches!(
            get_product(executor.store(), product.id).await,
            Err(CommandError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn set_stock_overrides_level() {
        let executor = CommandExecutor::new(InMemoryDocumentStore::new());
        let product = executor
            .execute(&CreateProduct {
                actor: admin(),
                draft: draft("Grower pellets", Category::Feeds),
            })
            .await
            .unwrap();

        let updated = executor
            .execute(&SetStock {
                actor: admin(),
                product_id: product.id,
                stock: 0,
            })
            .await
            .unwrap();

        assert_eq!(updated.stock, 0);
    }
}
