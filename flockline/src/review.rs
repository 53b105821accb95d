//! Product reviews.

use crate::actor::Actor;
use crate::catalog::Product;
use crate::errors::{CommandError, CommandResult};
use crate::executor::{Command, Decision};
use crate::store::{Collection, Document, DocumentStore, DocumentWrites};
use crate::types::{ProductId, Rating, RequiredText, ReviewId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A user's rating of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Review id
    pub id: ReviewId,
    /// Author
    pub user_id: UserId,
    /// Reviewed product
    pub product_id: ProductId,
    /// One to five stars
    pub rating: Rating,
    /// Review text
    pub comment: RequiredText,
    /// Creation time
    pub created_at: Timestamp,
}

impl Document for Review {
    type Id = ReviewId;
    const COLLECTION: Collection = Collection::Reviews;

    fn id(&self) -> ReviewId {
        self.id
    }
}

/// Posts a review of an existing product.
#[derive(Debug, Clone)]
pub struct CreateReview {
    /// Author
    pub actor: Actor,
    /// Reviewed product
    pub product_id: ProductId,
    /// One to five stars
    pub rating: Rating,
    /// Review text
    pub comment: RequiredText,
}

impl Command for CreateReview {
    type Output = Review;

    fn name(&self) -> &'static str {
        "create_review"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<Review>> {
        if store.load::<Product>(&self.product_id).await?.is_none() {
            return Err(CommandError::not_found("Product", self.product_id));
        }
        let review = Review {
            id: ReviewId::new(),
            user_id: self.actor.user_id,
            product_id: self.product_id,
            rating: self.rating,
            comment: self.comment.clone(),
            created_at: Timestamp::now(),
        };
        let writes = DocumentWrites::new().insert(&review).build()?;
        Ok(Decision::new(writes, review))
    }
}

async fn newest_first<S, F>(store: &S, keep: F) -> CommandResult<Vec<Review>>
where
    S: DocumentStore,
    F: Fn(&Review) -> bool,
{
    let mut reviews: Vec<Review> = store
        .load_all::<Review>()
        .await?
        .into_iter()
        .map(|r| r.document)
        .filter(|r| keep(r))
        .collect();
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(reviews)
}

/// Reviews of one product, newest first.
pub async fn list_reviews_for_product<S: DocumentStore>(
    store: &S,
    product_id: ProductId,
) -> CommandResult<Vec<Review>> {
    newest_first(store, |review| review.product_id == product_id).await
}

/// Every review, newest first. Administrators only.
pub async fn list_reviews<S: DocumentStore>(store: &S, actor: &Actor) -> CommandResult<Vec<Review>> {
    actor.require_admin()?;
    newest_first(store, |_| true).await
}
