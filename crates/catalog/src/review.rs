use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, DomainResult, Entity, Ordering, ProductId, ReviewId, ValidationErrors};

pub const RATING_MIN: i16 = 1;
pub const RATING_MAX: i16 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    #[serde(rename = "product")]
    pub product_id: ProductId,
    #[serde(rename = "customer")]
    pub customer_id: Option<CustomerId>,
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Review {
    type Id = ReviewId;

    fn id(&self) -> ReviewId {
        self.id
    }
}

/// Rating and comment submitted by a shopper.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDraft {
    /// Required on the flat `/reviews` endpoint, implied by the path on
    /// `/products/:id/reviews`.
    pub product: Option<ProductId>,
    pub rating: i16,
    #[serde(default)]
    pub comment: String,
}

impl Review {
    pub fn create(
        product_id: ProductId,
        customer_id: CustomerId,
        draft: ReviewDraft,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut errors = ValidationErrors::new();
        errors.check(
            !(RATING_MIN..=RATING_MAX).contains(&draft.rating),
            "rating",
            format!("Ensure this value is between {RATING_MIN} and {RATING_MAX}."),
        );
        errors.check(draft.comment.trim().is_empty(), "comment", "This field may not be blank.");
        errors.into_result()?;

        Ok(Self {
            id: ReviewId::new(),
            product_id,
            customer_id: Some(customer_id),
            rating: draft.rating,
            comment: draft.comment,
            created_at: now,
        })
    }

    pub fn is_owned_by(&self, customer: Option<CustomerId>) -> bool {
        customer.is_some() && self.customer_id == customer
    }
}

/// Review plus the author's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub product: Option<ProductId>,
    pub rating: Option<i16>,
}

impl ReviewFilter {
    pub fn matches(&self, r: &Review) -> bool {
        self.product.is_none_or(|p| p == r.product_id) && self.rating.is_none_or(|x| x == r.rating)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReviewSort {
    CreatedAt,
    Rating,
}

impl ReviewSort {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "created_at" => Some(Self::CreatedAt),
            "rating" => Some(Self::Rating),
            _ => None,
        }
    }

    pub fn default_ordering() -> Ordering<Self> {
        Ordering::desc(Self::CreatedAt)
    }

    pub fn compare(ordering: &Ordering<Self>, a: &Review, b: &Review) -> core::cmp::Ordering {
        let ord = match ordering.field {
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::Rating => a.rating.cmp(&b.rating).then_with(|| a.created_at.cmp(&b.created_at)),
        };
        ordering.apply(ord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(rating: i16, comment: &str) -> ReviewDraft {
        ReviewDraft {
            product: None,
            rating,
            comment: comment.to_string(),
        }
    }

    #[test]
    fn rating_must_be_one_to_five() {
        let (p, c) = (ProductId::new(), CustomerId::new());
        assert!(Review::create(p, c, draft(5, "Great product!"), Utc::now()).is_ok());
        for bad in [0, 6, -1] {
            let err = Review::create(p, c, draft(bad, "Great product!"), Utc::now()).unwrap_err();
            assert!(err.to_string().starts_with("rating"));
        }
    }

    #[test]
    fn comment_is_required() {
        let err = Review::create(ProductId::new(), CustomerId::new(), draft(4, "  "), Utc::now()).unwrap_err();
        assert!(err.to_string().starts_with("comment"));
    }

    #[test]
    fn ownership() {
        let owner = CustomerId::new();
        let review = Review::create(ProductId::new(), owner, draft(4, "ok"), Utc::now()).unwrap();
        assert!(review.is_owned_by(Some(owner)));
        assert!(!review.is_owned_by(Some(CustomerId::new())));
        assert!(!review.is_owned_by(None));
    }
}
