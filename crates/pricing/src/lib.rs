//! `storefront-pricing`: pricing rules, promotion codes and discount maths.

pub mod discount;
pub mod promotion;
pub mod rule;

pub use discount::{PricedLine, Quote, compute_discount};
pub use promotion::{
    Promotion, PromotionDraft, PromotionFilter, PromotionPatch, PromotionView, normalize_code,
};
pub use rule::{
    FULL_PERCENT_BP, PricingRule, PricingRuleDraft, PricingRuleFilter, PricingRulePatch, RuleScope, RuleType,
};
