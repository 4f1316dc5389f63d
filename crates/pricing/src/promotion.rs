use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::validate::required_text;
use storefront_core::{DomainError, DomainResult, Entity, PricingRuleId, PromotionId, ValidationErrors, nullable};

use crate::PricingRule;

pub const CODE_MAX: usize = 40;
pub const NAME_MAX: usize = 160;

pub const UNAVAILABLE: &str = "This promotion is no longer available.";
pub const NOT_IN_EFFECT: &str = "This promotion is not currently in effect.";

/// Coupon code linked to a pricing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "rule")]
    pub rule_id: PricingRuleId,
    pub active: bool,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
}

impl Entity for Promotion {
    type Id = PromotionId;

    fn id(&self) -> PromotionId {
        self.id
    }
}

/// Canonical form used for case-insensitive code lookups.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl Promotion {
    pub fn create(draft: PromotionDraft) -> DomainResult<Self> {
        let promotion = Self {
            id: PromotionId::new(),
            code: draft.code.trim().to_string(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            rule_id: draft.rule,
            active: draft.active,
            usage_limit: draft.usage_limit,
            used_count: 0,
        };
        promotion.validate()?;
        Ok(promotion)
    }

    pub fn apply(&mut self, patch: PromotionPatch) -> DomainResult<()> {
        if let Some(code) = patch.code {
            self.code = code.trim().to_string();
        }
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(d) = patch.description {
            self.description = d;
        }
        if let Some(rule) = patch.rule {
            self.rule_id = rule;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(limit) = patch.usage_limit {
            self.usage_limit = limit;
        }
        self.validate()
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "code", &self.code, CODE_MAX);
        required_text(&mut errors, "name", &self.name, NAME_MAX);
        errors.check(
            self.usage_limit.is_some_and(|l| l < 1),
            "usage_limit",
            "Ensure this value is greater than or equal to 1.",
        );
        errors.into_result()
    }

    pub fn matches_code(&self, code: &str) -> bool {
        normalize_code(&self.code) == normalize_code(code)
    }

    /// Active and under its usage limit.
    pub fn is_available(&self) -> bool {
        self.active && self.usage_limit.is_none_or(|limit| self.used_count < limit)
    }

    /// Check that the promotion can be used right now with `rule`.
    pub fn ensure_usable(&self, rule: &PricingRule, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_available() {
            return Err(DomainError::rule(UNAVAILABLE));
        }
        if !rule.is_in_effect(now) {
            return Err(DomainError::rule(NOT_IN_EFFECT));
        }
        Ok(())
    }

    /// Record one use.
    pub fn redeem(&mut self) -> DomainResult<()> {
        if !self.is_available() {
            return Err(DomainError::rule(UNAVAILABLE));
        }
        self.used_count += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromotionDraft {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub rule: PricingRuleId,
    #[serde(default = "default_true")]
    pub active: bool,
    pub usage_limit: Option<i64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromotionPatch {
    pub code: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub rule: Option<PricingRuleId>,
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub usage_limit: Option<Option<i64>>,
}

/// Promotion with its rule inlined and the computed availability flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionView {
    #[serde(flatten)]
    pub promotion: Promotion,
    pub rule_details: PricingRule,
    pub is_available: bool,
}

impl PromotionView {
    pub fn new(promotion: Promotion, rule: PricingRule) -> Self {
        let is_available = promotion.is_available();
        Self {
            promotion,
            rule_details: rule,
            is_available,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromotionFilter {
    pub active: Option<bool>,
    pub search: Option<String>,
}

impl PromotionFilter {
    pub fn matches(&self, p: &Promotion) -> bool {
        if self.active.is_some_and(|a| a != p.active) {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !p.code.to_lowercase().contains(&term) && !p.name.to_lowercase().contains(&term) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PricingRuleDraft, RuleScope, RuleType};

    fn promotion(limit: Option<i64>) -> Promotion {
        Promotion::create(PromotionDraft {
            code: "SAVE10".to_string(),
            name: "Save 10%".to_string(),
            description: None,
            rule: PricingRuleId::new(),
            active: true,
            usage_limit: limit,
        })
        .unwrap()
    }

    #[test]
    fn availability_tracks_usage_limit() {
        let mut p = promotion(Some(2));
        assert!(p.is_available());
        p.redeem().unwrap();
        p.redeem().unwrap();
        assert!(!p.is_available());
        assert_eq!(p.redeem().unwrap_err().to_string(), UNAVAILABLE);
    }

    #[test]
    fn inactive_is_unavailable() {
        let mut p = promotion(None);
        p.active = false;
        assert!(!p.is_available());
    }

    #[test]
    fn codes_match_case_insensitively() {
        let p = promotion(None);
        assert!(p.matches_code("save10"));
        assert!(p.matches_code("  Save10 "));
        assert!(!p.matches_code("SAVE20"));
    }

    #[test]
    fn usable_requires_rule_in_effect() {
        let p = promotion(None);
        let mut rule = PricingRule::create(PricingRuleDraft {
            name: "Rule".to_string(),
            rule_type: RuleType::Percentage,
            value: 1000,
            applies_to: RuleScope::default(),
            active: true,
            starts_at: None,
            ends_at: None,
        })
        .unwrap();
        assert!(p.ensure_usable(&rule, Utc::now()).is_ok());

        rule.active = false;
        assert_eq!(
            p.ensure_usable(&rule, Utc::now()).unwrap_err().to_string(),
            NOT_IN_EFFECT
        );
    }

    #[test]
    fn zero_usage_limit_is_rejected() {
        let mut p = promotion(None);
        let patch = PromotionPatch {
            usage_limit: Some(Some(0)),
            ..PromotionPatch::default()
        };
        assert!(p.apply(patch).is_err());
    }
}
