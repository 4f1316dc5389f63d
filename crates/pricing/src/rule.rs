use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::validate::required_text;
use storefront_core::{
    CategoryId, DomainError, DomainResult, Entity, PricingRuleId, ProductId, ValidationErrors, VariantId,
    nullable,
};

pub const NAME_MAX: usize = 160;

/// 100% expressed in basis points.
pub const FULL_PERCENT_BP: i64 = 10_000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Percentage,
    Fixed,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(DomainError::field("type", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

/// Which cart lines a rule discounts. An empty scope covers everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleScope {
    pub products: Vec<ProductId>,
    pub variants: Vec<VariantId>,
    pub categories: Vec<CategoryId>,
}

impl RuleScope {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.variants.is_empty() && self.categories.is_empty()
    }

    pub fn covers(&self, variant: VariantId, product: ProductId, category: CategoryId) -> bool {
        self.is_empty()
            || self.variants.contains(&variant)
            || self.products.contains(&product)
            || self.categories.contains(&category)
    }
}

/// Discount definition referenced by promotions.
///
/// `value` is in hundredths: basis points for percentage rules (`1000` is
/// 10%), minor currency units for fixed rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: PricingRuleId,
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub value: i64,
    pub applies_to: RuleScope,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl Entity for PricingRule {
    type Id = PricingRuleId;

    fn id(&self) -> PricingRuleId {
        self.id
    }
}

impl PricingRule {
    pub fn create(draft: PricingRuleDraft) -> DomainResult<Self> {
        let rule = Self {
            id: PricingRuleId::new(),
            name: draft.name.trim().to_string(),
            rule_type: draft.rule_type,
            value: draft.value,
            applies_to: draft.applies_to,
            active: draft.active,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn apply(&mut self, patch: PricingRulePatch) -> DomainResult<()> {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(t) = patch.rule_type {
            self.rule_type = t;
        }
        if let Some(v) = patch.value {
            self.value = v;
        }
        if let Some(scope) = patch.applies_to {
            self.applies_to = scope;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(starts) = patch.starts_at {
            self.starts_at = starts;
        }
        if let Some(ends) = patch.ends_at {
            self.ends_at = ends;
        }
        self.validate()
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "name", &self.name, NAME_MAX);
        errors.check(self.value < 0, "value", "Ensure this value is greater than or equal to 0.");
        errors.check(
            self.rule_type == RuleType::Percentage && self.value > FULL_PERCENT_BP,
            "value",
            "A percentage discount cannot exceed 100%.",
        );
        if let (Some(starts), Some(ends)) = (self.starts_at, self.ends_at) {
            errors.check(starts > ends, "ends_at", "End must not be before start.");
        }
        errors.into_result()
    }

    /// Active and inside its (inclusive) start/end window.
    pub fn is_in_effect(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.starts_at.is_none_or(|s| s <= now)
            && self.ends_at.is_none_or(|e| now <= e)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingRuleDraft {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub value: i64,
    #[serde(default)]
    pub applies_to: RuleScope,
    #[serde(default = "default_true")]
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingRulePatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: Option<RuleType>,
    pub value: Option<i64>,
    pub applies_to: Option<RuleScope>,
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub starts_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct PricingRuleFilter {
    pub active: Option<bool>,
    pub rule_type: Option<RuleType>,
}

impl PricingRuleFilter {
    pub fn matches(&self, rule: &PricingRule) -> bool {
        self.active.is_none_or(|a| a == rule.active) && self.rule_type.is_none_or(|t| t == rule.rule_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rule(rule_type: RuleType, value: i64) -> PricingRule {
        PricingRule::create(PricingRuleDraft {
            name: "Test Rule".to_string(),
            rule_type,
            value,
            applies_to: RuleScope::default(),
            active: true,
            starts_at: None,
            ends_at: None,
        })
        .unwrap()
    }

    #[test]
    fn in_effect_respects_window_and_flag() {
        let now = Utc::now();
        let mut r = rule(RuleType::Percentage, 1000);
        assert!(r.is_in_effect(now));

        r.starts_at = Some(now + Duration::hours(1));
        assert!(!r.is_in_effect(now));

        r.starts_at = Some(now - Duration::hours(2));
        r.ends_at = Some(now - Duration::hours(1));
        assert!(!r.is_in_effect(now));

        r.ends_at = Some(now);
        assert!(r.is_in_effect(now));

        r.active = false;
        assert!(!r.is_in_effect(now));
    }

    #[test]
    fn percentage_is_capped_at_one_hundred() {
        let mut r = rule(RuleType::Fixed, 50_000);
        let patch = PricingRulePatch {
            rule_type: Some(RuleType::Percentage),
            ..PricingRulePatch::default()
        };
        assert!(r.apply(patch).is_err());
    }

    #[test]
    fn window_must_not_be_inverted() {
        let now = Utc::now();
        let mut r = rule(RuleType::Fixed, 500);
        let patch = PricingRulePatch {
            starts_at: Some(Some(now)),
            ends_at: Some(Some(now - Duration::days(1))),
            ..PricingRulePatch::default()
        };
        let err = r.apply(patch).unwrap_err();
        assert!(err.to_string().starts_with("ends_at"));
    }

    #[test]
    fn empty_scope_covers_everything() {
        let scope = RuleScope::default();
        assert!(scope.covers(VariantId::new(), ProductId::new(), CategoryId::new()));

        let category = CategoryId::new();
        let scoped = RuleScope {
            categories: vec![category],
            ..RuleScope::default()
        };
        assert!(scoped.covers(VariantId::new(), ProductId::new(), category));
        assert!(!scoped.covers(VariantId::new(), ProductId::new(), CategoryId::new()));
    }

    #[test]
    fn type_serialises_as_type_field() {
        let json = serde_json::to_value(rule(RuleType::Percentage, 1000)).unwrap();
        assert_eq!(json["type"], "percentage");
        assert_eq!(json["applies_to"]["products"], serde_json::json!([]));
    }
}
