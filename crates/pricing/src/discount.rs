use serde::Serialize;

use storefront_core::{CategoryId, DomainResult, Money, ProductId, VariantId};

use crate::{PricingRule, RuleType};

/// One cart or order line as seen by the discount calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub unit_price: Money,
    pub qty: i64,
}

impl PricedLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.qty)
    }

    pub fn checked_line_total(&self) -> DomainResult<Money> {
        self.unit_price.checked_mul(self.qty)
    }
}

/// Discount `rule` grants on `lines`.
///
/// Only lines inside the rule's scope contribute. Percentage rules round
/// half-to-even to the minor unit; fixed rules are capped at the eligible
/// amount, so the result never exceeds the subtotal.
pub fn compute_discount(rule: &PricingRule, lines: &[PricedLine]) -> Money {
    let eligible: Money = lines
        .iter()
        .filter(|l| rule.applies_to.covers(l.variant_id, l.product_id, l.category_id))
        .map(PricedLine::line_total)
        .sum();
    if eligible.is_negative() || eligible.is_zero() {
        return Money::ZERO;
    }

    match rule.rule_type {
        RuleType::Percentage => eligible.percent(rule.value.clamp(0, crate::FULL_PERCENT_BP)),
        RuleType::Fixed => Money::from_minor(rule.value.max(0)).min(eligible),
    }
}

/// Totals for a set of lines with an optional discount applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub subtotal: Money,
    pub discount: Money,
    pub grand_total: Money,
}

impl Quote {
    pub fn new(subtotal: Money, discount: Money) -> Self {
        Self {
            subtotal,
            discount,
            grand_total: subtotal - discount,
        }
    }

    /// Fails when a line or the subtotal does not fit in a `Money`.
    pub fn for_lines(lines: &[PricedLine], rule: Option<&PricingRule>) -> DomainResult<Self> {
        let totals = lines.iter().map(PricedLine::checked_line_total).collect::<DomainResult<Vec<_>>>()?;
        let subtotal = Money::checked_sum(totals)?;
        let discount = rule.map(|r| compute_discount(r, lines)).unwrap_or(Money::ZERO);
        Ok(Self::new(subtotal, discount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleScope;
    use proptest::prelude::*;
    use storefront_core::PricingRuleId;

    fn rule(rule_type: RuleType, value: i64, scope: RuleScope) -> PricingRule {
        PricingRule {
            id: PricingRuleId::new(),
            name: "rule".to_string(),
            rule_type,
            value,
            applies_to: scope,
            active: true,
            starts_at: None,
            ends_at: None,
        }
    }

    fn line(unit: i64, qty: i64) -> PricedLine {
        PricedLine {
            variant_id: VariantId::new(),
            product_id: ProductId::new(),
            category_id: CategoryId::new(),
            unit_price: Money::from_minor(unit),
            qty,
        }
    }

    #[test]
    fn percentage_of_whole_cart() {
        // 10% of 2 x 29.99 = 5.998 -> 6.00
        let r = rule(RuleType::Percentage, 1000, RuleScope::default());
        let quote = Quote::for_lines(&[line(2999, 2)], Some(&r)).unwrap();
        assert_eq!(quote.subtotal, Money::from_minor(5998));
        assert_eq!(quote.discount, Money::from_minor(600));
        assert_eq!(quote.grand_total, Money::from_minor(5398));
    }

    #[test]
    fn fixed_discount_is_capped_at_eligible_amount() {
        let r = rule(RuleType::Fixed, 10_000, RuleScope::default());
        assert_eq!(compute_discount(&r, &[line(2500, 1)]), Money::from_minor(2500));

        let r = rule(RuleType::Fixed, 500, RuleScope::default());
        assert_eq!(compute_discount(&r, &[line(2500, 1)]), Money::from_minor(500));
    }

    #[test]
    fn scoped_rule_only_discounts_matching_lines() {
        let target = line(1000, 1);
        let other = line(4000, 1);
        let r = rule(
            RuleType::Percentage,
            5000,
            RuleScope {
                products: vec![target.product_id],
                ..RuleScope::default()
            },
        );
        let quote = Quote::for_lines(&[target, other], Some(&r)).unwrap();
        assert_eq!(quote.subtotal, Money::from_minor(5000));
        assert_eq!(quote.discount, Money::from_minor(500));
    }

    #[test]
    fn no_rule_means_no_discount() {
        let quote = Quote::for_lines(&[line(100, 3)], None).unwrap();
        assert_eq!(quote, Quote::new(Money::from_minor(300), Money::ZERO));
    }

    #[test]
    fn oversized_quantity_is_a_validation_error() {
        let r = rule(RuleType::Percentage, 500, RuleScope::default());
        let err = Quote::for_lines(&[line(2999, 9_000_000_000_000_000_000)], Some(&r)).unwrap_err();
        assert!(matches!(err, storefront_core::DomainError::Validation(_)));

        let err = Quote::for_lines(&[line(i64::MAX, 1), line(1, 1)], None).unwrap_err();
        assert!(matches!(err, storefront_core::DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a discount is never negative and never exceeds the subtotal.
        #[test]
        fn discount_never_exceeds_subtotal(
            prices in prop::collection::vec((0i64..1_000_000i64, 1i64..20i64), 0..8),
            percentage in any::<bool>(),
            value in 0i64..2_000_000i64,
        ) {
            let lines: Vec<_> = prices.iter().map(|&(p, q)| line(p, q)).collect();
            let r = if percentage {
                rule(RuleType::Percentage, value % 10_001, RuleScope::default())
            } else {
                rule(RuleType::Fixed, value, RuleScope::default())
            };
            let quote = Quote::for_lines(&lines, Some(&r)).unwrap();
            prop_assert!(quote.discount >= Money::ZERO);
            prop_assert!(quote.discount <= quote.subtotal);
            prop_assert!(quote.grand_total >= Money::ZERO);
        }
    }
}
