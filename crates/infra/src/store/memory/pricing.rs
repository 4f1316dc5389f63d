use async_trait::async_trait;

use storefront_core::{DomainError, Page, PageRequest, PricingRuleId, PromotionId};
use storefront_pricing::{
    PricingRule, PricingRuleFilter, PricingRulePatch, Promotion, PromotionFilter, PromotionPatch, PromotionView,
};

use super::{InMemoryStore, State, protected, sorted_page};
use crate::error::{StoreError, StoreResult, unique_message};
use crate::store::{PricingStore, active_then_name, invalid_pk};

impl State {
    fn promotion_view(&self, promotion: Promotion) -> StoreResult<PromotionView> {
        let rule = self
            .rules
            .get(&promotion.rule_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("pricing rule"))?;
        Ok(PromotionView::new(promotion, rule))
    }

    fn check_promotion(&self, promotion: &Promotion) -> StoreResult<()> {
        if !self.rules.contains_key(&promotion.rule_id) {
            return Err(invalid_pk("rule", promotion.rule_id).into());
        }
        if self
            .promotions
            .values()
            .any(|p| p.id != promotion.id && p.matches_code(&promotion.code))
        {
            return Err(DomainError::conflict(unique_message("promotions_code_key")).into());
        }
        Ok(())
    }
}

#[async_trait]
impl PricingStore for InMemoryStore {
    async fn list_rules(&self, filter: PricingRuleFilter, page: PageRequest) -> StoreResult<Page<PricingRule>> {
        let state = self.read();
        let matching = state.rules.values().filter(|r| filter.matches(r)).cloned().collect();
        Ok(sorted_page(
            matching,
            |a: &PricingRule, b: &PricingRule| {
                active_then_name((a.active, &a.name), (b.active, &b.name)).then_with(|| a.id.cmp(&b.id))
            },
            page,
        ))
    }

    async fn get_rule(&self, id: PricingRuleId) -> StoreResult<PricingRule> {
        let state = self.read();
        state.rules.get(&id).cloned().ok_or_else(|| StoreError::not_found("pricing rule"))
    }

    async fn create_rule(&self, rule: PricingRule) -> StoreResult<PricingRule> {
        let mut state = self.write();
        state.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update_rule(&self, id: PricingRuleId, patch: PricingRulePatch) -> StoreResult<PricingRule> {
        let mut state = self.write();
        let rule = state.rules.get_mut(&id).ok_or_else(|| StoreError::not_found("pricing rule"))?;
        let mut updated = rule.clone();
        updated.apply(patch)?;
        *rule = updated.clone();
        Ok(updated)
    }

    async fn delete_rule(&self, id: PricingRuleId) -> StoreResult<()> {
        let mut state = self.write();
        if !state.rules.contains_key(&id) {
            return Err(StoreError::not_found("pricing rule"));
        }
        if state.promotions.values().any(|p| p.rule_id == id) {
            return Err(protected("pricing rule"));
        }
        state.rules.remove(&id);
        Ok(())
    }

    async fn list_promotions(&self, filter: PromotionFilter, page: PageRequest) -> StoreResult<Page<PromotionView>> {
        let state = self.read();
        let matching = state.promotions.values().filter(|p| filter.matches(p)).cloned().collect();
        let page = sorted_page(
            matching,
            |a: &Promotion, b: &Promotion| {
                active_then_name((a.active, &a.name), (b.active, &b.name)).then_with(|| a.id.cmp(&b.id))
            },
            page,
        );
        let results = page
            .results
            .into_iter()
            .map(|p| state.promotion_view(p))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page {
            count: page.count,
            page: page.page,
            page_size: page.page_size,
            results,
        })
    }

    async fn get_promotion(&self, id: PromotionId) -> StoreResult<PromotionView> {
        let state = self.read();
        let promotion = state
            .promotions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("promotion"))?;
        state.promotion_view(promotion)
    }

    async fn find_promotion(&self, code: &str) -> StoreResult<Option<(Promotion, PricingRule)>> {
        let state = self.read();
        let Some(promotion) = state.promotions.values().find(|p| p.matches_code(code)) else {
            return Ok(None);
        };
        Ok(state
            .rules
            .get(&promotion.rule_id)
            .map(|rule| (promotion.clone(), rule.clone())))
    }

    async fn create_promotion(&self, promotion: Promotion) -> StoreResult<PromotionView> {
        let mut state = self.write();
        state.check_promotion(&promotion)?;
        state.promotions.insert(promotion.id, promotion.clone());
        state.promotion_view(promotion)
    }

    async fn update_promotion(&self, id: PromotionId, patch: PromotionPatch) -> StoreResult<PromotionView> {
        let mut state = self.write();
        let mut promotion = state
            .promotions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("promotion"))?;
        promotion.apply(patch)?;
        state.check_promotion(&promotion)?;
        state.promotions.insert(id, promotion.clone());
        state.promotion_view(promotion)
    }

    async fn delete_promotion(&self, id: PromotionId) -> StoreResult<()> {
        let mut state = self.write();
        state
            .promotions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("promotion"))
    }
}
