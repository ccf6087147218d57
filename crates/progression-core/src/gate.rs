//! Contract gate: which contract tiers a knight may select.

use contracts::{ContractDefinition, KingdomDefinition, Tier};
use serde::Serialize;

/// Every tier up to and including `tier`, in ascending order.
pub fn available_tiers(tier: Tier) -> Vec<Tier> {
    Tier::ALL[..=tier.index()].to_vec()
}

pub fn is_selectable(contract_tier: Tier, knight_tier: Tier) -> bool {
    contract_tier <= knight_tier
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContractOption<'a> {
    pub contract: &'a ContractDefinition,
    pub selectable: bool,
}

/// All of a kingdom's contracts in catalog order; locked ones are kept and flagged.
pub fn contract_options(kingdom: &KingdomDefinition, tier: Tier) -> Vec<ContractOption<'_>> {
    kingdom
        .contracts
        .iter()
        .map(|contract| ContractOption {
            contract,
            selectable: is_selectable(contract.tier, tier),
        })
        .collect()
}
