//! Read-only reference catalogs: kingdoms, bestiary tables, contracts and adventures.

use serde::{Deserialize, Serialize};

use crate::Tier;

/// One difficulty column of a kingdom's bestiary table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageDefinition {
    pub label: String,
    pub chapter: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BestiaryMonster {
    pub monster_id: String,
    #[serde(default)]
    pub name: String,
    /// Level per stage column; `None` means absent at that stage.
    #[serde(default)]
    pub levels: Vec<Option<u8>>,
}

impl BestiaryMonster {
    pub fn level_at(&self, stage_index: usize) -> Option<u8> {
        self.levels.get(stage_index).copied().flatten()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bestiary {
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
    #[serde(default)]
    pub monsters: Vec<BestiaryMonster>,
}

impl Bestiary {
    pub fn monster(&self, monster_id: &str) -> Option<&BestiaryMonster> {
        self.monsters
            .iter()
            .find(|monster| monster.monster_id == monster_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractDefinition {
    pub contract_id: String,
    pub tier: Tier,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub setup: String,
    #[serde(default)]
    pub reward: String,
    #[serde(default)]
    pub single_attempt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdventureDefinition {
    pub adventure_id: String,
    #[serde(default)]
    pub title: String,
    pub roll_min: u8,
    pub roll_max: u8,
    #[serde(default)]
    pub single_attempt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KingdomDefinition {
    pub kingdom_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub districts: Vec<String>,
    #[serde(default)]
    pub bestiary: Bestiary,
    #[serde(default)]
    pub contracts: Vec<ContractDefinition>,
    #[serde(default)]
    pub adventures: Vec<AdventureDefinition>,
}

impl KingdomDefinition {
    pub fn contract(&self, contract_id: &str) -> Option<&ContractDefinition> {
        self.contracts
            .iter()
            .find(|contract| contract.contract_id == contract_id)
    }

    pub fn adventure(&self, adventure_id: &str) -> Option<&AdventureDefinition> {
        self.adventures
            .iter()
            .find(|adventure| adventure.adventure_id == adventure_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceCatalog {
    #[serde(default)]
    pub kingdoms: Vec<KingdomDefinition>,
}

impl ReferenceCatalog {
    pub fn kingdom(&self, kingdom_id: &str) -> Option<&KingdomDefinition> {
        self.kingdoms
            .iter()
            .find(|kingdom| kingdom.kingdom_id == kingdom_id)
    }
}
