//! Campaign, expedition and district wheel records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AttemptResult;

pub const THREAT_TRACK_MAX: u8 = 10;
pub const THREAT_SURGE_THRESHOLD: u8 = 7;
pub const TIME_TRACK_MAX: u8 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectedContract {
    pub kingdom_id: String,
    pub contract_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KingdomProgress {
    #[serde(default)]
    pub adventures: BTreeMap<String, u32>,
    #[serde(default)]
    pub contracts: BTreeMap<String, u32>,
    #[serde(default)]
    pub district_wheel: Option<DistrictWheel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Campaign {
    pub campaign_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub party_leader_uid: Option<String>,
    #[serde(default)]
    pub selected_contract: Option<SelectedContract>,
    #[serde(default)]
    pub kingdoms: BTreeMap<String, KingdomProgress>,
    #[serde(default)]
    pub expedition: Option<Expedition>,
}

impl Campaign {
    pub fn new(campaign_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            name: name.into(),
            members: Vec::new(),
            party_leader_uid: None,
            selected_contract: None,
            kingdoms: BTreeMap::new(),
            expedition: None,
        }
    }

    pub fn is_member(&self, knight_uid: &str) -> bool {
        self.members.iter().any(|member| member == knight_uid)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExpeditionPhase {
    Vision,
    Outpost,
    Delve,
    Clash,
    Rest,
    SecondDelve,
    SecondClash,
    Spoils,
}

impl ExpeditionPhase {
    pub const ORDER: [ExpeditionPhase; 8] = [
        ExpeditionPhase::Vision,
        ExpeditionPhase::Outpost,
        ExpeditionPhase::Delve,
        ExpeditionPhase::Clash,
        ExpeditionPhase::Rest,
        ExpeditionPhase::SecondDelve,
        ExpeditionPhase::SecondClash,
        ExpeditionPhase::Spoils,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Outpost => "outpost",
            Self::Delve => "delve",
            Self::Clash => "clash",
            Self::Rest => "rest",
            Self::SecondDelve => "second_delve",
            Self::SecondClash => "second_clash",
            Self::Spoils => "spoils",
        }
    }

    pub fn is_delve(self) -> bool {
        matches!(self, Self::Delve | Self::SecondDelve)
    }

    pub fn is_clash(self) -> bool {
        matches!(self, Self::Clash | Self::SecondClash)
    }
}

impl fmt::Display for ExpeditionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a knight declared they are pursuing during the vision phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExpeditionChoice {
    Quest,
    Investigation,
    FreeRoam,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceStatus {
    #[default]
    Declared,
    Resolved,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnightChoice {
    pub choice: ExpeditionChoice,
    #[serde(default)]
    pub status: ChoiceStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DelveProgress {
    pub threat: u8,
    pub time: u8,
    pub current_location: Option<String>,
    pub discovered_clues: BTreeSet<String>,
    /// Objective id to completion flag.
    pub objectives: BTreeMap<String, bool>,
    pub contracts_in_progress: BTreeSet<String>,
    pub explored_locations: BTreeSet<String>,
    /// Set the first time threat reaches the surge threshold; never cleared.
    pub threat_surge_triggered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampfireTale {
    pub tale_id: String,
    pub rapport_bonus: i32,
    pub result: AttemptResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RestProgress {
    pub abilities_used: Vec<String>,
    pub resource_tokens_discarded: u32,
    pub monster_rotation_performed: bool,
    pub campfire_tale: Option<CampfireTale>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClashType {
    Exhibition,
    #[default]
    Full,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClashOutcome {
    Victory,
    Defeat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClashResult {
    pub clash_type: ClashType,
    pub phase: ExpeditionPhase,
    pub outcome: ClashOutcome,
    pub wounds_dealt: u32,
    pub wounds_received: u32,
    #[serde(default)]
    pub special_effects: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpoilsProgress {
    pub claimed_rewards: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Expedition {
    pub current_phase: ExpeditionPhase,
    #[serde(default)]
    pub knight_choices: BTreeMap<String, KnightChoice>,
    #[serde(default)]
    pub delve_progress: Option<DelveProgress>,
    #[serde(default)]
    pub rest_progress: Option<RestProgress>,
    #[serde(default)]
    pub clash_results: Vec<ClashResult>,
    #[serde(default)]
    pub spoils_progress: Option<SpoilsProgress>,
    #[serde(default)]
    pub phase_started_at_ms: u64,
}

impl Expedition {
    pub fn new(phase: ExpeditionPhase, started_at_ms: u64) -> Self {
        Self {
            current_phase: phase,
            knight_choices: BTreeMap::new(),
            delve_progress: None,
            rest_progress: None,
            clash_results: Vec::new(),
            spoils_progress: None,
            phase_started_at_ms: started_at_ms,
        }
    }
}

/// Districts of one kingdom map and the monster currently placed in each.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DistrictWheel {
    pub kingdom_id: String,
    #[serde(default)]
    pub districts: Vec<String>,
    #[serde(default)]
    pub current_rotation: u32,
    /// District id to monster id. Never maps two districts to one monster.
    #[serde(default)]
    pub assignments: BTreeMap<String, String>,
}

impl DistrictWheel {
    pub fn new(kingdom_id: impl Into<String>, districts: Vec<String>) -> Self {
        Self {
            kingdom_id: kingdom_id.into(),
            districts,
            current_rotation: 0,
            assignments: BTreeMap::new(),
        }
    }

    pub fn district_of(&self, monster_id: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(_, assigned)| assigned.as_str() == monster_id)
            .map(|(district, _)| district.as_str())
    }
}
