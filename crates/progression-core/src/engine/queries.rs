use contracts::{
    BestiaryMonster, Campaign, DistrictWheel, ExpeditionChoice, KingdomDefinition, Tier,
};
use serde::Serialize;

use super::ProgressionEngine;
use crate::error::ProgressionResult;
use crate::gate::{self, ContractOption};
use crate::stager::{self, StageInputs};
use crate::{ledger, tier};

/// Per-chapter investigation counts as shown on a knight sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChapterSummary {
    pub chapter: u32,
    pub distinct_normal: usize,
    pub distinct_lead: usize,
    pub distinct_total: usize,
    pub distinct_attempted: usize,
    pub quest_completed: bool,
    pub normal_locked: bool,
}

impl ProgressionEngine {
    pub fn calculate_tier(&self, knight_uid: &str) -> ProgressionResult<Tier> {
        Ok(tier::calculate_tier(self.knight(knight_uid)?))
    }

    pub fn available_contract_tiers(&self, knight_uid: &str) -> ProgressionResult<Vec<Tier>> {
        Ok(gate::available_tiers(self.calculate_tier(knight_uid)?))
    }

    pub fn chapter_summary(&self, knight_uid: &str, chapter: u32) -> ProgressionResult<ChapterSummary> {
        let progress = self.knight(knight_uid)?.chapter(chapter);
        Ok(ChapterSummary {
            chapter,
            distinct_normal: ledger::count_distinct_normal(&progress),
            distinct_lead: ledger::count_distinct_lead(&progress),
            distinct_total: ledger::count_distinct_total(&progress),
            distinct_attempted: ledger::count_distinct_attempted(&progress),
            quest_completed: progress.quest_completed(),
            normal_locked: ledger::is_normal_locked(&progress),
        })
    }

    /// Tier of the campaign's party leader; `mob` while no leader is set.
    pub fn leader_tier(&self, campaign_id: &str) -> ProgressionResult<Tier> {
        Ok(self.party_leader_tier(self.campaign(campaign_id)?))
    }

    pub fn contract_options(
        &self,
        campaign_id: &str,
        kingdom_id: &str,
    ) -> ProgressionResult<Vec<ContractOption<'_>>> {
        let leader_tier = self.leader_tier(campaign_id)?;
        Ok(gate::contract_options(
            self.kingdom_definition(kingdom_id)?,
            leader_tier,
        ))
    }

    pub fn active_stage(&self, campaign_id: &str, kingdom_id: &str) -> ProgressionResult<Option<usize>> {
        let campaign = self.campaign(campaign_id)?;
        Ok(self.active_stage_for(campaign, self.kingdom_definition(kingdom_id)?))
    }

    pub fn eligible_monsters(
        &self,
        campaign_id: &str,
        kingdom_id: &str,
    ) -> ProgressionResult<Vec<&BestiaryMonster>> {
        let campaign = self.campaign(campaign_id)?;
        let definition = self.kingdom_definition(kingdom_id)?;
        Ok(self
            .active_stage_for(campaign, definition)
            .map(|stage| stager::eligible_monsters(&definition.bestiary, stage))
            .unwrap_or_default())
    }

    /// Current wheel for a campaign's kingdom, or the empty wheel if it never rotated.
    pub fn district_wheel(&self, campaign_id: &str, kingdom_id: &str) -> ProgressionResult<DistrictWheel> {
        let campaign = self.campaign(campaign_id)?;
        let definition = self.kingdom_definition(kingdom_id)?;
        Ok(campaign
            .kingdoms
            .get(kingdom_id)
            .and_then(|kingdom| kingdom.district_wheel.clone())
            .unwrap_or_else(|| stager::new_wheel(definition)))
    }

    pub(super) fn party_leader_tier(&self, campaign: &Campaign) -> Tier {
        campaign
            .party_leader_uid
            .as_deref()
            .and_then(|uid| self.state.knights.get(uid))
            .map(tier::calculate_tier)
            .unwrap_or_default()
    }

    pub(super) fn active_stage_for(
        &self,
        campaign: &Campaign,
        definition: &KingdomDefinition,
    ) -> Option<usize> {
        let choices = campaign
            .expedition
            .as_ref()
            .map(|expedition| &expedition.knight_choices);
        let all_choices = choices
            .map(|choices| choices.values().map(|entry| entry.choice).collect::<Vec<_>>())
            .unwrap_or_default();

        let leader_uid = campaign.party_leader_uid.as_deref();
        let leader = leader_uid.and_then(|uid| self.state.knights.get(uid));
        let leader_choice: Option<ExpeditionChoice> = leader_uid
            .and_then(|uid| choices.and_then(|choices| choices.get(uid)))
            .map(|entry| entry.choice);
        let current_chapter = leader.map(ledger::current_chapter).unwrap_or(1);
        let leader_completed_investigations = leader
            .map(|knight| ledger::count_distinct_total(&knight.chapter(current_chapter)))
            .unwrap_or(0);

        stager::stage_index(
            &definition.bestiary,
            &StageInputs {
                leader_choice,
                current_chapter,
                all_choices: &all_choices,
                leader_completed_investigations,
            },
        )
    }
}
