use contracts::{
    Campaign, ChapterProgress, Command, CommandPayload, Event, EventType, KingdomDefinition,
    KingdomProgress, Knight, SelectedContract, Tier,
};
use serde_json::json;

use super::{PendingEvent, ProgressionEngine};
use crate::error::{EntityKind, ProgressionError, ProgressionResult, RuleViolation};
use crate::{adventure, expedition, gate, ledger, stager, tier};

fn event(event_type: EventType, subject_id: &str, details: Option<serde_json::Value>) -> PendingEvent {
    PendingEvent {
        event_type,
        subject_id: subject_id.to_string(),
        details,
    }
}

fn kingdom_progress(campaign: &Campaign, kingdom_id: &str) -> KingdomProgress {
    campaign
        .kingdoms
        .get(kingdom_id)
        .cloned()
        .unwrap_or_default()
}

impl ProgressionEngine {
    /// Applies one command. On error nothing is changed and no event is emitted.
    pub fn apply(&mut self, command: &Command) -> ProgressionResult<&[Event]> {
        let now_ms = command.issued_at_ms;
        let mut pending = Vec::new();

        match &command.payload {
            CommandPayload::RegisterKnight { knight_uid, name } => {
                if self.state.knights.contains_key(knight_uid) {
                    return Err(ProgressionError::AlreadyExists {
                        kind: EntityKind::Knight,
                        id: knight_uid.clone(),
                    });
                }
                self.state
                    .knights
                    .insert(knight_uid.clone(), Knight::new(knight_uid.clone(), name.clone()));
                pending.push(event(EventType::KnightRegistered, knight_uid, None));
            }
            CommandPayload::CreateCampaign {
                campaign_id,
                name,
                members,
            } => {
                if self.state.campaigns.contains_key(campaign_id) {
                    return Err(ProgressionError::AlreadyExists {
                        kind: EntityKind::Campaign,
                        id: campaign_id.clone(),
                    });
                }
                let mut campaign = Campaign::new(campaign_id.clone(), name.clone());
                for member in members {
                    self.knight(member)?;
                    if !campaign.is_member(member) {
                        campaign.members.push(member.clone());
                    }
                }
                self.state.campaigns.insert(campaign_id.clone(), campaign);
                pending.push(event(
                    EventType::CampaignCreated,
                    campaign_id,
                    Some(json!({ "members": members })),
                ));
            }
            CommandPayload::AddCampaignMember {
                campaign_id,
                knight_uid,
            } => {
                self.knight(knight_uid)?;
                let mut campaign = self.campaign(campaign_id)?.clone();
                if !campaign.is_member(knight_uid) {
                    campaign.members.push(knight_uid.clone());
                }
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::CampaignMemberAdded,
                    campaign_id,
                    Some(json!({ "knight_uid": knight_uid })),
                ));
            }
            CommandPayload::AbandonCampaign { campaign_id } => {
                self.campaign(campaign_id)?;
                self.state.campaigns.remove(campaign_id);
                pending.push(event(EventType::CampaignAbandoned, campaign_id, None));
            }
            CommandPayload::SetPartyLeader {
                campaign_id,
                knight_uid,
            } => {
                let campaign = expedition::set_party_leader(self.campaign(campaign_id)?, knight_uid)?;
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::PartyLeaderSet,
                    campaign_id,
                    Some(json!({ "knight_uid": knight_uid })),
                ));
            }
            CommandPayload::RecordInvestigationAttempt {
                knight_uid,
                chapter,
                code,
                via,
                result,
            } => {
                let knight = self.knight(knight_uid)?;
                let progress = ledger::record_attempt(
                    &knight.chapter(*chapter),
                    code.clone(),
                    *via,
                    *result,
                    now_ms,
                )?;
                pending.push(event(
                    EventType::InvestigationRecorded,
                    knight_uid,
                    Some(json!({
                        "chapter": chapter,
                        "code": code,
                        "via": via,
                        "result": result,
                        "distinct_normal": ledger::count_distinct_normal(&progress),
                        "distinct_total": ledger::count_distinct_total(&progress),
                    })),
                ));
                self.store_chapter(knight_uid, *chapter, progress, &mut pending);
            }
            CommandPayload::ConvertFailToLead {
                knight_uid,
                chapter,
                code,
            } => {
                let knight = self.knight(knight_uid)?;
                let progress = ledger::convert_fail_to_lead(&knight.chapter(*chapter), code)?;
                pending.push(event(
                    EventType::FailConvertedToLead,
                    knight_uid,
                    Some(json!({ "chapter": chapter, "code": code })),
                ));
                self.store_chapter(knight_uid, *chapter, progress, &mut pending);
            }
            CommandPayload::RecordQuestOutcome {
                knight_uid,
                chapter,
                outcome,
            } => {
                let knight = self.knight(knight_uid)?;
                let progress = ledger::record_quest(&knight.chapter(*chapter), *outcome);
                pending.push(event(
                    EventType::QuestRecorded,
                    knight_uid,
                    Some(json!({ "chapter": chapter, "outcome": outcome })),
                ));
                self.store_chapter(knight_uid, *chapter, progress, &mut pending);
            }
            CommandPayload::SelectContract {
                campaign_id,
                kingdom_id,
                contract_id,
            } => {
                let campaign = self.campaign(campaign_id)?;
                let contract = self
                    .kingdom_definition(kingdom_id)?
                    .contract(contract_id)
                    .ok_or_else(|| ProgressionError::not_found(EntityKind::Contract, contract_id))?;
                let leader_tier = self.party_leader_tier(campaign);
                if !gate::is_selectable(contract.tier, leader_tier) {
                    return Err(RuleViolation::ContractTierLocked {
                        required: contract.tier,
                        current: leader_tier,
                    }
                    .into());
                }
                let mut campaign = campaign.clone();
                campaign.selected_contract = Some(SelectedContract {
                    kingdom_id: kingdom_id.clone(),
                    contract_id: contract_id.clone(),
                });
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::ContractSelected,
                    campaign_id,
                    Some(json!({ "kingdom_id": kingdom_id, "contract_id": contract_id })),
                ));
            }
            CommandPayload::CompleteContract {
                campaign_id,
                kingdom_id,
                contract_id,
            } => {
                let single_attempt = self
                    .kingdom_definition(kingdom_id)?
                    .contract(contract_id)
                    .ok_or_else(|| ProgressionError::not_found(EntityKind::Contract, contract_id))?
                    .single_attempt;
                let mut campaign = self.campaign(campaign_id)?.clone();
                let kingdom = adventure::complete_contract(
                    &kingdom_progress(&campaign, kingdom_id),
                    contract_id,
                    single_attempt,
                );
                let count = kingdom.contracts.get(contract_id).copied().unwrap_or(0);
                campaign.kingdoms.insert(kingdom_id.clone(), kingdom);
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::ContractCompleted,
                    campaign_id,
                    Some(json!({
                        "kingdom_id": kingdom_id,
                        "contract_id": contract_id,
                        "count": count,
                    })),
                ));
            }
            CommandPayload::SetExpeditionPhase { campaign_id, phase } => {
                let campaign =
                    expedition::set_expedition_phase(self.campaign(campaign_id)?, *phase, now_ms)?;
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::ExpeditionPhaseChanged,
                    campaign_id,
                    Some(json!({ "phase": phase })),
                ));
            }
            CommandPayload::DeclareKnightChoice {
                campaign_id,
                knight_uid,
                choice,
            } => {
                let campaign = expedition::declare_knight_choice(
                    self.campaign(campaign_id)?,
                    knight_uid,
                    *choice,
                )?;
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::KnightChoiceUpdated,
                    campaign_id,
                    Some(json!({ "knight_uid": knight_uid, "choice": choice })),
                ));
            }
            CommandPayload::ResolveKnightChoice {
                campaign_id,
                knight_uid,
            } => {
                let campaign =
                    expedition::resolve_knight_choice(self.campaign(campaign_id)?, knight_uid)?;
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::KnightChoiceUpdated,
                    campaign_id,
                    Some(json!({ "knight_uid": knight_uid, "status": "resolved" })),
                ));
            }
            CommandPayload::AdvanceThreatTrack { campaign_id, steps } => {
                let before = self.campaign(campaign_id)?;
                let surged_before = threat_surge_triggered(before);
                let campaign = expedition::advance_threat_track(before, *steps)?;
                if threat_surge_triggered(&campaign) && !surged_before {
                    pending.push(event(EventType::ThreatSurgeTriggered, campaign_id, None));
                }
                self.store_delve(campaign, "advance_threat_track", &mut pending);
            }
            CommandPayload::AdvanceTimeTrack { campaign_id, steps } => {
                let campaign = expedition::advance_time_track(self.campaign(campaign_id)?, *steps)?;
                self.store_delve(campaign, "advance_time_track", &mut pending);
            }
            CommandPayload::SetCurrentLocation {
                campaign_id,
                location_id,
            } => {
                let campaign =
                    expedition::set_current_location(self.campaign(campaign_id)?, location_id)?;
                self.store_delve(campaign, "set_current_location", &mut pending);
            }
            CommandPayload::AddClue {
                campaign_id,
                clue_id,
            } => {
                let campaign = expedition::add_clue(self.campaign(campaign_id)?, clue_id)?;
                self.store_delve(campaign, "add_clue", &mut pending);
            }
            CommandPayload::AddObjective {
                campaign_id,
                objective_id,
            } => {
                let campaign = expedition::add_objective(self.campaign(campaign_id)?, objective_id)?;
                self.store_delve(campaign, "add_objective", &mut pending);
            }
            CommandPayload::CompleteObjective {
                campaign_id,
                objective_id,
            } => {
                let campaign =
                    expedition::complete_objective(self.campaign(campaign_id)?, objective_id)?;
                self.store_delve(campaign, "complete_objective", &mut pending);
            }
            CommandPayload::TrackDelveContract {
                campaign_id,
                contract_id,
            } => {
                let campaign =
                    expedition::track_delve_contract(self.campaign(campaign_id)?, contract_id)?;
                self.store_delve(campaign, "track_delve_contract", &mut pending);
            }
            CommandPayload::UseRestAbility {
                campaign_id,
                ability_id,
            } => {
                let campaign = expedition::use_rest_ability(self.campaign(campaign_id)?, ability_id)?;
                self.store_rest(campaign, "use_rest_ability", &mut pending);
            }
            CommandPayload::DiscardResourceTokens { campaign_id, count } => {
                let campaign =
                    expedition::discard_resource_tokens(self.campaign(campaign_id)?, *count)?;
                self.store_rest(campaign, "discard_resource_tokens", &mut pending);
            }
            CommandPayload::PerformMonsterRotation { campaign_id } => {
                let mut campaign =
                    expedition::perform_monster_rotation(self.campaign(campaign_id)?)?;
                if let Some(selected) = campaign.selected_contract.clone() {
                    campaign = self.rotate_wheel(&campaign, &selected.kingdom_id)?;
                    pending.push(self.rotation_event(&campaign, &selected.kingdom_id));
                }
                self.store_rest(campaign, "perform_monster_rotation", &mut pending);
            }
            CommandPayload::ResolveCampfireTale {
                campaign_id,
                tale_id,
                rapport_bonus,
                result,
            } => {
                let campaign = expedition::resolve_campfire_tale(
                    self.campaign(campaign_id)?,
                    tale_id,
                    *rapport_bonus,
                    *result,
                )?;
                self.store_rest(campaign, "resolve_campfire_tale", &mut pending);
            }
            CommandPayload::CompleteClash {
                campaign_id,
                clash_type,
                outcome,
                wounds_dealt,
                wounds_received,
                special_effects,
            } => {
                let campaign = expedition::complete_clash(
                    self.campaign(campaign_id)?,
                    *clash_type,
                    *outcome,
                    *wounds_dealt,
                    *wounds_received,
                    special_effects.clone(),
                )?;
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::ClashCompleted,
                    campaign_id,
                    Some(json!({
                        "clash_type": clash_type,
                        "outcome": outcome,
                        "wounds_dealt": wounds_dealt,
                        "wounds_received": wounds_received,
                    })),
                ));
            }
            CommandPayload::ClaimSpoil {
                campaign_id,
                reward_id,
            } => {
                let campaign = expedition::claim_spoil(self.campaign(campaign_id)?, reward_id)?;
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::SpoilClaimed,
                    campaign_id,
                    Some(json!({ "reward_id": reward_id })),
                ));
            }
            CommandPayload::RotateDistrictWheel {
                campaign_id,
                kingdom_id,
            } => {
                let campaign = self.rotate_wheel(self.campaign(campaign_id)?, kingdom_id)?;
                pending.push(self.rotation_event(&campaign, kingdom_id));
                self.store_campaign(campaign);
            }
            CommandPayload::ReassignDistrictMonster {
                campaign_id,
                kingdom_id,
                district_id,
                monster_id,
            } => {
                let definition = self.kingdom_definition(kingdom_id)?;
                if definition.bestiary.monster(monster_id).is_none() {
                    return Err(ProgressionError::not_found(EntityKind::Monster, monster_id));
                }
                let mut campaign = self.campaign(campaign_id)?.clone();
                let mut kingdom = kingdom_progress(&campaign, kingdom_id);
                let wheel = kingdom
                    .district_wheel
                    .clone()
                    .unwrap_or_else(|| stager::new_wheel(definition));
                kingdom.district_wheel = Some(stager::reassign(&wheel, district_id, monster_id)?);
                campaign.kingdoms.insert(kingdom_id.clone(), kingdom);
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::DistrictMonsterReassigned,
                    campaign_id,
                    Some(json!({
                        "kingdom_id": kingdom_id,
                        "district_id": district_id,
                        "monster_id": monster_id,
                    })),
                ));
            }
            CommandPayload::SetAdventureProgress {
                campaign_id,
                kingdom_id,
                adventure_id,
                single_attempt,
                delta,
            } => {
                let definition = self
                    .kingdom_definition(kingdom_id)?
                    .adventure(adventure_id)
                    .ok_or_else(|| ProgressionError::not_found(EntityKind::Adventure, adventure_id))?;
                let single_attempt = single_attempt.unwrap_or(definition.single_attempt);
                let mut campaign = self.campaign(campaign_id)?.clone();
                let kingdom = adventure::set_adventure_progress(
                    &kingdom_progress(&campaign, kingdom_id),
                    adventure_id,
                    single_attempt,
                    *delta,
                );
                let count = kingdom.adventures.get(adventure_id).copied().unwrap_or(0);
                campaign.kingdoms.insert(kingdom_id.clone(), kingdom);
                self.store_campaign(campaign);
                pending.push(event(
                    EventType::AdventureProgressed,
                    campaign_id,
                    Some(json!({
                        "kingdom_id": kingdom_id,
                        "adventure_id": adventure_id,
                        "count": count,
                    })),
                ));
            }
        }

        Ok(self.commit_events(&command.command_id, now_ms, pending))
    }

    pub(super) fn kingdom_definition(&self, kingdom_id: &str) -> ProgressionResult<&KingdomDefinition> {
        self.catalog
            .kingdom(kingdom_id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Kingdom, kingdom_id))
    }

    /// Redraws the kingdom's wheel from the monsters eligible at the active stage.
    fn rotate_wheel(&self, campaign: &Campaign, kingdom_id: &str) -> ProgressionResult<Campaign> {
        let definition = self.kingdom_definition(kingdom_id)?;
        let pool = self
            .active_stage_for(campaign, definition)
            .map(|stage| {
                stager::eligible_monsters(&definition.bestiary, stage)
                    .into_iter()
                    .map(|monster| monster.monster_id.clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut next = campaign.clone();
        let mut kingdom = kingdom_progress(&next, kingdom_id);
        let wheel = kingdom
            .district_wheel
            .clone()
            .unwrap_or_else(|| stager::new_wheel(definition));
        kingdom.district_wheel = Some(stager::rotate(&wheel, &pool));
        next.kingdoms.insert(kingdom_id.to_string(), kingdom);
        Ok(next)
    }

    fn rotation_event(&self, campaign: &Campaign, kingdom_id: &str) -> PendingEvent {
        let wheel = campaign
            .kingdoms
            .get(kingdom_id)
            .and_then(|kingdom| kingdom.district_wheel.as_ref());
        event(
            EventType::DistrictWheelRotated,
            &campaign.campaign_id,
            Some(json!({
                "kingdom_id": kingdom_id,
                "rotation": wheel.map(|wheel| wheel.current_rotation),
                "assignments": wheel.map(|wheel| &wheel.assignments),
            })),
        )
    }

    fn store_campaign(&mut self, campaign: Campaign) {
        self.state
            .campaigns
            .insert(campaign.campaign_id.clone(), campaign);
    }

    fn store_delve(&mut self, campaign: Campaign, action: &str, pending: &mut Vec<PendingEvent>) {
        pending.push(event(
            EventType::DelveProgressUpdated,
            &campaign.campaign_id,
            Some(json!({ "action": action })),
        ));
        self.store_campaign(campaign);
    }

    fn store_rest(&mut self, campaign: Campaign, action: &str, pending: &mut Vec<PendingEvent>) {
        pending.push(event(
            EventType::RestProgressUpdated,
            &campaign.campaign_id,
            Some(json!({ "action": action })),
        ));
        self.store_campaign(campaign);
    }

    /// Replaces one chapter and reports a tier change if the totals crossed a threshold.
    fn store_chapter(
        &mut self,
        knight_uid: &str,
        chapter: u32,
        progress: ChapterProgress,
        pending: &mut Vec<PendingEvent>,
    ) {
        let Some(knight) = self.state.knights.get_mut(knight_uid) else {
            return;
        };
        let before: Tier = tier::calculate_tier(knight);
        knight.chapters.insert(chapter, progress);
        let after = tier::calculate_tier(knight);
        if after != before {
            pending.push(event(
                EventType::TierChanged,
                knight_uid,
                Some(json!({ "from": before, "to": after })),
            ));
        }
    }
}

fn threat_surge_triggered(campaign: &Campaign) -> bool {
    campaign
        .expedition
        .as_ref()
        .and_then(|expedition| expedition.delve_progress.as_ref())
        .map(|delve| delve.threat_surge_triggered)
        .unwrap_or(false)
}
