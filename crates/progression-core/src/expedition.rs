//! Expedition phase machine and the per-phase progress records it owns.
//!
//! Phases only move when a command asks for the next one; nothing here
//! advances on its own.

use contracts::{
    AttemptResult, Campaign, CampfireTale, ChoiceStatus, ClashOutcome, ClashResult, ClashType,
    DelveProgress, Expedition, ExpeditionChoice, ExpeditionPhase, KnightChoice, RestProgress,
    SpoilsProgress, THREAT_SURGE_THRESHOLD, THREAT_TRACK_MAX, TIME_TRACK_MAX,
};

use crate::error::{EntityKind, ProgressionError, ProgressionResult, RuleViolation};

pub fn has_expedition_started(campaign: &Campaign) -> bool {
    campaign.expedition.is_some()
}

pub fn is_party_leader_locked(campaign: &Campaign) -> bool {
    has_expedition_started(campaign)
}

pub fn current_phase(campaign: &Campaign) -> Option<ExpeditionPhase> {
    campaign
        .expedition
        .as_ref()
        .map(|expedition| expedition.current_phase)
}

/// The only phase reachable from `current`; `None` means the expedition has
/// not started. `rest` continues into `second_delve`, never back to `delve`.
pub fn next_phase(current: Option<ExpeditionPhase>) -> Option<ExpeditionPhase> {
    match current {
        None => Some(ExpeditionPhase::Vision),
        Some(phase) => {
            let position = ExpeditionPhase::ORDER
                .iter()
                .position(|candidate| *candidate == phase)?;
            ExpeditionPhase::ORDER.get(position + 1).copied()
        }
    }
}

fn final_clash_recorded(expedition: &Expedition) -> bool {
    expedition.clash_results.iter().any(|result| {
        result.phase == ExpeditionPhase::SecondClash && result.clash_type == ClashType::Full
    })
}

pub fn set_party_leader(campaign: &Campaign, knight_uid: &str) -> ProgressionResult<Campaign> {
    if is_party_leader_locked(campaign) {
        return Err(RuleViolation::PartyLeaderLocked.into());
    }
    if !campaign.is_member(knight_uid) {
        return Err(ProgressionError::not_found(EntityKind::Member, knight_uid));
    }

    let mut next = campaign.clone();
    next.party_leader_uid = Some(knight_uid.to_string());
    Ok(next)
}

pub fn set_expedition_phase(
    campaign: &Campaign,
    target: ExpeditionPhase,
    now_ms: u64,
) -> ProgressionResult<Campaign> {
    let from = current_phase(campaign);
    let invalid = RuleViolation::InvalidPhaseTransition { from, to: target };
    if next_phase(from) != Some(target) {
        return Err(invalid.into());
    }

    let mut next = campaign.clone();
    if next.expedition.is_none() {
        next.expedition = Some(Expedition::new(target, now_ms));
        return Ok(next);
    }
    let Some(expedition) = next.expedition.as_mut() else {
        return Err(invalid.into());
    };

    if target == ExpeditionPhase::Spoils && !final_clash_recorded(expedition) {
        return Err(invalid.into());
    }

    expedition.current_phase = target;
    expedition.phase_started_at_ms = now_ms;
    match target {
        ExpeditionPhase::Delve | ExpeditionPhase::SecondDelve => {
            expedition.delve_progress.get_or_insert_with(DelveProgress::default);
        }
        ExpeditionPhase::Rest => {
            expedition.rest_progress.get_or_insert_with(RestProgress::default);
        }
        ExpeditionPhase::Spoils => {
            expedition
                .spoils_progress
                .get_or_insert_with(SpoilsProgress::default);
        }
        ExpeditionPhase::Vision
        | ExpeditionPhase::Outpost
        | ExpeditionPhase::Clash
        | ExpeditionPhase::SecondClash => {}
    }
    Ok(next)
}

fn update_expedition(
    campaign: &Campaign,
    update: impl FnOnce(&mut Expedition) -> ProgressionResult<()>,
) -> ProgressionResult<Campaign> {
    let mut next = campaign.clone();
    let expedition = next
        .expedition
        .as_mut()
        .ok_or(RuleViolation::ExpeditionNotStarted)?;
    update(expedition)?;
    Ok(next)
}

/// Delve actions apply only while a delve phase is current.
fn update_delve(
    campaign: &Campaign,
    action: &'static str,
    update: impl FnOnce(&mut DelveProgress) -> ProgressionResult<()>,
) -> ProgressionResult<Campaign> {
    update_expedition(campaign, |expedition| {
        let phase = expedition.current_phase;
        let not_allowed = RuleViolation::NotAllowedInPhase {
            action,
            phase: Some(phase),
        };
        if !phase.is_delve() {
            return Err(not_allowed.into());
        }
        let delve = expedition.delve_progress.as_mut().ok_or(not_allowed)?;
        update(delve)
    })
}

fn update_rest(
    campaign: &Campaign,
    action: &'static str,
    update: impl FnOnce(&mut RestProgress) -> ProgressionResult<()>,
) -> ProgressionResult<Campaign> {
    update_expedition(campaign, |expedition| {
        let phase = expedition.current_phase;
        let not_allowed = RuleViolation::NotAllowedInPhase {
            action,
            phase: Some(phase),
        };
        if phase != ExpeditionPhase::Rest {
            return Err(not_allowed.into());
        }
        let rest = expedition.rest_progress.as_mut().ok_or(not_allowed)?;
        update(rest)
    })
}

pub fn declare_knight_choice(
    campaign: &Campaign,
    knight_uid: &str,
    choice: ExpeditionChoice,
) -> ProgressionResult<Campaign> {
    if !campaign.is_member(knight_uid) {
        return Err(ProgressionError::not_found(EntityKind::Member, knight_uid));
    }
    update_expedition(campaign, |expedition| {
        expedition.knight_choices.insert(
            knight_uid.to_string(),
            KnightChoice {
                choice,
                status: ChoiceStatus::Declared,
            },
        );
        Ok(())
    })
}

pub fn resolve_knight_choice(campaign: &Campaign, knight_uid: &str) -> ProgressionResult<Campaign> {
    update_expedition(campaign, |expedition| {
        let entry = expedition
            .knight_choices
            .get_mut(knight_uid)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Member, knight_uid))?;
        if entry.status == ChoiceStatus::Resolved {
            return Err(RuleViolation::AlreadyResolved {
                what: "knight_choice",
            }
            .into());
        }
        entry.status = ChoiceStatus::Resolved;
        Ok(())
    })
}

pub fn advance_threat_track(campaign: &Campaign, steps: u8) -> ProgressionResult<Campaign> {
    update_delve(campaign, "advance_threat_track", |delve| {
        delve.threat = delve.threat.saturating_add(steps).min(THREAT_TRACK_MAX);
        if delve.threat >= THREAT_SURGE_THRESHOLD {
            delve.threat_surge_triggered = true;
        }
        Ok(())
    })
}

pub fn advance_time_track(campaign: &Campaign, steps: u8) -> ProgressionResult<Campaign> {
    update_delve(campaign, "advance_time_track", |delve| {
        delve.time = delve.time.saturating_add(steps).min(TIME_TRACK_MAX);
        Ok(())
    })
}

pub fn set_current_location(campaign: &Campaign, location_id: &str) -> ProgressionResult<Campaign> {
    update_delve(campaign, "set_current_location", |delve| {
        delve.current_location = Some(location_id.to_string());
        delve.explored_locations.insert(location_id.to_string());
        Ok(())
    })
}

pub fn add_clue(campaign: &Campaign, clue_id: &str) -> ProgressionResult<Campaign> {
    update_delve(campaign, "add_clue", |delve| {
        delve.discovered_clues.insert(clue_id.to_string());
        Ok(())
    })
}

pub fn add_objective(campaign: &Campaign, objective_id: &str) -> ProgressionResult<Campaign> {
    update_delve(campaign, "add_objective", |delve| {
        delve
            .objectives
            .entry(objective_id.to_string())
            .or_insert(false);
        Ok(())
    })
}

pub fn complete_objective(campaign: &Campaign, objective_id: &str) -> ProgressionResult<Campaign> {
    update_delve(campaign, "complete_objective", |delve| {
        let completed = delve
            .objectives
            .get_mut(objective_id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Objective, objective_id))?;
        *completed = true;
        Ok(())
    })
}

pub fn track_delve_contract(campaign: &Campaign, contract_id: &str) -> ProgressionResult<Campaign> {
    update_delve(campaign, "track_delve_contract", |delve| {
        delve.contracts_in_progress.insert(contract_id.to_string());
        Ok(())
    })
}

pub fn use_rest_ability(campaign: &Campaign, ability_id: &str) -> ProgressionResult<Campaign> {
    update_rest(campaign, "use_rest_ability", |rest| {
        rest.abilities_used.push(ability_id.to_string());
        Ok(())
    })
}

pub fn discard_resource_tokens(campaign: &Campaign, count: u32) -> ProgressionResult<Campaign> {
    update_rest(campaign, "discard_resource_tokens", |rest| {
        rest.resource_tokens_discarded = rest.resource_tokens_discarded.saturating_add(count);
        Ok(())
    })
}

pub fn perform_monster_rotation(campaign: &Campaign) -> ProgressionResult<Campaign> {
    update_rest(campaign, "perform_monster_rotation", |rest| {
        if rest.monster_rotation_performed {
            return Err(RuleViolation::AlreadyResolved {
                what: "monster_rotation",
            }
            .into());
        }
        rest.monster_rotation_performed = true;
        Ok(())
    })
}

pub fn resolve_campfire_tale(
    campaign: &Campaign,
    tale_id: &str,
    rapport_bonus: i32,
    result: AttemptResult,
) -> ProgressionResult<Campaign> {
    update_rest(campaign, "resolve_campfire_tale", |rest| {
        if rest.campfire_tale.is_some() {
            return Err(RuleViolation::AlreadyResolved {
                what: "campfire_tale",
            }
            .into());
        }
        rest.campfire_tale = Some(CampfireTale {
            tale_id: tale_id.to_string(),
            rapport_bonus,
            result,
        });
        Ok(())
    })
}

pub fn complete_clash(
    campaign: &Campaign,
    clash_type: ClashType,
    outcome: ClashOutcome,
    wounds_dealt: u32,
    wounds_received: u32,
    special_effects: Vec<String>,
) -> ProgressionResult<Campaign> {
    update_expedition(campaign, |expedition| {
        let phase = expedition.current_phase;
        if !phase.is_clash() {
            return Err(RuleViolation::NotAllowedInPhase {
                action: "complete_clash",
                phase: Some(phase),
            }
            .into());
        }
        expedition.clash_results.push(ClashResult {
            clash_type,
            phase,
            outcome,
            wounds_dealt,
            wounds_received,
            special_effects,
        });
        Ok(())
    })
}

pub fn claim_spoil(campaign: &Campaign, reward_id: &str) -> ProgressionResult<Campaign> {
    update_expedition(campaign, |expedition| {
        let phase = expedition.current_phase;
        let not_allowed = RuleViolation::NotAllowedInPhase {
            action: "claim_spoil",
            phase: Some(phase),
        };
        if phase != ExpeditionPhase::Spoils {
            return Err(not_allowed.into());
        }
        let spoils = expedition.spoils_progress.as_mut().ok_or(not_allowed)?;
        spoils.claimed_rewards.insert(reward_id.to_string());
        Ok(())
    })
}
