//! District monster stager: bestiary stage selection, eligibility and the
//! injective district-to-monster wheel.

use std::collections::BTreeSet;

use contracts::{Bestiary, BestiaryMonster, DistrictWheel, ExpeditionChoice, KingdomDefinition};

use crate::error::{EntityKind, ProgressionError, ProgressionResult};

/// Completed investigations in the current chapter after which an
/// investigation-minded leader draws from a harder column.
const INVESTIGATION_ESCALATION: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInputs<'a> {
    pub leader_choice: Option<ExpeditionChoice>,
    pub current_chapter: u32,
    pub all_choices: &'a [ExpeditionChoice],
    pub leader_completed_investigations: usize,
}

/// Columns tagged with the current chapter, else the latest earlier chapter
/// that has columns, else the earliest chapter in the table.
fn chapter_columns(bestiary: &Bestiary, current_chapter: u32) -> Vec<usize> {
    let chapters = bestiary
        .stages
        .iter()
        .map(|stage| stage.chapter)
        .collect::<BTreeSet<_>>();
    let Some(chapter) = chapters
        .range(..=current_chapter)
        .next_back()
        .or_else(|| chapters.iter().next())
        .copied()
    else {
        return Vec::new();
    };

    bestiary
        .stages
        .iter()
        .enumerate()
        .filter(|(_, stage)| stage.chapter == chapter)
        .map(|(index, _)| index)
        .collect()
}

fn escalation_steps(inputs: &StageInputs<'_>) -> usize {
    let mut steps = 0;
    match inputs.leader_choice {
        Some(ExpeditionChoice::Quest) => steps += 1,
        Some(ExpeditionChoice::Investigation)
            if inputs.leader_completed_investigations >= INVESTIGATION_ESCALATION =>
        {
            steps += 1
        }
        _ => {}
    }

    let quest_votes = inputs
        .all_choices
        .iter()
        .filter(|choice| **choice == ExpeditionChoice::Quest)
        .count();
    if quest_votes * 2 > inputs.all_choices.len() {
        steps += 1;
    }
    steps
}

/// Active bestiary column for a district draw, or `None` for an empty table.
pub fn stage_index(bestiary: &Bestiary, inputs: &StageInputs<'_>) -> Option<usize> {
    let columns = chapter_columns(bestiary, inputs.current_chapter);
    let last = columns.len().checked_sub(1)?;
    columns.get(escalation_steps(inputs).min(last)).copied()
}

/// Monsters with a level at `stage_index`; missing entries are not available.
pub fn eligible_monsters(bestiary: &Bestiary, stage_index: usize) -> Vec<&BestiaryMonster> {
    bestiary
        .monsters
        .iter()
        .filter(|monster| monster.level_at(stage_index).is_some())
        .collect()
}

pub fn new_wheel(kingdom: &KingdomDefinition) -> DistrictWheel {
    DistrictWheel::new(kingdom.kingdom_id.clone(), kingdom.districts.clone())
}

pub fn is_injective(wheel: &DistrictWheel) -> bool {
    let distinct = wheel.assignments.values().collect::<BTreeSet<_>>();
    distinct.len() == wheel.assignments.len()
}

/// Advances the rotation and redraws every district from `pool`.
///
/// District `i` takes `pool[(rotation + i) % pool.len()]`. Districts past the
/// pool size stay empty rather than repeat a monster.
pub fn rotate(wheel: &DistrictWheel, pool: &[String]) -> DistrictWheel {
    let mut next = wheel.clone();
    next.current_rotation = wheel.current_rotation.saturating_add(1);
    next.assignments.clear();
    if pool.is_empty() {
        return next;
    }

    let offset = next.current_rotation as usize % pool.len();
    for (index, district) in next.districts.iter().enumerate().take(pool.len()) {
        let monster = &pool[(offset + index) % pool.len()];
        next.assignments.insert(district.clone(), monster.clone());
    }
    next
}

/// Places `monster_id` in `district_id`. A monster already standing in
/// another district trades places with this district's occupant.
pub fn reassign(
    wheel: &DistrictWheel,
    district_id: &str,
    monster_id: &str,
) -> ProgressionResult<DistrictWheel> {
    if !wheel.districts.iter().any(|district| district == district_id) {
        return Err(ProgressionError::not_found(EntityKind::District, district_id));
    }

    let mut next = wheel.clone();
    let displaced = next.assignments.get(district_id).cloned();
    if let Some(previous_district) = wheel.district_of(monster_id) {
        if previous_district != district_id {
            match displaced {
                Some(occupant) => {
                    next.assignments
                        .insert(previous_district.to_string(), occupant);
                }
                None => {
                    next.assignments.remove(previous_district);
                }
            }
        }
    }
    next.assignments
        .insert(district_id.to_string(), monster_id.to_string());
    Ok(next)
}
