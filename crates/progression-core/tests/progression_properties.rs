use contracts::{
    AttemptResult, Campaign, ChapterProgress, DistrictWheel, ExpeditionPhase, InvestigationCode,
    InvestigationVia, KingdomProgress, Knight, Tier,
};
use progression_core::error::RuleViolation;
use progression_core::{adventure, expedition, gate, ledger, stager, tier};
use proptest::prelude::*;

fn attempt_strategy() -> impl Strategy<Value = (u8, bool, bool)> {
    (0_u8..8, any::<bool>(), any::<bool>())
}

fn apply_attempts(attempts: &[(u8, bool, bool)]) -> ChapterProgress {
    let mut chapter = ChapterProgress::default();
    for (index, (code, lead, pass)) in attempts.iter().enumerate() {
        let via = if *lead {
            InvestigationVia::Lead
        } else {
            InvestigationVia::Normal
        };
        let result = if *pass {
            AttemptResult::Pass
        } else {
            AttemptResult::Fail
        };
        if let Ok(next) = ledger::record_attempt(
            &chapter,
            InvestigationCode::new(format!("INV-{code}")),
            via,
            result,
            index as u64,
        ) {
            chapter = next;
        }
    }
    chapter
}

fn knight_with_totals(quests: u32, investigations: u32) -> Knight {
    let mut knight = Knight::new("k", "Knight");
    let chapters = quests.max(investigations.div_ceil(3)).max(1);
    let mut remaining = investigations;
    for number in 1..=chapters {
        let mut chapter = ChapterProgress::default();
        for slot in 0..remaining.min(3) {
            chapter = ledger::record_attempt(
                &chapter,
                InvestigationCode::new(format!("C{number}-{slot}")),
                InvestigationVia::Normal,
                AttemptResult::Pass,
                0,
            )
            .expect("fresh code within caps");
        }
        remaining = remaining.saturating_sub(3);
        if number <= quests {
            chapter = ledger::record_quest(&chapter, AttemptResult::Pass);
        }
        knight.chapters.insert(number, chapter);
    }
    knight
}

fn wheel(districts: usize) -> DistrictWheel {
    DistrictWheel::new(
        "rotmire",
        (0..districts).map(|index| format!("d{index}")).collect(),
    )
}

proptest! {
    #[test]
    fn property_distinct_caps_hold_for_any_attempt_sequence(
        attempts in prop::collection::vec(attempt_strategy(), 0..40)
    ) {
        let chapter = apply_attempts(&attempts);
        prop_assert!(ledger::count_distinct_normal(&chapter) <= 3);
        prop_assert!(ledger::count_distinct_total(&chapter) <= 5);
    }

    #[test]
    fn property_normal_attempt_rejected_iff_locked(
        attempts in prop::collection::vec(attempt_strategy(), 0..20),
        quest in any::<bool>(),
        pass in any::<bool>(),
    ) {
        let mut chapter = apply_attempts(&attempts);
        if quest {
            chapter = ledger::record_quest(&chapter, AttemptResult::Pass);
        }
        let locked = ledger::is_normal_locked(&chapter);
        let result = if pass { AttemptResult::Pass } else { AttemptResult::Fail };
        let code = ledger::completed_codes(&chapter)
            .into_iter()
            .next()
            .cloned()
            .unwrap_or_else(|| InvestigationCode::new("INV-0"));
        let outcome = ledger::record_attempt(&chapter, code, InvestigationVia::Normal, result, 99);
        let rejected_by_lock = matches!(outcome, Err(RuleViolation::InvestigationLocked));
        prop_assert_eq!(rejected_by_lock, locked);
        if result == AttemptResult::Fail {
            prop_assert_eq!(outcome.is_ok(), !locked);
        }
    }

    #[test]
    fn property_conversion_rewrites_one_entry(
        attempts in prop::collection::vec(attempt_strategy(), 0..30),
        code in 0_u8..8,
    ) {
        let chapter = apply_attempts(&attempts);
        let code = InvestigationCode::new(format!("INV-{code}"));
        let convertible = chapter
            .attempts
            .iter()
            .any(|entry| entry.code == code && entry.is_convertible());

        match ledger::convert_fail_to_lead(&chapter, &code) {
            Ok(next) => {
                prop_assert!(convertible);
                prop_assert_eq!(next.attempts.len(), chapter.attempts.len());
                prop_assert_eq!(
                    ledger::count_distinct_attempted(&next),
                    ledger::count_distinct_attempted(&chapter)
                );
                prop_assert_eq!(
                    ledger::lead_pass_count(&next),
                    ledger::lead_pass_count(&chapter) + 1
                );
                prop_assert!(ledger::count_distinct_total(&next) <= 5);
            }
            Err(RuleViolation::NoConvertibleEntry { .. }) => prop_assert!(!convertible),
            Err(RuleViolation::CapExceeded { .. }) => {
                prop_assert!(convertible);
                prop_assert_eq!(ledger::count_distinct_total(&chapter), 5);
            }
            Err(other) => prop_assert!(false, "unexpected violation {other:?}"),
        }
    }

    #[test]
    fn property_tier_is_monotone_in_each_total(
        quests in 0_usize..8,
        investigations in 0_usize..20,
        extra in 0_usize..4,
    ) {
        let base = tier::tier_for_totals(quests, investigations);
        prop_assert!(tier::tier_for_totals(quests + extra, investigations) >= base);
        prop_assert!(tier::tier_for_totals(quests, investigations + extra) >= base);
    }

    #[test]
    fn property_knight_tier_matches_totals(quests in 0_u32..6, investigations in 0_u32..18) {
        let knight = knight_with_totals(quests, investigations);
        let totals = tier::completion_totals(&knight);
        prop_assert_eq!(totals.quests, quests as usize);
        prop_assert_eq!(totals.investigations, investigations as usize);
        prop_assert_eq!(
            tier::calculate_tier(&knight),
            tier::tier_for_totals(quests as usize, investigations as usize)
        );
    }

    #[test]
    fn property_available_tiers_prefix(index in 0_usize..6) {
        let tier = Tier::ALL[index];
        let tiers = gate::available_tiers(tier);
        prop_assert!(tiers.contains(&Tier::Mob));
        prop_assert_eq!(tiers.len(), tier.index() + 1);
        prop_assert_eq!(tiers.last().copied(), Some(tier));
    }

    #[test]
    fn property_only_adjacent_phase_transitions(steps in 0_usize..7, target in 0_usize..8) {
        let mut campaign = Campaign::new("camp", "Camp");
        for phase in ExpeditionPhase::ORDER.iter().take(steps) {
            campaign = expedition::set_expedition_phase(&campaign, *phase, 0)
                .expect("sanctioned order");
        }
        let target = ExpeditionPhase::ORDER[target];
        let expected = expedition::next_phase(expedition::current_phase(&campaign));
        let outcome = expedition::set_expedition_phase(&campaign, target, 1);
        if expected == Some(target) && target != ExpeditionPhase::Spoils {
            let next = outcome.expect("adjacent transition");
            let started = next.expedition.expect("expedition started");
            prop_assert_eq!(started.current_phase, target);
            if target.is_delve() {
                prop_assert!(started.delve_progress.is_some());
            }
            if target == ExpeditionPhase::Rest {
                prop_assert!(started.rest_progress.is_some());
            }
        } else {
            let invalid_transition = matches!(
                outcome,
                Err(progression_core::ProgressionError::Rule(
                    RuleViolation::InvalidPhaseTransition { .. }
                ))
            );
            prop_assert!(invalid_transition);
        }
    }

    #[test]
    fn property_reassign_never_duplicates(
        districts in 1_usize..6,
        pool_size in 0_usize..8,
        moves in prop::collection::vec((0_usize..6, 0_usize..8), 0..20),
    ) {
        let pool = (0..pool_size).map(|index| format!("m{index}")).collect::<Vec<_>>();
        let mut current = stager::rotate(&wheel(districts), &pool);
        for (district, monster) in moves {
            if let Ok(next) = stager::reassign(&current, &format!("d{district}"), &format!("m{monster}")) {
                current = next;
            }
            prop_assert!(stager::is_injective(&current));
        }
    }

    #[test]
    fn property_rotate_advances_by_one(
        districts in 0_usize..6,
        pool_size in 0_usize..8,
        rotations in 0_u32..10,
    ) {
        let pool = (0..pool_size).map(|index| format!("m{index}")).collect::<Vec<_>>();
        let mut current = wheel(districts);
        for _ in 0..rotations {
            current = stager::rotate(&current, &pool);
        }
        let next = stager::rotate(&current, &pool);
        prop_assert_eq!(next.current_rotation, current.current_rotation + 1);
        prop_assert!(stager::is_injective(&next));
        prop_assert_eq!(next.assignments.len(), districts.min(pool_size));
    }
}

#[test]
fn scenario_fresh_knight_is_mob() {
    assert_eq!(tier::calculate_tier(&Knight::new("k", "Fresh")), Tier::Mob);
}

#[test]
fn scenario_three_normal_passes_and_quest_reach_vassal() {
    let knight = knight_with_totals(1, 3);
    assert_eq!(tier::calculate_tier(&knight), Tier::Vassal);
}

#[test]
fn scenario_single_attempt_adventure_twice_stays_at_one() {
    let once = adventure::set_adventure_progress(&KingdomProgress::default(), "lantern_walk", true, None);
    let twice = adventure::set_adventure_progress(&once, "lantern_walk", true, None);
    assert_eq!(twice.adventures["lantern_walk"], 1);
}

#[test]
fn scenario_delta_two_on_one_gives_three() {
    let one = adventure::set_adventure_progress(&KingdomProgress::default(), "eel_market", false, None);
    let three = adventure::set_adventure_progress(&one, "eel_market", false, Some(2));
    assert_eq!(three.adventures["eel_market"], 3);
}
