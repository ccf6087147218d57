//! Knight tier derived from cumulative quest and investigation completion.

use contracts::{Knight, Tier};

use crate::ledger;

/// `(tier, quests, investigations)` thresholds in ascending order.
const TIER_THRESHOLDS: [(Tier, usize, usize); 5] = [
    (Tier::Vassal, 1, 3),
    (Tier::King, 2, 6),
    (Tier::Devil, 3, 9),
    (Tier::Dragon, 4, 12),
    (Tier::Legendary, 5, 15),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionTotals {
    pub quests: usize,
    pub investigations: usize,
}

pub fn completion_totals(knight: &Knight) -> CompletionTotals {
    knight
        .chapters
        .values()
        .fold(CompletionTotals::default(), |mut totals, chapter| {
            if chapter.quest_completed() {
                totals.quests += 1;
            }
            totals.investigations += ledger::count_distinct_total(chapter);
            totals
        })
}

/// Highest tier whose quest and investigation thresholds are both met.
pub fn tier_for_totals(quests: usize, investigations: usize) -> Tier {
    TIER_THRESHOLDS
        .iter()
        .rev()
        .find(|(_, min_quests, min_investigations)| {
            quests >= *min_quests && investigations >= *min_investigations
        })
        .map(|(tier, _, _)| *tier)
        .unwrap_or(Tier::Mob)
}

pub fn calculate_tier(knight: &Knight) -> Tier {
    let totals = completion_totals(knight);
    tier_for_totals(totals.quests, totals.investigations)
}
