//! Completion counters for kingdom adventures and contracts.

use contracts::KingdomProgress;

/// Counter after applying one completion. Single-attempt entries saturate at 1.
pub fn next_count(current: u32, single_attempt: bool, delta: u32) -> u32 {
    if single_attempt {
        1
    } else {
        current.saturating_add(delta)
    }
}

pub fn set_adventure_progress(
    kingdom: &KingdomProgress,
    adventure_id: &str,
    single_attempt: bool,
    delta: Option<u32>,
) -> KingdomProgress {
    let mut next = kingdom.clone();
    let counter = next.adventures.entry(adventure_id.to_string()).or_insert(0);
    *counter = next_count(*counter, single_attempt, delta.unwrap_or(1));
    next
}

pub fn complete_contract(
    kingdom: &KingdomProgress,
    contract_id: &str,
    single_attempt: bool,
) -> KingdomProgress {
    let mut next = kingdom.clone();
    let counter = next.contracts.entry(contract_id.to_string()).or_insert(0);
    *counter = next_count(*counter, single_attempt, 1);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_attempt_adventure_is_idempotent() {
        let once = set_adventure_progress(&KingdomProgress::default(), "adv_1", true, None);
        let twice = set_adventure_progress(&once, "adv_1", true, None);
        assert_eq!(twice.adventures["adv_1"], 1);
        assert_eq!(once, twice);
    }

    #[test]
    fn repeatable_adventure_adds_delta() {
        let once = set_adventure_progress(&KingdomProgress::default(), "adv_2", false, None);
        assert_eq!(once.adventures["adv_2"], 1);
        let more = set_adventure_progress(&once, "adv_2", false, Some(2));
        assert_eq!(more.adventures["adv_2"], 3);
    }

    #[test]
    fn single_attempt_contract_counts_once() {
        let kingdom = complete_contract(&KingdomProgress::default(), "c1", true);
        let kingdom = complete_contract(&kingdom, "c1", true);
        let kingdom = complete_contract(&kingdom, "c2", false);
        let kingdom = complete_contract(&kingdom, "c2", false);
        assert_eq!(kingdom.contracts["c1"], 1);
        assert_eq!(kingdom.contracts["c2"], 2);
    }
}
