//! Investigation ledger: per-chapter attempt log, completion projections and lock state.
//!
//! Every count here is recomputed from the attempt log on each call.

use std::collections::BTreeSet;

use contracts::{
    AttemptResult, ChapterProgress, InvestigationAttempt, InvestigationCode, InvestigationVia,
    Knight, QuestRecord, MAX_DISTINCT_INVESTIGATIONS_PER_CHAPTER,
    MAX_DISTINCT_NORMAL_INVESTIGATIONS_PER_CHAPTER,
};

use crate::error::RuleViolation;

/// Codes with at least one pass, by either path.
pub fn completed_codes(chapter: &ChapterProgress) -> BTreeSet<&InvestigationCode> {
    chapter
        .attempts
        .iter()
        .filter(|attempt| attempt.is_pass())
        .map(|attempt| &attempt.code)
        .collect()
}

fn normal_completed_codes(chapter: &ChapterProgress) -> BTreeSet<&InvestigationCode> {
    chapter
        .attempts
        .iter()
        .filter(|attempt| attempt.is_pass() && attempt.via == InvestigationVia::Normal)
        .map(|attempt| &attempt.code)
        .collect()
}

pub fn count_distinct_normal(chapter: &ChapterProgress) -> usize {
    normal_completed_codes(chapter).len()
}

pub fn count_distinct_total(chapter: &ChapterProgress) -> usize {
    completed_codes(chapter).len()
}

/// Completed codes that were never passed on the normal track.
pub fn count_distinct_lead(chapter: &ChapterProgress) -> usize {
    let normal = normal_completed_codes(chapter);
    completed_codes(chapter)
        .into_iter()
        .filter(|code| !normal.contains(code))
        .count()
}

pub fn count_distinct_attempted(chapter: &ChapterProgress) -> usize {
    chapter
        .attempts
        .iter()
        .map(|attempt| &attempt.code)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Number of lead-pass entries in the log, retries included.
pub fn lead_pass_count(chapter: &ChapterProgress) -> usize {
    chapter
        .attempts
        .iter()
        .filter(|attempt| attempt.is_pass() && attempt.via == InvestigationVia::Lead)
        .count()
}

pub fn is_completed(chapter: &ChapterProgress, code: &InvestigationCode) -> bool {
    chapter
        .attempts
        .iter()
        .any(|attempt| attempt.is_pass() && &attempt.code == code)
}

/// The normal track closes once the quest is done and three normal
/// investigations are complete. Leads stay open up to the chapter ceiling.
pub fn is_normal_locked(chapter: &ChapterProgress) -> bool {
    chapter.quest_completed()
        && count_distinct_normal(chapter) >= MAX_DISTINCT_NORMAL_INVESTIGATIONS_PER_CHAPTER
}

pub fn record_attempt(
    chapter: &ChapterProgress,
    code: InvestigationCode,
    via: InvestigationVia,
    result: AttemptResult,
    timestamp_ms: u64,
) -> Result<ChapterProgress, RuleViolation> {
    if via == InvestigationVia::Normal && is_normal_locked(chapter) {
        return Err(RuleViolation::InvestigationLocked);
    }

    if result == AttemptResult::Pass {
        let completed = completed_codes(chapter);
        if !completed.contains(&code) && completed.len() >= MAX_DISTINCT_INVESTIGATIONS_PER_CHAPTER
        {
            return Err(RuleViolation::CapExceeded {
                track: "total",
                limit: MAX_DISTINCT_INVESTIGATIONS_PER_CHAPTER,
            });
        }

        let normal = normal_completed_codes(chapter);
        if via == InvestigationVia::Normal
            && !normal.contains(&code)
            && normal.len() >= MAX_DISTINCT_NORMAL_INVESTIGATIONS_PER_CHAPTER
        {
            return Err(RuleViolation::CapExceeded {
                track: "normal",
                limit: MAX_DISTINCT_NORMAL_INVESTIGATIONS_PER_CHAPTER,
            });
        }
    }

    let mut next = chapter.clone();
    next.attempts.push(InvestigationAttempt {
        code,
        result,
        via,
        timestamp_ms,
    });
    Ok(next)
}

/// Rewrites the latest failed normal attempt for `code` into a lead pass, in place.
pub fn convert_fail_to_lead(
    chapter: &ChapterProgress,
    code: &InvestigationCode,
) -> Result<ChapterProgress, RuleViolation> {
    let Some(index) = chapter
        .attempts
        .iter()
        .rposition(|attempt| &attempt.code == code && attempt.is_convertible())
    else {
        return Err(RuleViolation::NoConvertibleEntry {
            code: code.to_string(),
        });
    };

    if !is_completed(chapter, code)
        && count_distinct_total(chapter) >= MAX_DISTINCT_INVESTIGATIONS_PER_CHAPTER
    {
        return Err(RuleViolation::CapExceeded {
            track: "total",
            limit: MAX_DISTINCT_INVESTIGATIONS_PER_CHAPTER,
        });
    }

    let mut next = chapter.clone();
    let entry = &mut next.attempts[index];
    entry.via = InvestigationVia::Lead;
    entry.result = AttemptResult::Pass;
    Ok(next)
}

pub fn record_quest(chapter: &ChapterProgress, outcome: AttemptResult) -> ChapterProgress {
    let mut next = chapter.clone();
    next.quest = Some(QuestRecord {
        completed: true,
        outcome,
    });
    next
}

/// Lowest chapter, starting at 1, whose quest is still open.
pub fn current_chapter(knight: &Knight) -> u32 {
    let mut chapter = 1;
    while knight
        .chapters
        .get(&chapter)
        .map(ChapterProgress::quest_completed)
        .unwrap_or(false)
    {
        chapter += 1;
    }
    chapter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> InvestigationCode {
        InvestigationCode::new(raw)
    }

    fn record(
        chapter: &ChapterProgress,
        raw: &str,
        via: InvestigationVia,
        result: AttemptResult,
    ) -> Result<ChapterProgress, RuleViolation> {
        record_attempt(chapter, code(raw), via, result, 0)
    }

    fn with_normal_passes(count: usize) -> ChapterProgress {
        let mut chapter = ChapterProgress::default();
        for index in 0..count {
            chapter = record(
                &chapter,
                &format!("I1-{}", index + 1),
                InvestigationVia::Normal,
                AttemptResult::Pass,
            )
            .expect("normal pass under cap");
        }
        chapter
    }

    #[test]
    fn retries_do_not_inflate_distinct_counts() {
        let mut chapter = ChapterProgress::default();
        chapter = record(&chapter, "I1-1", InvestigationVia::Normal, AttemptResult::Fail)
            .expect("fail");
        chapter = record(&chapter, "I1-1", InvestigationVia::Normal, AttemptResult::Pass)
            .expect("pass");
        chapter = record(&chapter, "I1-1", InvestigationVia::Normal, AttemptResult::Pass)
            .expect("repeat pass");

        assert_eq!(chapter.attempts.len(), 3);
        assert_eq!(count_distinct_normal(&chapter), 1);
        assert_eq!(count_distinct_total(&chapter), 1);
        assert_eq!(count_distinct_attempted(&chapter), 1);
    }

    #[test]
    fn fail_only_code_is_not_completed() {
        let chapter = record(
            &ChapterProgress::default(),
            "I1-4",
            InvestigationVia::Normal,
            AttemptResult::Fail,
        )
        .expect("fail");
        assert_eq!(count_distinct_total(&chapter), 0);
        assert!(!is_completed(&chapter, &code("I1-4")));
        assert_eq!(count_distinct_attempted(&chapter), 1);
    }

    #[test]
    fn fourth_normal_pass_exceeds_normal_cap() {
        let chapter = with_normal_passes(3);
        let err = record(&chapter, "I1-4", InvestigationVia::Normal, AttemptResult::Pass)
            .expect_err("normal cap");
        assert_eq!(
            err,
            RuleViolation::CapExceeded {
                track: "normal",
                limit: 3
            }
        );

        let chapter = record(&chapter, "I1-4", InvestigationVia::Lead, AttemptResult::Pass)
            .expect("lead still open");
        assert_eq!(count_distinct_lead(&chapter), 1);
    }

    #[test]
    fn sixth_distinct_code_exceeds_total_cap() {
        let mut chapter = with_normal_passes(3);
        for raw in ["I1-4", "I1-5"] {
            chapter = record(&chapter, raw, InvestigationVia::Lead, AttemptResult::Pass)
                .expect("lead under cap");
        }
        let err = record(&chapter, "I1-6", InvestigationVia::Lead, AttemptResult::Pass)
            .expect_err("total cap");
        assert!(matches!(err, RuleViolation::CapExceeded { track: "total", .. }));

        let retry = record(&chapter, "I1-5", InvestigationVia::Lead, AttemptResult::Pass)
            .expect("re-passing a completed code adds nothing");
        assert_eq!(count_distinct_total(&retry), 5);
    }

    #[test]
    fn lock_requires_quest_and_three_normals() {
        let chapter = with_normal_passes(3);
        assert!(!is_normal_locked(&chapter));

        let quest_only = record_quest(&with_normal_passes(2), AttemptResult::Pass);
        assert!(!is_normal_locked(&quest_only));

        let locked = record_quest(&chapter, AttemptResult::Fail);
        assert!(is_normal_locked(&locked));

        let err = record(&locked, "I1-1", InvestigationVia::Normal, AttemptResult::Fail)
            .expect_err("normal locked");
        assert_eq!(err, RuleViolation::InvestigationLocked);

        let lead = record(&locked, "I1-4", InvestigationVia::Lead, AttemptResult::Pass)
            .expect("lead open while locked");
        assert_eq!(count_distinct_total(&lead), 4);
    }

    #[test]
    fn convert_rewrites_failed_normal_in_place() {
        let mut chapter = ChapterProgress::default();
        chapter = record(&chapter, "I1-2", InvestigationVia::Normal, AttemptResult::Fail)
            .expect("fail");
        let before_len = chapter.attempts.len();
        let before_leads = lead_pass_count(&chapter);

        let converted = convert_fail_to_lead(&chapter, &code("I1-2")).expect("convertible");
        assert_eq!(converted.attempts.len(), before_len);
        assert_eq!(lead_pass_count(&converted), before_leads + 1);
        assert_eq!(count_distinct_attempted(&converted), 1);
        assert_eq!(count_distinct_normal(&converted), 0);
        assert_eq!(converted.attempts[0].via, InvestigationVia::Lead);
        assert_eq!(converted.attempts[0].result, AttemptResult::Pass);

        let err = convert_fail_to_lead(&converted, &code("I1-2")).expect_err("one-way");
        assert!(matches!(err, RuleViolation::NoConvertibleEntry { .. }));
    }

    #[test]
    fn convert_rejects_lead_fail_and_unknown_code() {
        let chapter = record(
            &ChapterProgress::default(),
            "I1-3",
            InvestigationVia::Lead,
            AttemptResult::Fail,
        )
        .expect("lead fail");
        assert!(convert_fail_to_lead(&chapter, &code("I1-3")).is_err());
        assert!(convert_fail_to_lead(&chapter, &code("I9-9")).is_err());
    }

    #[test]
    fn convert_respects_total_cap() {
        let mut chapter = with_normal_passes(3);
        chapter = record(&chapter, "I1-9", InvestigationVia::Normal, AttemptResult::Fail)
            .expect("fail after three normals");
        for raw in ["I1-4", "I1-5"] {
            chapter = record(&chapter, raw, InvestigationVia::Lead, AttemptResult::Pass)
                .expect("lead");
        }
        let err = convert_fail_to_lead(&chapter, &code("I1-9")).expect_err("cap");
        assert!(matches!(err, RuleViolation::CapExceeded { track: "total", .. }));
    }

    #[test]
    fn current_chapter_skips_completed_quests() {
        let mut knight = Knight::new("k", "Knight");
        assert_eq!(current_chapter(&knight), 1);
        knight.chapters.insert(
            1,
            record_quest(&ChapterProgress::default(), AttemptResult::Pass),
        );
        assert_eq!(current_chapter(&knight), 2);
        knight.chapters.insert(3, with_normal_passes(1));
        assert_eq!(current_chapter(&knight), 2);
    }
}
