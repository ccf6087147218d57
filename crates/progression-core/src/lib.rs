//! Progression rules for knights and campaigns: investigation ledger, tiers,
//! contract gating, the expedition phase machine and district monster staging.

pub mod adventure;
pub mod engine;
pub mod error;
pub mod expedition;
pub mod gate;
pub mod ledger;
pub mod stager;
pub mod tier;

pub use engine::{ChapterSummary, ProgressionEngine};
pub use error::{EntityKind, ProgressionError, ProgressionResult, RuleViolation};
pub use gate::ContractOption;
pub use stager::StageInputs;
pub use tier::CompletionTotals;
