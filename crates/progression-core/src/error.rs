use std::fmt;

use contracts::{ExpeditionPhase, Tier};
use thiserror::Error;

/// A disallowed game action. Expected during play and surfaced to the player as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("normal investigations are locked for this chapter")]
    InvestigationLocked,
    #[error("chapter investigation cap reached ({limit} distinct {track})")]
    CapExceeded { track: &'static str, limit: usize },
    #[error("no failed normal attempt to convert for `{code}`")]
    NoConvertibleEntry { code: String },
    #[error("expedition has not started")]
    ExpeditionNotStarted,
    #[error("cannot move expedition from {} to {to}", phase_label(.from))]
    InvalidPhaseTransition {
        from: Option<ExpeditionPhase>,
        to: ExpeditionPhase,
    },
    #[error("party leader is locked while an expedition is underway")]
    PartyLeaderLocked,
    #[error("contract requires tier {required}, party leader is {current}")]
    ContractTierLocked { required: Tier, current: Tier },
    #[error("`{action}` is not available during {}", phase_label(.phase))]
    NotAllowedInPhase {
        action: &'static str,
        phase: Option<ExpeditionPhase>,
    },
    #[error("`{what}` was already resolved")]
    AlreadyResolved { what: &'static str },
}

fn phase_label(phase: &Option<ExpeditionPhase>) -> &'static str {
    phase.map(ExpeditionPhase::as_str).unwrap_or("not_started")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Knight,
    Campaign,
    Member,
    Kingdom,
    Contract,
    Adventure,
    District,
    Monster,
    Objective,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Knight => "knight",
            Self::Campaign => "campaign",
            Self::Member => "campaign member",
            Self::Kingdom => "kingdom",
            Self::Contract => "contract",
            Self::Adventure => "adventure",
            Self::District => "district",
            Self::Monster => "monster",
            Self::Objective => "objective",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressionError {
    #[error(transparent)]
    Rule(#[from] RuleViolation),
    #[error("{kind} `{id}` not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("{kind} `{id}` already exists")]
    AlreadyExists { kind: EntityKind, id: String },
}

impl ProgressionError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_rule_violation(&self) -> bool {
        matches!(self, Self::Rule(_))
    }
}

pub type ProgressionResult<T> = Result<T, ProgressionError>;
