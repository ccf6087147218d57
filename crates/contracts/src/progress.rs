//! Knight progression records: chapters, investigation attempts and tiers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Investigation identifier as printed on the card, e.g. `I2-3`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvestigationCode(String);

impl InvestigationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvestigationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InvestigationCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationVia {
    Normal,
    Lead,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvestigationAttempt {
    pub code: InvestigationCode,
    pub result: AttemptResult,
    pub via: InvestigationVia,
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl InvestigationAttempt {
    pub fn is_pass(&self) -> bool {
        self.result == AttemptResult::Pass
    }

    pub fn is_convertible(&self) -> bool {
        self.via == InvestigationVia::Normal && self.result == AttemptResult::Fail
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestRecord {
    pub completed: bool,
    pub outcome: AttemptResult,
}

/// Per-chapter progress. The set of completed investigations is derived from
/// `attempts` on every read and is never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterProgress {
    #[serde(default)]
    pub quest: Option<QuestRecord>,
    #[serde(default)]
    pub attempts: Vec<InvestigationAttempt>,
}

impl ChapterProgress {
    pub fn quest_completed(&self) -> bool {
        self.quest.map(|quest| quest.completed).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Knight {
    pub knight_uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub chapters: BTreeMap<u32, ChapterProgress>,
}

impl Knight {
    pub fn new(knight_uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            knight_uid: knight_uid.into(),
            name: name.into(),
            chapters: BTreeMap::new(),
        }
    }

    /// Chapter record, or an empty default when the chapter was never touched.
    pub fn chapter(&self, chapter: u32) -> ChapterProgress {
        self.chapters.get(&chapter).cloned().unwrap_or_default()
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Mob,
    Vassal,
    King,
    Devil,
    Dragon,
    Legendary,
}

impl Tier {
    pub const ALL: [Tier; 6] = [
        Tier::Mob,
        Tier::Vassal,
        Tier::King,
        Tier::Devil,
        Tier::Dragon,
        Tier::Legendary,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Mob => 0,
            Self::Vassal => 1,
            Self::King => 2,
            Self::Devil => 3,
            Self::Dragon => 4,
            Self::Legendary => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mob => "mob",
            Self::Vassal => "vassal",
            Self::King => "king",
            Self::Devil => "devil",
            Self::Dragon => "dragon",
            Self::Legendary => "legendary",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
