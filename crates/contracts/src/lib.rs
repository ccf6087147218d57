//! v1 contracts shared by the progression engine, the tracker API, persistence and the CLI.

mod campaign;
mod progress;
mod reference;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use campaign::{
    Campaign, CampfireTale, ChoiceStatus, ClashOutcome, ClashResult, ClashType, DelveProgress,
    DistrictWheel, Expedition, ExpeditionChoice, ExpeditionPhase, KingdomProgress, KnightChoice,
    RestProgress, SelectedContract, SpoilsProgress, THREAT_SURGE_THRESHOLD, THREAT_TRACK_MAX,
    TIME_TRACK_MAX,
};
pub use progress::{
    AttemptResult, ChapterProgress, InvestigationAttempt, InvestigationCode, InvestigationVia,
    Knight, QuestRecord, Tier,
};
pub use reference::{
    AdventureDefinition, Bestiary, BestiaryMonster, ContractDefinition, KingdomDefinition,
    ReferenceCatalog, StageDefinition,
};

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const MAX_DISTINCT_INVESTIGATIONS_PER_CHAPTER: usize = 5;
pub const MAX_DISTINCT_NORMAL_INVESTIGATIONS_PER_CHAPTER: usize = 3;

fn schema_version_v1() -> String {
    SCHEMA_VERSION_V1.to_string()
}

/// Whole persisted state: every knight and every campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressionSnapshot {
    #[serde(default = "schema_version_v1")]
    pub schema_version: String,
    #[serde(default)]
    pub knights: BTreeMap<String, Knight>,
    #[serde(default)]
    pub campaigns: BTreeMap<String, Campaign>,
}

impl Default for ProgressionSnapshot {
    fn default() -> Self {
        Self {
            schema_version: schema_version_v1(),
            knights: BTreeMap::new(),
            campaigns: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    RegisterKnight {
        knight_uid: String,
        #[serde(default)]
        name: String,
    },
    CreateCampaign {
        campaign_id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        members: Vec<String>,
    },
    AddCampaignMember {
        campaign_id: String,
        knight_uid: String,
    },
    AbandonCampaign {
        campaign_id: String,
    },
    SetPartyLeader {
        campaign_id: String,
        knight_uid: String,
    },
    RecordInvestigationAttempt {
        knight_uid: String,
        chapter: u32,
        code: InvestigationCode,
        via: InvestigationVia,
        result: AttemptResult,
    },
    ConvertFailToLead {
        knight_uid: String,
        chapter: u32,
        code: InvestigationCode,
    },
    RecordQuestOutcome {
        knight_uid: String,
        chapter: u32,
        outcome: AttemptResult,
    },
    SelectContract {
        campaign_id: String,
        kingdom_id: String,
        contract_id: String,
    },
    CompleteContract {
        campaign_id: String,
        kingdom_id: String,
        contract_id: String,
    },
    SetExpeditionPhase {
        campaign_id: String,
        phase: ExpeditionPhase,
    },
    DeclareKnightChoice {
        campaign_id: String,
        knight_uid: String,
        choice: ExpeditionChoice,
    },
    ResolveKnightChoice {
        campaign_id: String,
        knight_uid: String,
    },
    AdvanceThreatTrack {
        campaign_id: String,
        steps: u8,
    },
    AdvanceTimeTrack {
        campaign_id: String,
        steps: u8,
    },
    SetCurrentLocation {
        campaign_id: String,
        location_id: String,
    },
    AddClue {
        campaign_id: String,
        clue_id: String,
    },
    AddObjective {
        campaign_id: String,
        objective_id: String,
    },
    CompleteObjective {
        campaign_id: String,
        objective_id: String,
    },
    TrackDelveContract {
        campaign_id: String,
        contract_id: String,
    },
    UseRestAbility {
        campaign_id: String,
        ability_id: String,
    },
    DiscardResourceTokens {
        campaign_id: String,
        count: u32,
    },
    PerformMonsterRotation {
        campaign_id: String,
    },
    ResolveCampfireTale {
        campaign_id: String,
        tale_id: String,
        rapport_bonus: i32,
        result: AttemptResult,
    },
    CompleteClash {
        campaign_id: String,
        #[serde(default)]
        clash_type: ClashType,
        outcome: ClashOutcome,
        wounds_dealt: u32,
        wounds_received: u32,
        #[serde(default)]
        special_effects: Vec<String>,
    },
    ClaimSpoil {
        campaign_id: String,
        reward_id: String,
    },
    RotateDistrictWheel {
        campaign_id: String,
        kingdom_id: String,
    },
    ReassignDistrictMonster {
        campaign_id: String,
        kingdom_id: String,
        district_id: String,
        monster_id: String,
    },
    SetAdventureProgress {
        campaign_id: String,
        kingdom_id: String,
        adventure_id: String,
        #[serde(default)]
        single_attempt: Option<bool>,
        #[serde(default)]
        delta: Option<u32>,
    },
}

impl CommandPayload {
    pub fn command_type(&self) -> &'static str {
        match self {
            Self::RegisterKnight { .. } => "register_knight",
            Self::CreateCampaign { .. } => "create_campaign",
            Self::AddCampaignMember { .. } => "add_campaign_member",
            Self::AbandonCampaign { .. } => "abandon_campaign",
            Self::SetPartyLeader { .. } => "set_party_leader",
            Self::RecordInvestigationAttempt { .. } => "record_investigation_attempt",
            Self::ConvertFailToLead { .. } => "convert_fail_to_lead",
            Self::RecordQuestOutcome { .. } => "record_quest_outcome",
            Self::SelectContract { .. } => "select_contract",
            Self::CompleteContract { .. } => "complete_contract",
            Self::SetExpeditionPhase { .. } => "set_expedition_phase",
            Self::DeclareKnightChoice { .. } => "declare_knight_choice",
            Self::ResolveKnightChoice { .. } => "resolve_knight_choice",
            Self::AdvanceThreatTrack { .. } => "advance_threat_track",
            Self::AdvanceTimeTrack { .. } => "advance_time_track",
            Self::SetCurrentLocation { .. } => "set_current_location",
            Self::AddClue { .. } => "add_clue",
            Self::AddObjective { .. } => "add_objective",
            Self::CompleteObjective { .. } => "complete_objective",
            Self::TrackDelveContract { .. } => "track_delve_contract",
            Self::UseRestAbility { .. } => "use_rest_ability",
            Self::DiscardResourceTokens { .. } => "discard_resource_tokens",
            Self::PerformMonsterRotation { .. } => "perform_monster_rotation",
            Self::ResolveCampfireTale { .. } => "resolve_campfire_tale",
            Self::CompleteClash { .. } => "complete_clash",
            Self::ClaimSpoil { .. } => "claim_spoil",
            Self::RotateDistrictWheel { .. } => "rotate_district_wheel",
            Self::ReassignDistrictMonster { .. } => "reassign_district_monster",
            Self::SetAdventureProgress { .. } => "set_adventure_progress",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Command {
    pub schema_version: String,
    pub command_id: String,
    #[serde(default)]
    pub issued_at_ms: u64,
    pub payload: CommandPayload,
}

impl Command {
    pub fn new(command_id: impl Into<String>, issued_at_ms: u64, payload: CommandPayload) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command_id.into(),
            issued_at_ms,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvestigationLocked,
    CapExceeded,
    NoConvertibleEntry,
    ExpeditionNotStarted,
    InvalidPhaseTransition,
    PartyLeaderLocked,
    ContractTierLocked,
    NotAllowedInPhase,
    AlreadyResolved,
    NotFound,
    AlreadyExists,
    InvalidCommand,
    ContractVersionUnsupported,
}

impl ErrorCode {
    pub fn class(self) -> ErrorClass {
        match self {
            Self::InvestigationLocked
            | Self::CapExceeded
            | Self::NoConvertibleEntry
            | Self::ExpeditionNotStarted
            | Self::InvalidPhaseTransition
            | Self::PartyLeaderLocked
            | Self::ContractTierLocked
            | Self::NotAllowedInPhase
            | Self::AlreadyResolved => ErrorClass::RuleViolation,
            Self::NotFound => ErrorClass::Integrity,
            Self::AlreadyExists | Self::InvalidCommand | Self::ContractVersionUnsupported => {
                ErrorClass::Request
            }
        }
    }
}

/// Rule violations are disallowed game actions; integrity failures point at a
/// caller holding stale or wrong ids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RuleViolation,
    Integrity,
    Request,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub error_class: ErrorClass,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            error_class: error_code.class(),
            message: message.into(),
            details,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.error_code, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub schema_version: String,
    pub command_id: String,
    pub accepted: bool,
    pub error: Option<ApiError>,
}

impl CommandResult {
    pub fn accepted(command: &Command) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command.command_id.clone(),
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(command: &Command, error: ApiError) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command.command_id.clone(),
            accepted: false,
            error: Some(error),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|error| error.error_code)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    KnightRegistered,
    CampaignCreated,
    CampaignMemberAdded,
    CampaignAbandoned,
    PartyLeaderSet,
    InvestigationRecorded,
    FailConvertedToLead,
    QuestRecorded,
    TierChanged,
    ContractSelected,
    ContractCompleted,
    ExpeditionPhaseChanged,
    KnightChoiceUpdated,
    DelveProgressUpdated,
    ThreatSurgeTriggered,
    RestProgressUpdated,
    ClashCompleted,
    SpoilClaimed,
    DistrictWheelRotated,
    DistrictMonsterReassigned,
    AdventureProgressed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub schema_version: String,
    pub sequence: u64,
    pub command_id: String,
    pub created_at_ms: u64,
    pub event_type: EventType,
    pub subject_id: String,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub schema_version: String,
    pub query_type: String,
    pub data: Value,
}

impl QueryResponse {
    pub fn new(query_type: impl Into<String>, data: Value) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            query_type: query_type.into(),
            data,
        }
    }
}
