//! In-process tracker facade: command validation, rule-error mapping, structured
//! logging and synchronous SQLite persistence around the progression engine.

mod catalog;
mod config;
mod persistence;

use std::path::Path;

use contracts::{
    ApiError, BestiaryMonster, Campaign, Command, CommandPayload, CommandResult, DistrictWheel,
    ErrorClass, ErrorCode, Event, Knight, ProgressionSnapshot, ReferenceCatalog, Tier,
    SCHEMA_VERSION_V1,
};
use progression_core::{
    ChapterSummary, ContractOption, ProgressionEngine, ProgressionError, RuleViolation,
};
use thiserror::Error;

pub use catalog::{
    builtin_catalog, catalog_from_file, catalog_from_json_str, load_catalog, CatalogError,
    CatalogSource, BUILTIN_REFERENCE_CATALOG,
};
pub use config::{TrackerConfig, CATALOG_PATH_ENV, SQLITE_PATH_ENV};
pub use persistence::{
    PersistedCommandEntry, PersistedSnapshot, PersistenceError, SqliteCampaignStore,
};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type QueryResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct CampaignTracker {
    engine: ProgressionEngine,
    catalog_source: CatalogSource,
    command_audit: Vec<CommandResult>,
    command_log: Vec<PersistedCommandEntry>,
    store: Option<SqliteCampaignStore>,
    last_persistence_error: Option<String>,
}

impl CampaignTracker {
    pub fn new(catalog: ReferenceCatalog) -> Self {
        Self {
            engine: ProgressionEngine::new(catalog),
            catalog_source: CatalogSource::Builtin,
            command_audit: Vec::new(),
            command_log: Vec::new(),
            store: None,
            last_persistence_error: None,
        }
    }

    /// Loads the catalog and, when a SQLite path is configured, restores the
    /// latest persisted state from it.
    pub fn from_config(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let (catalog, source) = load_catalog(config)?;
        let mut tracker = Self::new(catalog);
        tracker.catalog_source = source;
        if let Some(path) = config.sqlite_path.as_ref() {
            tracker.attach_sqlite_store(path)?;
        }
        Ok(tracker)
    }

    /// Attaches a store and adopts its latest snapshot and command log.
    /// Meant to be called before any command is submitted.
    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteCampaignStore::open(path.as_ref())?;
        let next_sequence = store.next_event_sequence()?;
        let snapshot = match store.load_latest_snapshot()? {
            Some(persisted) => persisted.snapshot,
            None => self.engine.snapshot().clone(),
        };
        let command_log = store.load_command_log()?;

        self.engine =
            ProgressionEngine::resume(snapshot, self.engine.catalog().clone(), next_sequence);
        self.command_audit = command_log
            .iter()
            .map(|entry| entry.result.clone())
            .collect();
        self.command_log = command_log;
        self.store = Some(store);
        self.last_persistence_error = None;

        tracing::info!(
            target: "progression::api",
            path = %path.as_ref().display(),
            knights = self.engine.snapshot().knights.len(),
            campaigns = self.engine.snapshot().campaigns.len(),
            commands = self.command_log.len(),
            next_sequence,
            "store.attached"
        );
        Ok(())
    }

    pub fn submit_command(&mut self, command: Command) -> CommandResult {
        let outcome = match self.validate_command(&command) {
            Some(error) => Err(error),
            None => self
                .engine
                .apply(&command)
                .map(<[Event]>::to_vec)
                .map_err(|err| api_error(&err)),
        };

        let (result, events) = match outcome {
            Ok(events) => {
                tracing::info!(
                    target: "progression::api",
                    command_id = %command.command_id,
                    command_type = command.payload.command_type(),
                    events = events.len(),
                    "command.accepted"
                );
                (CommandResult::accepted(&command), events)
            }
            Err(error) => {
                log_rejection(&command, &error);
                (CommandResult::rejected(&command, error), Vec::new())
            }
        };

        let entry = PersistedCommandEntry {
            command,
            result: result.clone(),
        };
        self.persist(&entry, &events);
        self.command_audit.push(result.clone());
        self.command_log.push(entry);
        result
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    pub fn catalog(&self) -> &ReferenceCatalog {
        self.engine.catalog()
    }

    pub fn catalog_source(&self) -> &CatalogSource {
        &self.catalog_source
    }

    pub fn snapshot(&self) -> &ProgressionSnapshot {
        self.engine.snapshot()
    }

    pub fn command_audit(&self) -> &[CommandResult] {
        &self.command_audit
    }

    pub fn command_log(&self) -> &[PersistedCommandEntry] {
        &self.command_log
    }

    /// Events emitted by this process since it started or attached a store.
    pub fn events(&self) -> &[Event] {
        self.engine.events()
    }

    /// Every stored event after `sequence`; without a store, the in-process events.
    pub fn event_history(&self, after_sequence: u64) -> Result<Vec<Event>, PersistenceError> {
        match self.store.as_ref() {
            Some(store) => store.load_events_after(after_sequence),
            None => Ok(self
                .engine
                .events()
                .iter()
                .filter(|event| event.sequence > after_sequence)
                .cloned()
                .collect()),
        }
    }

    pub fn knight(&self, knight_uid: &str) -> QueryResult<&Knight> {
        self.engine.knight(knight_uid).map_err(|err| api_error(&err))
    }

    pub fn campaign(&self, campaign_id: &str) -> QueryResult<&Campaign> {
        self.engine.campaign(campaign_id).map_err(|err| api_error(&err))
    }

    pub fn calculate_tier(&self, knight_uid: &str) -> QueryResult<Tier> {
        self.engine
            .calculate_tier(knight_uid)
            .map_err(|err| api_error(&err))
    }

    pub fn available_contract_tiers(&self, knight_uid: &str) -> QueryResult<Vec<Tier>> {
        self.engine
            .available_contract_tiers(knight_uid)
            .map_err(|err| api_error(&err))
    }

    pub fn chapter_summary(&self, knight_uid: &str, chapter: u32) -> QueryResult<ChapterSummary> {
        self.engine
            .chapter_summary(knight_uid, chapter)
            .map_err(|err| api_error(&err))
    }

    pub fn leader_tier(&self, campaign_id: &str) -> QueryResult<Tier> {
        self.engine
            .leader_tier(campaign_id)
            .map_err(|err| api_error(&err))
    }

    pub fn contract_options(
        &self,
        campaign_id: &str,
        kingdom_id: &str,
    ) -> QueryResult<Vec<ContractOption<'_>>> {
        self.engine
            .contract_options(campaign_id, kingdom_id)
            .map_err(|err| api_error(&err))
    }

    pub fn active_stage(&self, campaign_id: &str, kingdom_id: &str) -> QueryResult<Option<usize>> {
        self.engine
            .active_stage(campaign_id, kingdom_id)
            .map_err(|err| api_error(&err))
    }

    pub fn eligible_monsters(
        &self,
        campaign_id: &str,
        kingdom_id: &str,
    ) -> QueryResult<Vec<&BestiaryMonster>> {
        self.engine
            .eligible_monsters(campaign_id, kingdom_id)
            .map_err(|err| api_error(&err))
    }

    pub fn district_wheel(&self, campaign_id: &str, kingdom_id: &str) -> QueryResult<DistrictWheel> {
        self.engine
            .district_wheel(campaign_id, kingdom_id)
            .map_err(|err| api_error(&err))
    }

    fn persist(&mut self, entry: &PersistedCommandEntry, events: &[Event]) {
        let Some(store) = self.store.as_mut() else {
            return;
        };

        let snapshot = entry.result.accepted.then(|| self.engine.snapshot());
        if let Err(err) = store.persist_command(entry, events, snapshot) {
            tracing::error!(
                target: "progression::api",
                command_id = %entry.command.command_id,
                error = %err,
                "persistence.failed"
            );
            self.last_persistence_error = Some(err.to_string());
        }
    }

    fn validate_command(&self, command: &Command) -> Option<ApiError> {
        if command.schema_version != SCHEMA_VERSION_V1 {
            return Some(ApiError::new(
                ErrorCode::ContractVersionUnsupported,
                "Unsupported schema_version",
                Some(format!(
                    "got={} expected={}",
                    command.schema_version, SCHEMA_VERSION_V1
                )),
            ));
        }

        if command.command_id.trim().is_empty() {
            return Some(invalid("command_id must not be empty"));
        }

        if self
            .command_log
            .iter()
            .any(|entry| entry.result.accepted && entry.command.command_id == command.command_id)
        {
            return Some(ApiError::new(
                ErrorCode::InvalidCommand,
                "command_id was already applied",
                Some(format!("command_id={}", command.command_id)),
            ));
        }

        match &command.payload {
            CommandPayload::RegisterKnight { knight_uid, .. } if knight_uid.trim().is_empty() => {
                Some(invalid("register_knight requires a knight_uid"))
            }
            CommandPayload::CreateCampaign { campaign_id, .. } if campaign_id.trim().is_empty() => {
                Some(invalid("create_campaign requires a campaign_id"))
            }
            CommandPayload::RecordInvestigationAttempt { chapter, .. }
            | CommandPayload::ConvertFailToLead { chapter, .. }
            | CommandPayload::RecordQuestOutcome { chapter, .. }
                if *chapter == 0 =>
            {
                Some(invalid("chapter numbers start at 1"))
            }
            CommandPayload::RecordInvestigationAttempt { code, .. }
            | CommandPayload::ConvertFailToLead { code, .. }
                if code.as_str().trim().is_empty() =>
            {
                Some(invalid("investigation code must not be empty"))
            }
            CommandPayload::AdvanceThreatTrack { steps, .. }
            | CommandPayload::AdvanceTimeTrack { steps, .. }
                if *steps == 0 =>
            {
                Some(invalid("track advances require steps >= 1"))
            }
            CommandPayload::DiscardResourceTokens { count, .. } if *count == 0 => {
                Some(invalid("discard_resource_tokens requires count >= 1"))
            }
            CommandPayload::SetAdventureProgress { delta: Some(0), .. } => {
                Some(invalid("set_adventure_progress requires delta >= 1"))
            }
            _ => None,
        }
    }
}

fn invalid(message: &str) -> ApiError {
    ApiError::new(ErrorCode::InvalidCommand, message, None)
}

fn api_error(err: &ProgressionError) -> ApiError {
    let (code, details) = match err {
        ProgressionError::Rule(rule) => rule_error(rule),
        ProgressionError::NotFound { kind, id } => {
            (ErrorCode::NotFound, Some(format!("kind={kind} id={id}")))
        }
        ProgressionError::AlreadyExists { kind, id } => {
            (ErrorCode::AlreadyExists, Some(format!("kind={kind} id={id}")))
        }
    };
    ApiError::new(code, err.to_string(), details)
}

fn rule_error(rule: &RuleViolation) -> (ErrorCode, Option<String>) {
    match rule {
        RuleViolation::InvestigationLocked => (ErrorCode::InvestigationLocked, None),
        RuleViolation::CapExceeded { track, limit } => (
            ErrorCode::CapExceeded,
            Some(format!("track={track} limit={limit}")),
        ),
        RuleViolation::NoConvertibleEntry { code } => {
            (ErrorCode::NoConvertibleEntry, Some(format!("code={code}")))
        }
        RuleViolation::ExpeditionNotStarted => (ErrorCode::ExpeditionNotStarted, None),
        RuleViolation::InvalidPhaseTransition { .. } => (ErrorCode::InvalidPhaseTransition, None),
        RuleViolation::PartyLeaderLocked => (ErrorCode::PartyLeaderLocked, None),
        RuleViolation::ContractTierLocked { required, current } => (
            ErrorCode::ContractTierLocked,
            Some(format!("required={required} current={current}")),
        ),
        RuleViolation::NotAllowedInPhase { action, .. } => {
            (ErrorCode::NotAllowedInPhase, Some(format!("action={action}")))
        }
        RuleViolation::AlreadyResolved { what } => {
            (ErrorCode::AlreadyResolved, Some(format!("what={what}")))
        }
    }
}

fn log_rejection(command: &Command, error: &ApiError) {
    match error.error_class {
        ErrorClass::Integrity => tracing::warn!(
            target: "progression::api",
            command_id = %command.command_id,
            command_type = command.payload.command_type(),
            error_code = ?error.error_code,
            message = %error.message,
            "command.rejected"
        ),
        ErrorClass::RuleViolation | ErrorClass::Request => tracing::debug!(
            target: "progression::api",
            command_id = %command.command_id,
            command_type = command.payload.command_type(),
            error_code = ?error.error_code,
            message = %error.message,
            "command.rejected"
        ),
    }
}

#[cfg(test)]
mod tests {
    use contracts::{AttemptResult, InvestigationCode, InvestigationVia};

    use super::*;

    fn tracker() -> CampaignTracker {
        CampaignTracker::new(builtin_catalog().expect("builtin catalog should parse"))
    }

    fn temp_db_path(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();

        std::env::temp_dir().join(format!("progression_tracker_{name}_{nanos}.sqlite"))
    }

    fn remove_db(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }

    fn submit(tracker: &mut CampaignTracker, id: &str, payload: CommandPayload) -> CommandResult {
        tracker.submit_command(Command::new(id, 1_700_000_000_000, payload))
    }

    fn register(tracker: &mut CampaignTracker, uid: &str) {
        let result = submit(
            tracker,
            &format!("cmd_register_{uid}"),
            CommandPayload::RegisterKnight {
                knight_uid: uid.to_string(),
                name: format!("Sir {uid}"),
            },
        );
        assert!(result.accepted);
    }

    fn attempt(uid: &str, chapter: u32, code: &str) -> CommandPayload {
        CommandPayload::RecordInvestigationAttempt {
            knight_uid: uid.to_string(),
            chapter,
            code: InvestigationCode::new(code),
            via: InvestigationVia::Normal,
            result: AttemptResult::Pass,
        }
    }

    #[test]
    fn rejects_unsupported_schema_version() {
        let mut tracker = tracker();
        let mut command = Command::new(
            "cmd_old",
            1,
            CommandPayload::RegisterKnight {
                knight_uid: "k1".to_string(),
                name: String::new(),
            },
        );
        command.schema_version = "0.9".to_string();

        let result = tracker.submit_command(command);
        assert!(!result.accepted);
        assert_eq!(result.error_code(), Some(ErrorCode::ContractVersionUnsupported));
        assert!(tracker.snapshot().knights.is_empty());
    }

    #[test]
    fn rejects_zero_chapter_as_request_error() {
        let mut tracker = tracker();
        register(&mut tracker, "k1");
        let result = submit(&mut tracker, "cmd_zero", attempt("k1", 0, "L-01"));

        let error = result.error.expect("zero chapter should be rejected");
        assert_eq!(error.error_code, ErrorCode::InvalidCommand);
        assert_eq!(error.error_class, ErrorClass::Request);
    }

    #[test]
    fn rule_violations_leave_state_untouched() {
        let mut tracker = tracker();
        register(&mut tracker, "k1");
        for (index, code) in ["L-01", "L-02", "L-03"].iter().enumerate() {
            let result = submit(&mut tracker, &format!("cmd_pass_{index}"), attempt("k1", 1, code));
            assert!(result.accepted);
        }
        let before = tracker.snapshot().clone();

        let result = submit(&mut tracker, "cmd_pass_over", attempt("k1", 1, "L-04"));
        let error = result.error.expect("fourth normal pass should be rejected");
        assert_eq!(error.error_code, ErrorCode::CapExceeded);
        assert_eq!(error.error_class, ErrorClass::RuleViolation);
        assert_eq!(error.details.as_deref(), Some("track=normal limit=3"));
        assert_eq!(tracker.snapshot(), &before);
        assert_eq!(tracker.command_audit().len(), 5);
    }

    #[test]
    fn unknown_ids_are_integrity_errors() {
        let mut tracker = tracker();
        let result = submit(&mut tracker, "cmd_ghost", attempt("ghost", 1, "L-01"));
        let error = result.error.expect("unknown knight should be rejected");
        assert_eq!(error.error_code, ErrorCode::NotFound);
        assert_eq!(error.error_class, ErrorClass::Integrity);

        let query = tracker.calculate_tier("ghost").unwrap_err();
        assert_eq!(query.error_code, ErrorCode::NotFound);
    }

    #[test]
    fn replayed_command_id_is_rejected() {
        let mut tracker = tracker();
        register(&mut tracker, "k1");
        let result = submit(
            &mut tracker,
            "cmd_register_k1",
            CommandPayload::RegisterKnight {
                knight_uid: "k2".to_string(),
                name: String::new(),
            },
        );
        assert_eq!(result.error_code(), Some(ErrorCode::InvalidCommand));
        assert!(tracker.knight("k2").is_err());
    }

    #[test]
    fn contract_options_flag_locked_tiers() {
        let mut tracker = tracker();
        register(&mut tracker, "k1");
        let created = submit(
            &mut tracker,
            "cmd_campaign",
            CommandPayload::CreateCampaign {
                campaign_id: "camp".to_string(),
                name: "Salt Road".to_string(),
                members: vec!["k1".to_string()],
            },
        );
        assert!(created.accepted);

        let options = tracker
            .contract_options("camp", "lyonesse")
            .expect("kingdom should exist");
        let selectable = options
            .iter()
            .filter(|option| option.selectable)
            .map(|option| option.contract.contract_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(selectable, vec!["lyonesse_bell_ringers"]);
        assert_eq!(options.len(), 5);
    }

    #[test]
    fn persists_and_reloads_state() {
        let db_path = temp_db_path("reload");
        let mut first = tracker();
        first
            .attach_sqlite_store(&db_path)
            .expect("should attach sqlite store");

        register(&mut first, "k1");
        let result = submit(&mut first, "cmd_attempt", attempt("k1", 1, "L-01"));
        assert!(result.accepted);
        let rejected = submit(&mut first, "cmd_bad", attempt("k1", 0, "L-02"));
        assert!(!rejected.accepted);
        assert!(first.last_persistence_error().is_none());

        let expected = first.snapshot().clone();
        let last_sequence = first.events().last().map(|event| event.sequence);
        drop(first);

        let mut reloaded = tracker();
        reloaded
            .attach_sqlite_store(&db_path)
            .expect("should reattach sqlite store");
        assert_eq!(reloaded.snapshot(), &expected);
        assert_eq!(reloaded.command_log().len(), 3);
        assert_eq!(
            reloaded
                .event_history(0)
                .expect("events should load")
                .last()
                .map(|event| event.sequence),
            last_sequence
        );

        register(&mut reloaded, "k2");
        let next = reloaded.events().first().map(|event| event.sequence);
        assert_eq!(next, last_sequence.map(|sequence| sequence + 1));

        drop(reloaded);
        remove_db(&db_path);
    }

    #[test]
    fn command_accepted_on_retry_stays_applied_after_reload() {
        let db_path = temp_db_path("retry");
        let mut first = tracker();
        first
            .attach_sqlite_store(&db_path)
            .expect("should attach sqlite store");

        let early = submit(&mut first, "cmd_a", attempt("k1", 1, "L-01"));
        assert_eq!(early.error_code(), Some(ErrorCode::NotFound));
        register(&mut first, "k1");
        assert!(submit(&mut first, "cmd_a", attempt("k1", 1, "L-01")).accepted);
        assert!(first.last_persistence_error().is_none());
        drop(first);

        let mut reloaded = tracker();
        reloaded
            .attach_sqlite_store(&db_path)
            .expect("should reattach sqlite store");
        let outcomes = reloaded
            .command_log()
            .iter()
            .map(|entry| (entry.command.command_id.as_str(), entry.result.accepted))
            .collect::<Vec<_>>();
        assert_eq!(
            outcomes,
            vec![
                ("cmd_a", false),
                ("cmd_register_k1", true),
                ("cmd_a", true)
            ]
        );

        let replay = submit(&mut reloaded, "cmd_a", attempt("k1", 1, "L-01"));
        assert_eq!(replay.error_code(), Some(ErrorCode::InvalidCommand));
        let chapter = reloaded
            .knight("k1")
            .expect("knight should reload")
            .chapters
            .get(&1)
            .expect("chapter 1 should exist");
        assert_eq!(chapter.attempts.len(), 1);

        drop(reloaded);
        remove_db(&db_path);
    }
}
