use std::path::Path;

use contracts::{Command, CommandResult, Event, ProgressionSnapshot};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCommandEntry {
    pub command: Command,
    pub result: CommandResult,
}

/// Latest stored state plus the last event sequence it already includes.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSnapshot {
    pub snapshot: ProgressionSnapshot,
    pub last_event_sequence: u64,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct SqliteCampaignStore {
    conn: Connection,
}

impl SqliteCampaignStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Writes one command with its outcome, the events it produced and, when it
    /// was accepted, the resulting snapshot. All rows land in one transaction.
    /// A retried `command_id` gets its own row; only the newest snapshot is kept.
    pub fn persist_command(
        &mut self,
        entry: &PersistedCommandEntry,
        events: &[Event],
        snapshot: Option<&ProgressionSnapshot>,
    ) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO commands (
                command_id,
                command_type,
                issued_at_ms,
                accepted,
                command_json,
                result_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.command.command_id.as_str(),
                entry.command.payload.command_type(),
                to_sql_int(entry.command.issued_at_ms),
                if entry.result.accepted { 1_i64 } else { 0_i64 },
                serde_json::to_string(&entry.command)?,
                serde_json::to_string(&entry.result)?,
            ],
        )?;

        for event in events {
            tx.execute(
                "INSERT OR IGNORE INTO events (
                    sequence,
                    command_id,
                    event_type,
                    subject_id,
                    payload_json,
                    created_at_ms
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    to_sql_int(event.sequence),
                    event.command_id.as_str(),
                    format!("{:?}", event.event_type),
                    event.subject_id.as_str(),
                    serde_json::to_string(event)?,
                    to_sql_int(event.created_at_ms),
                ],
            )?;
        }

        if let Some(snapshot_payload) = snapshot {
            let last_event_sequence: i64 =
                tx.query_row("SELECT COALESCE(MAX(sequence), 0) FROM events", [], |row| {
                    row.get(0)
                })?;
            tx.execute(
                "INSERT INTO snapshots (
                    command_id,
                    last_event_sequence,
                    payload_json,
                    created_at_ms
                 ) VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.command.command_id.as_str(),
                    last_event_sequence,
                    serde_json::to_string(snapshot_payload)?,
                    to_sql_int(entry.command.issued_at_ms),
                ],
            )?;
            let snapshot_id = tx.last_insert_rowid();
            tx.execute(
                "DELETE FROM snapshots WHERE snapshot_id < ?1",
                params![snapshot_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_latest_snapshot(&self) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT payload_json, last_event_sequence
                 FROM snapshots
                 ORDER BY snapshot_id DESC
                 LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((raw, sequence)) => Ok(Some(PersistedSnapshot {
                snapshot: serde_json::from_str::<ProgressionSnapshot>(&raw)?,
                last_event_sequence: u64::try_from(sequence).unwrap_or(0),
            })),
            None => Ok(None),
        }
    }

    pub fn next_event_sequence(&self) -> Result<u64, PersistenceError> {
        let max: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(sequence), 0) FROM events", [], |row| {
                row.get(0)
            })?;
        Ok(u64::try_from(max).unwrap_or(0) + 1)
    }

    pub fn load_events_after(&self, sequence: u64) -> Result<Vec<Event>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json
             FROM events
             WHERE sequence > ?1
             ORDER BY sequence ASC",
        )?;

        let rows = stmt.query_map(params![to_sql_int(sequence)], |row| row.get::<_, String>(0))?;

        let mut events = Vec::new();
        for row in rows {
            let payload = row?;
            events.push(serde_json::from_str::<Event>(&payload)?);
        }

        Ok(events)
    }

    pub fn load_command_log(&self) -> Result<Vec<PersistedCommandEntry>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT command_json, result_json
             FROM commands
             ORDER BY entry_id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (command_json, result_json) = row?;
            entries.push(PersistedCommandEntry {
                command: serde_json::from_str(&command_json)?,
                result: serde_json::from_str(&result_json)?,
            });
        }

        Ok(entries)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS commands (
                entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
                command_id TEXT NOT NULL,
                command_type TEXT NOT NULL,
                issued_at_ms INTEGER NOT NULL,
                accepted INTEGER NOT NULL,
                command_json TEXT NOT NULL,
                result_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                sequence INTEGER PRIMARY KEY,
                command_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
                command_id TEXT NOT NULL,
                last_event_sequence INTEGER NOT NULL,
                payload_json TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_subject ON events(subject_id, sequence);
            CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type, sequence);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'progression-000000')",
            [],
        )?;

        let command_entries_applied: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = 2)",
            [],
            |row| row.get(0),
        )?;
        if !command_entries_applied {
            self.migrate_command_entries()?;
        }

        Ok(())
    }

    /// Version 1 keyed `commands` on `command_id`, which dropped the accepted
    /// row of a command retried after a rejection. Rebuild it keyed per entry.
    fn migrate_command_entries(&mut self) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "
            ALTER TABLE commands RENAME TO commands_v1;

            CREATE TABLE commands (
                entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
                command_id TEXT NOT NULL,
                command_type TEXT NOT NULL,
                issued_at_ms INTEGER NOT NULL,
                accepted INTEGER NOT NULL,
                command_json TEXT NOT NULL,
                result_json TEXT NOT NULL
            );

            INSERT INTO commands (
                command_id, command_type, issued_at_ms, accepted, command_json, result_json
            )
            SELECT command_id, command_type, issued_at_ms, accepted, command_json, result_json
            FROM commands_v1
            ORDER BY rowid ASC;

            DROP TABLE commands_v1;

            CREATE INDEX IF NOT EXISTS idx_commands_id ON commands(command_id);
            CREATE INDEX IF NOT EXISTS idx_commands_issued ON commands(issued_at_ms);

            INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
            VALUES(2, 'command_entries_v2', 'progression-000000');
            ",
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use contracts::{ApiError, CommandPayload, ErrorCode};

    use super::*;

    fn temp_db_path(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();

        std::env::temp_dir().join(format!("progression_store_{name}_{nanos}.sqlite"))
    }

    fn remove_db(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }

    fn register(id: &str, uid: &str) -> Command {
        Command::new(
            id,
            1_700_000_000_000,
            CommandPayload::RegisterKnight {
                knight_uid: uid.to_string(),
                name: String::new(),
            },
        )
    }

    fn accepted(command: &Command) -> PersistedCommandEntry {
        PersistedCommandEntry {
            command: command.clone(),
            result: CommandResult::accepted(command),
        }
    }

    fn snapshot_rows(store: &SqliteCampaignStore) -> i64 {
        store
            .conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))
            .expect("count snapshots")
    }

    #[test]
    fn retried_command_id_keeps_every_outcome() {
        let db_path = temp_db_path("retry");
        let mut store = SqliteCampaignStore::open(&db_path).expect("open store");

        let command = register("cmd_retry", "k1");
        let rejected = PersistedCommandEntry {
            command: command.clone(),
            result: CommandResult::rejected(
                &command,
                ApiError::new(ErrorCode::InvalidCommand, "not yet", None),
            ),
        };
        store
            .persist_command(&rejected, &[], None)
            .expect("persist rejection");
        store
            .persist_command(&accepted(&command), &[], Some(&ProgressionSnapshot::default()))
            .expect("persist acceptance");

        let outcomes = store
            .load_command_log()
            .expect("load log")
            .into_iter()
            .map(|entry| (entry.command.command_id, entry.result.accepted))
            .collect::<Vec<_>>();
        assert_eq!(
            outcomes,
            vec![
                ("cmd_retry".to_string(), false),
                ("cmd_retry".to_string(), true)
            ]
        );

        drop(store);
        remove_db(&db_path);
    }

    #[test]
    fn only_the_latest_snapshot_is_retained() {
        let db_path = temp_db_path("prune");
        let mut store = SqliteCampaignStore::open(&db_path).expect("open store");

        for index in 0..4 {
            let command = register(&format!("cmd_{index}"), &format!("k{index}"));
            store
                .persist_command(
                    &accepted(&command),
                    &[],
                    Some(&ProgressionSnapshot::default()),
                )
                .expect("persist");
        }

        assert_eq!(snapshot_rows(&store), 1);
        assert!(store
            .load_latest_snapshot()
            .expect("load snapshot")
            .is_some());

        drop(store);
        remove_db(&db_path);
    }

    #[test]
    fn reopening_keeps_migrations_idempotent() {
        let db_path = temp_db_path("reopen");
        let mut store = SqliteCampaignStore::open(&db_path).expect("open store");
        let command = register("cmd_once", "k1");
        store
            .persist_command(&accepted(&command), &[], None)
            .expect("persist");
        drop(store);

        let store = SqliteCampaignStore::open(&db_path).expect("reopen store");
        assert_eq!(store.load_command_log().expect("load log").len(), 1);
        let versions: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count migrations");
        assert_eq!(versions, 2);

        drop(store);
        remove_db(&db_path);
    }
}
