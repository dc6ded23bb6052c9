//! The `SQLite`-backed store.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use gatehouse_core::{AuditEntry, Decision, OfflineResult, PendingApproval, Resolution, ToolArgs};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    request_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    signature TEXT NOT NULL,
    args TEXT NOT NULL,
    decision TEXT NOT NULL,
    resolution TEXT NOT NULL,
    resolved_by TEXT,
    result TEXT,
    error_kind TEXT
);

CREATE TABLE IF NOT EXISTS pending_requests (
    request_id TEXT PRIMARY KEY,
    tool_name TEXT NOT NULL,
    signature TEXT NOT NULL,
    args TEXT NOT NULL,
    message_ref TEXT,
    status TEXT NOT NULL DEFAULT 'waiting',
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS offline_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    result TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_request ON audit_log(request_id);
CREATE INDEX IF NOT EXISTS idx_pending_expires ON pending_requests(expires_at);
CREATE INDEX IF NOT EXISTS idx_offline_agent ON offline_results(agent_id);
";

/// Marker status for a pending row awaiting its terminal transition.
const STATUS_WAITING: &str = "waiting";

/// Outcome of a [`Store::resolve_pending`] attempt.
///
/// Exactly one caller per request id ever observes [`ResolveOutcome::Won`];
/// every later caller gets a no-op. This property defeats the
/// approval-versus-timeout race.
#[derive(Debug)]
pub enum ResolveOutcome {
    /// This caller performed the terminal transition.
    Won(PendingApproval),
    /// Someone already resolved the record; the prior resolution, when the
    /// row still exists to report one.
    AlreadyResolved(Option<Resolution>),
    /// No record with this id exists (resolved and removed, or never
    /// inserted).
    NotFound,
}

/// Durable audit, pending, and offline-result storage.
///
/// Cloning shares the underlying connection; all writers serialize on the
/// internal mutex. The connection closes when the last clone drops.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    ///
    /// The parent directory is created, the schema applied, and on Unix the
    /// file mode tightened to `0600` — audit rows carry tool arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the file cannot be created or the
    /// schema cannot be applied.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        debug!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (tests).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the schema cannot be applied.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    // -- audit ------------------------------------------------------------

    /// Append one audit row.
    ///
    /// Called exactly once per request, at its terminal state, and always
    /// before the agent is told the outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the insert fails.
    pub fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO audit_log
               (timestamp, request_id, tool_name, signature, args, decision,
                resolution, resolved_by, result, error_kind)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                to_iso(entry.timestamp),
                entry.request_id,
                entry.tool_name,
                entry.signature,
                args_json(&entry.args)?,
                entry.decision.as_str(),
                entry.resolution.as_str(),
                entry.resolved_by,
                entry.result.as_ref().map(serde_json::Value::to_string),
                entry.error_kind,
            ],
        )?;
        Ok(())
    }

    /// Recent audit rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure or corrupt rows.
    pub fn recent_audit(&self, limit: u32) -> StoreResult<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, request_id, tool_name, signature, args, decision,
                    resolution, resolved_by, result, error_kind
               FROM audit_log ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_audit)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// The audit row for a request id, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure or corrupt rows.
    pub fn audit_for_request(&self, request_id: &str) -> StoreResult<Option<AuditEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT timestamp, request_id, tool_name, signature, args, decision,
                    resolution, resolved_by, result, error_kind
               FROM audit_log WHERE request_id = ?1",
            params![request_id],
            row_to_audit,
        )
        .optional()
        .map_err(Into::into)
    }

    // -- pending ----------------------------------------------------------

    /// Insert a pending approval in the `waiting` state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicatePending`] when a record with this id
    /// already exists.
    pub fn insert_pending(&self, pending: &PendingApproval) -> StoreResult<()> {
        let conn = self.lock()?;
        insert_pending_row(&conn, pending)
    }

    /// Insert a pending approval only while the waiting count is below
    /// `max`. Check and insert share one critical section, so concurrent
    /// ASK requests can never overshoot the ceiling.
    ///
    /// Returns `false` (without side effects) when the ceiling is reached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicatePending`] when a record with this id
    /// already exists.
    pub fn insert_pending_if_capacity(
        &self,
        pending: &PendingApproval,
        max: u64,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let waiting: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_requests WHERE status = ?1",
            params![STATUS_WAITING],
            |row| row.get(0),
        )?;
        if u64::try_from(waiting).unwrap_or(0) >= max {
            return Ok(false);
        }
        insert_pending_row(&conn, pending)?;
        Ok(true)
    }

    /// Record the messenger message reference for an inserted pending.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the update fails.
    pub fn set_pending_message_ref(&self, request_id: &str, message_ref: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE pending_requests SET message_ref = ?1 WHERE request_id = ?2",
            params![message_ref, request_id],
        )?;
        Ok(())
    }

    /// Attempt the terminal transition for a pending record.
    ///
    /// A single conditional update guarded on `status = 'waiting'`: the
    /// first caller wins and receives the record; concurrent or later
    /// callers observe [`ResolveOutcome::AlreadyResolved`] (or
    /// [`ResolveOutcome::NotFound`] once the row is removed) and must
    /// treat it as a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub fn resolve_pending(
        &self,
        request_id: &str,
        resolution: Resolution,
    ) -> StoreResult<ResolveOutcome> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE pending_requests SET status = ?1
               WHERE request_id = ?2 AND status = ?3",
            params![resolution.as_str(), request_id, STATUS_WAITING],
        )?;

        if changed == 1 {
            let record = conn.query_row(
                "SELECT request_id, tool_name, signature, args, message_ref,
                        created_at, expires_at
                   FROM pending_requests WHERE request_id = ?1",
                params![request_id],
                row_to_pending,
            )?;
            return Ok(ResolveOutcome::Won(record));
        }

        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM pending_requests WHERE request_id = ?1",
                params![request_id],
                |row| row.get(0),
            )
            .optional()?;

        match status {
            None => Ok(ResolveOutcome::NotFound),
            Some(s) => Ok(ResolveOutcome::AlreadyResolved(
                Resolution::from_str(&s).ok(),
            )),
        }
    }

    /// Remove a pending record after its outcome has been audited and
    /// delivered or queued.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the delete fails.
    pub fn remove_pending(&self, request_id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM pending_requests WHERE request_id = ?1",
            params![request_id],
        )?;
        Ok(())
    }

    /// Resolve every waiting record whose expiry has passed as timed out,
    /// returning the swept records for notification.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the sweep transaction fails.
    pub fn sweep_stale(&self, now: DateTime<Utc>) -> StoreResult<Vec<PendingApproval>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now_iso = to_iso(now);

        let stale = {
            let mut stmt = tx.prepare(
                "SELECT request_id, tool_name, signature, args, message_ref,
                        created_at, expires_at
                   FROM pending_requests
                  WHERE status = ?1 AND expires_at <= ?2",
            )?;
            let rows = stmt.query_map(params![STATUS_WAITING, now_iso], row_to_pending)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        if !stale.is_empty() {
            tx.execute(
                "UPDATE pending_requests SET status = ?1
                   WHERE status = ?2 AND expires_at <= ?3",
                params![Resolution::TimedOut.as_str(), STATUS_WAITING, now_iso],
            )?;
        }
        tx.commit()?;
        Ok(stale)
    }

    /// Every record still waiting for a decision (startup re-arm).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub fn waiting_pending(&self) -> StoreResult<Vec<PendingApproval>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT request_id, tool_name, signature, args, message_ref,
                    created_at, expires_at
               FROM pending_requests WHERE status = ?1",
        )?;
        let rows = stmt.query_map(params![STATUS_WAITING], row_to_pending)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Number of records currently waiting (pending-quota source of truth).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub fn count_waiting(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_requests WHERE status = ?1",
            params![STATUS_WAITING],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // -- offline results --------------------------------------------------

    /// Buffer a resolution whose reply could not be delivered.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the insert fails.
    pub fn enqueue_offline_result(
        &self,
        request_id: &str,
        tool_name: &str,
        result: &serde_json::Value,
        agent_id: &str,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO offline_results
               (request_id, tool_name, result, agent_id, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                request_id,
                tool_name,
                result.to_string(),
                agent_id,
                to_iso(Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Atomically drain every buffered result for an agent identity.
    ///
    /// The select and delete run in one transaction, so each result is
    /// returned exactly once across all callers.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the drain transaction fails.
    pub fn drain_offline_results(&self, agent_id: &str) -> StoreResult<Vec<OfflineResult>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let results = {
            let mut stmt = tx.prepare(
                "SELECT request_id, tool_name, result, created_at
                   FROM offline_results WHERE agent_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![agent_id], |row| {
                let result_raw: String = row.get(2)?;
                let created_raw: String = row.get(3)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    result_raw,
                    created_raw,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        tx.execute(
            "DELETE FROM offline_results WHERE agent_id = ?1",
            params![agent_id],
        )?;
        tx.commit()?;

        results
            .into_iter()
            .map(|(request_id, tool_name, result, created_at)| {
                Ok(OfflineResult {
                    request_id,
                    tool_name,
                    result: serde_json::from_str(&result)
                        .map_err(|e| StoreError::Corrupt(format!("offline result: {e}")))?,
                    created_at: parse_iso(&created_at)?,
                })
            })
            .collect()
    }

    // -- health -----------------------------------------------------------

    /// Whether the database answers a trivial query.
    #[must_use]
    pub fn health_check(&self) -> bool {
        self.lock()
            .ok()
            .and_then(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .ok()
            })
            .is_some()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

// -- row mapping ----------------------------------------------------------

fn insert_pending_row(conn: &Connection, pending: &PendingApproval) -> StoreResult<()> {
    let result = conn.execute(
        "INSERT INTO pending_requests
           (request_id, tool_name, signature, args, message_ref, status,
            created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            pending.request_id,
            pending.tool_name,
            pending.signature,
            args_json(&pending.args)?,
            pending.message_ref,
            STATUS_WAITING,
            to_iso(pending.created_at),
            to_iso(pending.expires_at),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::DuplicatePending(pending.request_id.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

fn to_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn parse_iso(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

fn args_json(args: &ToolArgs) -> StoreResult<String> {
    serde_json::to_string(args).map_err(|e| StoreError::Corrupt(format!("args: {e}")))
}

fn parse_args(raw: &str) -> Result<ToolArgs, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> Result<AuditEntry, rusqlite::Error> {
    let timestamp: String = row.get(0)?;
    let args_raw: String = row.get(4)?;
    let decision_raw: String = row.get(5)?;
    let resolution_raw: String = row.get(6)?;
    let result_raw: Option<String> = row.get(8)?;

    Ok(AuditEntry {
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(0, e))?,
        request_id: row.get(1)?,
        tool_name: row.get(2)?,
        signature: row.get(3)?,
        args: parse_args(&args_raw)?,
        decision: Decision::from_str(&decision_raw)
            .map_err(|e| conversion_err(5, std::io::Error::other(e)))?,
        resolution: Resolution::from_str(&resolution_raw)
            .map_err(|e| conversion_err(6, std::io::Error::other(e)))?,
        resolved_by: row.get(7)?,
        result: result_raw
            .map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_err(8, e)))
            .transpose()?,
        error_kind: row.get(9)?,
    })
}

fn row_to_pending(row: &rusqlite::Row<'_>) -> Result<PendingApproval, rusqlite::Error> {
    let args_raw: String = row.get(3)?;
    let created_raw: String = row.get(5)?;
    let expires_raw: String = row.get(6)?;

    Ok(PendingApproval {
        request_id: row.get(0)?,
        tool_name: row.get(1)?,
        signature: row.get(2)?,
        args: parse_args(&args_raw)?,
        message_ref: row.get(4)?,
        created_at: DateTime::parse_from_rfc3339(&created_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(5, e))?,
        expires_at: DateTime::parse_from_rfc3339(&expires_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(6, e))?,
    })
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gatehouse_core::ToolRequest;
    use serde_json::{json, Value};

    fn sample_args() -> ToolArgs {
        let mut args = ToolArgs::new();
        args.insert("entity_id".into(), Value::String("sensor.t".into()));
        args
    }

    fn sample_pending(request_id: &str, expires_in: Duration) -> PendingApproval {
        let now = Utc::now();
        PendingApproval {
            request_id: request_id.into(),
            tool_name: "ha_call_service".into(),
            signature: "ha_call_service(light.turn_on, light.bedroom)".into(),
            args: sample_args(),
            message_ref: None,
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn audit_append_and_read_back() {
        let store = Store::in_memory().unwrap();
        let request = ToolRequest::new("r-1", "ha_get_state", sample_args());
        let entry = AuditEntry::immediate(
            &request,
            "ha_get_state(sensor.t)",
            Decision::Allow,
            Resolution::Executed,
        )
        .with_result(json!({"state": "21.5"}));

        store.append_audit(&entry).unwrap();

        let back = store.audit_for_request("r-1").unwrap().unwrap();
        assert_eq!(back.decision, Decision::Allow);
        assert_eq!(back.resolution, Resolution::Executed);
        assert_eq!(back.args, sample_args());
        assert_eq!(back.result, Some(json!({"state": "21.5"})));

        let recent = store.recent_audit(10).unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn first_resolution_wins_second_is_noop() {
        let store = Store::in_memory().unwrap();
        store
            .insert_pending(&sample_pending("r-race", Duration::seconds(900)))
            .unwrap();

        let first = store
            .resolve_pending("r-race", Resolution::Approved)
            .unwrap();
        assert!(matches!(first, ResolveOutcome::Won(_)));

        // The timeout path arrives late and must observe the prior outcome.
        let second = store
            .resolve_pending("r-race", Resolution::TimedOut)
            .unwrap();
        match second {
            ResolveOutcome::AlreadyResolved(Some(r)) => assert_eq!(r, Resolution::Approved),
            other => panic!("expected AlreadyResolved(Approved), got {other:?}"),
        }
    }

    #[test]
    fn resolving_missing_record_is_not_found() {
        let store = Store::in_memory().unwrap();
        let outcome = store
            .resolve_pending("ghost", Resolution::TimedOut)
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::NotFound));
    }

    #[test]
    fn removed_pending_is_never_resurrected() {
        let store = Store::in_memory().unwrap();
        store
            .insert_pending(&sample_pending("r-gone", Duration::seconds(900)))
            .unwrap();
        store
            .resolve_pending("r-gone", Resolution::DeniedByUser)
            .unwrap();
        store.remove_pending("r-gone").unwrap();

        assert!(matches!(
            store.resolve_pending("r-gone", Resolution::Approved).unwrap(),
            ResolveOutcome::NotFound
        ));
        assert_eq!(store.count_waiting().unwrap(), 0);
    }

    #[test]
    fn capped_insert_enforces_the_ceiling() {
        let store = Store::in_memory().unwrap();
        let pending = |id: &str| sample_pending(id, Duration::seconds(900));

        assert!(store.insert_pending_if_capacity(&pending("r-1"), 2).unwrap());
        assert!(store.insert_pending_if_capacity(&pending("r-2"), 2).unwrap());
        // At the ceiling: rejected without side effects.
        assert!(!store.insert_pending_if_capacity(&pending("r-3"), 2).unwrap());
        assert_eq!(store.count_waiting().unwrap(), 2);

        // A resolved record frees capacity.
        store.resolve_pending("r-1", Resolution::Approved).unwrap();
        assert!(store.insert_pending_if_capacity(&pending("r-3"), 2).unwrap());
    }

    #[test]
    fn duplicate_pending_is_rejected() {
        let store = Store::in_memory().unwrap();
        let pending = sample_pending("r-dup", Duration::seconds(900));
        store.insert_pending(&pending).unwrap();
        let err = store.insert_pending(&pending).unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePending(ref id) if id == "r-dup"));
    }

    #[test]
    fn sweep_resolves_only_expired_records() {
        let store = Store::in_memory().unwrap();
        store
            .insert_pending(&sample_pending("r-old", Duration::seconds(-5)))
            .unwrap();
        store
            .insert_pending(&sample_pending("r-new", Duration::seconds(900)))
            .unwrap();

        let swept = store.sweep_stale(Utc::now()).unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].request_id, "r-old");

        // The swept record is terminally timed out; a late approval no-ops.
        match store.resolve_pending("r-old", Resolution::Approved).unwrap() {
            ResolveOutcome::AlreadyResolved(Some(r)) => assert_eq!(r, Resolution::TimedOut),
            other => panic!("expected AlreadyResolved(TimedOut), got {other:?}"),
        }

        // The fresh record still counts against the quota and resolves.
        assert_eq!(store.count_waiting().unwrap(), 1);
        assert!(matches!(
            store.resolve_pending("r-new", Resolution::Approved).unwrap(),
            ResolveOutcome::Won(_)
        ));
    }

    #[test]
    fn sweep_boundary_is_inclusive() {
        let store = Store::in_memory().unwrap();
        let pending = sample_pending("r-edge", Duration::zero());
        let expires_at = pending.expires_at;
        store.insert_pending(&pending).unwrap();

        // A sweep at exactly expires_at claims the record.
        let swept = store.sweep_stale(expires_at).unwrap();
        assert_eq!(swept.len(), 1);
    }

    #[test]
    fn offline_results_drain_exactly_once() {
        let store = Store::in_memory().unwrap();
        store
            .enqueue_offline_result("r-1", "ha_get_state", &json!({"status": "executed"}), "default")
            .unwrap();
        store
            .enqueue_offline_result("r-2", "ha_get_state", &json!({"status": "denied"}), "default")
            .unwrap();

        let first = store.drain_offline_results("default").unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].request_id, "r-1");
        assert_eq!(first[1].request_id, "r-2");

        let second = store.drain_offline_results("default").unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn offline_results_are_scoped_by_agent() {
        let store = Store::in_memory().unwrap();
        store
            .enqueue_offline_result("r-1", "t", &json!(1), "default")
            .unwrap();
        assert!(store.drain_offline_results("someone-else").unwrap().is_empty());
        assert_eq!(store.drain_offline_results("default").unwrap().len(), 1);
    }

    #[test]
    fn waiting_pending_lists_only_unresolved() {
        let store = Store::in_memory().unwrap();
        store
            .insert_pending(&sample_pending("r-a", Duration::seconds(900)))
            .unwrap();
        store
            .insert_pending(&sample_pending("r-b", Duration::seconds(900)))
            .unwrap();
        store.resolve_pending("r-a", Resolution::Approved).unwrap();

        let waiting = store.waiting_pending().unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].request_id, "r-b");
    }

    #[test]
    fn message_ref_updates() {
        let store = Store::in_memory().unwrap();
        store
            .insert_pending(&sample_pending("r-msg", Duration::seconds(900)))
            .unwrap();
        store.set_pending_message_ref("r-msg", "tg:123:456").unwrap();

        let waiting = store.waiting_pending().unwrap();
        assert_eq!(waiting[0].message_ref.as_deref(), Some("tg:123:456"));
    }

    #[test]
    fn opens_on_disk_and_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("gatehouse.db");

        {
            let store = Store::open(&path).unwrap();
            store
                .insert_pending(&sample_pending("r-persist", Duration::seconds(900)))
                .unwrap();
            assert!(store.health_check());
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_waiting().unwrap(), 1);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
