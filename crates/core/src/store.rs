//! The Persistence Store: a single `rusqlite::Connection`
//! guarded by a mutex, schema created idempotently on open, with an atomic
//! single-row claim giving two processes sharing one SQLite file
//! single-runner semantics for one `(Job, stage)`.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use ulid::Ulid;

use crate::error::StageError;
use crate::models::{Job, Recording, Stage, StageState};
use crate::stage_defs::STAGE_CATALOG;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS recordings (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id       TEXT NOT NULL UNIQUE,
    title           TEXT,
    uploader        TEXT,
    duration_seconds INTEGER,
    upload_date     TEXT,
    webpage_url     TEXT NOT NULL,
    description     TEXT,
    channel_id      TEXT,
    channel_url     TEXT,
    thumbnail       TEXT,
    was_live        INTEGER,
    live_status     TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    ulid            TEXT NOT NULL UNIQUE,
    recording_id    INTEGER NOT NULL REFERENCES recordings(id),
    start_seconds   INTEGER NOT NULL,
    end_seconds     INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id          INTEGER NOT NULL REFERENCES jobs(id),
    stage_name      TEXT NOT NULL,
    state           TEXT NOT NULL,
    attempt_count   INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    started_at      TEXT,
    finished_at     TEXT,
    next_eligible_at TEXT,
    output_path     TEXT,
    UNIQUE(job_id, stage_name)
);

CREATE INDEX IF NOT EXISTS idx_stages_name_state ON stages(stage_name, state);
CREATE INDEX IF NOT EXISTS idx_stages_job ON stages(job_id);
"#;

pub struct Store {
    conn: Mutex<Connection>,
}

fn row_to_recording(row: &rusqlite::Row) -> rusqlite::Result<Recording> {
    Ok(Recording {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        title: row.get("title")?,
        uploader: row.get("uploader")?,
        duration_seconds: row.get("duration_seconds")?,
        upload_date: row.get("upload_date")?,
        webpage_url: row.get("webpage_url")?,
        description: row.get("description")?,
        channel_id: row.get("channel_id")?,
        channel_url: row.get("channel_url")?,
        thumbnail: row.get("thumbnail")?,
        was_live: row.get("was_live")?,
        live_status: row.get("live_status")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get("id")?,
        ulid: row.get("ulid")?,
        recording_id: row.get("recording_id")?,
        start_seconds: row.get("start_seconds")?,
        end_seconds: row.get("end_seconds")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_stage(row: &rusqlite::Row) -> rusqlite::Result<Stage> {
    let state_str: String = row.get("state")?;
    Ok(Stage {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        stage_name: row.get("stage_name")?,
        state: StageState::parse(&state_str).unwrap_or(StageState::Failed),
        attempt_count: row.get("attempt_count")?,
        last_error: row.get("last_error")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
        next_eligible_at: row.get("next_eligible_at")?,
        output_path: row.get("output_path")?,
    })
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Creates the Recording if no row exists for `source_id`; otherwise
    /// returns the existing one, leaving it untouched (Recordings are never
    /// mutated after creation).
    pub fn get_or_create_recording(
        &self,
        source_id: &str,
        webpage_url: &str,
    ) -> Result<Recording, StageError> {
        let conn = self.conn.lock().unwrap();
        let existing = conn
            .query_row(
                "SELECT * FROM recordings WHERE source_id = ?1",
                params![source_id],
                row_to_recording,
            )
            .optional()?;
        if let Some(rec) = existing {
            return Ok(rec);
        }
        let now = Utc::now();
        conn.execute(
            "INSERT INTO recordings (source_id, webpage_url, created_at) VALUES (?1, ?2, ?3)",
            params![source_id, webpage_url, now],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT * FROM recordings WHERE id = ?1",
            params![id],
            row_to_recording,
        )
        .map_err(StageError::from)
    }

    pub fn update_recording_metadata(
        &self,
        recording_id: i64,
        title: Option<&str>,
        uploader: Option<&str>,
        duration_seconds: Option<i64>,
        upload_date: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE recordings SET title = ?1, uploader = ?2, duration_seconds = ?3, upload_date = ?4, description = ?5 WHERE id = ?6",
            params![title, uploader, duration_seconds, upload_date, description, recording_id],
        )?;
        Ok(())
    }

    pub fn get_recording(&self, recording_id: i64) -> Result<Recording, StageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM recordings WHERE id = ?1",
            params![recording_id],
            row_to_recording,
        )
        .map_err(StageError::from)
    }

    /// Creates a Job and materializes every catalog stage as `pending` in
    /// one transaction.
    pub fn create_job(
        &self,
        recording_id: i64,
        start_seconds: i64,
        end_seconds: i64,
    ) -> Result<Job, StageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let ulid = Ulid::new().to_string();
        let now = Utc::now();
        tx.execute(
            "INSERT INTO jobs (ulid, recording_id, start_seconds, end_seconds, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![ulid, recording_id, start_seconds, end_seconds, now],
        )?;
        let job_id = tx.last_insert_rowid();
        for def in STAGE_CATALOG {
            tx.execute(
                "INSERT INTO stages (job_id, stage_name, state, attempt_count) VALUES (?1, ?2, ?3, 0)",
                params![job_id, def.name, StageState::Pending.as_str()],
            )?;
        }
        let job = tx.query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![job_id],
            row_to_job,
        )?;
        tx.commit()?;
        Ok(job)
    }

    pub fn get_job(&self, job_id: i64) -> Result<Job, StageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![job_id], row_to_job)
            .map_err(StageError::from)
    }

    pub fn get_job_with_recording(&self, job_id: i64) -> Result<(Job, Recording), StageError> {
        let job = self.get_job(job_id)?;
        let recording = self.get_recording(job.recording_id)?;
        Ok((job, recording))
    }

    pub fn list_stages_for_job(&self, job_id: i64) -> Result<Vec<Stage>, StageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM stages WHERE job_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id], row_to_stage)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_stage(&self, job_id: i64, stage_name: &str) -> Result<Stage, StageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM stages WHERE job_id = ?1 AND stage_name = ?2",
            params![job_id, stage_name],
            row_to_stage,
        )
        .map_err(StageError::from)
    }

    /// Job ids whose preceding stage is `success` (or this is the first
    /// stage) and whose own state is `pending` or `failed` with
    /// `next_eligible_at` in the past, ordered by Job id.
    pub fn list_eligible(&self, stage_name: &str) -> Result<Vec<i64>, StageError> {
        let predecessor = crate::stage_defs::predecessor(stage_name);
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let job_ids: Vec<i64> = match predecessor {
            None => {
                let mut stmt = conn.prepare(
                    "SELECT job_id FROM stages
                     WHERE stage_name = ?1
                       AND state IN ('pending', 'failed')
                       AND (next_eligible_at IS NULL OR next_eligible_at <= ?2)
                     ORDER BY job_id ASC",
                )?;
                stmt.query_map(params![stage_name, now], |r| r.get(0))?
                    .collect::<Result<Vec<_>, _>>()?
            }
            Some(prev) => {
                let mut stmt = conn.prepare(
                    "SELECT s.job_id FROM stages s
                     JOIN stages p ON p.job_id = s.job_id AND p.stage_name = ?3
                     WHERE s.stage_name = ?1
                       AND s.state IN ('pending', 'failed')
                       AND (s.next_eligible_at IS NULL OR s.next_eligible_at <= ?2)
                       AND p.state = 'success'
                     ORDER BY s.job_id ASC",
                )?;
                stmt.query_map(params![stage_name, now, prev], |r| r.get(0))?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(job_ids)
    }

    /// The atomic claim: transitions `(job_id, stage_name)` from
    /// `pending`/`failed` to `running`, bumping `attempt_count` and stamping
    /// `started_at`, only if it is still in one of those states. Returns
    /// `PreconditionUnmet` if another runner (or a prior call) already
    /// claimed it.
    pub fn claim_stage(&self, job_id: i64, stage_name: &str) -> Result<Stage, StageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let changed = tx.execute(
            "UPDATE stages SET state = 'running', attempt_count = attempt_count + 1, started_at = ?1
             WHERE job_id = ?2 AND stage_name = ?3 AND state IN ('pending', 'failed')
               AND (next_eligible_at IS NULL OR next_eligible_at <= ?1)",
            params![now, job_id, stage_name],
        )?;
        if changed != 1 {
            return Err(StageError::PreconditionUnmet(format!(
                "stage {stage_name} for job {job_id} is not claimable"
            )));
        }
        let stage = tx.query_row(
            "SELECT * FROM stages WHERE job_id = ?1 AND stage_name = ?2",
            params![job_id, stage_name],
            row_to_stage,
        )?;
        tx.commit()?;
        Ok(stage)
    }

    pub fn complete_stage(
        &self,
        job_id: i64,
        stage_name: &str,
        output_path: Option<&str>,
    ) -> Result<(), StageError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "UPDATE stages SET state = 'success', finished_at = ?1, output_path = ?2, last_error = NULL
             WHERE job_id = ?3 AND stage_name = ?4",
            params![now, output_path, job_id, stage_name],
        )?;
        Ok(())
    }

    pub fn fail_stage(
        &self,
        job_id: i64,
        stage_name: &str,
        error_message: &str,
        backoff_seconds: i64,
    ) -> Result<(), StageError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let next_eligible = now + chrono::Duration::seconds(backoff_seconds);
        conn.execute(
            "UPDATE stages SET state = 'failed', finished_at = ?1, last_error = ?2, next_eligible_at = ?3
             WHERE job_id = ?4 AND stage_name = ?5",
            params![now, error_message, next_eligible, job_id, stage_name],
        )?;
        Ok(())
    }

    /// Reclaims every Stage left `running` (from a crashed prior process) to
    /// `pending`, preserving attempt count. Call once at Dispatcher startup.
    pub fn reclaim_abandoned(&self) -> Result<usize, StageError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE stages SET state = 'pending', last_error = 'abandoned' WHERE state = 'running'",
            [],
        )?;
        Ok(changed)
    }

    pub fn stage_next_eligible_at(&self, job_id: i64, stage_name: &str) -> Result<Option<DateTime<Utc>>, StageError> {
        Ok(self.get_stage(job_id, stage_name)?.next_eligible_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn creating_a_job_materializes_every_catalog_stage_pending() {
        let store = store();
        let rec = store
            .get_or_create_recording("abc123", "https://example/v/abc123")
            .unwrap();
        let job = store.create_job(rec.id, 60, 120).unwrap();
        let stages = store.list_stages_for_job(job.id).unwrap();
        assert_eq!(stages.len(), STAGE_CATALOG.len());
        assert!(stages.iter().all(|s| s.state == StageState::Pending));
    }

    #[test]
    fn get_or_create_recording_is_idempotent() {
        let store = store();
        let a = store
            .get_or_create_recording("abc123", "https://example/v/abc123")
            .unwrap();
        let b = store
            .get_or_create_recording("abc123", "https://example/v/abc123")
            .unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn claim_is_single_runner() {
        let store = store();
        let rec = store.get_or_create_recording("abc", "u").unwrap();
        let job = store.create_job(rec.id, 0, 0).unwrap();
        store.claim_stage(job.id, "download_audio").unwrap();
        let second = store.claim_stage(job.id, "download_audio");
        assert!(matches!(second, Err(StageError::PreconditionUnmet(_))));
    }

    #[test]
    fn list_eligible_respects_predecessor_success() {
        let store = store();
        let rec = store.get_or_create_recording("abc", "u").unwrap();
        let job = store.create_job(rec.id, 0, 0).unwrap();
        assert_eq!(store.list_eligible("extract_segment").unwrap().len(), 0);
        store.claim_stage(job.id, "download_audio").unwrap();
        store
            .complete_stage(job.id, "download_audio", Some("/tmp/x"))
            .unwrap();
        assert_eq!(store.list_eligible("extract_segment").unwrap(), vec![job.id]);
    }

    #[test]
    fn reclaim_abandoned_resets_running_to_pending() {
        let store = store();
        let rec = store.get_or_create_recording("abc", "u").unwrap();
        let job = store.create_job(rec.id, 0, 0).unwrap();
        store.claim_stage(job.id, "download_audio").unwrap();
        let n = store.reclaim_abandoned().unwrap();
        assert_eq!(n, 1);
        let stage = store.get_stage(job.id, "download_audio").unwrap();
        assert_eq!(stage.state, StageState::Pending);
        assert_eq!(stage.attempt_count, 1);
        assert_eq!(stage.last_error.as_deref(), Some("abandoned"));
    }

    #[test]
    fn fail_stage_sets_backoff() {
        let store = store();
        let rec = store.get_or_create_recording("abc", "u").unwrap();
        let job = store.create_job(rec.id, 0, 0).unwrap();
        store.claim_stage(job.id, "download_audio").unwrap();
        store
            .fail_stage(job.id, "download_audio", "network error", 30)
            .unwrap();
        let stage = store.get_stage(job.id, "download_audio").unwrap();
        assert_eq!(stage.state, StageState::Failed);
        assert!(stage.next_eligible_at.is_some());
    }
}
