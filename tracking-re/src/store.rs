//! Tracking and model-registry storage on SQLite.
//!
//! One database holds experiments, runs (params, metrics, tags, logged
//! models), registered models, their versions and aliases. Artifacts live
//! on disk under the configured artifact root; the database records where.
//! Every mutating call is a single statement or a single transaction, so
//! several publishers and resolvers can share one database file.

use chrono::{DateTime, Utc};
use rusqlite::{
    params, Connection, OpenFlags, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::config::TrackingConfig;
use crate::error::{Result, TrackingError};
use crate::registry::{ModelVersion, RegisteredModel, DEFAULT_STAGE, READY_STATUS};
use crate::run::{Experiment, Metric, ParamValue, Params, Run, RunInfo, RunStatus};
use crate::signature::ModelSignature;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS experiments (
        experiment_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        artifact_location TEXT NOT NULL,
        creation_time TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS runs (
        run_id TEXT PRIMARY KEY,
        experiment_id INTEGER NOT NULL REFERENCES experiments(experiment_id),
        run_name TEXT NOT NULL,
        status TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        artifact_uri TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS params (
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (run_id, key)
    );
    CREATE TABLE IF NOT EXISTS metrics (
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        key TEXT NOT NULL,
        value REAL NOT NULL,
        timestamp TEXT NOT NULL,
        step INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS tags (
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (run_id, key)
    );
    CREATE TABLE IF NOT EXISTS logged_models (
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        artifact_path TEXT NOT NULL,
        flavor TEXT NOT NULL,
        signature TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (run_id, artifact_path)
    );
    CREATE TABLE IF NOT EXISTS registered_models (
        name TEXT PRIMARY KEY,
        creation_time TEXT NOT NULL,
        last_updated_time TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS model_versions (
        name TEXT NOT NULL REFERENCES registered_models(name),
        version INTEGER NOT NULL,
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        artifact_path TEXT NOT NULL,
        source TEXT NOT NULL,
        current_stage TEXT NOT NULL,
        status TEXT NOT NULL,
        creation_time TEXT NOT NULL,
        last_updated_time TEXT NOT NULL,
        PRIMARY KEY (name, version)
    );
    CREATE TABLE IF NOT EXISTS model_version_tags (
        name TEXT NOT NULL,
        version INTEGER NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (name, version, key),
        FOREIGN KEY (name, version) REFERENCES model_versions(name, version)
    );
    CREATE TABLE IF NOT EXISTS registered_model_aliases (
        name TEXT NOT NULL,
        alias TEXT NOT NULL,
        version INTEGER NOT NULL,
        PRIMARY KEY (name, alias),
        FOREIGN KEY (name, version) REFERENCES model_versions(name, version)
    );
";

const VERSION_COLUMNS: &str = "name, version, creation_time, last_updated_time, run_id,
    artifact_path, source, current_stage, status";

/// Handle on the tracking database behind one endpoint.
pub struct TrackingStore {
    conn: Connection,
    endpoint: String,
    artifact_root: PathBuf,
}

impl TrackingStore {
    /// Open the store, creating the database and schema if needed.
    pub fn open(config: &TrackingConfig) -> Result<Self> {
        let endpoint = config.endpoint()?.to_string();
        let path = config.database_path()?;
        let conn = Connection::open(&path).map_err(|e| connection_error(&endpoint, e))?;
        Self::init(conn, endpoint, config.artifact_root()?)
    }

    /// Open a store that must already exist. A missing or unreadable
    /// database is a connection error.
    pub fn open_existing(config: &TrackingConfig) -> Result<Self> {
        let endpoint = config.endpoint()?.to_string();
        let path = config.database_path()?;
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| connection_error(&endpoint, e))?;
        Self::init(conn, endpoint, config.artifact_root()?)
    }

    fn init(conn: Connection, endpoint: String, artifact_root: PathBuf) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .and_then(|_| conn.execute_batch("PRAGMA foreign_keys = ON;"))
            .and_then(|_| conn.execute_batch(SCHEMA))
            .map_err(|e| connection_error(&endpoint, e))?;
        debug!(endpoint = %endpoint, "tracking store opened");
        Ok(Self {
            conn,
            endpoint,
            artifact_root,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    // ---- experiments -------------------------------------------------

    pub fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        Ok(self
            .conn
            .query_row(
                "SELECT experiment_id, name, artifact_location, creation_time
                 FROM experiments WHERE name = ?1",
                [name],
                experiment_from_row,
            )
            .optional()?)
    }

    /// Return the experiment called `name`, creating it on first use.
    pub fn get_or_create_experiment(&self, name: &str) -> Result<Experiment> {
        if name.trim().is_empty() {
            return Err(TrackingError::validation("experiment name must not be empty"));
        }
        if let Some(existing) = self.get_experiment_by_name(name)? {
            return Ok(existing);
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT OR IGNORE INTO experiments (name, artifact_location, creation_time)
             VALUES (?1, '', ?2)",
            params![name, Utc::now()],
        )?;
        let id: i64 = tx.query_row(
            "SELECT experiment_id FROM experiments WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;
        let location = self.artifact_root.join(id.to_string());
        tx.execute(
            "UPDATE experiments SET artifact_location = ?1
             WHERE experiment_id = ?2 AND artifact_location = ''",
            params![location.to_string_lossy().into_owned(), id],
        )?;
        tx.commit()?;

        debug!(experiment = name, experiment_id = id, "experiment created");
        self.get_experiment_by_name(name)?
            .ok_or_else(|| TrackingError::not_found(format!("experiment '{name}'")))
    }

    // ---- runs ----------------------------------------------------------

    /// Start a new run in `experiment_id`.
    pub fn create_run(&self, experiment_id: i64, run_name: &str) -> Result<RunInfo> {
        let location: Option<String> = self
            .conn
            .query_row(
                "SELECT artifact_location FROM experiments WHERE experiment_id = ?1",
                [experiment_id],
                |row| row.get(0),
            )
            .optional()?;
        let location =
            location.ok_or_else(|| TrackingError::not_found(format!("experiment {experiment_id}")))?;

        let run_id = Uuid::new_v4().simple().to_string();
        let artifact_uri = PathBuf::from(location).join(&run_id).join("artifacts");
        let start_time = Utc::now();
        self.conn.execute(
            "INSERT INTO runs (run_id, experiment_id, run_name, status, start_time, artifact_uri)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                experiment_id,
                run_name,
                RunStatus::Running.as_str(),
                start_time,
                artifact_uri.to_string_lossy().into_owned()
            ],
        )?;
        debug!(run_id = %run_id, run_name, "run started");

        Ok(RunInfo {
            run_id,
            experiment_id,
            run_name: run_name.to_string(),
            status: RunStatus::Running,
            start_time,
            end_time: None,
            artifact_uri: artifact_uri.to_string_lossy().into_owned(),
        })
    }

    pub fn get_run_info(&self, run_id: &str) -> Result<RunInfo> {
        self.conn
            .query_row(
                "SELECT run_id, experiment_id, run_name, status, start_time, end_time, artifact_uri
                 FROM runs WHERE run_id = ?1",
                [run_id],
                |row| {
                    let status: String = row.get(3)?;
                    Ok((
                        RunInfo {
                            run_id: row.get(0)?,
                            experiment_id: row.get(1)?,
                            run_name: row.get(2)?,
                            status: RunStatus::Running,
                            start_time: row.get(4)?,
                            end_time: row.get(5)?,
                            artifact_uri: row.get(6)?,
                        },
                        status,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| TrackingError::not_found(format!("run '{run_id}'")))
            .and_then(|(mut info, status)| {
                info.status = status.parse()?;
                Ok(info)
            })
    }

    /// A run with everything logged against it.
    pub fn get_run(&self, run_id: &str) -> Result<Run> {
        let info = self.get_run_info(run_id)?;

        let params = self.string_map("SELECT key, value FROM params WHERE run_id = ?1", run_id)?;
        let tags = self.string_map("SELECT key, value FROM tags WHERE run_id = ?1", run_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT key, value, timestamp, step FROM metrics WHERE run_id = ?1 ORDER BY rowid",
        )?;
        let metrics = stmt
            .query_map([run_id], |row| {
                Ok(Metric {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    timestamp: row.get(2)?,
                    step: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT artifact_path FROM logged_models WHERE run_id = ?1 ORDER BY artifact_path",
        )?;
        let logged_models = stmt
            .query_map([run_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(Run {
            info,
            params,
            metrics,
            tags,
            logged_models,
        })
    }

    fn string_map(&self, sql: &str, key: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?)
    }

    /// Finished and failed runs are immutable.
    fn ensure_active(&self, run_id: &str) -> Result<()> {
        let info = self.get_run_info(run_id)?;
        if info.status.is_terminal() {
            return Err(TrackingError::validation(format!(
                "run '{run_id}' is {} and can no longer be modified",
                info.status
            )));
        }
        Ok(())
    }

    pub fn log_param(&self, run_id: &str, key: &str, value: &ParamValue) -> Result<()> {
        self.ensure_active(run_id)?;
        insert_param(&self.conn, run_id, key, value)
    }

    /// Log every parameter in one transaction.
    pub fn log_params(&self, run_id: &str, params: &Params) -> Result<()> {
        self.ensure_active(run_id)?;
        let tx = self.conn.unchecked_transaction()?;
        for (key, value) in params {
            insert_param(&tx, run_id, key, value)?;
        }
        tx.commit()?;
        debug!(run_id, count = params.len(), "params logged");
        Ok(())
    }

    pub fn log_metric(&self, run_id: &str, key: &str, value: f64, step: i64) -> Result<()> {
        self.ensure_active(run_id)?;
        if !value.is_finite() {
            return Err(TrackingError::validation(format!(
                "metric '{key}' must be finite, got {value}"
            )));
        }
        self.conn.execute(
            "INSERT INTO metrics (run_id, key, value, timestamp, step) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, key, value, Utc::now(), step],
        )?;
        debug!(run_id, key, value, "metric logged");
        Ok(())
    }

    pub fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.ensure_active(run_id)?;
        self.conn.execute(
            "INSERT INTO tags (run_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (run_id, key) DO UPDATE SET value = excluded.value",
            params![run_id, key, value],
        )?;
        Ok(())
    }

    /// Directory a run's artifact at `artifact_path` should be written to.
    pub fn artifact_dir(&self, run_id: &str, artifact_path: &str) -> Result<PathBuf> {
        let info = self.get_run_info(run_id)?;
        Ok(PathBuf::from(info.artifact_uri).join(artifact_path))
    }

    /// Record that a model was written under `artifact_path` for this run.
    pub fn log_model(
        &self,
        run_id: &str,
        artifact_path: &str,
        flavor: &str,
        signature: &ModelSignature,
    ) -> Result<()> {
        self.ensure_active(run_id)?;
        if artifact_path.trim().is_empty() {
            return Err(TrackingError::validation("artifact path must not be empty"));
        }
        self.conn.execute(
            "INSERT INTO logged_models (run_id, artifact_path, flavor, signature, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, artifact_path, flavor, signature.to_json()?, Utc::now()],
        )?;
        debug!(run_id, artifact_path, flavor, "model logged");
        Ok(())
    }

    pub fn get_logged_model_signature(
        &self,
        run_id: &str,
        artifact_path: &str,
    ) -> Result<ModelSignature> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT signature FROM logged_models WHERE run_id = ?1 AND artifact_path = ?2",
                params![run_id, artifact_path],
                |row| row.get(0),
            )
            .optional()?;
        let raw = raw.ok_or_else(|| {
            TrackingError::not_found(format!("logged model '{artifact_path}' in run '{run_id}'"))
        })?;
        ModelSignature::from_json(&raw)
    }

    /// Move a running run to a terminal status.
    pub fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(TrackingError::validation("a run can only be ended as FINISHED or FAILED"));
        }
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, end_time = ?2 WHERE run_id = ?3 AND status = ?4",
            params![status.as_str(), Utc::now(), run_id, RunStatus::Running.as_str()],
        )?;
        if updated == 0 {
            // distinguish unknown runs from already finished ones
            self.ensure_active(run_id)?;
        }
        debug!(run_id, status = %status, "run ended");
        Ok(())
    }

    // ---- registry ------------------------------------------------------

    /// Register the model logged at `artifact_path` in `run_id` as the next
    /// version of `name`, creating the registered model on first use.
    pub fn register_model_version(
        &self,
        name: &str,
        run_id: &str,
        artifact_path: &str,
    ) -> Result<ModelVersion> {
        self.register_version(name, run_id, artifact_path, false)
    }

    /// Register the next version of `name` and end the running `run_id` as
    /// `FINISHED` in one transaction. On error neither change is visible.
    pub fn register_and_finish_run(
        &self,
        name: &str,
        run_id: &str,
        artifact_path: &str,
    ) -> Result<ModelVersion> {
        self.register_version(name, run_id, artifact_path, true)
    }

    fn register_version(
        &self,
        name: &str,
        run_id: &str,
        artifact_path: &str,
        finish: bool,
    ) -> Result<ModelVersion> {
        if name.trim().is_empty() {
            return Err(TrackingError::validation("registered model name must not be empty"));
        }
        let info = self.get_run_info(run_id)?;
        if info.status == RunStatus::Failed {
            return Err(TrackingError::validation(format!(
                "run '{run_id}' failed; its model cannot be registered"
            )));
        }
        if finish && info.status.is_terminal() {
            return Err(TrackingError::validation(format!(
                "run '{run_id}' is {} and can no longer be modified",
                info.status
            )));
        }
        self.get_logged_model_signature(run_id, artifact_path)?;
        let source = PathBuf::from(&info.artifact_uri).join(artifact_path);

        let now = Utc::now();
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO registered_models (name, creation_time, last_updated_time)
             VALUES (?1, ?2, ?2)
             ON CONFLICT (name) DO UPDATE SET last_updated_time = excluded.last_updated_time",
            params![name, now],
        )?;
        let version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM model_versions WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO model_versions (name, version, run_id, artifact_path, source,
                 current_stage, status, creation_time, last_updated_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                name,
                version,
                run_id,
                artifact_path,
                source.to_string_lossy().into_owned(),
                DEFAULT_STAGE,
                READY_STATUS,
                now
            ],
        )?;
        if finish {
            let updated = tx.execute(
                "UPDATE runs SET status = ?1, end_time = ?2 WHERE run_id = ?3 AND status = ?4",
                params![
                    RunStatus::Finished.as_str(),
                    now,
                    run_id,
                    RunStatus::Running.as_str()
                ],
            )?;
            if updated == 0 {
                return Err(TrackingError::validation(format!(
                    "run '{run_id}' ended while its model was being registered"
                )));
            }
        }
        tx.commit()?;

        debug!(model = name, version, run_id, finished = finish, "model version registered");
        self.get_model_version(name, version)
    }

    pub fn get_registered_model(&self, name: &str) -> Result<RegisteredModel> {
        let (creation_time, last_updated_time): (DateTime<Utc>, DateTime<Utc>) = self
            .conn
            .query_row(
                "SELECT creation_time, last_updated_time FROM registered_models WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| TrackingError::not_found(format!("registered model '{name}'")))?;

        let latest_version: Option<i64> = self.conn.query_row(
            "SELECT MAX(version) FROM model_versions WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT alias, version FROM registered_model_aliases WHERE name = ?1")?;
        let aliases = stmt
            .query_map([name], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<String, i64>>>()?;

        Ok(RegisteredModel {
            name: name.to_string(),
            creation_time,
            last_updated_time,
            aliases,
            latest_version,
        })
    }

    pub fn get_model_version(&self, name: &str, version: i64) -> Result<ModelVersion> {
        let sql = format!("SELECT {VERSION_COLUMNS} FROM model_versions WHERE name = ?1 AND version = ?2");
        let mut mv = self
            .conn
            .query_row(&sql, params![name, version], version_from_row)
            .optional()?
            .ok_or_else(|| TrackingError::not_found(format!("model '{name}' version {version}")))?;

        mv.tags = self.version_tags(name, version)?;
        let mut stmt = self.conn.prepare(
            "SELECT alias FROM registered_model_aliases
             WHERE name = ?1 AND version = ?2 ORDER BY alias",
        )?;
        mv.aliases = stmt
            .query_map(params![name, version], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(mv)
    }

    fn version_tags(&self, name: &str, version: i64) -> Result<BTreeMap<String, String>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM model_version_tags WHERE name = ?1 AND version = ?2",
        )?;
        let rows = stmt.query_map(params![name, version], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?)
    }

    /// Highest-numbered version of `name`.
    pub fn latest_version(&self, name: &str) -> Result<ModelVersion> {
        let model = self.get_registered_model(name)?;
        let version = model
            .latest_version
            .ok_or_else(|| TrackingError::not_found(format!("model '{name}' has no versions")))?;
        self.get_model_version(name, version)
    }

    pub fn set_model_version_tag(&self, name: &str, version: i64, key: &str, value: &str) -> Result<()> {
        self.get_model_version(name, version)?;
        self.conn.execute(
            "INSERT INTO model_version_tags (name, version, key, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (name, version, key) DO UPDATE SET value = excluded.value",
            params![name, version, key, value],
        )?;
        Ok(())
    }

    /// Point `alias` at `version`, replacing any previous assignment.
    pub fn set_alias(&self, name: &str, alias: &str, version: i64) -> Result<()> {
        validate_alias(alias)?;
        self.get_model_version(name, version)?;
        self.conn.execute(
            "INSERT INTO registered_model_aliases (name, alias, version) VALUES (?1, ?2, ?3)
             ON CONFLICT (name, alias) DO UPDATE SET version = excluded.version",
            params![name, alias, version],
        )?;
        debug!(model = name, alias, version, "alias assigned");
        Ok(())
    }

    pub fn delete_alias(&self, name: &str, alias: &str) -> Result<()> {
        let removed = self.conn.execute(
            "DELETE FROM registered_model_aliases WHERE name = ?1 AND alias = ?2",
            params![name, alias],
        )?;
        if removed == 0 {
            return Err(TrackingError::not_found(format!(
                "alias '{alias}' on model '{name}'"
            )));
        }
        debug!(model = name, alias, "alias deleted");
        Ok(())
    }

    /// The version `alias` currently points at.
    pub fn get_version_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion> {
        self.get_registered_model(name)?;
        let version: Option<i64> = self
            .conn
            .query_row(
                "SELECT version FROM registered_model_aliases WHERE name = ?1 AND alias = ?2",
                params![name, alias],
                |row| row.get(0),
            )
            .optional()?;
        let version = version.ok_or_else(|| {
            TrackingError::not_found(format!("alias '{alias}' is not assigned on model '{name}'"))
        })?;
        self.get_model_version(name, version)
    }
}

fn connection_error(endpoint: &str, err: rusqlite::Error) -> TrackingError {
    TrackingError::Connection {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    }
}

fn insert_param(conn: &Connection, run_id: &str, key: &str, value: &ParamValue) -> Result<()> {
    let value = value.to_string();
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM params WHERE run_id = ?1 AND key = ?2",
            params![run_id, key],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(old) if old != value => Err(TrackingError::validation(format!(
            "param '{key}' already logged as '{old}'; params are immutable"
        ))),
        Some(_) => Ok(()),
        None => {
            conn.execute(
                "INSERT INTO params (run_id, key, value) VALUES (?1, ?2, ?3)",
                params![run_id, key, value],
            )?;
            Ok(())
        }
    }
}

fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty() {
        return Err(TrackingError::validation("alias must not be empty"));
    }
    if !alias
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(TrackingError::validation(format!(
            "alias '{alias}' may only contain letters, digits, '_' and '-'"
        )));
    }
    // "latest" and "v<N>" would shadow version references
    let lowered = alias.to_ascii_lowercase();
    let shadows_version = lowered
        .strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
    if lowered == "latest" || shadows_version {
        return Err(TrackingError::validation(format!("alias '{alias}' is reserved")));
    }
    Ok(())
}

fn experiment_from_row(row: &Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        experiment_id: row.get(0)?,
        name: row.get(1)?,
        artifact_location: row.get(2)?,
        creation_time: row.get(3)?,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<ModelVersion> {
    Ok(ModelVersion {
        name: row.get(0)?,
        version: row.get(1)?,
        creation_time: row.get(2)?,
        last_updated_time: row.get(3)?,
        run_id: row.get(4)?,
        artifact_path: row.get(5)?,
        source: row.get(6)?,
        current_stage: row.get(7)?,
        status: row.get(8)?,
        tags: BTreeMap::new(),
        aliases: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{DataType, TensorSpec};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, TrackingStore) {
        let dir = TempDir::new().unwrap();
        let uri = format!("sqlite:///{}", dir.path().join("mlflow.db").display());
        let store = TrackingStore::open(&TrackingConfig::new(uri)).unwrap();
        (dir, store)
    }

    fn signature() -> ModelSignature {
        ModelSignature {
            inputs: TensorSpec { dtype: DataType::Float64, shape: vec![-1, 4] },
            outputs: TensorSpec { dtype: DataType::Int64, shape: vec![-1] },
        }
    }

    fn run_with_model(store: &TrackingStore) -> String {
        let exp = store.get_or_create_experiment("quickstart").unwrap();
        let run = store.create_run(exp.experiment_id, "run_test").unwrap();
        store.log_model(&run.run_id, "iris_model", "logreg", &signature()).unwrap();
        run.run_id
    }

    #[test]
    fn test_experiment_is_created_once() {
        let (_dir, store) = test_store();
        let first = store.get_or_create_experiment("quickstart").unwrap();
        let second = store.get_or_create_experiment("quickstart").unwrap();
        assert_eq!(first.experiment_id, second.experiment_id);
        assert!(first.artifact_location.ends_with(&first.experiment_id.to_string()));
        assert!(store.get_experiment_by_name("other").unwrap().is_none());
    }

    #[test]
    fn test_run_records_params_metrics_and_tags() {
        let (_dir, store) = test_store();
        let exp = store.get_or_create_experiment("quickstart").unwrap();
        let run = store.create_run(exp.experiment_id, "run_1").unwrap();
        assert_eq!(run.run_id.len(), 32);

        let mut params = Params::new();
        params.insert("max_iter".into(), ParamValue::from(1000_i64));
        params.insert("solver".into(), ParamValue::from("gd"));
        store.log_params(&run.run_id, &params).unwrap();
        store.log_metric(&run.run_id, "accuracy", 0.9, 0).unwrap();
        store.set_tag(&run.run_id, "LR Info", "LR model from script").unwrap();
        store.finish_run(&run.run_id, RunStatus::Finished).unwrap();

        let stored = store.get_run(&run.run_id).unwrap();
        assert_eq!(stored.info.status, RunStatus::Finished);
        assert!(stored.info.end_time.is_some());
        assert_eq!(stored.params["max_iter"], "1000");
        assert_eq!(stored.params["solver"], "gd");
        assert_eq!(stored.metric("accuracy"), Some(0.9));
        assert_eq!(stored.tags["LR Info"], "LR model from script");
    }

    #[test]
    fn test_finished_runs_are_immutable() {
        let (_dir, store) = test_store();
        let exp = store.get_or_create_experiment("quickstart").unwrap();
        let run = store.create_run(exp.experiment_id, "run_1").unwrap();
        store.finish_run(&run.run_id, RunStatus::Failed).unwrap();

        let err = store.log_metric(&run.run_id, "accuracy", 0.5, 0).unwrap_err();
        assert!(matches!(err, TrackingError::Validation(_)));
        assert!(store.finish_run(&run.run_id, RunStatus::Finished).is_err());
        assert!(matches!(
            store.finish_run("missing", RunStatus::Finished).unwrap_err(),
            TrackingError::NotFound(_)
        ));
    }

    #[test]
    fn test_params_cannot_change_value() {
        let (_dir, store) = test_store();
        let exp = store.get_or_create_experiment("quickstart").unwrap();
        let run = store.create_run(exp.experiment_id, "run_1").unwrap();
        store.log_param(&run.run_id, "solver", &"gd".into()).unwrap();
        store.log_param(&run.run_id, "solver", &"gd".into()).unwrap();
        assert!(store.log_param(&run.run_id, "solver", &"sgd".into()).is_err());
    }

    #[test]
    fn test_versions_increase_per_model() {
        let (_dir, store) = test_store();
        let run_a = run_with_model(&store);
        let run_b = run_with_model(&store);

        let v1 = store.register_model_version("iris", &run_a, "iris_model").unwrap();
        let v2 = store.register_model_version("iris", &run_b, "iris_model").unwrap();
        let other = store.register_model_version("other", &run_a, "iris_model").unwrap();
        assert_eq!((v1.version, v2.version, other.version), (1, 2, 1));
        assert_eq!(v1.current_stage, DEFAULT_STAGE);
        assert_eq!(v1.status, READY_STATUS);
        assert!(v1.source.ends_with("iris_model"));
        assert_eq!(store.latest_version("iris").unwrap().version, 2);
    }

    #[test]
    fn test_registering_requires_a_logged_model() {
        let (_dir, store) = test_store();
        let run_id = run_with_model(&store);
        let err = store.register_model_version("iris", &run_id, "elsewhere").unwrap_err();
        assert!(matches!(err, TrackingError::NotFound(_)));
        assert!(store.get_registered_model("iris").is_err());
    }

    #[test]
    fn test_alias_reassignment_replaces_mapping() {
        let (_dir, store) = test_store();
        let run_a = run_with_model(&store);
        let run_b = run_with_model(&store);
        store.register_model_version("iris", &run_a, "iris_model").unwrap();
        store.register_model_version("iris", &run_b, "iris_model").unwrap();

        store.set_alias("iris", "prod", 1).unwrap();
        assert_eq!(store.get_version_by_alias("iris", "prod").unwrap().version, 1);
        store.set_alias("iris", "prod", 2).unwrap();
        let resolved = store.get_version_by_alias("iris", "prod").unwrap();
        assert_eq!(resolved.version, 2);
        assert_eq!(resolved.aliases, vec!["prod".to_string()]);
        assert!(store.get_model_version("iris", 1).unwrap().aliases.is_empty());

        let model = store.get_registered_model("iris").unwrap();
        assert_eq!(model.aliases.len(), 1);
        assert_eq!(model.aliases["prod"], 2);
    }

    #[test]
    fn test_unassigned_alias_and_unknown_model_are_not_found() {
        let (_dir, store) = test_store();
        let run_id = run_with_model(&store);
        store.register_model_version("iris", &run_id, "iris_model").unwrap();

        for (name, alias) in [("iris", "staging"), ("iris", "prod"), ("unknown", "prod")] {
            let err = store.get_version_by_alias(name, alias).unwrap_err();
            assert!(matches!(err, TrackingError::NotFound(_)), "{name}@{alias}");
        }
        assert!(matches!(
            store.set_alias("iris", "prod", 7).unwrap_err(),
            TrackingError::NotFound(_)
        ));
    }

    #[test]
    fn test_delete_alias() {
        let (_dir, store) = test_store();
        let run_id = run_with_model(&store);
        store.register_model_version("iris", &run_id, "iris_model").unwrap();
        store.set_alias("iris", "prod", 1).unwrap();
        store.delete_alias("iris", "prod").unwrap();
        assert!(store.get_version_by_alias("iris", "prod").is_err());
        assert!(matches!(
            store.delete_alias("iris", "prod").unwrap_err(),
            TrackingError::NotFound(_)
        ));
    }

    #[test]
    fn test_reserved_aliases_are_rejected() {
        let (_dir, store) = test_store();
        let run_id = run_with_model(&store);
        store.register_model_version("iris", &run_id, "iris_model").unwrap();
        for alias in ["latest", "v1", "V12", "", "has space"] {
            assert!(store.set_alias("iris", alias, 1).is_err(), "{alias:?}");
        }
        store.set_alias("iris", "v1-candidate", 1).unwrap();
    }

    #[test]
    fn test_version_tags() {
        let (_dir, store) = test_store();
        let run_id = run_with_model(&store);
        store.register_model_version("iris", &run_id, "iris_model").unwrap();
        store.set_model_version_tag("iris", 1, "validated", "true").unwrap();
        let mv = store.get_model_version("iris", 1).unwrap();
        assert_eq!(mv.tags["validated"], "true");
        assert!(mv.fields().iter().any(|(k, v)| *k == "tags" && v == "validated=true"));
    }

    #[test]
    fn test_open_existing_requires_database() {
        let dir = TempDir::new().unwrap();
        let uri = format!("sqlite:///{}", dir.path().join("absent.db").display());
        let err = TrackingStore::open_existing(&TrackingConfig::new(uri)).err().unwrap();
        assert!(matches!(err, TrackingError::Connection { .. }));
    }

    #[test]
    fn test_register_and_finish_run_commits_both() {
        let (_dir, store) = test_store();
        let run_id = run_with_model(&store);
        let mv = store.register_and_finish_run("iris", &run_id, "iris_model").unwrap();
        assert_eq!(mv.version, 1);
        let info = store.get_run_info(&run_id).unwrap();
        assert_eq!(info.status, RunStatus::Finished);
        assert!(info.end_time.is_some());

        let err = store.register_and_finish_run("iris", &run_id, "iris_model").unwrap_err();
        assert!(matches!(err, TrackingError::Validation(_)));
        assert_eq!(store.latest_version("iris").unwrap().version, 1);
    }

    #[test]
    fn test_register_and_finish_run_rolls_back_on_failure() {
        let (_dir, store) = test_store();
        let run_id = run_with_model(&store);
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER refuse_finish BEFORE UPDATE ON runs
                 WHEN NEW.status = 'FINISHED'
                 BEGIN SELECT RAISE(ABORT, 'finish refused'); END;",
            )
            .unwrap();

        let err = store.register_and_finish_run("iris", &run_id, "iris_model").unwrap_err();
        assert!(matches!(err, TrackingError::Store(_)), "{err}");
        assert!(matches!(
            store.get_registered_model("iris").unwrap_err(),
            TrackingError::NotFound(_)
        ));
        assert_eq!(store.get_run_info(&run_id).unwrap().status, RunStatus::Running);
        store.finish_run(&run_id, RunStatus::Failed).unwrap();
    }
}
