use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use super::types::{ExecutionLogRecord, WorkflowSummary};
use super::{Store, now_timestamp};
use crate::core::workflow::{ActionKind, ExecutionResult, LogStatus};

struct RawLog {
    id: String,
    user_id: String,
    workflow_id: String,
    status: String,
    actions_executed: String,
    error: Option<String>,
    executed_at: String,
    workflow_name: Option<String>,
    workflow_actions: Option<String>,
}

const LOG_SELECT: &str = "SELECT l.id, l.user_id, l.workflow_id, l.status, l.actions_executed, \
                          l.error, l.executed_at, w.name, w.actions \
                          FROM execution_logs l LEFT JOIN workflows w ON w.id = l.workflow_id";

fn raw_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLog> {
    Ok(RawLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        workflow_id: row.get(2)?,
        status: row.get(3)?,
        actions_executed: row.get(4)?,
        error: row.get(5)?,
        executed_at: row.get(6)?,
        workflow_name: row.get(7)?,
        workflow_actions: row.get(8)?,
    })
}

impl TryFrom<RawLog> for ExecutionLogRecord {
    type Error = anyhow::Error;

    fn try_from(raw: RawLog) -> Result<Self> {
        let status = LogStatus::from_status(&raw.status)
            .with_context(|| format!("Unknown log status '{}' on {}", raw.status, raw.id))?;
        let actions_executed: Vec<ActionKind> = serde_json::from_str(&raw.actions_executed)?;
        let workflow = match (raw.workflow_name, raw.workflow_actions) {
            (Some(name), Some(actions)) => Some(WorkflowSummary {
                id: raw.workflow_id.clone(),
                name,
                actions: serde_json::from_str(&actions)?,
            }),
            _ => None,
        };
        Ok(ExecutionLogRecord {
            id: raw.id,
            user_id: raw.user_id,
            workflow_id: raw.workflow_id,
            status,
            actions_executed,
            error: raw.error,
            executed_at: raw.executed_at,
            workflow,
        })
    }
}

impl Store {
    /// Record the start of a run. The log stays `running` until finished.
    pub async fn create_execution_log(&self, user_id: &str, workflow_id: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO execution_logs (id, user_id, workflow_id, status, actions_executed, executed_at)
             VALUES (?1, ?2, ?3, ?4, '[]', ?5)",
            params![
                id,
                user_id,
                workflow_id,
                LogStatus::Running.as_str(),
                now_timestamp()
            ],
        )?;
        Ok(id)
    }

    /// Write the outcome of a run. Only a `running` log is updated, so a log
    /// transitions at most once.
    pub async fn finish_execution_log(&self, log_id: &str, result: &ExecutionResult) -> Result<bool> {
        let actions = serde_json::to_string(&result.actions_executed)?;
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE execution_logs SET status = ?1, actions_executed = ?2, error = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                LogStatus::from_result(result).as_str(),
                actions,
                result.error,
                log_id,
                LogStatus::Running.as_str()
            ],
        )?;
        Ok(rows > 0)
    }

    /// One page of a user's logs, newest first, plus the user's total log count.
    pub async fn list_execution_logs(
        &self,
        user_id: &str,
        limit: u32,
        skip: u32,
    ) -> Result<(Vec<ExecutionLogRecord>, u64)> {
        let (raws, total) = {
            let db = self.db.lock().await;
            let mut stmt = db.prepare(&format!(
                "{} WHERE l.user_id = ?1 ORDER BY l.executed_at DESC, l.rowid DESC LIMIT ?2 OFFSET ?3",
                LOG_SELECT
            ))?;
            let rows = stmt.query_map(params![user_id, limit, skip], raw_log)?;
            let mut raws = Vec::new();
            for row in rows {
                raws.push(row?);
            }
            let total: i64 = db.query_row(
                "SELECT COUNT(*) FROM execution_logs WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            (raws, total.max(0) as u64)
        };
        let logs = raws
            .into_iter()
            .map(ExecutionLogRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((logs, total))
    }

    pub async fn get_execution_log(
        &self,
        user_id: &str,
        log_id: &str,
    ) -> Result<Option<ExecutionLogRecord>> {
        let raw = {
            let db = self.db.lock().await;
            db.query_row(
                &format!("{} WHERE l.id = ?1 AND l.user_id = ?2", LOG_SELECT),
                params![log_id, user_id],
                raw_log,
            )
            .optional()?
        };
        raw.map(ExecutionLogRecord::try_from).transpose()
    }
}
