use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use super::types::NewWorkflow;
use super::{Store, now_timestamp};
use crate::core::workflow::{ActionKind, TriggerKind, Workflow};

struct RawWorkflow {
    id: String,
    user_id: String,
    name: String,
    trigger: String,
    actions: String,
    action_configs: String,
    canvas_data: Option<String>,
    created_at: String,
    updated_at: String,
}

const WORKFLOW_COLUMNS: &str = "id, user_id, name, trigger_kind, actions, action_configs, \
                                canvas_data, created_at, updated_at";

fn raw_workflow(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawWorkflow> {
    Ok(RawWorkflow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        trigger: row.get(3)?,
        actions: row.get(4)?,
        action_configs: row.get(5)?,
        canvas_data: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl TryFrom<RawWorkflow> for Workflow {
    type Error = anyhow::Error;

    fn try_from(raw: RawWorkflow) -> Result<Self> {
        let actions: Vec<ActionKind> = serde_json::from_str(&raw.actions)
            .with_context(|| format!("Corrupt action list on workflow {}", raw.id))?;
        Ok(Workflow {
            trigger: TriggerKind::from_name(&raw.trigger).unwrap_or_default(),
            actions,
            action_configs: serde_json::from_str(&raw.action_configs)?,
            canvas_data: raw
                .canvas_data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            id: raw.id,
            user_id: raw.user_id,
            name: raw.name,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}

impl Store {
    pub async fn create_workflow(&self, new: NewWorkflow) -> Result<Workflow> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();
        let actions = serde_json::to_string(&new.actions)?;
        let action_configs = serde_json::to_string(&new.action_configs)?;
        let canvas_data = new
            .canvas_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO workflows (id, user_id, name, trigger_kind, actions, action_configs,
             canvas_data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                id,
                new.user_id,
                new.name,
                new.trigger.as_str(),
                actions,
                action_configs,
                canvas_data,
                now
            ],
        )?;

        Ok(Workflow {
            id,
            user_id: new.user_id,
            name: new.name,
            trigger: new.trigger,
            actions: new.actions,
            action_configs: new.action_configs,
            canvas_data: new.canvas_data,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Workflows owned by `user_id`, newest first.
    pub async fn list_workflows(&self, user_id: &str) -> Result<Vec<Workflow>> {
        let raws = {
            let db = self.db.lock().await;
            let mut stmt = db.prepare(&format!(
                "SELECT {} FROM workflows WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
                WORKFLOW_COLUMNS
            ))?;
            let rows = stmt.query_map(params![user_id], raw_workflow)?;
            let mut raws = Vec::new();
            for row in rows {
                raws.push(row?);
            }
            raws
        };
        raws.into_iter().map(Workflow::try_from).collect()
    }

    /// A workflow by id, only when owned by `user_id`.
    pub async fn get_workflow(&self, user_id: &str, workflow_id: &str) -> Result<Option<Workflow>> {
        let raw = {
            let db = self.db.lock().await;
            db.query_row(
                &format!(
                    "SELECT {} FROM workflows WHERE id = ?1 AND user_id = ?2",
                    WORKFLOW_COLUMNS
                ),
                params![workflow_id, user_id],
                raw_workflow,
            )
            .optional()?
        };
        raw.map(Workflow::try_from).transpose()
    }

    pub async fn delete_workflow(&self, user_id: &str, workflow_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "DELETE FROM workflows WHERE id = ?1 AND user_id = ?2",
            params![workflow_id, user_id],
        )?;
        Ok(rows > 0)
    }
}
