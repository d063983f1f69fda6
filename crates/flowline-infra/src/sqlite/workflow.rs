//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `flowline-core` using sqlx with split
//! read/write pools. Graphs are stored as JSON blobs alongside a per-node
//! index table, so trigger lookups are plain SQL instead of a scan over
//! every stored graph. Executions and node logs track run state for crash
//! recovery and auditing.

use chrono::{DateTime, Utc};
use flowline_core::repository::workflow::{ScheduleBinding, WorkflowRepository};
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{
    ExecutionRecord, ExecutionStatus, Node, NodeRunLog, NodeRunStatus, NodeType, WorkflowGraph,
};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct GraphRow {
    graph: String,
}

impl GraphRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            graph: row.try_get("graph")?,
        })
    }

    fn into_graph(self) -> Result<WorkflowGraph, RepositoryError> {
        serde_json::from_str(&self.graph)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow graph JSON: {e}")))
    }
}

struct NodeRow {
    workflow_id: String,
    node_id: String,
    node_type: String,
    data: String,
}

impl NodeRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            workflow_id: row.try_get("workflow_id")?,
            node_id: row.try_get("node_id")?,
            node_type: row.try_get("node_type")?,
            data: row.try_get("data")?,
        })
    }

    fn into_node(self) -> Result<Node, RepositoryError> {
        Ok(Node {
            id: self.node_id,
            node_type: parse_node_type(&self.node_type)?,
            data: serde_json::from_str(&self.data)
                .map_err(|e| RepositoryError::Query(format!("invalid node data JSON: {e}")))?,
            workflow_id: parse_uuid(&self.workflow_id)?,
        })
    }
}

struct ExecutionRow {
    id: String,
    workflow_id: String,
    workflow_name: String,
    status: String,
    context: String,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    resume_at: Option<String>,
    resume_node_id: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            workflow_name: row.try_get("workflow_name")?,
            status: row.try_get("status")?,
            context: row.try_get("context")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            resume_at: row.try_get("resume_at")?,
            resume_node_id: row.try_get("resume_node_id")?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord, RepositoryError> {
        let status: ExecutionStatus =
            serde_json::from_value(serde_json::Value::String(self.status.clone()))
                .map_err(|_| {
                    RepositoryError::Query(format!("invalid execution status: {}", self.status))
                })?;

        let context: serde_json::Value = serde_json::from_str(&self.context)
            .map_err(|e| RepositoryError::Query(format!("invalid context JSON: {e}")))?;

        Ok(ExecutionRecord {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            workflow_name: self.workflow_name,
            status,
            context,
            error: self.error,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            resume_at: self.resume_at.as_deref().map(parse_datetime).transpose()?,
            resume_node_id: self.resume_node_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn node_type_str(node_type: NodeType) -> Result<String, RepositoryError> {
    Ok(serde_json::to_value(node_type)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .as_str()
        .unwrap_or_default()
        .to_string())
}

fn parse_node_type(s: &str) -> Result<NodeType, RepositoryError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid node type: {s}")))
}

fn status_str<S: serde::Serialize>(status: &S) -> Result<String, RepositoryError> {
    Ok(serde_json::to_value(status)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .as_str()
        .unwrap_or("pending")
        .to_string())
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_graph(&self, graph: &WorkflowGraph) -> Result<(), RepositoryError> {
        let graph_json = serde_json::to_string(graph)
            .map_err(|e| RepositoryError::Query(format!("serialize graph: {e}")))?;
        let now = format_datetime(&Utc::now());

        sqlx::query(
            r#"INSERT INTO workflows (id, name, workspace_id, active, graph, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 workspace_id = excluded.workspace_id,
                 active = excluded.active,
                 graph = excluded.graph,
                 updated_at = excluded.updated_at"#,
        )
        .bind(graph.id.to_string())
        .bind(&graph.name)
        .bind(graph.workspace_id.to_string())
        .bind(graph.active as i32)
        .bind(&graph_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Rebuild the node index for this graph.
        sqlx::query("DELETE FROM workflow_nodes WHERE workflow_id = ?")
            .bind(graph.id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        for node in &graph.nodes {
            let data_json = serde_json::to_string(&node.data)
                .map_err(|e| RepositoryError::Query(format!("serialize node data: {e}")))?;
            sqlx::query(
                "INSERT INTO workflow_nodes (workflow_id, node_id, node_type, data) VALUES (?, ?, ?, ?)",
            )
            .bind(graph.id.to_string())
            .bind(&node.id)
            .bind(node_type_str(node.node_type)?)
            .bind(&data_json)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        }

        Ok(())
    }

    async fn get_graph(&self, id: &Uuid) -> Result<Option<WorkflowGraph>, RepositoryError> {
        let row = sqlx::query("SELECT graph FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = GraphRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_graph()?))
            }
            None => Ok(None),
        }
    }

    async fn find_trigger_nodes(
        &self,
        trigger_type: NodeType,
        workspace_id: &Uuid,
    ) -> Result<Vec<Node>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT n.workflow_id, n.node_id, n.node_type, n.data
               FROM workflow_nodes n
               JOIN workflows w ON w.id = n.workflow_id
               WHERE w.workspace_id = ? AND w.active = 1 AND n.node_type = ?"#,
        )
        .bind(workspace_id.to_string())
        .bind(node_type_str(trigger_type)?)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = NodeRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            nodes.push(r.into_node()?);
        }
        Ok(nodes)
    }

    async fn list_schedule_nodes(&self) -> Result<Vec<ScheduleBinding>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT n.workflow_id, n.node_id, n.node_type, n.data, w.workspace_id
               FROM workflow_nodes n
               JOIN workflows w ON w.id = n.workflow_id
               WHERE w.active = 1 AND n.node_type = 'schedule'"#,
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut bindings = Vec::with_capacity(rows.len());
        for row in &rows {
            let workspace_id: String = row
                .try_get("workspace_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let r = NodeRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            bindings.push(ScheduleBinding {
                node: r.into_node()?,
                workspace_id: parse_uuid(&workspace_id)?,
            });
        }
        Ok(bindings)
    }

    async fn create_execution(&self, record: &ExecutionRecord) -> Result<(), RepositoryError> {
        let context_str = serde_json::to_string(&record.context)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO executions
               (id, workflow_id, workflow_name, status, context, error,
                started_at, completed_at, resume_at, resume_node_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.workflow_id.to_string())
        .bind(&record.workflow_name)
        .bind(status_str(&record.status)?)
        .bind(&context_str)
        .bind(&record.error)
        .bind(format_datetime(&record.started_at))
        .bind(record.completed_at.as_ref().map(format_datetime))
        .bind(record.resume_at.as_ref().map(format_datetime))
        .bind(&record.resume_node_id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn update_execution_status(
        &self,
        execution_id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        context: Option<&serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        let completed_at = if status.is_terminal() {
            Some(format_datetime(&Utc::now()))
        } else {
            None
        };

        let context_str = context
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Leaving the Waiting state always clears the resume marker.
        let clear_resume = status != ExecutionStatus::Waiting;

        let result = sqlx::query(
            r#"UPDATE executions SET
                 status = ?,
                 error = ?,
                 completed_at = COALESCE(?, completed_at),
                 context = COALESCE(?, context),
                 resume_at = CASE WHEN ? THEN NULL ELSE resume_at END,
                 resume_node_id = CASE WHEN ? THEN NULL ELSE resume_node_id END
               WHERE id = ?"#,
        )
        .bind(status_str(&status)?)
        .bind(error)
        .bind(&completed_at)
        .bind(&context_str)
        .bind(clear_resume)
        .bind(clear_resume)
        .bind(execution_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn schedule_resume(
        &self,
        execution_id: &Uuid,
        resume_at: DateTime<Utc>,
        resume_node_id: &str,
        context: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let context_str = serde_json::to_string(context)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            r#"UPDATE executions SET
                 status = 'waiting', resume_at = ?, resume_node_id = ?, context = ?
               WHERE id = ?"#,
        )
        .bind(format_datetime(&resume_at))
        .bind(resume_node_id)
        .bind(&context_str)
        .bind(execution_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<ExecutionRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn list_due_resumptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM executions WHERE status = 'waiting' AND resume_at <= ? ORDER BY resume_at ASC",
        )
        .bind(format_datetime(&now))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ExecutionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            records.push(r.into_record()?);
        }
        Ok(records)
    }

    async fn create_node_log(&self, log: &NodeRunLog) -> Result<(), RepositoryError> {
        let output_str = log
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO node_logs
               (id, execution_id, node_id, status, attempt, idempotency_key,
                output, error, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.execution_id.to_string())
        .bind(&log.node_id)
        .bind(status_str(&log.status)?)
        .bind(log.attempt as i32)
        .bind(&log.idempotency_key)
        .bind(&output_str)
        .bind(&log.error)
        .bind(log.started_at.as_ref().map(format_datetime))
        .bind(log.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn update_node_log(
        &self,
        log_id: &Uuid,
        status: NodeRunStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let output_str = output
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            r#"UPDATE node_logs SET
                 status = ?,
                 output = COALESCE(?, output),
                 error = COALESCE(?, error),
                 completed_at = ?
               WHERE id = ?"#,
        )
        .bind(status_str(&status)?)
        .bind(&output_str)
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(log_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn completed_node_ids(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT node_id FROM node_logs
               WHERE execution_id = ? AND status IN ('success', 'skipped')
               GROUP BY node_id
               ORDER BY MIN(started_at) ASC"#,
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let node_id: String = row
                .try_get("node_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            ids.push(node_id);
        }
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
