//! Engine-reported statistics
//!
//! Parsing of `explain` output in `executionStats` verbosity and of
//! `$group` counts.

use mongodb::bson::{Bson, Document};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("explain output has no executionStats section")]
    MissingExecutionStats,

    #[error("field '{0}' is missing or not a number")]
    NotANumber(String),

    #[error("group result has no count")]
    MissingCount,
}

/// How the winning plan reached the documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryPlan {
    IndexScan { index_name: String },
    CollectionScan,
    /// No index or scan stage recognized; carries the root stage name
    Other { stage: String },
}

impl QueryPlan {
    pub fn index_name(&self) -> Option<&str> {
        match self {
            QueryPlan::IndexScan { index_name } => Some(index_name),
            _ => None,
        }
    }
}

/// Execution statistics of one explained query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub execution_time_millis: i64,
    pub total_docs_examined: i64,
    pub n_returned: i64,
    pub plan: QueryPlan,
}

impl ExecutionStats {
    /// Parse the reply of an `explain` command.
    ///
    /// The index is looked up by walking the execution stage tree; when the
    /// execution stages carry no classic stage names (slot based engine),
    /// the query planner's winning plan is walked instead.
    pub fn from_explain(explain: &Document) -> Result<Self, StatsError> {
        let stats = explain
            .get_document("executionStats")
            .map_err(|_| StatsError::MissingExecutionStats)?;

        let execution_time_millis = number(stats, "executionTimeMillis")?;
        let total_docs_examined = number(stats, "totalDocsExamined")?;
        let n_returned = number(stats, "nReturned")?;

        let mut plan = stats
            .get_document("executionStages")
            .map(plan_of)
            .unwrap_or(QueryPlan::Other {
                stage: String::new(),
            });

        if matches!(plan, QueryPlan::Other { .. }) {
            if let Ok(winning) = explain
                .get_document("queryPlanner")
                .and_then(|planner| planner.get_document("winningPlan"))
            {
                let winning = winning.get_document("queryPlan").unwrap_or(winning);
                if let fallback @ (QueryPlan::IndexScan { .. } | QueryPlan::CollectionScan) =
                    plan_of(winning)
                {
                    plan = fallback;
                }
            }
        }

        Ok(Self {
            execution_time_millis,
            total_docs_examined,
            n_returned,
            plan,
        })
    }

    pub fn uses_index(&self, name: &str) -> bool {
        self.plan.index_name() == Some(name)
    }
}

/// Classify a stage tree
fn plan_of(root: &Document) -> QueryPlan {
    if let Some(index_name) = find_index_name(root) {
        return QueryPlan::IndexScan { index_name };
    }
    if has_stage(root, "COLLSCAN") {
        return QueryPlan::CollectionScan;
    }
    QueryPlan::Other {
        stage: root.get_str("stage").unwrap_or_default().to_string(),
    }
}

fn child_stages(stage: &Document) -> Vec<&Document> {
    let mut children = Vec::new();
    if let Ok(input) = stage.get_document("inputStage") {
        children.push(input);
    }
    if let Ok(inputs) = stage.get_array("inputStages") {
        children.extend(inputs.iter().filter_map(Bson::as_document));
    }
    children
}

fn find_index_name(stage: &Document) -> Option<String> {
    if let Ok(name) = stage.get_str("indexName") {
        return Some(name.to_string());
    }
    child_stages(stage).into_iter().find_map(find_index_name)
}

fn has_stage(stage: &Document, name: &str) -> bool {
    stage.get_str("stage").map(|s| s == name).unwrap_or(false)
        || child_stages(stage).into_iter().any(|child| has_stage(child, name))
}

/// Read a numeric field whatever width the server chose
fn number(doc: &Document, key: &str) -> Result<i64, StatsError> {
    match doc.get(key) {
        Some(Bson::Int32(n)) => Ok(i64::from(*n)),
        Some(Bson::Int64(n)) => Ok(*n),
        Some(Bson::Double(n)) => Ok(*n as i64),
        _ => Err(StatsError::NotANumber(key.to_string())),
    }
}

/// One bucket of a `$group` by field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldCount {
    pub value: Bson,
    pub count: u64,
}

impl FieldCount {
    /// Parse `{ _id: <value>, count: <n> }`
    pub fn from_group_document(doc: &Document) -> Result<Self, StatsError> {
        let value = doc.get("_id").cloned().unwrap_or(Bson::Null);
        let count = number(doc, "count").map_err(|_| StatsError::MissingCount)?;
        Ok(Self {
            value,
            count: count.max(0) as u64,
        })
    }

    /// Bucket label; missing or empty values print as `<empty>`
    pub fn label(&self) -> String {
        match &self.value {
            Bson::Null | Bson::Undefined => "<empty>".to_string(),
            Bson::String(s) if s.is_empty() => "<empty>".to_string(),
            Bson::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for FieldCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.label(), self.count)
    }
}
