use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::protocol::ErrorCode;
use crate::schema::RootSchema;
use crate::source::{QueryError, QuerySource, StreamOptions};

#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: RootSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn meta(&self) -> ToolMeta<'_> {
        ToolMeta {
            name: self.name,
            description: self.description,
            input_schema: &self.input_schema,
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Wire shape of one `tools/list` entry.
#[derive(Serialize)]
pub struct ToolMeta<'a> {
    pub name: &'a str,
    pub description: &'a str,
    #[serde(rename = "inputSchema")]
    pub input_schema: &'a RootSchema,
}

/// Everything a handler may touch while running one invocation.
#[derive(Clone)]
pub struct ToolCtx {
    pub source: Arc<dyn QuerySource>,
    pub cancel: CancellationToken,
    pub stream: StreamOptions,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("tool call timed out after {0:?}")]
    TimedOut(Duration),
    #[error("internal: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ToolError::InvalidArgs(_) => ErrorCode::InvalidParams,
            ToolError::NotFound(_)
            | ToolError::Query(_)
            | ToolError::TimedOut(_)
            | ToolError::Internal(_) => ErrorCode::ToolFailure,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, ToolError::Query(QueryError::Cancelled))
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ToolCtx, args: Value) -> Result<Value, ToolError>;
}
