pub use crate::config::ServerConfig;
pub use crate::executor::{ToolExecutor, ToolInvocation, ToolOutcome};
pub use crate::metrics::{Metrics, MetricsSnapshot};
pub use crate::registry::{RegistryError, ToolRegistry};
pub use crate::session::{Session, SessionError};
pub use crate::source::{MockSource, Query, QueryError, QueryResult, QuerySource};
pub use crate::tool::{ToolCtx, ToolDescriptor, ToolError, ToolHandler};
pub use crate::tools::default_registry;
#[cfg(feature = "http")]
pub use crate::{McpLayer, McpLayerConfig};
