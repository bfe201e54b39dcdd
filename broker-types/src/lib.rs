pub mod agent;
pub mod codebase;
pub mod errors;
pub mod events;
pub mod mcp;
pub mod session;
pub mod task;

pub use agent::{Agent, AgentStatus, RegisterAgentOptions};
pub use codebase::{Codebase, CodebaseDependency, CodebaseIdentity, DependencyType, IdentificationMethod};
pub use errors::{BrokerError, BrokerResult};
pub use events::BrokerEvent;
pub use mcp::{
    ExternalServerInfo, McpServersFile, ServerState, ServerTransportConfig, ToolDescriptor, ToolOrigin,
};
pub use session::{ClientContext, ConnectionType, SecurityLevel, Session};
pub use task::{CoordinationStrategy, CreateTaskOptions, CrossCodebaseDependency, Priority, Task, TaskStatus};
