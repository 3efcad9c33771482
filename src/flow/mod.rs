// SPDX-License-Identifier: MIT

pub mod condition;
pub mod context;
pub mod loader;
pub mod nodes;
pub mod runner;
pub mod types;
pub mod validate;

pub use context::{ContextManager, FlowContext, FlowStatus};
pub use loader::FlowLoader;
pub use nodes::{NodeExecutor, NodeHandler};
pub use runner::FlowRunner;
pub use types::{FlowEdge, FlowMetadata, FlowNode, FlowSpec, Mode, NodeType};
