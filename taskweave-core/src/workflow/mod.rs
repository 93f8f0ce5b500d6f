//! Workflow dependency resolution and execution

pub mod executor;
pub mod resolver;

pub use executor::WorkflowExecutor;
pub use resolver::resolve;
