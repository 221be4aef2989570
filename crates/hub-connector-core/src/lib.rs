//! Shared adapter traits and error taxonomy used by every per-agent
//! connector and by the hub server's Container CLI Adapter and Daemon
//! Client implementations.

pub mod container;
pub mod daemon;
pub mod error;
pub mod shell_quote;

pub use container::{ContainerAdapter, ExecOutcome, Port};
pub use daemon::{DaemonClient, JobStatus};
pub use error::ConnectorError;
