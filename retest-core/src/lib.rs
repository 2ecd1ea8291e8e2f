//! Retest core library: checksums, snapshots, change detection and test selection.
//!
//! The main entry point is [`engine::RtsEngine`]. A build tool calls
//! [`compute_non_affected`](engine::RtsEngine::compute_non_affected) before
//! running tests and [`update_snapshot`](engine::RtsEngine::update_snapshot)
//! after a successful run; state lives in a [`store::StateStore`].

pub mod change;
pub mod checksum;
pub mod classfile;
pub mod config;
pub mod engine;
pub mod error;
pub mod progress;
pub mod resolve;
pub mod source;
pub mod store;
pub mod types;

pub use config::RetestConfig;
pub use engine::{HistoryStatus, ImpactReport, RtsEngine, Selection, StatusReport, UpdateReport};
pub use error::{Result, RetestError};
pub use source::{ClassSource, DirectoryClassSource, EdgeFileProvider, EdgeProvider};
pub use types::{ClassName, Classpath, DependencyEdge, TestId};
