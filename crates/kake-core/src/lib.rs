//! Kake: an in-process, long-lived dependency/build engine. A host process
//! constructs one [`Engine`], registers compile rules against it, then calls
//! [`Engine::build`]/[`Engine::build_many`] as file requests arrive.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fsview;
pub mod path;
pub mod pattern;
pub mod registry;
pub mod resolver;
pub mod rule;
pub mod staleness;

pub use config::EngineConfig;
pub use context::{BuildContext, ContextView};
pub use engine::Engine;
pub use error::{KakeError, Result};
pub use executor::ProcessRunner;
pub use fsview::FilesystemView;
pub use path::TargetPath;
pub use rule::{BuildInvocation, Capability, NodeView};
