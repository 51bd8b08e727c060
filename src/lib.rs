//! MBT Bridge – glue between user-written behavioral models and an external
//! model-based-testing engine
//!
//! This crate exposes a user model ("roles" and "actions" describing a system
//! under test) as a local service the engine drives:
//! - Value codec translating between native values and the engine's recursive
//!   tagged wire format, including "ignore during comparison" sentinels
//! - Role identity codec addressing role instances as `name#index`
//! - Plugin service dispatching init/cleanup/action requests to registered
//!   action functions, with concurrent multi-sequence execution
//! - Runner lifecycle manager that binds a Unix-socket endpoint, launches the
//!   engine subprocess, and tears both down safely
//!
//! The exploration/search algorithm itself lives entirely in the external
//! engine; this crate only answers its calls.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod model;
pub mod overrides;
pub mod protocol;
pub mod role;
pub mod runner;
pub mod service;
pub mod value;

pub use error::{ActionError, ActionResult, RunnerError, RunnerResult};
pub use model::{ActionRegistry, ActionTarget, Model, ModelHooks, Role, StateAccess, StateMap};
pub use overrides::{FuzzOptions, OverridesBuilder};
pub use role::RoleId;
pub use runner::{Runner, TestOptions, run_tests};
pub use service::PluginService;
pub use value::{ModelValue, SentinelKind, WireValue, decode, encode};

/// Current version of the bridge crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
