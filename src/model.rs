//! Model surface: traits implemented by user test code plus the action registry
//!
//! Capabilities (state capture, after-action hook, override provider) are
//! declared explicitly through [`StateAccess`] and [`ModelHooks`] rather than
//! discovered by reflection; the dispatcher resolves them once at service
//! construction and never re-probes per call.

use crate::error::ActionResult;
use crate::overrides::{FuzzOptions, OverridesBuilder};
use crate::role::RoleId;
use crate::value::ModelValue;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Observable state of one role: key/value pairs in capture order.
pub type StateMap = Vec<(String, ModelValue)>;

/// How a role exposes its observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAccess {
    /// No observable state; the role is never included in state captures.
    Hidden,
    /// Plain accessor with no concurrency guarantee.
    Plain,
    /// Concurrency-safe point-in-time capture; preferred over `Plain` when a
    /// role offers both.
    Snapshot,
}

/// A named, indexed component of the system under test that actions operate on.
#[async_trait]
pub trait Role: Send + Sync + 'static {
    /// Upcast used by [`ActionTarget::role_as`] to recover the concrete role
    /// type inside action functions. Implementations return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Declare which state accessor this role provides.
    fn state_access(&self) -> StateAccess {
        StateAccess::Hidden
    }

    /// Current state, with no concurrency guarantee.
    async fn state(&self) -> ActionResult<StateMap> {
        Ok(Vec::new())
    }

    /// Consistent, concurrency-safe snapshot of the state. Defaults to the
    /// plain accessor for roles that declare `Snapshot` but share one
    /// implementation.
    async fn snapshot_state(&self) -> ActionResult<StateMap> {
        self.state().await
    }
}

/// Optional model hooks, resolved once when the plugin service is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelHooks {
    /// Run [`Model::after_action`] after each sequential-mode action. Skipped
    /// in concurrent multi-sequence execution, where quiescence between
    /// actions is ill-defined.
    pub after_action: bool,
    /// Call [`Model::provide_overrides`] before each init.
    pub overrides: bool,
}

/// The system model driven by the external engine.
///
/// `init` begins a run and `cleanup` ends it; the dispatcher trusts the
/// engine to pair them and does not reject out-of-order calls.
#[async_trait]
pub trait Model: Send + Sync {
    /// Initialize the model before a test run.
    async fn init(&self) -> ActionResult<()>;

    /// Clean up the model after a test run.
    async fn cleanup(&self) -> ActionResult<()>;

    /// Enumerate all current role instances keyed by identity.
    async fn roles(&self) -> Vec<(RoleId, Arc<dyn Role>)>;

    /// Declare which optional hooks this model implements.
    fn hooks(&self) -> ModelHooks {
        ModelHooks::default()
    }

    /// Resynchronization point invoked after each sequential-mode action,
    /// when declared via [`ModelHooks::after_action`].
    async fn after_action(&self) -> ActionResult<()> {
        Ok(())
    }

    /// Declare typed variable overrides before init, when declared via
    /// [`ModelHooks::overrides`]. Receives the engine's fuzz seed.
    async fn provide_overrides(&self, _fuzz: &FuzzOptions, _builder: &mut OverridesBuilder) {}
}

/// Target an action executes against: the model itself or one role instance.
#[derive(Clone)]
pub enum ActionTarget {
    /// The top-level model (empty role name in the request).
    Model(Arc<dyn Model>),
    /// A specific role instance.
    Role(Arc<dyn Role>),
}

impl ActionTarget {
    /// The model, if this target addresses the model itself.
    pub fn as_model(&self) -> Option<&Arc<dyn Model>> {
        match self {
            ActionTarget::Model(model) => Some(model),
            ActionTarget::Role(_) => None,
        }
    }

    /// The role instance, if this target addresses a role.
    pub fn as_role(&self) -> Option<&Arc<dyn Role>> {
        match self {
            ActionTarget::Role(role) => Some(role),
            ActionTarget::Model(_) => None,
        }
    }

    /// Downcast the target role to its concrete type.
    pub fn role_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            ActionTarget::Role(role) => Arc::clone(role).as_any().downcast::<T>().ok(),
            ActionTarget::Model(_) => None,
        }
    }
}

/// Registered action function: invoked with the resolved target and the
/// decoded positional arguments, optionally returning a value.
pub type ActionFn =
    Arc<dyn Fn(ActionTarget, Vec<ModelValue>) -> BoxFuture<'static, ActionResult<Option<ModelValue>>> + Send + Sync>;

/// Two-level mapping from role type name to action name to function.
///
/// The empty role name registers actions on the top-level model itself.
/// Built once at process start and read-only thereafter.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, HashMap<String, ActionFn>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action function under `(role, action)`.
    pub fn register<F, Fut>(&mut self, role: &str, action: &str, func: F)
    where
        F: Fn(ActionTarget, Vec<ModelValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult<Option<ModelValue>>> + Send + 'static,
    {
        let boxed: ActionFn = Arc::new(move |target, args| func(target, args).boxed());
        self.actions
            .entry(role.to_string())
            .or_default()
            .insert(action.to_string(), boxed);
    }

    /// All actions registered for a role type, if any.
    pub fn actions_for(&self, role: &str) -> Option<&HashMap<String, ActionFn>> {
        self.actions.get(role)
    }

    /// Number of role types with registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the registry has no registrations at all.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
