//! Hookpoint payload and the controller/legacy hook interfaces.

use crate::error::LifecycleError;
use crate::op::{OpDescriptor, UrlParams};
use crate::role::{Actor, Role};
use serde_json::Value;

/// Opaque carrier flowing Before -> After/Transact within one request.
/// No identity beyond the request; discarded once the last stage completes.
#[derive(Clone, Debug, Default)]
pub struct Cargo {
    pub payload: Value,
}

impl Cargo {
    pub fn new(payload: Value) -> Self {
        Cargo { payload }
    }
}

/// Payload handed by reference to each hook in sequence; mutations are
/// visible to later hooks. Owned by the orchestrator for one request.
///
/// Invariant: `roles.len() == models.len()`.
#[derive(Debug)]
pub struct HookPayload {
    pub models: Vec<Value>,
    pub actor: Actor,
    pub roles: Vec<Role>,
    pub cargo: Cargo,
    pub endpoint: OpDescriptor,
}

/// User-supplied lifecycle hooks. Every method is a default no-op so a
/// controller implements only the stages it registered for; the stages it
/// actually runs at are decided by the registry, not by which methods exist.
pub trait Controller: Send {
    /// Called once right after instantiation, before any stage method.
    fn init(&mut self, _data: &HookPayload) {}

    /// Patch-only, before the JSON merge is applied.
    fn before_apply(&mut self, _data: &mut HookPayload) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn before(&mut self, _data: &mut HookPayload) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn after(&mut self, _data: &mut HookPayload) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Post-commit. No error return: the transaction is already resolved, so
    /// failures here must be handled by the hook itself.
    fn after_transact(&mut self, _data: &mut HookPayload) {}

    /// Return Some to replace the default response body.
    fn render(&mut self, _data: &HookPayload) -> Option<Value> {
        None
    }
}

/// Older payload shape for types that predate controller registration.
/// Carries no db handle: the transaction is already resolved when legacy
/// hooks fire.
pub struct LegacyHookData<'a> {
    pub actor: &'a Actor,
    pub type_name: &'a str,
    pub roles: &'a [Role],
    pub url_params: &'a UrlParams,
    pub cargo: &'a Cargo,
}

/// Backward-compatibility AfterTransact interface, invoked only when a type
/// has no registered controller.
pub trait LegacyAfterTransact: Send + Sync {
    fn after_transact_one(&self, _model: &Value, _data: &LegacyHookData<'_>) {}

    fn after_transact_many(&self, _models: &[Value], _data: &LegacyHookData<'_>) {}
}
