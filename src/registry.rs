//! Controller registry: hook-stage resolution per model type.
//!
//! Built mutably at application wiring, then shared read-only behind an Arc.
//! Lookups never mutate; registration is append-only.

use crate::hook::{Controller, LegacyAfterTransact};
use crate::op::{Stage, Verb};
use std::collections::HashMap;
use std::sync::Arc;

type ControllerFactory = Box<dyn Fn() -> Box<dyn Controller> + Send + Sync>;

/// Per-model-type registry mapping (verb, first-applicable-stage) to the
/// ordered list of controller factories.
#[derive(Default)]
pub struct ControllerRegistry {
    slots: HashMap<(Verb, Stage), Vec<ControllerFactory>>,
    any_registered: bool,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        ControllerRegistry::default()
    }

    /// Register a controller type for every verb in `verbs` (letters CRUPD)
    /// at the first applicable stage among `stages` (letters JBAT).
    ///
    /// Stage priority is B > A > T; J always wins for Patch specifically
    /// (patch hooks need pre-merge access). Read has no Before stage: a
    /// first-computed B is remapped to A if requested, else T, else the
    /// registration for Read is dropped. An empty stage string registers the
    /// controller nowhere. Unknown letters are ignored.
    pub fn register<C>(&mut self, verbs: &str, stages: &str)
    where
        C: Controller + Default + 'static,
    {
        self.register_factory(verbs, stages, || Box::new(C::default()));
    }

    /// Same as [`register`](Self::register) but with an explicit factory, for
    /// controllers without a Default construction.
    pub fn register_factory<F>(&mut self, verbs: &str, stages: &str, factory: F)
    where
        F: Fn() -> Box<dyn Controller> + Clone + Send + Sync + 'static,
    {
        // Monotonic: flips on every registration call, even one whose stage
        // string lands the controller in no slot.
        self.any_registered = true;
        for c in verbs.chars() {
            let Some(verb) = Verb::from_letter(c) else {
                continue;
            };
            if let Some(stage) = first_applicable_stage(verb, stages) {
                let f = factory.clone();
                self.slots
                    .entry((verb, stage))
                    .or_default()
                    .push(Box::new(move || f()));
            }
        }
    }

    /// Fresh instances of every controller registered at exactly this
    /// (verb, stage) pair, in registration order. Empty if none.
    pub fn instantiate_controllers_with_first_hook_at(
        &self,
        verb: Verb,
        stage: Stage,
    ) -> Vec<Box<dyn Controller>> {
        match self.slots.get(&(verb, stage)) {
            Some(factories) => factories.iter().map(|f| f()).collect(),
            None => Vec::new(),
        }
    }

    /// Whether any registration has ever occurred on this registry.
    pub fn has_registered_any_controller(&self) -> bool {
        self.any_registered
    }
}

/// First applicable stage for one verb given the requested stage letters.
fn first_applicable_stage(verb: Verb, stages: &str) -> Option<Stage> {
    if verb == Verb::Patch && stages.contains('J') {
        return Some(Stage::Json);
    }
    let first = if stages.contains('B') {
        Stage::Before
    } else if stages.contains('A') {
        Stage::After
    } else if stages.contains('T') {
        Stage::Transact
    } else {
        return None;
    };
    if verb == Verb::Read && first == Stage::Before {
        if stages.contains('A') {
            return Some(Stage::After);
        }
        if stages.contains('T') {
            return Some(Stage::Transact);
        }
        return None;
    }
    Some(first)
}

struct TypeEntry {
    controllers: ControllerRegistry,
    legacy: Option<Arc<dyn LegacyAfterTransact>>,
}

/// Registry of all model types known to the application: each type carries
/// its controller registry and, for types that predate controllers, an
/// optional legacy AfterTransact hook. Wiring happens once at startup; the
/// whole registry is then shared read-only.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeEntry>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Controller registry for a type, created on first use.
    pub fn controllers_mut(&mut self, type_name: &str) -> &mut ControllerRegistry {
        &mut self.entry(type_name).controllers
    }

    pub fn controllers(&self, type_name: &str) -> Option<&ControllerRegistry> {
        self.types.get(type_name).map(|e| &e.controllers)
    }

    /// Wire the backward-compatibility hook for a type.
    pub fn set_legacy_hook(&mut self, type_name: &str, hook: Arc<dyn LegacyAfterTransact>) {
        self.entry(type_name).legacy = Some(hook);
    }

    pub fn legacy_hook(&self, type_name: &str) -> Option<Arc<dyn LegacyAfterTransact>> {
        self.types.get(type_name).and_then(|e| e.legacy.clone())
    }

    fn entry(&mut self, type_name: &str) -> &mut TypeEntry {
        self.types
            .entry(type_name.to_string())
            .or_insert_with(|| TypeEntry {
                controllers: ControllerRegistry::new(),
                legacy: None,
            })
    }

    /// Fetcher handed to mappers for one type; resolves against this shared
    /// registry on every call.
    pub fn fetcher(self: &Arc<Self>, type_name: &str) -> TypeFetcher {
        TypeFetcher {
            registry: Arc::clone(self),
            type_name: type_name.to_string(),
        }
    }
}

/// Mapper-returned view over controller registrations for one model type.
pub trait Fetcher: Send + Sync {
    fn has_registered_handler(&self) -> bool;

    fn fetch_handlers_for_op_and_hook(&self, verb: Verb, stage: Stage)
        -> Vec<Box<dyn Controller>>;
}

/// [`Fetcher`] backed by the shared [`TypeRegistry`].
pub struct TypeFetcher {
    registry: Arc<TypeRegistry>,
    type_name: String,
}

impl Fetcher for TypeFetcher {
    fn has_registered_handler(&self) -> bool {
        self.registry
            .controllers(&self.type_name)
            .map(ControllerRegistry::has_registered_any_controller)
            .unwrap_or(false)
    }

    fn fetch_handlers_for_op_and_hook(
        &self,
        verb: Verb,
        stage: Stage,
    ) -> Vec<Box<dyn Controller>> {
        self.registry
            .controllers(&self.type_name)
            .map(|c| c.instantiate_controllers_with_first_hook_at(verb, stage))
            .unwrap_or_default()
    }
}
