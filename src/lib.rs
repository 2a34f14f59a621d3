//! Restcycle: model-driven CRUD lifecycle orchestration for REST backends.
//!
//! Given a set of registered model types, the crate wires auto-generated
//! create/read/update/patch/delete endpoints through a request lifecycle:
//! transaction boundaries, data-mapper execution, per-instance role
//! computation, and ordered hookpoint dispatch.

pub mod error;
pub mod handlers;
pub mod hook;
pub mod mapper;
pub mod op;
pub mod orchestrator;
pub mod registry;
pub mod response;
pub mod role;
pub mod routes;
pub mod state;
pub mod tx;

pub use error::{LifecycleError, Rendered};
pub use hook::{Cargo, Controller, HookPayload, LegacyAfterTransact, LegacyHookData};
pub use mapper::{DataMapper, MapperContext, MapperError, MapperOutcome};
pub use op::{Cardinality, OpDescriptor, Stage, UrlParams, Verb};
pub use orchestrator::{OpLogger, OpOutput, Orchestrator, RestOps};
pub use registry::{ControllerRegistry, Fetcher, TypeFetcher, TypeRegistry};
pub use role::{Actor, Role};
pub use routes::{common_routes, entity_routes};
pub use state::AppState;
pub use tx::{open_transaction_count, run_in_transaction, Transactor};
