//! Request lifecycle orchestrator: one entry point per (verb, cardinality),
//! sequencing transaction boundaries, mapper execution, role computation,
//! and post-commit hook dispatch.
//!
//! Per-request state machine:
//! `Start -> (BeginTx) -> MapperExec -> {Fail -> RenderError -> End} |
//! {Success -> RoleCompute -> HookResolve -> HookDispatch -> (CommitTx) -> End}`.
//! No retries at this layer; retry policy belongs to the mapper.

use crate::error::LifecycleError;
use crate::hook::{Cargo, HookPayload, LegacyHookData};
use crate::mapper::{DataMapper, MapperContext, MapperError, MapperOutcome};
use crate::op::{Cardinality, OpDescriptor, Stage, UrlParams, Verb};
use crate::registry::{Fetcher, TypeRegistry};
use crate::role::{Actor, Role};
use crate::tx::{run_in_transaction, Transactor};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;

/// Optional injected operation logger, called before mapper execution.
/// Writes receive the open transaction handle; reads pass None.
pub trait OpLogger<Tx>: Send + Sync {
    fn log(&self, tx: Option<&mut Tx>, http_method: &str, type_name_lower: &str, arity: &str);
}

/// Result of one successful operation: the final hook payload, the total
/// matching count (read-many), and a custom body if a Render hook opted out
/// of default rendering.
#[derive(Debug)]
pub struct OpOutput {
    pub payload: HookPayload,
    pub total: Option<u64>,
    pub custom_body: Option<Value>,
}

/// Object-safe facade over the ten lifecycle entry points, so HTTP adapters
/// need not know the concrete transactor/mapper types.
#[async_trait]
pub trait RestOps: Send + Sync {
    async fn create_one(
        &self,
        actor: Actor,
        type_name: &str,
        body: Value,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;

    async fn create_many(
        &self,
        actor: Actor,
        type_name: &str,
        bodies: Vec<Value>,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;

    async fn read_one(
        &self,
        actor: Actor,
        type_name: &str,
        id: &str,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;

    async fn read_many(
        &self,
        actor: Actor,
        type_name: &str,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;

    async fn update_one(
        &self,
        actor: Actor,
        type_name: &str,
        id: &str,
        body: Value,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;

    async fn update_many(
        &self,
        actor: Actor,
        type_name: &str,
        bodies: Vec<Value>,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;

    async fn patch_one(
        &self,
        actor: Actor,
        type_name: &str,
        id: &str,
        patch: Value,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;

    async fn patch_many(
        &self,
        actor: Actor,
        type_name: &str,
        patches: Vec<Value>,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;

    async fn delete_one(
        &self,
        actor: Actor,
        type_name: &str,
        id: &str,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;

    async fn delete_many(
        &self,
        actor: Actor,
        type_name: &str,
        bodies: Vec<Value>,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError>;
}

/// Lifecycle orchestrator over an injected transactor and data mapper.
/// One invocation per inbound request; no internal parallel fan-out.
pub struct Orchestrator<T: Transactor, M: DataMapper<T>> {
    transactor: T,
    mapper: M,
    types: Arc<TypeRegistry>,
    logger: Option<Box<dyn OpLogger<T::Tx>>>,
    debug_tx: bool,
}

enum WriteOp {
    CreateOne(Value),
    CreateMany(Vec<Value>),
    UpdateOne(String, Value),
    UpdateMany(Vec<Value>),
    PatchOne(String, Value),
    PatchMany(Vec<Value>),
    DeleteOne(String),
    DeleteMany(Vec<Value>),
}

impl WriteOp {
    fn verb(&self) -> Verb {
        match self {
            WriteOp::CreateOne(_) | WriteOp::CreateMany(_) => Verb::Create,
            WriteOp::UpdateOne(..) | WriteOp::UpdateMany(_) => Verb::Update,
            WriteOp::PatchOne(..) | WriteOp::PatchMany(_) => Verb::Patch,
            WriteOp::DeleteOne(_) | WriteOp::DeleteMany(_) => Verb::Delete,
        }
    }

    fn cardinality(&self) -> Cardinality {
        match self {
            WriteOp::CreateOne(_)
            | WriteOp::UpdateOne(..)
            | WriteOp::PatchOne(..)
            | WriteOp::DeleteOne(_) => Cardinality::One,
            _ => Cardinality::Many,
        }
    }
}

/// Borrowed per-request state threaded through the transaction wrapper so the
/// boxed callback future can reach it without capturing.
struct WriteEnv<'e, T: Transactor, M> {
    mapper: &'e M,
    logger: Option<&'e dyn OpLogger<T::Tx>>,
    actor: &'e Actor,
    params: &'e UrlParams,
    cargo: &'e mut Cargo,
    type_name: &'e str,
    type_lower: &'e str,
    op: Option<WriteOp>,
    verb: Verb,
    card: Cardinality,
}

fn wrap_write_error(verb: Verb, e: MapperError) -> LifecycleError {
    e.into_lifecycle(|detail| match verb {
        Verb::Create => LifecycleError::CreateFailed { detail },
        Verb::Update => LifecycleError::UpdateFailed { detail },
        Verb::Patch => LifecycleError::PatchFailed { detail },
        Verb::Delete => LifecycleError::DeleteFailed { detail },
        Verb::Read => LifecycleError::Internal { detail },
    })
}

fn wrap_read_error(e: MapperError) -> LifecycleError {
    match e {
        MapperError::NotFound => LifecycleError::NotFound,
        MapperError::Db(sqlx::Error::RowNotFound) => LifecycleError::NotFound,
        MapperError::Rendered(r) => LifecycleError::Custom(r),
        other => LifecycleError::Internal {
            detail: other.to_string(),
        },
    }
}

impl<T, M> Orchestrator<T, M>
where
    T: Transactor,
    M: DataMapper<T>,
{
    pub fn new(transactor: T, mapper: M, types: Arc<TypeRegistry>) -> Self {
        Orchestrator {
            transactor,
            mapper,
            types,
            logger: None,
            debug_tx: false,
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn OpLogger<T::Tx>>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Enable labeled debug instrumentation on write transactions.
    pub fn with_tx_debug(mut self) -> Self {
        self.debug_tx = true;
        self
    }

    /// Shared algorithm for all write/delete verbs: mapper runs inside the
    /// transaction wrapper; roles and hooks are computed after commit
    /// resolution. After-transact hooks fire only when the commit succeeded.
    async fn run_write(
        &self,
        actor: Actor,
        type_name: &str,
        params: UrlParams,
        op: WriteOp,
    ) -> Result<OpOutput, LifecycleError> {
        let verb = op.verb();
        let card = op.cardinality();
        let type_lower = type_name.to_lowercase();
        let mut cargo = Cargo::default();
        let label_owned = self
            .debug_tx
            .then(|| format!("{} {}", verb.http_method(), type_lower));

        let outcome: MapperOutcome = {
            let mut env = WriteEnv::<'_, T, M> {
                mapper: &self.mapper,
                logger: self.logger.as_deref(),
                actor: &actor,
                params: &params,
                cargo: &mut cargo,
                type_name,
                type_lower: type_lower.as_str(),
                op: Some(op),
                verb,
                card,
            };
            run_in_transaction(
                &self.transactor,
                &mut env,
                label_owned.as_deref(),
                |tx, env| {
                    async move {
                        let verb = env.verb;
                        let card = env.card;
                        if let Some(l) = env.logger {
                            l.log(Some(&mut *tx), verb.http_method(), env.type_lower, card.arity());
                        }
                        let op = match env.op.take() {
                            Some(op) => op,
                            None => {
                                return Err(LifecycleError::Internal {
                                    detail: "write payload already consumed".into(),
                                })
                            }
                        };
                        let mapper = env.mapper;
                        let mut ctx = MapperContext {
                            actor: env.actor,
                            type_name: env.type_name,
                            url_params: env.params,
                            cargo: &mut *env.cargo,
                        };
                        let res = match op {
                            WriteOp::CreateOne(body) => mapper.create_one(tx, &mut ctx, body).await,
                            WriteOp::CreateMany(bodies) => {
                                mapper.create_many(tx, &mut ctx, bodies).await
                            }
                            WriteOp::UpdateOne(id, body) => {
                                mapper.update_one(tx, &mut ctx, &id, body).await
                            }
                            WriteOp::UpdateMany(bodies) => {
                                mapper.update_many(tx, &mut ctx, bodies).await
                            }
                            WriteOp::PatchOne(id, patch) => {
                                mapper.patch_one(tx, &mut ctx, &id, patch).await
                            }
                            WriteOp::PatchMany(patches) => {
                                mapper.patch_many(tx, &mut ctx, patches).await
                            }
                            WriteOp::DeleteOne(id) => mapper.delete_one(tx, &mut ctx, &id).await,
                            WriteOp::DeleteMany(bodies) => {
                                mapper.delete_many(tx, &mut ctx, bodies).await
                            }
                        };
                        res.map_err(|e| wrap_write_error(verb, e))
                    }
                    .boxed()
                },
            )
            .await?
        };

        // The actor that just performed the write owns every instance.
        let roles = vec![Role::Admin; outcome.models.len()];
        let mut payload = HookPayload {
            models: outcome.models,
            actor,
            roles,
            cargo,
            endpoint: OpDescriptor::new(verb, card, type_name, params),
        };
        let custom_body = self.dispatch_after_transact(outcome.fetcher.as_ref(), &mut payload);
        Ok(OpOutput {
            payload,
            total: None,
            custom_body,
        })
    }

    /// Reads use the ambient handle directly; no transaction is opened.
    async fn run_read(
        &self,
        actor: Actor,
        type_name: &str,
        params: UrlParams,
        id: Option<&str>,
    ) -> Result<OpOutput, LifecycleError> {
        let card = if id.is_some() {
            Cardinality::One
        } else {
            Cardinality::Many
        };
        let type_lower = type_name.to_lowercase();
        if let Some(l) = self.logger.as_deref() {
            l.log(None, Verb::Read.http_method(), &type_lower, card.arity());
        }
        let mut cargo = Cargo::default();
        let outcome = {
            let mut ctx = MapperContext {
                actor: &actor,
                type_name,
                url_params: &params,
                cargo: &mut cargo,
            };
            let res = match id {
                Some(id) => self.mapper.read_one(&self.transactor, &mut ctx, id).await,
                None => self.mapper.read_many(&self.transactor, &mut ctx).await,
            };
            res.map_err(wrap_read_error)?
        };

        let n = outcome.models.len();
        let roles = match outcome.roles {
            Some(r) if r.len() == n => r,
            Some(r) => {
                return Err(LifecycleError::Internal {
                    detail: format!("mapper returned {} roles for {} models", r.len(), n),
                })
            }
            None => vec![Role::Public; n],
        };
        let mut payload = HookPayload {
            models: outcome.models,
            actor,
            roles,
            cargo,
            endpoint: OpDescriptor::new(Verb::Read, card, type_name, params),
        };
        let custom_body = self.dispatch_after_transact(outcome.fetcher.as_ref(), &mut payload);
        Ok(OpOutput {
            payload,
            total: outcome.total,
            custom_body,
        })
    }

    /// Resolve and run the post-transaction hookpoint. Types without any
    /// registered controller fall back to the legacy AfterTransact hook when
    /// one is wired. Dispatch is sequential and synchronous; return values of
    /// after-transact hooks are ignored, since the operation is already
    /// resolved. A Render hook may replace the default response body.
    fn dispatch_after_transact(
        &self,
        fetcher: &dyn Fetcher,
        payload: &mut HookPayload,
    ) -> Option<Value> {
        if !fetcher.has_registered_handler() {
            if let Some(hook) = self.types.legacy_hook(&payload.endpoint.type_name) {
                let data = LegacyHookData {
                    actor: &payload.actor,
                    type_name: &payload.endpoint.type_name,
                    roles: &payload.roles,
                    url_params: &payload.endpoint.url_params,
                    cargo: &payload.cargo,
                };
                match payload.endpoint.cardinality {
                    Cardinality::One => {
                        if let Some(model) = payload.models.first() {
                            hook.after_transact_one(model, &data);
                        }
                    }
                    Cardinality::Many => hook.after_transact_many(&payload.models, &data),
                }
            }
            return None;
        }
        let verb = payload.endpoint.verb;
        let mut custom = None;
        let mut controllers = fetcher.fetch_handlers_for_op_and_hook(verb, Stage::Transact);
        for c in controllers.iter_mut() {
            c.init(payload);
            c.after_transact(payload);
            if custom.is_none() {
                custom = c.render(payload);
            }
        }
        custom
    }
}

#[async_trait]
impl<T, M> RestOps for Orchestrator<T, M>
where
    T: Transactor,
    M: DataMapper<T>,
{
    async fn create_one(
        &self,
        actor: Actor,
        type_name: &str,
        body: Value,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_write(actor, type_name, params, WriteOp::CreateOne(body))
            .await
    }

    async fn create_many(
        &self,
        actor: Actor,
        type_name: &str,
        bodies: Vec<Value>,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_write(actor, type_name, params, WriteOp::CreateMany(bodies))
            .await
    }

    async fn read_one(
        &self,
        actor: Actor,
        type_name: &str,
        id: &str,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_read(actor, type_name, params, Some(id)).await
    }

    async fn read_many(
        &self,
        actor: Actor,
        type_name: &str,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_read(actor, type_name, params, None).await
    }

    async fn update_one(
        &self,
        actor: Actor,
        type_name: &str,
        id: &str,
        body: Value,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_write(
            actor,
            type_name,
            params,
            WriteOp::UpdateOne(id.to_string(), body),
        )
        .await
    }

    async fn update_many(
        &self,
        actor: Actor,
        type_name: &str,
        bodies: Vec<Value>,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_write(actor, type_name, params, WriteOp::UpdateMany(bodies))
            .await
    }

    async fn patch_one(
        &self,
        actor: Actor,
        type_name: &str,
        id: &str,
        patch: Value,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_write(
            actor,
            type_name,
            params,
            WriteOp::PatchOne(id.to_string(), patch),
        )
        .await
    }

    async fn patch_many(
        &self,
        actor: Actor,
        type_name: &str,
        patches: Vec<Value>,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_write(actor, type_name, params, WriteOp::PatchMany(patches))
            .await
    }

    async fn delete_one(
        &self,
        actor: Actor,
        type_name: &str,
        id: &str,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_write(actor, type_name, params, WriteOp::DeleteOne(id.to_string()))
            .await
    }

    async fn delete_many(
        &self,
        actor: Actor,
        type_name: &str,
        bodies: Vec<Value>,
        params: UrlParams,
    ) -> Result<OpOutput, LifecycleError> {
        self.run_write(actor, type_name, params, WriteOp::DeleteMany(bodies))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{Controller, LegacyAfterTransact, LegacyHookData};
    use crate::registry::TypeRegistry;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Mutex;

    struct MockTransactor {
        fail_commit: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MockTransactor {
        fn new() -> Self {
            MockTransactor {
                fail_commit: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transactor for MockTransactor {
        type Tx = ();

        async fn begin(&self) -> Result<(), LifecycleError> {
            self.calls.lock().unwrap().push("begin");
            Ok(())
        }

        async fn commit(&self, _tx: ()) -> Result<(), LifecycleError> {
            if self.fail_commit {
                return Err(LifecycleError::Commit {
                    detail: "commit refused".into(),
                });
            }
            self.calls.lock().unwrap().push("commit");
            Ok(())
        }

        async fn rollback(&self, _tx: ()) -> Result<(), LifecycleError> {
            self.calls.lock().unwrap().push("rollback");
            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    enum Fail {
        NotFound,
        Plain(&'static str),
        Custom,
    }

    struct MockMapper {
        types: Arc<TypeRegistry>,
        fail: Option<Fail>,
        models: Vec<Value>,
        roles: Option<Vec<Role>>,
        total: Option<u64>,
    }

    impl MockMapper {
        fn ok(types: Arc<TypeRegistry>, models: Vec<Value>) -> Self {
            MockMapper {
                types,
                fail: None,
                models,
                roles: None,
                total: None,
            }
        }

        fn failing(types: Arc<TypeRegistry>, fail: Fail) -> Self {
            MockMapper {
                types,
                fail: Some(fail),
                models: Vec::new(),
                roles: None,
                total: None,
            }
        }

        fn result(&self, ctx: &MapperContext<'_>) -> Result<MapperOutcome, MapperError> {
            match self.fail {
                Some(Fail::NotFound) => return Err(MapperError::NotFound),
                Some(Fail::Plain(msg)) => return Err(MapperError::Other(msg.into())),
                Some(Fail::Custom) => {
                    return Err(MapperError::Rendered(crate::error::Rendered {
                        status: StatusCode::CONFLICT,
                        code: 9009,
                        msg: "mapper says no".into(),
                        error: String::new(),
                        more_info: None,
                    }))
                }
                None => {}
            }
            let mut out = MapperOutcome::new(
                self.models.clone(),
                Box::new(self.types.fetcher(ctx.type_name)),
            );
            out.roles = self.roles.clone();
            out.total = self.total;
            Ok(out)
        }
    }

    #[async_trait]
    impl DataMapper<MockTransactor> for MockMapper {
        async fn create_one(
            &self,
            _tx: &mut (),
            ctx: &mut MapperContext<'_>,
            _body: Value,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }

        async fn create_many(
            &self,
            _tx: &mut (),
            ctx: &mut MapperContext<'_>,
            _bodies: Vec<Value>,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }

        async fn read_one(
            &self,
            _db: &MockTransactor,
            ctx: &mut MapperContext<'_>,
            _id: &str,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }

        async fn read_many(
            &self,
            _db: &MockTransactor,
            ctx: &mut MapperContext<'_>,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }

        async fn update_one(
            &self,
            _tx: &mut (),
            ctx: &mut MapperContext<'_>,
            _id: &str,
            _body: Value,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }

        async fn update_many(
            &self,
            _tx: &mut (),
            ctx: &mut MapperContext<'_>,
            _bodies: Vec<Value>,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }

        async fn patch_one(
            &self,
            _tx: &mut (),
            ctx: &mut MapperContext<'_>,
            _id: &str,
            _patch: Value,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }

        async fn patch_many(
            &self,
            _tx: &mut (),
            ctx: &mut MapperContext<'_>,
            _patches: Vec<Value>,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }

        async fn delete_one(
            &self,
            _tx: &mut (),
            ctx: &mut MapperContext<'_>,
            _id: &str,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }

        async fn delete_many(
            &self,
            _tx: &mut (),
            ctx: &mut MapperContext<'_>,
            _bodies: Vec<Value>,
        ) -> Result<MapperOutcome, MapperError> {
            self.result(ctx)
        }
    }

    fn orch(
        types: Arc<TypeRegistry>,
        mapper: MockMapper,
    ) -> Orchestrator<MockTransactor, MockMapper> {
        Orchestrator::new(MockTransactor::new(), mapper, types)
    }

    #[tokio::test]
    async fn create_one_mapper_failure_renders_verb_default() {
        let types = Arc::new(TypeRegistry::new());
        let o = orch(
            Arc::clone(&types),
            MockMapper::failing(types, Fail::Plain("db exploded")),
        );
        let err = o
            .create_one(Actor::anonymous(), "post", json!({"a": 1}), UrlParams::new())
            .await
            .unwrap_err();
        let r = err.render();
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
        assert_eq!(r.msg, "error in creating resource");
        assert_eq!(r.error, "db exploded");
        // Failure rolled the transaction back.
        assert_eq!(*o.transactor.calls.lock().unwrap(), vec!["begin", "rollback"]);
    }

    #[tokio::test]
    async fn each_write_verb_wraps_in_its_own_default() {
        let cases: [(Verb, &str); 3] = [
            (Verb::Update, "error in updating resource"),
            (Verb::Patch, "error in patching resource"),
            (Verb::Delete, "error in deleting resource"),
        ];
        for (verb, msg) in cases {
            let types = Arc::new(TypeRegistry::new());
            let o = orch(
                Arc::clone(&types),
                MockMapper::failing(types, Fail::Plain("nope")),
            );
            let err = match verb {
                Verb::Update => o
                    .update_one(Actor::anonymous(), "post", "1", json!({}), UrlParams::new())
                    .await
                    .unwrap_err(),
                Verb::Patch => o
                    .patch_one(Actor::anonymous(), "post", "1", json!({}), UrlParams::new())
                    .await
                    .unwrap_err(),
                _ => o
                    .delete_one(Actor::anonymous(), "post", "1", UrlParams::new())
                    .await
                    .unwrap_err(),
            };
            assert_eq!(err.render().msg, msg);
        }
    }

    #[tokio::test]
    async fn mapper_custom_render_bypasses_verb_default() {
        let types = Arc::new(TypeRegistry::new());
        let o = orch(
            Arc::clone(&types),
            MockMapper::failing(types, Fail::Custom),
        );
        let err = o
            .create_one(Actor::anonymous(), "post", json!({}), UrlParams::new())
            .await
            .unwrap_err();
        let r = err.render();
        assert_eq!(r.status, StatusCode::CONFLICT);
        assert_eq!(r.code, 9009);
        assert_eq!(r.msg, "mapper says no");
    }

    #[tokio::test]
    async fn read_one_not_found_renders_404_not_internal() {
        let types = Arc::new(TypeRegistry::new());
        let o = orch(
            Arc::clone(&types),
            MockMapper::failing(types, Fail::NotFound),
        );
        let err = o
            .read_one(Actor::anonymous(), "post", "42", UrlParams::new())
            .await
            .unwrap_err();
        let r = err.render();
        assert_eq!(r.status, StatusCode::NOT_FOUND);
        assert_eq!(r.code, crate::error::code::NOT_FOUND);
        // Reads never open a transaction.
        assert!(o.transactor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_failure_other_than_not_found_is_internal() {
        let types = Arc::new(TypeRegistry::new());
        let o = orch(
            Arc::clone(&types),
            MockMapper::failing(types, Fail::Plain("connection dropped")),
        );
        let err = o
            .read_many(Actor::anonymous(), "post", UrlParams::new())
            .await
            .unwrap_err();
        assert_eq!(err.render().status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn writes_stamp_admin_role_per_instance() {
        let types = Arc::new(TypeRegistry::new());
        let models = vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})];
        let o = orch(Arc::clone(&types), MockMapper::ok(types, models));
        let out = o
            .create_many(
                Actor::anonymous(),
                "post",
                vec![json!({}), json!({}), json!({})],
                UrlParams::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.payload.roles, vec![Role::Admin; 3]);
        assert_eq!(out.payload.models.len(), 3);
        assert_eq!(*o.transactor.calls.lock().unwrap(), vec!["begin", "commit"]);
    }

    #[tokio::test]
    async fn reads_use_mapper_roles_and_total() {
        let types = Arc::new(TypeRegistry::new());
        let mut mapper = MockMapper::ok(
            Arc::clone(&types),
            vec![json!({"id": 1}), json!({"id": 2})],
        );
        mapper.roles = Some(vec![Role::Member, Role::Guest]);
        mapper.total = Some(57);
        let o = orch(types, mapper);
        let out = o
            .read_many(Actor::anonymous(), "post", UrlParams::new())
            .await
            .unwrap();
        assert_eq!(out.payload.roles, vec![Role::Member, Role::Guest]);
        assert_eq!(out.total, Some(57));
    }

    #[tokio::test]
    async fn read_role_count_mismatch_is_an_internal_error() {
        let types = Arc::new(TypeRegistry::new());
        let mut mapper = MockMapper::ok(
            Arc::clone(&types),
            vec![json!({"id": 1}), json!({"id": 2})],
        );
        mapper.roles = Some(vec![Role::Member]);
        let o = orch(types, mapper);
        let err = o
            .read_many(Actor::anonymous(), "post", UrlParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Internal { .. }));
    }

    struct RecordingLegacy {
        calls: Mutex<Vec<(usize, Vec<Role>)>>,
    }

    impl LegacyAfterTransact for RecordingLegacy {
        fn after_transact_one(&self, _model: &Value, data: &LegacyHookData<'_>) {
            self.calls.lock().unwrap().push((1, data.roles.to_vec()));
        }

        fn after_transact_many(&self, models: &[Value], data: &LegacyHookData<'_>) {
            self.calls
                .lock()
                .unwrap()
                .push((models.len(), data.roles.to_vec()));
        }
    }

    #[tokio::test]
    async fn delete_many_without_controllers_invokes_legacy_batch_hook_once() {
        let legacy = Arc::new(RecordingLegacy {
            calls: Mutex::new(Vec::new()),
        });
        let mut types = TypeRegistry::new();
        types.set_legacy_hook("post", Arc::clone(&legacy) as Arc<dyn LegacyAfterTransact>);
        let types = Arc::new(types);
        let models = vec![json!({"id": 1}), json!({"id": 2})];
        let o = orch(Arc::clone(&types), MockMapper::ok(types, models));
        let out = o
            .delete_many(
                Actor::anonymous(),
                "post",
                vec![json!({"id": 1}), json!({"id": 2})],
                UrlParams::new(),
            )
            .await
            .unwrap();
        assert!(out.custom_body.is_none());
        let calls = legacy.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 2);
        assert_eq!(calls[0].1, vec![Role::Admin, Role::Admin]);
    }

    #[derive(Default)]
    struct StampController;

    impl Controller for StampController {
        fn after_transact(&mut self, data: &mut HookPayload) {
            data.cargo.payload = json!("stamped");
        }
    }

    struct ObserverController {
        seen: Arc<Mutex<Vec<Value>>>,
    }

    impl Controller for ObserverController {
        fn after_transact(&mut self, data: &mut HookPayload) {
            self.seen.lock().unwrap().push(data.cargo.payload.clone());
        }
    }

    #[tokio::test]
    async fn modern_hooks_run_in_registration_order_with_mutations_visible() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut types = TypeRegistry::new();
        {
            let reg = types.controllers_mut("post");
            reg.register::<StampController>("D", "T");
            let seen = Arc::clone(&seen);
            reg.register_factory("D", "T", move || {
                Box::new(ObserverController {
                    seen: Arc::clone(&seen),
                })
            });
        }
        // A legacy hook is also wired; the modern path must win.
        let legacy = Arc::new(RecordingLegacy {
            calls: Mutex::new(Vec::new()),
        });
        types.set_legacy_hook("post", Arc::clone(&legacy) as Arc<dyn LegacyAfterTransact>);
        let types = Arc::new(types);
        let o = orch(
            Arc::clone(&types),
            MockMapper::ok(types, vec![json!({"id": 1})]),
        );
        o.delete_one(Actor::anonymous(), "post", "1", UrlParams::new())
            .await
            .unwrap();
        // Second controller observed the first one's cargo mutation.
        assert_eq!(*seen.lock().unwrap(), vec![json!("stamped")]);
        assert!(legacy.calls.lock().unwrap().is_empty());
    }

    #[derive(Default)]
    struct RenderingController;

    impl Controller for RenderingController {
        fn render(&mut self, data: &HookPayload) -> Option<Value> {
            Some(json!({"custom": data.models.len()}))
        }
    }

    #[tokio::test]
    async fn render_hook_replaces_default_body() {
        let mut types = TypeRegistry::new();
        types
            .controllers_mut("post")
            .register::<RenderingController>("C", "T");
        let types = Arc::new(types);
        let o = orch(
            Arc::clone(&types),
            MockMapper::ok(types, vec![json!({"id": 1})]),
        );
        let out = o
            .create_one(Actor::anonymous(), "post", json!({}), UrlParams::new())
            .await
            .unwrap();
        assert_eq!(out.custom_body, Some(json!({"custom": 1})));
    }

    #[tokio::test]
    async fn commit_failure_surfaces_and_skips_hook_dispatch() {
        let legacy = Arc::new(RecordingLegacy {
            calls: Mutex::new(Vec::new()),
        });
        let mut types = TypeRegistry::new();
        types.set_legacy_hook("post", Arc::clone(&legacy) as Arc<dyn LegacyAfterTransact>);
        let types = Arc::new(types);
        let mapper = MockMapper::ok(Arc::clone(&types), vec![json!({"id": 1})]);
        let mut transactor = MockTransactor::new();
        transactor.fail_commit = true;
        let o = Orchestrator::new(transactor, mapper, types);
        let err = o
            .delete_one(Actor::anonymous(), "post", "1", UrlParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Commit { .. }));
        assert!(legacy.calls.lock().unwrap().is_empty());
    }

    struct RecordingLogger {
        calls: Arc<Mutex<Vec<(String, String, String)>>>,
    }

    impl OpLogger<()> for RecordingLogger {
        fn log(&self, _tx: Option<&mut ()>, method: &str, type_name: &str, arity: &str) {
            self.calls
                .lock()
                .unwrap()
                .push((method.into(), type_name.into(), arity.into()));
        }
    }

    #[tokio::test]
    async fn logger_receives_method_lowercased_type_and_arity() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let types = Arc::new(TypeRegistry::new());
        let o = orch(
            Arc::clone(&types),
            MockMapper::ok(Arc::clone(&types), vec![json!({"id": 1})]),
        )
        .with_logger(Box::new(RecordingLogger {
            calls: Arc::clone(&calls),
        }));
        o.create_one(Actor::anonymous(), "Widget", json!({}), UrlParams::new())
            .await
            .unwrap();
        o.read_many(Actor::anonymous(), "Widget", UrlParams::new())
            .await
            .unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], ("POST".into(), "widget".into(), "1".into()));
        assert_eq!(calls[1], ("GET".into(), "widget".into(), "n".into()));
    }
}
