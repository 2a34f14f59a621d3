//! Data-mapper contract: the external collaborator performing persistence.
//!
//! One method per (verb, cardinality). Write and delete methods receive the
//! open transaction handle; read methods receive the ambient pool directly
//! (no write isolation needed).

use crate::error::{LifecycleError, Rendered};
use crate::hook::Cargo;
use crate::op::UrlParams;
use crate::registry::Fetcher;
use crate::role::{Actor, Role};
use crate::tx::Transactor;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Request context handed to every mapper call. The cargo slot is mutable so
/// the mapper's Before-stage hooks can pass data forward to later stages.
pub struct MapperContext<'a> {
    pub actor: &'a Actor,
    pub type_name: &'a str,
    pub url_params: &'a UrlParams,
    pub cargo: &'a mut Cargo,
}

/// Successful mapper result.
pub struct MapperOutcome {
    /// Resulting model instances, in operation order.
    pub models: Vec<Value>,
    /// Per-instance access roles; reads only. Writes ignore this and stamp
    /// Admin per instance.
    pub roles: Option<Vec<Role>>,
    /// Total matching count; read-many only.
    pub total: Option<u64>,
    /// Controller resolution for this model type.
    pub fetcher: Box<dyn Fetcher>,
}

impl MapperOutcome {
    pub fn new(models: Vec<Value>, fetcher: Box<dyn Fetcher>) -> Self {
        MapperOutcome {
            models,
            roles: None,
            total: None,
            fetcher,
        }
    }
}

/// Mapper failure. `Rendered` carries a mapper-supplied custom render that
/// bypasses the verb-default wrapping.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Other(String),
    #[error("{}", .0.msg)]
    Rendered(Rendered),
}

impl MapperError {
    /// Custom renders and read not-found keep their own mapping; everything
    /// else wraps in the supplied verb default.
    pub(crate) fn into_lifecycle<F>(self, default: F) -> LifecycleError
    where
        F: FnOnce(String) -> LifecycleError,
    {
        match self {
            MapperError::Rendered(r) => LifecycleError::Custom(r),
            other => default(other.to_string()),
        }
    }
}

/// Persistence operations, one per (verb, cardinality).
#[async_trait]
pub trait DataMapper<T: Transactor>: Send + Sync {
    async fn create_one(
        &self,
        tx: &mut T::Tx,
        ctx: &mut MapperContext<'_>,
        body: Value,
    ) -> Result<MapperOutcome, MapperError>;

    async fn create_many(
        &self,
        tx: &mut T::Tx,
        ctx: &mut MapperContext<'_>,
        bodies: Vec<Value>,
    ) -> Result<MapperOutcome, MapperError>;

    async fn read_one(
        &self,
        db: &T,
        ctx: &mut MapperContext<'_>,
        id: &str,
    ) -> Result<MapperOutcome, MapperError>;

    async fn read_many(
        &self,
        db: &T,
        ctx: &mut MapperContext<'_>,
    ) -> Result<MapperOutcome, MapperError>;

    async fn update_one(
        &self,
        tx: &mut T::Tx,
        ctx: &mut MapperContext<'_>,
        id: &str,
        body: Value,
    ) -> Result<MapperOutcome, MapperError>;

    async fn update_many(
        &self,
        tx: &mut T::Tx,
        ctx: &mut MapperContext<'_>,
        bodies: Vec<Value>,
    ) -> Result<MapperOutcome, MapperError>;

    async fn patch_one(
        &self,
        tx: &mut T::Tx,
        ctx: &mut MapperContext<'_>,
        id: &str,
        patch: Value,
    ) -> Result<MapperOutcome, MapperError>;

    async fn patch_many(
        &self,
        tx: &mut T::Tx,
        ctx: &mut MapperContext<'_>,
        patches: Vec<Value>,
    ) -> Result<MapperOutcome, MapperError>;

    async fn delete_one(
        &self,
        tx: &mut T::Tx,
        ctx: &mut MapperContext<'_>,
        id: &str,
    ) -> Result<MapperOutcome, MapperError>;

    async fn delete_many(
        &self,
        tx: &mut T::Tx,
        ctx: &mut MapperContext<'_>,
        bodies: Vec<Value>,
    ) -> Result<MapperOutcome, MapperError>;
}
