//! Entity CRUD routes.
//! Parameterized paths so Path extractors receive the type segment and id;
//! handlers resolve the model type by name through the orchestrator.

use crate::handlers::entity::{
    create, create_many, delete as delete_handler, delete_many, list, patch, patch_many, read,
    update, update_many,
};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:type_name", get(list).post(create))
        .route(
            "/:type_name/bulk",
            post(create_many)
                .put(update_many)
                .patch(patch_many)
                .delete(delete_many),
        )
        .route(
            "/:type_name/:id",
            get(read).put(update).patch(patch).delete(delete_handler),
        )
        .with_state(state)
}
