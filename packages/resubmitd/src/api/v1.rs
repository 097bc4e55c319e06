use axum::{Router, routing::get};

use crate::{api::State, guards::Guards};

pub mod echo;
pub mod health;
pub mod orders;
pub mod uploads;

/// Routes are matched exactly: `/api/v1/orders/` is a 404 and never reaches a
/// guard, even though fingerprints fold a trailing slash into the same
/// submission.
pub fn router(guards: &Guards) -> Router<State> {
    Router::new()
        .route("/health", get(health::handle))
        .nest("/orders", orders::router().route_layer(guards.standard()))
        .nest("/uploads", uploads::router().route_layer(guards.standard()))
        .nest("/echo", echo::router().route_layer(guards.brief()))
}
