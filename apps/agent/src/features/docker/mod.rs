pub mod list;
pub mod logs;
pub mod pull;
pub mod run;
pub mod stop;

use axum::routing::{get, post};
use axum::Router;

pub fn router() -> Router {
    Router::new()
        .route("/docker/run", post(run::run))
        .route("/docker/stop/:id", post(stop::stop))
        .route("/docker/remove/:id", post(stop::remove))
        .route("/docker/logs/:id", get(logs::logs))
        .route("/docker/list", get(list::list))
        .route("/docker/images", get(list::images))
        .route("/docker/pull", post(pull::pull))
        .route("/docker/login", post(pull::login))
}
