use actix_web::{web, HttpResponse};

use crate::state::AppState;

pub async fn handler(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let session_id = path.into_inner();
    let removed = state.context.clear_context(&session_id);
    log::info!("[{}] Context cleared ({} entries)", session_id, removed);
    HttpResponse::NoContent().finish()
}
