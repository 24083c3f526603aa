use actix_web::http::header;
use actix_web::HttpResponse;

/// CORS preflight for clients outside the permissive CORS middleware.
pub async fn handler() -> HttpResponse {
    HttpResponse::NoContent()
        .append_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
        .append_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
        .finish()
}
