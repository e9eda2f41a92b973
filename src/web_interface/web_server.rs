use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use rust_embed::RustEmbed;
use warp::http::StatusCode;
use warp::{reply, Filter, Rejection, Reply};

use crate::error_handling::types::WebError;
use crate::storage::storage_trait::Storage;
use crate::web_interface::ip_guard::{self, Forbidden};
use crate::web_interface::routes;

/// Dashboard assets compiled into the binary.
#[derive(RustEmbed)]
#[folder = "assets/"]
struct Assets;

/// Web server for the capture endpoint, the management API and the
/// dashboard.
pub struct WebServer {
    storage: Arc<dyn Storage>,
    allowed_ips: Arc<Vec<String>>,
}

impl WebServer {
    /// Create a new WebServer instance.
    pub fn new(storage: Arc<dyn Storage>, allowed_ips: Vec<String>) -> Self {
        Self {
            storage,
            allowed_ips: Arc::new(allowed_ips),
        }
    }

    /// Start the web server on the given port.
    pub async fn start(&self, port: u16) -> Result<(), WebError> {
        Self::serve(self.storage.clone(), self.allowed_ips.clone(), port).await
    }

    /// Build the filters from owned handles and run the server. Taking
    /// owned `Arc`s (rather than borrowing `&self`) keeps the returned
    /// future `'static` and `Send` so it can be driven from a spawned task.
    async fn serve(
        storage: Arc<dyn Storage>,
        allowed_ips: Arc<Vec<String>>,
        port: u16,
    ) -> Result<(), WebError> {
        let guard = ip_guard::require_allowed(allowed_ips);

        // GET / -> dashboard
        let dashboard = warp::path::end()
            .and(warp::get())
            .map(|| serve_asset("index.html"));

        // GET /assets/<file> -> embedded static files
        let assets = warp::path("assets")
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::get())
            .map(|file: String| serve_asset(&file));

        // Capture stays open; everything else sits behind the allow-list
        let filters = routes::capture_route(storage.clone())
            .or(guard.clone().and(routes::api(storage.clone())))
            .or(guard.clone().and(dashboard))
            .or(guard.and(assets))
            .recover(handle_rejection)
            .boxed();

        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        info!("Web server listening on {}", addr);
        warp::serve(filters).run(addr).await;

        Ok(())
    }
}

fn serve_asset(path: &str) -> warp::reply::Response {
    match Assets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            reply::with_header(
                content.data.into_owned(),
                "Content-Type",
                mime.as_ref().to_string(),
            )
            .into_response()
        }
        None => reply::with_status(
            reply::json(&serde_json::json!({
                "error": "Not Found",
                "message": "The requested resource was not found"
            })),
            StatusCode::NOT_FOUND,
        )
        .into_response(),
    }
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, error, message) = if err.find::<Forbidden>().is_some() {
        (
            StatusCode::FORBIDDEN,
            "Forbidden",
            "Your IP address is not whitelisted",
        )
    } else if err.is_not_found() || err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::NOT_FOUND,
            "Not Found",
            "The requested resource was not found",
        )
    } else if err.find::<warp::reject::InvalidQuery>().is_some()
        || err.find::<warp::filters::body::BodyDeserializeError>().is_some()
    {
        (
            StatusCode::BAD_REQUEST,
            "Bad Request",
            "Malformed query string or request body",
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "Unexpected error",
        )
    };

    Ok(reply::with_status(
        reply::json(&serde_json::json!({"error": error, "message": message})),
        code,
    ))
}
