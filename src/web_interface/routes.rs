//! API route filters and handlers.
//!
//! Endpoint shapes mirror the JSON envelope used by the dashboard:
//! `{success, ...}` on success, `{success: false, message}` on failure.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use warp::http::{HeaderMap, Method, StatusCode};
use warp::path::Tail;
use warp::{reply, Filter, Rejection, Reply};

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{CallbackFilter, NewRoute, RouteUpdate};
use crate::web_interface::capture;
use crate::web_interface::types::{
    ApiMessage, CallbackListResponse, CallbacksQuery, CaptureAck, CreateRoutePayload,
    DataResponse, MessageDataResponse, UpdateRoutePayload,
};

fn with_storage(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (Arc<dyn Storage>,), Error = Infallible> + Clone {
    warp::any().map(move || storage.clone())
}

fn message(success: bool, text: &str, code: StatusCode) -> reply::WithStatus<reply::Json> {
    reply::with_status(
        reply::json(&ApiMessage {
            success,
            message: text.to_string(),
        }),
        code,
    )
}

fn storage_failure(e: StorageError, context: &str) -> reply::WithStatus<reply::Json> {
    message(
        false,
        &format!("{}: {}", context, e),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

/// ANY /callback/<path> — capture endpoint, open to any caller.
pub fn capture_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("callback")
        .and(warp::path::tail())
        .and(warp::method())
        .and(warp::header::headers_cloned())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::body::bytes())
        .and(warp::addr::remote())
        .and(with_storage(storage))
        .and_then(handle_capture)
}

async fn handle_capture(
    tail: Tail,
    method: Method,
    headers: HeaderMap,
    query: HashMap<String, String>,
    body: Bytes,
    remote: Option<SocketAddr>,
    storage: Arc<dyn Storage>,
) -> Result<impl Reply, Rejection> {
    let draft = capture::draft_from_parts(&method, tail.as_str(), &headers, query, &body, remote);
    match storage.save_callback(draft).await {
        Ok(saved) => Ok(reply::with_status(
            reply::json(&CaptureAck {
                success: true,
                message: "Callback received and logged".to_string(),
                id: saved.id,
            }),
            StatusCode::OK,
        )),
        Err(e) => Ok(storage_failure(e, "Error processing callback")),
    }
}

/// All management endpoints under `/api`.
pub fn api(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    // `dates` must match before the id parameter
    callbacks_dates(storage.clone())
        .or(callbacks_list(storage.clone()))
        .or(callbacks_get(storage.clone()))
        .or(callbacks_delete(storage.clone()))
        .or(routes_create(storage.clone()))
        .or(routes_list(storage.clone()))
        .or(routes_update(storage.clone()))
        .or(routes_delete(storage))
}

fn callbacks_list(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "callbacks")
        .and(warp::get())
        .and(warp::query::<CallbacksQuery>())
        .and(with_storage(storage))
        .and_then(handle_callbacks_list)
}

async fn handle_callbacks_list(
    query: CallbacksQuery,
    storage: Arc<dyn Storage>,
) -> Result<impl Reply, Rejection> {
    let date = match query.date.as_deref().filter(|d| !d.is_empty()) {
        None => None,
        Some(text) => match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                return Ok(message(
                    false,
                    "Invalid date, expected YYYY-MM-DD",
                    StatusCode::BAD_REQUEST,
                ))
            }
        },
    };

    let filter = CallbackFilter {
        route: query.route.filter(|r| !r.is_empty()),
        date,
        limit: query.limit,
        offset: query.offset,
        ..Default::default()
    };

    match storage.get_callbacks(filter).await {
        Ok(page) => Ok(reply::with_status(
            reply::json(&CallbackListResponse {
                success: true,
                page,
            }),
            StatusCode::OK,
        )),
        Err(e) => Ok(storage_failure(e, "Error retrieving callbacks")),
    }
}

fn callbacks_dates(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "callbacks" / "dates")
        .and(warp::get())
        .and(with_storage(storage))
        .and_then(handle_callbacks_dates)
}

async fn handle_callbacks_dates(storage: Arc<dyn Storage>) -> Result<impl Reply, Rejection> {
    match storage.get_callback_dates().await {
        Ok(dates) => Ok(reply::with_status(
            reply::json(&DataResponse {
                success: true,
                data: dates,
            }),
            StatusCode::OK,
        )),
        Err(e) => Ok(storage_failure(e, "Error retrieving callback dates")),
    }
}

fn callbacks_get(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "callbacks" / String)
        .and(warp::get())
        .and(with_storage(storage))
        .and_then(handle_callbacks_get)
}

async fn handle_callbacks_get(
    id: String,
    storage: Arc<dyn Storage>,
) -> Result<impl Reply, Rejection> {
    match storage.get_callback_by_id(&id).await {
        Ok(Some(callback)) => Ok(reply::with_status(
            reply::json(&DataResponse {
                success: true,
                data: callback,
            }),
            StatusCode::OK,
        )),
        Ok(None) => Ok(message(false, "Callback not found", StatusCode::NOT_FOUND)),
        Err(e) => Ok(storage_failure(e, "Error retrieving callback")),
    }
}

fn callbacks_delete(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "callbacks" / String)
        .and(warp::delete())
        .and(with_storage(storage))
        .and_then(handle_callbacks_delete)
}

async fn handle_callbacks_delete(
    id: String,
    storage: Arc<dyn Storage>,
) -> Result<impl Reply, Rejection> {
    match storage.delete_callback(&id).await {
        Ok(true) => Ok(message(
            true,
            "Callback deleted successfully",
            StatusCode::OK,
        )),
        Ok(false) => Ok(message(false, "Callback not found", StatusCode::NOT_FOUND)),
        Err(e) => Ok(storage_failure(e, "Error deleting callback")),
    }
}

fn routes_create(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "routes")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_storage(storage))
        .and_then(handle_routes_create)
}

async fn handle_routes_create(
    payload: CreateRoutePayload,
    storage: Arc<dyn Storage>,
) -> Result<impl Reply, Rejection> {
    let path = payload.path.unwrap_or_default();
    let name = payload.name.unwrap_or_default();
    if path.is_empty() || name.is_empty() {
        return Ok(message(
            false,
            "Path and name are required",
            StatusCode::BAD_REQUEST,
        ));
    }
    if !path.starts_with('/') {
        return Ok(message(
            false,
            "Path must start with /",
            StatusCode::BAD_REQUEST,
        ));
    }

    match storage
        .save_route(NewRoute {
            path,
            name,
            description: payload.description,
        })
        .await
    {
        Ok(route) => Ok(reply::with_status(
            reply::json(&MessageDataResponse {
                success: true,
                message: "Route created successfully".to_string(),
                data: route,
            }),
            StatusCode::CREATED,
        )),
        Err(StorageError::DuplicatePath) => Ok(message(
            false,
            "Route path already exists",
            StatusCode::CONFLICT,
        )),
        Err(e) => Ok(storage_failure(e, "Error creating route")),
    }
}

fn routes_list(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "routes")
        .and(warp::get())
        .and(with_storage(storage))
        .and_then(handle_routes_list)
}

async fn handle_routes_list(storage: Arc<dyn Storage>) -> Result<impl Reply, Rejection> {
    match storage.get_routes().await {
        Ok(routes) => Ok(reply::with_status(
            reply::json(&DataResponse {
                success: true,
                data: routes,
            }),
            StatusCode::OK,
        )),
        Err(e) => Ok(storage_failure(e, "Error retrieving routes")),
    }
}

fn routes_update(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "routes" / String)
        .and(warp::put())
        .and(warp::body::json())
        .and(with_storage(storage))
        .and_then(handle_routes_update)
}

async fn handle_routes_update(
    id: String,
    payload: UpdateRoutePayload,
    storage: Arc<dyn Storage>,
) -> Result<impl Reply, Rejection> {
    if let Some(ref path) = payload.path {
        if !path.starts_with('/') {
            return Ok(message(
                false,
                "Path must start with /",
                StatusCode::BAD_REQUEST,
            ));
        }
    }

    let update = RouteUpdate {
        path: payload.path,
        name: payload.name,
        description: payload.description,
    };

    match storage.update_route(&id, update).await {
        Ok(Some(route)) => Ok(reply::with_status(
            reply::json(&MessageDataResponse {
                success: true,
                message: "Route updated successfully".to_string(),
                data: route,
            }),
            StatusCode::OK,
        )),
        Ok(None) => Ok(message(false, "Route not found", StatusCode::NOT_FOUND)),
        Err(StorageError::DuplicatePath) => Ok(message(
            false,
            "Route path already exists",
            StatusCode::CONFLICT,
        )),
        Err(e) => Ok(storage_failure(e, "Error updating route")),
    }
}

fn routes_delete(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "routes" / String)
        .and(warp::delete())
        .and(with_storage(storage))
        .and_then(handle_routes_delete)
}

async fn handle_routes_delete(
    id: String,
    storage: Arc<dyn Storage>,
) -> Result<impl Reply, Rejection> {
    match storage.delete_route(&id).await {
        Ok(true) => Ok(message(true, "Route deleted successfully", StatusCode::OK)),
        Ok(false) => Ok(message(false, "Route not found", StatusCode::NOT_FOUND)),
        Err(e) => Ok(storage_failure(e, "Error deleting route")),
    }
}
