use serde::{Deserialize, Serialize};

use crate::storage::types::CallbackPage;

/// Generic success/failure message payload.
#[derive(Serialize)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

/// Acknowledgement returned to the webhook sender.
#[derive(Serialize)]
pub struct CaptureAck {
    pub success: bool,
    pub message: String,
    pub id: String,
}

#[derive(Serialize)]
pub struct DataResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Serialize)]
pub struct MessageDataResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

#[derive(Serialize)]
pub struct CallbackListResponse {
    pub success: bool,
    #[serde(flatten)]
    pub page: CallbackPage,
}

/// Query parameters accepted by `GET /api/callbacks`.
#[derive(Debug, Deserialize)]
pub struct CallbacksQuery {
    pub route: Option<String>,
    /// Calendar day, `YYYY-MM-DD`
    pub date: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoutePayload {
    pub path: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoutePayload {
    pub path: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}
