//! Achievement API endpoints
//!
//! ## Endpoints
//!
//! - `GET /api/v1/achievements` - List achievements visible to the caller
//! - `POST /api/v1/achievements` - Create a draft (students)
//! - `GET /api/v1/achievements/{id}` - Reference merged with content
//! - `PUT /api/v1/achievements/{id}` - Update draft/rejected content
//! - `DELETE /api/v1/achievements/{id}` - Soft delete a draft
//! - `POST /api/v1/achievements/{id}/submit` - Submit for verification
//! - `POST /api/v1/achievements/{id}/verify` - Verify with points (advisors)
//! - `POST /api/v1/achievements/{id}/reject` - Reject with a note (advisors)
//! - `GET /api/v1/achievements/{id}/history` - Status history
//! - `POST /api/v1/achievements/{id}/attachments` - Append attachment metadata
//! - `GET /api/v1/students/{id}/achievements` - One student's achievements
//! - `GET /api/v1/admin/reconciliation` - Recent reconciliation events (admins)
//!
//! ## Authentication
//!
//! Every endpoint requires a bearer JWT. The route permission is checked
//! before the engine runs; ownership and advisor checks happen in the engine.

use bytes::Bytes;
use hyper::{Method, Response, StatusCode};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    achievement_error_response, error_response, not_found_response, parse_body,
    success_response, tracker_error_response, FullBody,
};
use crate::achievement::model::{
    AddAttachments, CreateAchievement, RejectAchievement, UpdateAchievement, VerifyAchievement,
};
use crate::achievement::{AchievementError, ListScope};
use crate::auth::{extract_token_from_header, get_required_permission, Permission, Principal};
use crate::server::AppState;

/// Prefix for every versioned API route
pub const API_PREFIX: &str = "/api/v1/";

/// Handle a request below `/api/v1/`.
///
/// The body has already been read in full by the server.
pub async fn handle_api_request(
    state: &AppState,
    method: &Method,
    path: &str,
    auth_header: Option<&str>,
    body: Bytes,
) -> Response<FullBody> {
    let Some(rest) = path.strip_prefix(API_PREFIX) else {
        return not_found_response(path);
    };
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    let principal = match authenticate(state, auth_header) {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match segments.as_slice() {
        ["achievements", tail @ ..] => {
            let Some(permission) = get_required_permission(method, tail) else {
                return not_found_response(path);
            };
            if let Err(response) = require_permission(&principal, permission) {
                return response;
            }
            handle_achievement_route(state, &principal, method, tail, &body).await
        }
        ["students", student_id, "achievements"] if *method == Method::GET => {
            if let Err(response) = require_permission(&principal, Permission::Read) {
                return response;
            }
            let student_id = decode_segment(student_id);
            let result = state
                .engine
                .list_achievements(&principal, ListScope::Student(student_id))
                .await;
            respond(result, StatusCode::OK, "Achievements retrieved")
        }
        ["admin", "reconciliation"] if *method == Method::GET => {
            if !principal.is_admin() {
                warn!(principal_id = %principal.id, "Non-admin requested reconciliation events");
                return error_response(StatusCode::FORBIDDEN, "Admin role required", "forbidden");
            }
            let events = state.engine.reconciliation().recent().await;
            success_response(StatusCode::OK, "Reconciliation events retrieved", events)
        }
        _ => not_found_response(path),
    }
}

async fn handle_achievement_route(
    state: &AppState,
    principal: &Principal,
    method: &Method,
    tail: &[&str],
    body: &[u8],
) -> Response<FullBody> {
    let engine = &state.engine;

    match (method, tail) {
        (&Method::GET, []) => respond(
            engine.list_achievements(principal, ListScope::Default).await,
            StatusCode::OK,
            "Achievements retrieved",
        ),
        (&Method::POST, []) => {
            let input = match parse_body::<CreateAchievement>(body) {
                Ok(input) => input,
                Err(e) => return achievement_error_response(&e),
            };
            respond(
                engine.create_achievement(principal, input).await,
                StatusCode::CREATED,
                "Achievement created",
            )
        }
        (_, [id, tail @ ..]) => {
            let Some(id) = parse_id(id) else {
                debug!(id = %id, "Malformed achievement id");
                return achievement_error_response(&AchievementError::NotFound);
            };
            handle_reference_route(state, principal, method, id, tail, body).await
        }
        _ => error_response(StatusCode::NOT_FOUND, "Route not found", "not_found"),
    }
}

async fn handle_reference_route(
    state: &AppState,
    principal: &Principal,
    method: &Method,
    id: Uuid,
    tail: &[&str],
    body: &[u8],
) -> Response<FullBody> {
    let engine = &state.engine;

    match (method, tail) {
        (&Method::GET, []) => respond(
            engine.get_achievement_detail(principal, id).await,
            StatusCode::OK,
            "Achievement retrieved",
        ),
        (&Method::PUT, []) => match parse_body::<UpdateAchievement>(body) {
            Ok(input) => respond(
                engine.update_achievement(principal, id, input).await,
                StatusCode::OK,
                "Achievement updated",
            ),
            Err(e) => achievement_error_response(&e),
        },
        (&Method::DELETE, []) => respond(
            engine.delete_achievement(principal, id).await,
            StatusCode::OK,
            "Achievement deleted",
        ),
        (&Method::POST, ["submit"]) => respond(
            engine.submit_achievement(principal, id).await,
            StatusCode::OK,
            "Achievement submitted",
        ),
        (&Method::POST, ["verify"]) => match parse_body::<VerifyAchievement>(body) {
            Ok(input) => respond(
                engine.verify_achievement(principal, id, input).await,
                StatusCode::OK,
                "Achievement verified",
            ),
            Err(e) => achievement_error_response(&e),
        },
        (&Method::POST, ["reject"]) => match parse_body::<RejectAchievement>(body) {
            Ok(input) => respond(
                engine.reject_achievement(principal, id, input).await,
                StatusCode::OK,
                "Achievement rejected",
            ),
            Err(e) => achievement_error_response(&e),
        },
        (&Method::GET, ["history"]) => respond(
            engine.get_history(principal, id).await,
            StatusCode::OK,
            "History retrieved",
        ),
        (&Method::POST, ["attachments"]) => match parse_body::<AddAttachments>(body) {
            Ok(input) => respond(
                engine.add_attachments(principal, id, input).await,
                StatusCode::OK,
                "Attachments added",
            ),
            Err(e) => achievement_error_response(&e),
        },
        _ => error_response(StatusCode::NOT_FOUND, "Route not found", "not_found"),
    }
}

// =============================================================================
// Helpers
// =============================================================================

#[allow(clippy::result_large_err)]
fn authenticate(
    state: &AppState,
    auth_header: Option<&str>,
) -> Result<Principal, Response<FullBody>> {
    let Some(token) = extract_token_from_header(auth_header) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Missing authorization token",
            "unauthorized",
        ));
    };

    state.jwt.authenticate(token).map_err(|e| {
        debug!("Token rejected: {}", e);
        tracker_error_response(&e)
    })
}

#[allow(clippy::result_large_err)]
fn require_permission(principal: &Principal, permission: Permission) -> Result<(), Response<FullBody>> {
    if principal.has_permission(permission) {
        return Ok(());
    }
    warn!(
        principal_id = %principal.id,
        permission = permission.as_str(),
        "Missing route permission"
    );
    Err(error_response(
        StatusCode::FORBIDDEN,
        &format!("Missing permission {}", permission.as_str()),
        "forbidden",
    ))
}

fn respond<T: serde::Serialize>(
    result: Result<T, AchievementError>,
    status: StatusCode,
    message: &str,
) -> Response<FullBody> {
    match result {
        Ok(data) => success_response(status, message, data),
        Err(e) => achievement_error_response(&e),
    }
}

fn parse_id(segment: &str) -> Option<Uuid> {
    Uuid::parse_str(segment).ok()
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}
