//! REST contact list: who a user keeps track of, and when they were last seen.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::history::{blocking, run_store};
use crate::auth::middleware::CurrentUser;
use crate::db::models::{Contact, UserId};
use crate::error::StoreError;
use crate::state::AppState;

/// GET /api/contacts
pub async fn list_contacts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Contact>>, StatusCode> {
    let contacts = blocking(&state, move |store| store.get_user_contacts(user)).await?;
    Ok(Json(contacts))
}

/// POST /api/contacts/{user_id}
pub async fn add_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(target): Path<i64>,
) -> Result<(StatusCode, Json<Contact>), StatusCode> {
    let target = UserId(target);
    match run_store(&state, move |store| store.add_contact(user, target)).await? {
        Ok(contact) => {
            tracing::info!(user_id = %user, contact_id = %target, "Contact added");
            Ok((StatusCode::CREATED, Json(contact)))
        }
        Err(StoreError::SameUser(_)) => Err(StatusCode::BAD_REQUEST),
        Err(StoreError::UnknownUser(_)) => Err(StatusCode::NOT_FOUND),
        Err(StoreError::DuplicateContact(_)) => Err(StatusCode::CONFLICT),
        Err(e) => {
            tracing::error!(
                user_id = %user,
                contact_id = %target,
                error = %e,
                "Adding contact failed"
            );
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
