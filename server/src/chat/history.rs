//! REST read-side for persisted chats: list, read, mark seen.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::auth::middleware::CurrentUser;
use crate::db::models::{ChatId, ChatSummary, Message, UserId};
use crate::db::ChatStore;
use crate::error::StoreError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SeenResponse {
    pub updated: usize,
}

/// Run a store call on the blocking pool. Only a failed task maps to 500 here;
/// store errors are handed back for the caller to translate.
pub(crate) async fn run_store<T, F>(
    state: &AppState,
    f: F,
) -> Result<Result<T, StoreError>, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&dyn ChatStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Store task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Like [`run_store`], with every store error mapped to 500.
pub(crate) async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&dyn ChatStore) -> Result<T, StoreError> + Send + 'static,
{
    run_store(state, f).await?.map_err(|e| {
        tracing::error!(error = %e, "Store call failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// 404 when the chat is missing, 403 when the caller is not one of its two users.
async fn authorize_chat(
    state: &AppState,
    chat_id: ChatId,
    user: UserId,
) -> Result<(), StatusCode> {
    let chat = blocking(state, move |store| store.get_chat(chat_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    if chat.includes(user) {
        Ok(())
    } else {
        tracing::warn!(user_id = %user, chat_id = %chat_id, "Chat access denied");
        Err(StatusCode::FORBIDDEN)
    }
}

/// GET /api/chats
pub async fn list_chats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ChatSummary>>, StatusCode> {
    let chats = blocking(&state, move |store| store.get_user_chats(user)).await?;
    Ok(Json(chats))
}

/// GET /api/chats/{chat_id}/messages
pub async fn chat_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(chat_id): Path<i64>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let chat_id = ChatId(chat_id);
    authorize_chat(&state, chat_id, user).await?;
    let messages = blocking(&state, move |store| store.get_chat_messages(chat_id)).await?;
    Ok(Json(messages))
}

/// POST /api/chats/{chat_id}/seen
/// Marks every message the peer sent in this chat as seen.
pub async fn mark_seen(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(chat_id): Path<i64>,
) -> Result<Json<SeenResponse>, StatusCode> {
    let chat_id = ChatId(chat_id);
    authorize_chat(&state, chat_id, user).await?;
    let updated = blocking(&state, move |store| store.mark_chat_seen(chat_id, user)).await?;

    tracing::debug!(user_id = %user, chat_id = %chat_id, updated, "Messages marked seen");
    Ok(Json(SeenResponse { updated }))
}
