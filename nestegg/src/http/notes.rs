//! `/apps/notes` handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use axum_extra::extract::{Form, WithRejection};
use tracing::{debug, info, warn};

use crate::notes::NoteError;
use crate::rate_limit::Endpoint;

use super::auth::SessionUser;
use super::error::ApiError;
use super::responses::{
    CreateNoteForm, DebugResponse, DebugUser, MessageResponse, NoteCreatedResponse,
    NotesResponse, SearchQuery, SearchResponse,
};
use super::retirement::enforce_limit;
use super::state::AppState;

pub async fn list_notes(State(state): State<AppState>, user: SessionUser) -> Json<NotesResponse> {
    let notes = state.notes.list(&user.username).await;
    debug!(user = %user.username, notes = notes.len(), "notes listed");
    Json(NotesResponse { notes })
}

pub async fn create_note(
    State(state): State<AppState>,
    user: SessionUser,
    WithRejection(Form(form), _): WithRejection<Form<CreateNoteForm>, ApiError>,
) -> Result<Json<NoteCreatedResponse>, ApiError> {
    enforce_limit(&state, &user, Endpoint::CreateNote)?;

    let note = state
        .notes
        .create(&user.username, &form.title, &form.content)
        .await
        .map_err(|err| {
            debug!(user = %user.username, error = %err, "note rejected");
            ApiError::from(err)
        })?;

    info!(user = %user.username, note_id = note.id, "note created");
    Ok(Json(NoteCreatedResponse {
        message: "Note created!",
        note,
    }))
}

pub async fn search_notes(
    State(state): State<AppState>,
    user: SessionUser,
    Query(params): Query<SearchQuery>,
) -> Json<SearchResponse> {
    let notes = state.notes.search(&user.username, &params.q).await;
    debug!(
        user = %user.username,
        query = %params.q,
        results = notes.len(),
        "notes searched"
    );
    Json(SearchResponse {
        query: params.q,
        notes,
    })
}

pub async fn delete_note(
    State(state): State<AppState>,
    user: SessionUser,
    WithRejection(Path(id), _): WithRejection<Path<u64>, ApiError>,
) -> Result<Json<MessageResponse>, ApiError> {
    match state.notes.delete(&user.username, id).await {
        Ok(note) => {
            info!(user = %user.username, note_id = note.id, "note deleted");
            Ok(Json(MessageResponse::new("Note deleted!")))
        }
        Err(err) => {
            if let NoteError::NotOwner { owner, .. } = &err {
                warn!(
                    target: "security",
                    user = %user.username,
                    note_id = id,
                    owner = %owner,
                    "attempted to delete another user's note"
                );
            }
            Err(ApiError::from(err))
        }
    }
}

/// Dumps every user's figures and every note. Admins only.
pub async fn debug_dump(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<DebugResponse>, ApiError> {
    if !state.auth.is_admin(&user.username) {
        warn!(target: "security", user = %user.username, "non-admin requested notes debug dump");
        return Err(ApiError::AdminOnly);
    }

    let usernames = state
        .auth
        .usernames()
        .map(String::from)
        .collect::<Vec<_>>();
    let mut users = Vec::with_capacity(usernames.len());
    for username in usernames {
        let account = state.accounts.snapshot(&username).await;
        users.push(DebugUser {
            admin: state.auth.is_admin(&username),
            username,
            funds: account.funds,
            retirement_balance: account.retirement_balance,
        });
    }
    let notes = state.notes.all().await;

    info!(user = %user.username, users = users.len(), notes = notes.len(), "notes debug dump served");
    Ok(Json(DebugResponse { users, notes }))
}
