//! Request handlers
//!
//! Each handler performs one read-then-write sequence against the record store, plus the image
//! directory where needed. Requests on the same post are not isolated from each other: two
//! concurrent writes to one post resolve as last-write-wins.
//!
//! Image files and rows share no transaction, so file changes are ordered around a pending row
//! write: the row mutation is executed but held open, the file operation runs, and only then is
//! the row committed. A failed file operation rolls the row back.
use crate::errors::ApiError;
use crate::form::{IMAGE_FIELD, ImageField, PostForm};
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use readinglife_core::database::queries::PendingWrite;
use readinglife_core::database::types::{NewPost, PostChanges, PostRecord};
use readinglife_core::image_store::StoredImage;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

pub const UPDATED_MESSAGE: &str = "Successfully updated the book";
pub const DELETED_MESSAGE: &str = "Successfully deleted the book";
pub const CREATED_MESSAGE: &str = "Successfully saved to the database";
pub const COMMENTED_MESSAGE: &str = "Successfully added the comment";

/// Body of `POST /comment/{book_name}`. A missing `comment` is stored as `null`.
#[derive(Debug, Default, Deserialize)]
pub struct CommentPayload {
    #[serde(default)]
    pub comment: Value,
}

/// `GET /`: every post, newest first, with public image URLs.
#[instrument(name = "posts.list", skip(state))]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PostRecord>>, ApiError> {
    let posts = state.db.fetch_posts().await?;
    tracing::debug!(count = posts.len(), "fetched posts");

    Ok(Json(
        posts
            .into_iter()
            .map(|post| state.with_public_url(post))
            .collect(),
    ))
}

/// `GET /{book_name}`: the first post with that name, comments newest first.
#[instrument(name = "posts.get", skip(state))]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(book_name): Path<String>,
) -> Result<Json<PostRecord>, ApiError> {
    let mut post = find_post(&state, &book_name).await?;
    post.comments.reverse();

    Ok(Json(state.with_public_url(post)))
}

/// `PUT /{book_name}`: merge the submitted fields over the stored post and optionally replace its
/// image. The old image is deleted before the row change is committed.
#[instrument(name = "posts.update", skip(state, multipart))]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
pub async fn update_post(
    State(state): State<Arc<AppState>>,
    Path(book_name): Path<String>,
    multipart: Multipart,
) -> Result<&'static str, ApiError> {
    let form = PostForm::from_multipart(multipart, ImageField::Any).await?;
    let current = find_post(&state, &book_name).await?;

    let new_image = match form.image {
        Some(upload) => Some(
            state
                .images
                .store(&upload.file_name, &upload.data)
                .await
                .map_err(ApiError::ImageUpload)?,
        ),
        None => None,
    };

    let changes = PostChanges::merge(
        &current,
        form.fields,
        new_image.as_ref().map(|image| image.img_path.clone()),
    );

    let pending = match state.db.update_post(current.id, &changes).await {
        Ok(pending) => pending,
        Err(error) => {
            discard_image(&state, new_image.as_ref()).await;
            return Err(error.into());
        }
    };
    if pending.rows_affected() == 0 {
        // Deleted by a concurrent request since the lookup
        abandon(pending).await;
        discard_image(&state, new_image.as_ref()).await;
        return Err(ApiError::BookNotFound);
    }

    if let Some(image) = &new_image {
        let replaced = current
            .img_path
            .as_deref()
            .filter(|old_path| *old_path != image.img_path);
        if let Some(old_path) = replaced {
            if let Err(error) = state.images.delete(old_path).await {
                abandon(pending).await;
                discard_image(&state, Some(image)).await;
                return Err(ApiError::OldImageDeletion(error));
            }
        }
    }

    if let Err(error) = pending.commit().await {
        discard_image(&state, new_image.as_ref()).await;
        return Err(error.into());
    }

    tracing::info!(id = current.id, name = %changes.name, "updated post");
    Ok(UPDATED_MESSAGE)
}

/// `DELETE /{book_name}`: remove the post and its image. The row is only removed once the image
/// file is gone.
#[instrument(name = "posts.delete", skip(state))]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Path(book_name): Path<String>,
) -> Result<&'static str, ApiError> {
    let current = find_post(&state, &book_name).await?;
    let pending = state.db.delete_post(current.id).await?;
    if pending.rows_affected() == 0 {
        abandon(pending).await;
        return Err(ApiError::BookNotFound);
    }

    if let Some(img_path) = current.img_path.as_deref() {
        if let Err(error) = state.images.delete(img_path).await {
            abandon(pending).await;
            return Err(ApiError::ImageDeletion(error));
        }
    }

    pending.commit().await?;

    tracing::info!(id = current.id, "deleted post");
    Ok(DELETED_MESSAGE)
}

/// `POST /create`: store the uploaded image and insert a new post pointing at it.
#[instrument(name = "posts.create", skip(state, multipart))]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<&'static str, ApiError> {
    let form = PostForm::from_multipart(multipart, ImageField::Named(IMAGE_FIELD)).await?;
    let upload = form.image.ok_or(ApiError::MissingImage)?;

    let image = state
        .images
        .store(&upload.file_name, &upload.data)
        .await
        .map_err(ApiError::ImageUpload)?;

    let post = NewPost::new(form.fields, image.img_path.clone());
    match state.db.insert_post(&post).await {
        Ok(id) => {
            tracing::info!(id, file = %image.file_name, "created post");
            Ok(CREATED_MESSAGE)
        }
        Err(error) => {
            discard_image(&state, Some(&image)).await;
            Err(error.into())
        }
    }
}

/// `POST /comment/{book_name}`: append a comment of any JSON shape. A body that is not declared
/// as JSON, or is empty, counts as `{}`. The name is resolved before the body is looked at.
#[instrument(name = "posts.comment", skip(state, headers, body))]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(book_name): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<&'static str, ApiError> {
    let current = find_post(&state, &book_name).await?;
    let payload = parse_comment(&headers, &body?)?;
    state.db.insert_comment(current.id, &payload.comment).await?;

    tracing::info!(id = current.id, "added comment");
    Ok(COMMENTED_MESSAGE)
}

fn parse_comment(headers: &HeaderMap, body: &[u8]) -> Result<CommentPayload, ApiError> {
    if !is_json(headers) || body.trim_ascii().is_empty() {
        return Ok(CommentPayload::default());
    }
    serde_json::from_slice(body).map_err(ApiError::Json)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .is_some_and(|essence| {
            essence.eq_ignore_ascii_case("application/json")
                || essence.to_ascii_lowercase().ends_with("+json")
        })
}

async fn find_post(state: &AppState, book_name: &str) -> Result<PostRecord, ApiError> {
    state
        .db
        .fetch_post_by_name(book_name)
        .await?
        .ok_or(ApiError::BookNotFound)
}

/// Roll back a pending row write after a failed file operation.
async fn abandon(pending: PendingWrite) {
    if let Err(error) = pending.rollback().await {
        tracing::warn!("Failed to roll back pending write: {error}");
    }
}

/// Remove an image written earlier in a request that did not go through.
async fn discard_image(state: &AppState, image: Option<&StoredImage>) {
    let Some(image) = image else {
        return;
    };
    if let Err(error) = state.images.delete(&image.img_path).await {
        tracing::warn!(file = %image.file_name, "Failed to remove orphaned image: {error}");
    }
}
