use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A book review post as returned to callers, with its comments decoded in append order.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq)]
pub struct PostRecord {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub category: String,
    pub review: String,
    pub img_path: Option<String>,
    pub comments: Vec<Value>,
}

/// Raw row of the posts query. Comments arrive as the JSON texts stored in the `comments` table
/// and are decoded separately so a corrupt entry yields a typed error instead of a driver error.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub category: String,
    pub review: String,
    pub img_path: Option<String>,
    #[sqlx(json)]
    pub comments: Vec<String>,
}

impl TryFrom<PostRow> for PostRecord {
    type Error = StoreError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let comments = row
            .comments
            .iter()
            .enumerate()
            .map(|(index, body)| {
                serde_json::from_str(body).map_err(|source| StoreError::MalformedComment {
                    post_id: row.id,
                    index,
                    source,
                })
            })
            .collect::<Result<Vec<Value>, StoreError>>()?;

        Ok(Self {
            id: row.id,
            name: row.name,
            author: row.author,
            category: row.category,
            review: row.review,
            img_path: row.img_path,
            comments,
        })
    }
}

/// Text fields of a post as submitted by a client. Any of them may be missing.
#[non_exhaustive]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PostFields {
    pub name: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub review: Option<String>,
}

impl PostFields {
    #[must_use]
    #[inline]
    pub const fn new(
        name: Option<String>,
        author: Option<String>,
        category: Option<String>,
        review: Option<String>,
    ) -> Self {
        Self {
            name,
            author,
            category,
            review,
        }
    }
}

/// A post about to be inserted. Missing fields are bound as NULL and left for the schema to
/// reject.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub name: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub review: Option<String>,
    pub img_path: String,
}

impl NewPost {
    #[must_use]
    #[inline]
    pub fn new(fields: PostFields, img_path: String) -> Self {
        Self {
            name: fields.name,
            author: fields.author,
            category: fields.category,
            review: fields.review,
            img_path,
        }
    }
}

/// The complete set of column values written by an update.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostChanges {
    pub name: String,
    pub author: String,
    pub category: String,
    pub review: String,
    pub img_path: Option<String>,
}

impl PostChanges {
    /// Merge submitted fields over the current record. A missing or empty field keeps the stored
    /// value, so no field can be cleared through an update. `new_img_path` replaces the stored
    /// image path only when a new image was uploaded.
    #[must_use]
    #[inline]
    pub fn merge(current: &PostRecord, submitted: PostFields, new_img_path: Option<String>) -> Self {
        Self {
            name: keep_unless_given(submitted.name, &current.name),
            author: keep_unless_given(submitted.author, &current.author),
            category: keep_unless_given(submitted.category, &current.category),
            review: keep_unless_given(submitted.review, &current.review),
            img_path: new_img_path.or_else(|| current.img_path.clone()),
        }
    }
}

fn keep_unless_given(submitted: Option<String>, current: &str) -> String {
    submitted
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| current.to_owned())
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("comment {index} of post {post_id} is not valid JSON: {source}")]
    MalformedComment {
        post_id: i64,
        index: usize,
        source: serde_json::Error,
    },
}
