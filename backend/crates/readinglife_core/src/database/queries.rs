use crate::database::types::{NewPost, PostChanges, PostRecord, PostRow, StoreError};
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction, sqlite::SqliteConnectOptions};
use std::path::Path;

pub struct Db {
    pool: SqlitePool,
}

/// A row mutation that has been executed inside an open transaction but not yet committed.
///
/// The server performs the matching filesystem step (deleting an image) between executing the
/// mutation and committing it. If that step fails the write is rolled back, so the row and the
/// image directory never disagree. Dropping a `PendingWrite` without committing rolls it back.
#[must_use = "a pending write is rolled back unless committed"]
pub struct PendingWrite {
    tx: Transaction<'static, Sqlite>,
    rows_affected: u64,
}

impl PendingWrite {
    /// Rows changed by the mutation. Zero means the row vanished after it was looked up.
    #[inline]
    pub const fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl Db {
    /// Open (or create) the SQLite database at `path` and bring its schema up to date.
    /// # Errors
    /// Fails if the file cannot be opened or a migration fails to apply.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn init(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .foreign_keys(true)
            .create_if_missing(true)
            .filename(path);
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!().run(&pool).await?;
        log::info!("Opened database at {}", path.display());

        Ok(Self { pool })
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at end of program"
    )]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// All posts, most recently created first. Comments are in append order.
    /// # Errors
    /// Fails on a database error or if a stored comment is not valid JSON.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Large function, called once per request"
    )]
    pub async fn fetch_posts(&self) -> Result<Vec<PostRecord>, StoreError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            "WITH comments_info AS (
                SELECT
                    post,
                    Json_group_array(body ORDER BY id) AS comments
                FROM
                    comments
                GROUP BY
                    post
            )
            SELECT
                posts.id,
                name,
                author,
                category,
                review,
                img_path,
                CASE WHEN comments_info.comments IS NULL THEN '[]'
                    ELSE comments_info.comments END AS comments
            FROM
                posts
                LEFT JOIN comments_info ON comments_info.post = posts.id
            ORDER BY
                posts.id DESC;
        ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PostRecord::try_from).collect()
    }

    /// The first post carrying exactly this name, i.e. the one with the lowest id. Names are
    /// not unique, so this is a best-effort lookup.
    /// # Errors
    /// Fails on a database error or if a stored comment is not valid JSON.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Large function, called once per request"
    )]
    pub async fn fetch_post_by_name(&self, name: &str) -> Result<Option<PostRecord>, StoreError> {
        let row: Option<PostRow> = sqlx::query_as(
            "WITH target AS (
                SELECT id FROM posts WHERE name = ? ORDER BY id ASC LIMIT 1
            ),
            comments_info AS (
                SELECT
                    post,
                    Json_group_array(body ORDER BY id) AS comments
                FROM
                    comments
                WHERE
                    post IN (SELECT id FROM target)
                GROUP BY
                    post
            )
            SELECT
                posts.id,
                name,
                author,
                category,
                review,
                img_path,
                CASE WHEN comments_info.comments IS NULL THEN '[]'
                    ELSE comments_info.comments END AS comments
            FROM
                posts
                JOIN target ON target.id = posts.id
                LEFT JOIN comments_info ON comments_info.post = posts.id;
        ",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PostRecord::try_from).transpose()
    }

    /// Insert a post and return its id.
    /// # Errors
    /// Fails if the store rejects the row, e.g. because a required field is missing.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub async fn insert_post(&self, post: &NewPost) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO posts (name, author, category, review, img_path)
            VALUES (?, ?, ?, ?, ?)
                RETURNING id;
        "#,
        )
        .bind(&post.name)
        .bind(&post.author)
        .bind(&post.category)
        .bind(&post.review)
        .bind(&post.img_path)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Overwrite every mutable column of post `id`. The change stays pending until committed.
    /// # Errors
    /// Fails if the transaction cannot be opened or the update is rejected.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub async fn update_post(
        &self,
        id: i64,
        changes: &PostChanges,
    ) -> Result<PendingWrite, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET name = ?, author = ?, category = ?, review = ?, img_path = ?
            WHERE id = ?;
        "#,
        )
        .bind(&changes.name)
        .bind(&changes.author)
        .bind(&changes.category)
        .bind(&changes.review)
        .bind(&changes.img_path)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        Ok(PendingWrite {
            tx,
            rows_affected: result.rows_affected(),
        })
    }

    /// Delete post `id` together with its comments. The change stays pending until committed.
    /// # Errors
    /// Fails if the transaction cannot be opened or the delete is rejected.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub async fn delete_post(&self, id: i64) -> Result<PendingWrite, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM posts WHERE id = ?;")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        Ok(PendingWrite {
            tx,
            rows_affected: result.rows_affected(),
        })
    }

    /// Append a comment to post `post_id`. Any JSON value is accepted.
    /// # Errors
    /// Fails on a database error, including when the post no longer exists.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub async fn insert_comment(&self, post_id: i64, comment: &Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO comments (post, body) VALUES (?, ?);")
            .bind(post_id)
            .bind(comment.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::types::PostFields;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_db() -> (TempDir, Db) {
        let dir = TempDir::new().unwrap();
        let db = Db::init(&dir.path().join("test.db")).await.unwrap();
        (dir, db)
    }

    fn fields(name: &str) -> PostFields {
        PostFields::new(
            Some(name.to_owned()),
            Some(String::from("Herbert")),
            Some(String::from("SciFi")),
            Some(String::from("Great")),
        )
    }

    async fn insert(db: &Db, name: &str) -> i64 {
        let post = NewPost::new(fields(name), format!("/src/imgs/{name}.jpg"));
        db.insert_post(&post).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_fetch_by_name() {
        let (_dir, db) = open_db().await;
        let id = insert(&db, "Dune").await;

        let post = db.fetch_post_by_name("Dune").await.unwrap().unwrap();

        assert_eq!(
            post,
            PostRecord {
                id,
                name: String::from("Dune"),
                author: String::from("Herbert"),
                category: String::from("SciFi"),
                review: String::from("Great"),
                img_path: Some(String::from("/src/imgs/Dune.jpg")),
                comments: Vec::new(),
            }
        );
        assert!(db.fetch_post_by_name("Arrakis").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_posts_newest_first() {
        let (_dir, db) = open_db().await;
        for name in ["A", "B", "C"] {
            insert(&db, name).await;
        }

        let names: Vec<String> = db
            .fetch_posts()
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.name)
            .collect();

        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_duplicate_names_resolve_to_lowest_id() {
        let (_dir, db) = open_db().await;
        let first = insert(&db, "Dune").await;
        insert(&db, "Dune").await;

        let post = db.fetch_post_by_name("Dune").await.unwrap().unwrap();

        assert_eq!(post.id, first);
    }

    #[tokio::test]
    async fn test_missing_field_is_rejected() {
        let (_dir, db) = open_db().await;
        let post = NewPost::new(
            PostFields::new(Some(String::from("Dune")), None, None, None),
            String::from("/src/imgs/dune.jpg"),
        );

        let result = db.insert_post(&post).await;

        assert!(matches!(result, Err(StoreError::Db(_))));
        assert!(db.fetch_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comments_keep_append_order() {
        let (_dir, db) = open_db().await;
        let id = insert(&db, "Dune").await;
        insert(&db, "Emma").await;

        db.insert_comment(id, &json!("first")).await.unwrap();
        db.insert_comment(id, &json!({"text": "second"})).await.unwrap();

        let post = db.fetch_post_by_name("Dune").await.unwrap().unwrap();
        assert_eq!(post.comments, vec![json!("first"), json!({"text": "second"})]);

        let other = db.fetch_post_by_name("Emma").await.unwrap().unwrap();
        assert!(other.comments.is_empty());
    }

    #[tokio::test]
    async fn test_update_commit_and_rollback() {
        let (_dir, db) = open_db().await;
        let id = insert(&db, "Dune").await;
        let current = db.fetch_post_by_name("Dune").await.unwrap().unwrap();

        let rolled_back = PostChanges::merge(
            &current,
            PostFields::new(None, Some(String::from("Nobody")), None, None),
            None,
        );
        let pending = db.update_post(id, &rolled_back).await.unwrap();
        assert_eq!(pending.rows_affected(), 1);
        pending.rollback().await.unwrap();
        let post = db.fetch_post_by_name("Dune").await.unwrap().unwrap();
        assert_eq!(post.author, "Herbert");

        let committed = PostChanges::merge(
            &current,
            PostFields::new(Some(String::from("Dune Messiah")), None, None, None),
            None,
        );
        db.update_post(id, &committed)
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert!(db.fetch_post_by_name("Dune").await.unwrap().is_none());
        let renamed = db.fetch_post_by_name("Dune Messiah").await.unwrap().unwrap();
        assert_eq!(renamed.id, id);
    }

    #[tokio::test]
    async fn test_delete_removes_comments() {
        let (_dir, db) = open_db().await;
        let id = insert(&db, "Dune").await;
        db.insert_comment(id, &json!("first")).await.unwrap();

        let pending = db.delete_post(id).await.unwrap();
        assert_eq!(pending.rows_affected(), 1);
        pending.commit().await.unwrap();

        assert!(db.fetch_posts().await.unwrap().is_empty());
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_dropped_delete_is_rolled_back() {
        let (_dir, db) = open_db().await;
        let id = insert(&db, "Dune").await;

        drop(db.delete_post(id).await.unwrap());

        assert!(db.fetch_post_by_name("Dune").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_writes_to_vanished_post_affect_nothing() {
        let (_dir, db) = open_db().await;
        let id = insert(&db, "Dune").await;
        let current = db.fetch_post_by_name("Dune").await.unwrap().unwrap();
        db.delete_post(id).await.unwrap().commit().await.unwrap();

        let changes = PostChanges::merge(&current, PostFields::default(), None);
        let update = db.update_post(id, &changes).await.unwrap();
        assert_eq!(update.rows_affected(), 0);
        update.rollback().await.unwrap();

        let delete = db.delete_post(id).await.unwrap();
        assert_eq!(delete.rows_affected(), 0);
        delete.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_comment_is_reported() {
        let (_dir, db) = open_db().await;
        let id = insert(&db, "Dune").await;
        sqlx::query("INSERT INTO comments (post, body) VALUES (?, '{broken')")
            .bind(id)
            .execute(&db.pool)
            .await
            .unwrap();

        let result = db.fetch_post_by_name("Dune").await;

        assert!(matches!(
            result,
            Err(StoreError::MalformedComment { index: 0, .. })
        ));
    }
}
