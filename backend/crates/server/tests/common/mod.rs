//! Shared helpers for the HTTP tests: a server on an ephemeral port backed by scratch storage.
#![allow(dead_code, reason = "Not every test binary uses every helper")]

use readinglife_server::config::ServerConfig;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const COVER_BYTES: &[u8] = b"\x89PNG fake cover image";

pub struct TestServer {
    pub base_url: String,
    pub client: Client,
    pub image_dir: PathBuf,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
    _storage: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|config| config).await
    }

    /// Start a server whose configuration is adjusted by `configure` after the test defaults.
    pub async fn start_with(configure: impl FnOnce(ServerConfig) -> ServerConfig) -> Self {
        let storage = TempDir::new().unwrap();
        let image_dir = storage.path().join("src").join("imgs");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let config = configure(
            ServerConfig::default()
                .with_storage(storage.path().join("posts.db"), image_dir.clone())
                .with_backend_url(&base_url),
        );

        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(readinglife_server::serve(listener, config, async move {
            drop(signal.await);
        }));

        Self {
            base_url,
            client: Client::new(),
            image_dir,
            shutdown,
            handle,
            _storage: storage,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `POST /create` with all four text fields and an `img` part.
    pub async fn create(&self, name: &str, author: &str, file_name: &str) -> Response {
        let form = Form::new()
            .text("name", name.to_owned())
            .text("author", author.to_owned())
            .text("category", "SciFi")
            .text("review", "Great")
            .part("img", cover(file_name));
        self.client
            .post(self.url("/create"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    /// Create a post and insist that it worked.
    pub async fn seed(&self, name: &str, author: &str, file_name: &str) {
        let response = self.create(name, author, file_name).await;
        assert_eq!(response.status().as_u16(), 200, "creating {name} failed");
    }

    pub async fn get_json(&self, path: &str) -> (u16, serde_json::Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    pub async fn comment(&self, name: &str, body: serde_json::Value) -> Response {
        self.client
            .post(self.url(&format!("/comment/{name}")))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// `POST /comment/{name}` with a raw body and an optional content type.
    pub async fn comment_raw(
        &self,
        name: &str,
        content_type: Option<&str>,
        body: &'static str,
    ) -> Response {
        let mut request = self.client.post(self.url(&format!("/comment/{name}")));
        if let Some(content_type) = content_type {
            request = request.header("Content-Type", content_type);
        }
        request.body(body).send().await.unwrap()
    }

    /// Append a comment and insist that it worked.
    pub async fn seed_comment(&self, name: &str, comment: serde_json::Value) {
        let response = self.comment(name, serde_json::json!({ "comment": comment })).await;
        assert_eq!(response.status().as_u16(), 200, "commenting on {name} failed");
    }

    pub async fn delete(&self, name: &str) -> Response {
        self.client
            .delete(self.url(&format!("/{name}")))
            .send()
            .await
            .unwrap()
    }

    /// File names currently in the image directory, sorted.
    pub fn image_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.image_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

pub fn cover(file_name: &str) -> Part {
    Part::bytes(COVER_BYTES).file_name(file_name.to_owned())
}
