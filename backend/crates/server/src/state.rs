use readinglife_core::database::queries::Db;
use readinglife_core::database::types::PostRecord;
use readinglife_core::image_store::ImageStore;
use readinglife_core::urls::rewrite_image_path;

/// Shared state handed to every handler. Owns the database pool and the image directory for the
/// lifetime of the server.
pub struct AppState {
    pub db: Db,
    pub images: ImageStore,
    /// Public base URL used to turn stored image paths into links
    pub backend_url: String,
}

impl AppState {
    #[must_use]
    #[inline]
    pub const fn new(db: Db, images: ImageStore, backend_url: String) -> Self {
        Self {
            db,
            images,
            backend_url,
        }
    }

    /// Replace the internal image path of `post` with its public URL.
    #[must_use]
    #[inline]
    pub fn with_public_url(&self, mut post: PostRecord) -> PostRecord {
        post.img_path = rewrite_image_path(&self.backend_url, post.img_path.as_deref());
        post
    }
}
