//! Rewriting of stored image paths into links a browser can follow.
use crate::image_store::IMAGE_PATH_PREFIX;
use urlencoding::encode;

/// URL prefix under which the image directory is served.
pub const PUBLIC_IMAGE_PREFIX: &str = "/imgs";

/// Turn an internal `img_path` (`/src/imgs/{file}`) into `{base_url}/imgs/{file}`. The file name
/// is percent-encoded; a trailing `/` on `base_url` is ignored.
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per record")]
pub fn public_image_url(base_url: &str, img_path: &str) -> String {
    let public_path = img_path.replacen(IMAGE_PATH_PREFIX, PUBLIC_IMAGE_PREFIX, 1);
    let encoded_path = match public_path.rsplit_once('/') {
        Some((dir, file_name)) => format!("{dir}/{}", encode(file_name)),
        None => encode(&public_path).into_owned(),
    };

    format!("{}{encoded_path}", base_url.trim_end_matches('/'))
}

/// [`public_image_url`] over an optional path.
#[must_use]
#[inline]
pub fn rewrite_image_path(base_url: &str, img_path: Option<&str>) -> Option<String> {
    img_path.map(|path| public_image_url(base_url, path))
}
