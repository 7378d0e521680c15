use chrono::Utc;
use log::warn;
use rand::Rng as _;
use regex::Regex;
use std::path::Path;

/// Name used when nothing usable is left of the uploaded file name.
const FALLBACK_NAME: &str = "image";

/// Upper bound (exclusive) of the random suffix appended to stored file names.
const RANDOM_SUFFIX_BOUND: u32 = 1_000_000_000;

/// Longest prefix of the original name kept in a stored file name. Together with the suffix and
/// extension this stays below the 255 byte file name limit of common filesystems.
const MAX_ORIGINAL_BYTES: usize = 200;

/// Longer extensions are not repeated at the end of the stored name.
const MAX_EXTENSION_BYTES: usize = 16;

/// Build a collision-resistant file name for an upload:
/// `{original}_{unix millis}-{random}{.ext}`, where `.ext` repeats the original extension.
/// Long original names are cut to a bounded prefix.
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per upload")]
pub fn unique_file_name(original_name: &str) -> String {
    let original = sanitize_file_name(original_name);
    let timestamp = Utc::now().timestamp_millis();
    let suffix = rand::rng().random_range(0..RANDOM_SUFFIX_BOUND);
    let extension = Path::new(&original)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= MAX_EXTENSION_BYTES)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let original = truncate_on_char_boundary(&original, MAX_ORIGINAL_BYTES);

    format!("{original}_{timestamp}-{suffix}{extension}")
}

/// The longest prefix of `name` that fits in `max_bytes` without splitting a character.
fn truncate_on_char_boundary(name: &str, max_bytes: usize) -> &str {
    if name.len() <= max_bytes {
        return name;
    }
    let end = (0..=max_bytes)
        .rev()
        .find(|&index| name.is_char_boundary(index))
        .unwrap_or(0);
    name.get(..end).unwrap_or_default()
}

/// Reduce a client-supplied file name to a single safe path component. Directory parts are
/// dropped, and separators, control characters and characters reserved on common filesystems
/// become `_`. Non-ASCII letters are kept.
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per upload")]
pub fn sanitize_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned = match Regex::new(r#"[<>:"|?*\x00-\x1f\x7f]"#) {
        Ok(re) => re.replace_all(base, "_").to_string(),
        Err(error) => {
            warn!("Failed to construct file name regex, {error}");
            base.chars()
                .map(|ch| if ch.is_alphanumeric() || ch == '.' { ch } else { '_' })
                .collect()
        }
    };

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_NAME.to_owned()
    } else {
        cleaned.to_owned()
    }
}
