//! Parsing of the multipart bodies sent by the create and update endpoints.
use crate::errors::ApiError;
use axum::body::Bytes;
use axum::extract::Multipart;
use readinglife_core::database::types::PostFields;

/// Name of the multipart part carrying the cover image.
pub const IMAGE_FIELD: &str = "img";

/// Which file part is accepted as the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageField {
    /// Only a file part with this name
    Named(&'static str),
    /// The first file part, whatever its name
    Any,
}

impl ImageField {
    fn accepts(self, field_name: Option<&str>) -> bool {
        match self {
            Self::Named(expected) => field_name == Some(expected),
            Self::Any => true,
        }
    }
}

/// An uploaded file, held in memory until the request has been validated.
#[derive(Debug)]
pub struct UploadedImage {
    pub file_name: String,
    pub data: Bytes,
}

/// Text fields and image of a create or update request.
#[derive(Debug, Default)]
pub struct PostForm {
    pub fields: PostFields,
    pub image: Option<UploadedImage>,
}

impl PostForm {
    /// Read the whole multipart body. Unknown text parts are ignored; only the first accepted
    /// file part with a name and some content is kept.
    /// # Errors
    /// Fails if the body is not valid multipart data or exceeds the body limit.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub async fn from_multipart(
        mut multipart: Multipart,
        image_field: ImageField,
    ) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);

            if let Some(file_name) = field.file_name().map(str::to_owned) {
                // Browsers send an unnamed, empty part for a file input left blank
                if form.image.is_none() && image_field.accepts(name.as_deref()) {
                    let data = field.bytes().await?;
                    if !file_name.is_empty() && !data.is_empty() {
                        form.image = Some(UploadedImage { file_name, data });
                    }
                }
                continue;
            }

            let slot = match name.as_deref() {
                Some("name") => &mut form.fields.name,
                Some("author") => &mut form.fields.author,
                Some("category") => &mut form.fields.category,
                Some("review") => &mut form.fields.review,
                _ => continue,
            };
            *slot = Some(field.text().await?);
        }

        Ok(form)
    }
}
