use serde::Serialize;

/// Field of the request body holding the image, as plain base 64 or as a
/// `data:` URL
pub const IMAGE_FIELD: &str = "image_base64";

#[derive(Debug, Serialize)]
pub struct DescriptionBody {
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
}
