use axum::extract::Multipart;
use std::path::Path;

use crate::api::errors::ApiError;

#[derive(Debug)]
pub(crate) struct UploadedFile {
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) bytes: Vec<u8>,
}

/// Reads the first multipart field named `field_name`, enforcing `max_bytes`
/// while streaming. Other fields are skipped.
pub(crate) async fn read_file_field(
    multipart: &mut Multipart,
    field_name: &str,
    max_bytes: usize,
) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type =
            field.content_type().unwrap_or("application/octet-stream").to_string();
        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
        {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(ApiError::PayloadTooLarge(format!(
                    "File size exceeds {}MB limit",
                    max_bytes / (1024 * 1024)
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(Some(UploadedFile { filename, content_type, bytes }));
    }

    Ok(None)
}

pub(crate) fn validate_image_upload(
    filename: &str,
    content_type: &str,
    allowed_extensions: &[String],
) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")));
    }

    let mime = content_type.trim().to_ascii_lowercase();
    if mime_allowed_for_extension(&mime, &extension) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "MIME type '{mime}' does not match extension '.{extension}'"
        )))
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        "webp" => mime == "image/webp",
        "gif" => mime == "image/gif",
        _ => false,
    }
}

/// Excel uploads must at least carry an `.xlsx` name; content is checked by the parser.
pub(crate) fn validate_xlsx_filename(filename: &str) -> Result<(), ApiError> {
    let is_xlsx = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
    if is_xlsx {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Invalid Excel file: expected an .xlsx upload".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
    }

    #[test]
    fn accepts_matching_image_types() {
        assert!(validate_image_upload("me.PNG", "image/png", &allowed()).is_ok());
        assert!(validate_image_upload("me.jpg", "image/jpeg", &allowed()).is_ok());
    }

    #[test]
    fn rejects_disallowed_or_mismatched_images() {
        assert!(validate_image_upload("me.gif", "image/gif", &allowed()).is_err());
        assert!(validate_image_upload("me.png", "image/jpeg", &allowed()).is_err());
        assert!(validate_image_upload("noext", "image/png", &allowed()).is_err());
    }

    #[test]
    fn xlsx_name_is_required() {
        assert!(validate_xlsx_filename("quiz.XLSX").is_ok());
        assert!(validate_xlsx_filename("quiz.csv").is_err());
    }
}
