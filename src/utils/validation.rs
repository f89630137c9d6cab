use crate::config::ValidationConfig;
use crate::models::{Payload, ReceivedFile, ReceivedUpload, UploadRequest};
use serde_json::{Value, json};
use std::path::Path;
use thiserror::Error;

/// Media type assumed when a part carries no usable Content-Type.
pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Business-rule rejection of an upload request.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Runs the validation gate over what the transport layer accepted.
///
/// Pure precondition check: nothing is deleted or uploaded here. On success the
/// received files are converted into payloads that are guaranteed to be on disk.
pub fn validate_upload_request(
    received: &ReceivedUpload,
    rules: &ValidationConfig,
) -> Result<UploadRequest, ValidationError> {
    if received.file_count() == 0 {
        return Err(ValidationError::new("NO_FILES", "No files were uploaded"));
    }

    if received.images.is_empty() {
        return Err(ValidationError::new(
            "NO_IMAGES",
            "At least one image file is required",
        ));
    }

    if received.images.len() < rules.min_image_count {
        return Err(ValidationError::new(
            "TOO_FEW_IMAGES",
            format!(
                "At least {} image files are required",
                rules.min_image_count
            ),
        ));
    }

    let invalid_images: Vec<&ReceivedFile> = received
        .images
        .iter()
        .filter(|f| !rules.is_allowed_image(&f.media_type) || f.temp_path.is_none())
        .collect();

    if !invalid_images.is_empty() {
        let details: Vec<Value> = invalid_images.iter().map(|f| describe(f)).collect();
        return Err(
            ValidationError::new("INVALID_IMAGE_TYPE", "Invalid image file type(s)")
                .with_details(Value::Array(details)),
        );
    }

    let audio = match received.audio.first() {
        Some(file) if !rules.is_allowed_audio(&file.media_type) || file.temp_path.is_none() => {
            return Err(
                ValidationError::new("INVALID_AUDIO_TYPE", "Invalid audio file type")
                    .with_details(describe(file)),
            );
        }
        Some(file) => to_payload(file),
        None => None,
    };

    Ok(UploadRequest {
        images: received.images.iter().filter_map(to_payload).collect(),
        audio,
    })
}

fn describe(file: &ReceivedFile) -> Value {
    json!({
        "name": file.original_name,
        "type": file.media_type,
    })
}

fn to_payload(file: &ReceivedFile) -> Option<Payload> {
    Some(Payload {
        original_name: file.original_name.clone(),
        media_type: file.media_type.clone(),
        size: file.size,
        temp_path: file.temp_path.clone()?,
    })
}

/// Normalizes a declared Content-Type to its lowercase essence ("type/subtype").
pub fn normalize_media_type(content_type: Option<&str>) -> String {
    content_type
        .and_then(|ct| ct.trim().parse::<mime::Mime>().ok())
        .map(|m| m.essence_str().to_lowercase())
        .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string())
}

/// Sanitizes a client-supplied filename so it can never address a path
pub fn sanitize_filename(filename: &str) -> String {
    let normalized = filename.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.trim().is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileField;
    use std::path::PathBuf;

    fn image(name: &str, media_type: &str) -> ReceivedFile {
        ReceivedFile {
            field: FileField::Images,
            original_name: name.to_string(),
            media_type: media_type.to_string(),
            size: 10,
            temp_path: Some(PathBuf::from(format!("/tmp/{}", name))),
        }
    }

    fn audio(name: &str, media_type: &str) -> ReceivedFile {
        ReceivedFile {
            field: FileField::Audio,
            ..image(name, media_type)
        }
    }

    fn jpegs(count: usize) -> Vec<ReceivedFile> {
        (0..count)
            .map(|i| image(&format!("photo{}.jpg", i), "image/jpeg"))
            .collect()
    }

    #[test]
    fn test_rejects_empty_request() {
        let err = validate_upload_request(&ReceivedUpload::default(), &ValidationConfig::default())
            .unwrap_err();
        assert_eq!(err.code, "NO_FILES");
        assert_eq!(err.message, "No files were uploaded");
    }

    #[test]
    fn test_rejects_audio_only() {
        let received = ReceivedUpload {
            images: vec![],
            audio: vec![audio("note.wav", "audio/wav")],
        };
        let err = validate_upload_request(&received, &ValidationConfig::default()).unwrap_err();
        assert_eq!(err.code, "NO_IMAGES");
    }

    #[test]
    fn test_rejects_below_minimum() {
        let received = ReceivedUpload {
            images: jpegs(5),
            audio: vec![],
        };
        let err = validate_upload_request(&received, &ValidationConfig::default()).unwrap_err();
        assert_eq!(err.code, "TOO_FEW_IMAGES");
        assert_eq!(err.message, "At least 8 image files are required");
    }

    #[test]
    fn test_lists_exactly_the_invalid_images() {
        let mut images = jpegs(8);
        images[2] = image("contract.pdf", "application/pdf");
        let mut refused = image("clip.mp4", "video/mp4");
        refused.temp_path = None;
        images.push(refused);

        let received = ReceivedUpload {
            images,
            audio: vec![],
        };
        let err = validate_upload_request(&received, &ValidationConfig::default()).unwrap_err();
        assert_eq!(err.code, "INVALID_IMAGE_TYPE");
        assert_eq!(
            err.details,
            Some(json!([
                {"name": "contract.pdf", "type": "application/pdf"},
                {"name": "clip.mp4", "type": "video/mp4"},
            ]))
        );
    }

    #[test]
    fn test_rejects_invalid_audio() {
        let received = ReceivedUpload {
            images: jpegs(8),
            audio: vec![audio("note.flac", "audio/flac")],
        };
        let err = validate_upload_request(&received, &ValidationConfig::default()).unwrap_err();
        assert_eq!(err.code, "INVALID_AUDIO_TYPE");
        assert_eq!(
            err.details,
            Some(json!({"name": "note.flac", "type": "audio/flac"}))
        );
    }

    #[test]
    fn test_accepts_valid_request_in_order() {
        let received = ReceivedUpload {
            images: jpegs(8),
            audio: vec![audio("note.wav", "audio/wav")],
        };
        let request = validate_upload_request(&received, &ValidationConfig::default()).unwrap();
        assert_eq!(request.images.len(), 8);
        assert_eq!(request.images[0].original_name, "photo0.jpg");
        assert_eq!(request.images[7].original_name, "photo7.jpg");
        assert_eq!(request.audio.unwrap().original_name, "note.wav");
    }

    #[test]
    fn test_normalize_media_type() {
        assert_eq!(normalize_media_type(Some("image/JPEG")), "image/jpeg");
        assert_eq!(
            normalize_media_type(Some("audio/wav; codecs=1")),
            "audio/wav"
        );
        assert_eq!(normalize_media_type(Some("garbage")), FALLBACK_MEDIA_TYPE);
        assert_eq!(normalize_media_type(None), FALLBACK_MEDIA_TYPE);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test.jpg"), "test.jpg");
        assert_eq!(sanitize_filename("my photo.png"), "my photo.png");
        assert_eq!(sanitize_filename("a<b>.gif"), "a_b_.gif");
        assert_eq!(sanitize_filename("../../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\windows\\cat.jpg"), "cat.jpg");
        assert_eq!(sanitize_filename(""), "unnamed");
    }
}
