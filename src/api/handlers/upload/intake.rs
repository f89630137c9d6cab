use crate::api::error::TransportError;
use crate::config::{AppConfig, MIB, size_label};
use crate::models::{FileField, ReceivedFile, ReceivedUpload, extension_of};
use crate::services::temp_storage::{CleanupGuard, StageError, TempStorage};
use crate::utils::validation::{normalize_media_type, sanitize_filename};
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;

/// Largest value accepted for a plain (non-file) form field.
const MAX_FIELD_VALUE: u64 = MIB as u64;

/// Reads every part of an upload form, staging accepted files to disk.
///
/// Files whose declared media type is not allowed for their field are read
/// and thrown away; they are still reported so the validation gate can name
/// them. On error every file staged so far is removed before returning. Each
/// staged path is also registered with `staged` as soon as it exists.
pub async fn receive_upload(
    multipart: &mut Multipart,
    temp_storage: &TempStorage,
    config: &AppConfig,
    staged: &CleanupGuard,
) -> Result<ReceivedUpload, TransportError> {
    let mut received = ReceivedUpload::default();

    match read_parts(multipart, temp_storage, config, staged, &mut received).await {
        Ok(()) => Ok(received),
        Err(e) => {
            temp_storage.remove_all(&received.staged_paths()).await;
            Err(e)
        }
    }
}

async fn read_parts(
    multipart: &mut Multipart,
    temp_storage: &TempStorage,
    config: &AppConfig,
    staged: &CleanupGuard,
    received: &mut ReceivedUpload,
) -> Result<(), TransportError> {
    let mut field_parts = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, config))?
    {
        let name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            field_parts += 1;
            if field_parts > config.upload.max_parts {
                return Err(TransportError::TooManyParts);
            }
            TempStorage::discard_stream(field, MAX_FIELD_VALUE)
                .await
                .map_err(|e| match e {
                    StageError::TooLarge { .. } => {
                        TransportError::Malformed(format!("Field value too long: {}", name))
                    }
                    other => stage_error(other, config),
                })?;
            continue;
        };

        let kind = FileField::from_field_name(&name).ok_or_else(|| {
            tracing::warn!("Unexpected file field: {}", name);
            TransportError::UnexpectedFile
        })?;

        if received.file_count() >= config.upload.max_files {
            return Err(TransportError::TooManyFiles);
        }

        let field_limit = match kind {
            FileField::Images => config.validation.max_image_count,
            FileField::Audio => config.validation.max_audio_count,
        };
        if received.count_for(kind) >= field_limit {
            tracing::warn!("Too many files on field {}", kind.as_str());
            return Err(TransportError::UnexpectedFile);
        }

        let media_type = normalize_media_type(field.content_type());
        let accepted = match kind {
            FileField::Images => config.validation.is_allowed_image(&media_type),
            FileField::Audio => config.validation.is_allowed_audio(&media_type),
        };
        let max_size = config.upload.max_file_size as u64;

        let (size, temp_path) = if accepted {
            let file = temp_storage
                .stage(
                    kind.as_str(),
                    &extension_of(&sanitize_filename(&file_name)),
                    field,
                    max_size,
                )
                .await
                .map_err(|e| stage_error(e, config))?;
            staged.track(file.path.clone());
            (file.size, Some(file.path))
        } else {
            tracing::warn!(
                "Unsupported file type on {}: {:?} ({})",
                kind.as_str(),
                file_name,
                media_type
            );
            let size = TempStorage::discard_stream(field, max_size)
                .await
                .map_err(|e| stage_error(e, config))?;
            (size, None)
        };

        received.push(ReceivedFile {
            field: kind,
            original_name: file_name,
            media_type,
            size,
            temp_path,
        });
    }

    Ok(())
}

fn multipart_error(err: MultipartError, config: &AppConfig) -> TransportError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        TransportError::BodyTooLarge {
            limit: size_label(config.upload.max_body_size()),
        }
    } else {
        TransportError::Malformed(err.body_text())
    }
}

fn stage_error(err: StageError, config: &AppConfig) -> TransportError {
    match err {
        StageError::TooLarge { .. } => TransportError::FileTooLarge {
            limit: size_label(config.upload.max_file_size),
        },
        StageError::Stream(msg) if msg.contains("length limit exceeded") => {
            TransportError::BodyTooLarge {
                limit: size_label(config.upload.max_body_size()),
            }
        }
        StageError::Stream(msg) => TransportError::Malformed(msg),
        StageError::Io(e) => TransportError::Storage(e),
    }
}
