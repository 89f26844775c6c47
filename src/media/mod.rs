//! Pre-send validation of message content and attachments.
//!
//! Everything here runs before any network call; a rejected send leaves the
//! conversation untouched.

use crate::error::{ChatSyncError, Result};
use crate::types::{MediaUpload, SendRequest};

pub const DEFAULT_MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

/// Checks that `request` has something to send and that any attachment is an
/// image or video no larger than `max_media_bytes`.
///
/// An accepted attachment has its `mime_type` replaced by the sniffed type,
/// which is what gets uploaded.
pub fn validate_send(request: &mut SendRequest, max_media_bytes: usize) -> Result<()> {
    match &mut request.media {
        None if request.content.trim().is_empty() => Err(ChatSyncError::Validation(
            "Message has no text or media".to_string(),
        )),
        None => Ok(()),
        Some(media) => {
            let sniffed = validate_media(media, max_media_bytes)?;
            media.mime_type = sniffed.to_string();
            Ok(())
        }
    }
}

/// Validates an attachment and returns its sniffed MIME type.
///
/// The declared `mime_type` is not trusted; the bytes decide.
pub fn validate_media(media: &MediaUpload, max_media_bytes: usize) -> Result<&'static str> {
    if media.data.is_empty() {
        return Err(ChatSyncError::Validation("Invalid media file.".to_string()));
    }
    if media.data.len() > max_media_bytes {
        return Err(ChatSyncError::Validation(format!(
            "Media file should be less than {}",
            human_size(max_media_bytes)
        )));
    }

    let Some(kind) = infer::get(&media.data) else {
        return Err(ChatSyncError::Validation(format!(
            "Unrecognised media file {}",
            media.filename
        )));
    };
    if !(infer::is_image(&media.data) || infer::is_video(&media.data)) {
        return Err(ChatSyncError::Validation(format!(
            "Only images and videos can be attached, got {}",
            kind.mime_type()
        )));
    }

    if kind.mime_type() != media.mime_type {
        tracing::debug!(
            target: "chatsync::media::validate_media",
            "Declared type {} for {} differs from sniffed {}",
            media.mime_type,
            media.filename,
            kind.mime_type()
        );
    }
    Ok(kind.mime_type())
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}
