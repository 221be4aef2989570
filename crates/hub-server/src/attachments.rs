//! Prompt attachment handling (§4.6): decode base64 data URIs to a host
//! temp directory with restrictive permissions, ready for `copyTo` into the
//! drone's container.

use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::paths::attachments_dir;

pub const MAX_ATTACHMENTS: usize = 8;
pub const MAX_BYTES_PER_FILE: u64 = 6 * 1024 * 1024;
pub const MAX_TOTAL_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("too many attachments: {0} (max {MAX_ATTACHMENTS})")]
    TooMany(usize),
    #[error("attachment {0} exceeds {MAX_BYTES_PER_FILE} bytes")]
    TooLarge(String),
    #[error("attachments exceed {MAX_TOTAL_BYTES} bytes total")]
    TotalTooLarge,
    #[error("unsupported mime type: {0}")]
    UnsupportedMime(String),
    #[error("malformed data URI")]
    Malformed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct WrittenAttachment {
    pub filename: String,
    pub host_path: PathBuf,
}

/// Decode and write a batch of `data:` URI attachments for one prompt,
/// enforcing the §4.6 limits. Filenames are sanitized and deduplicated by
/// appending `-2`, `-3`, … on collision.
pub fn write_attachments(
    prompt_id: &str,
    attachments: &[(String, String)],
) -> Result<Vec<WrittenAttachment>, AttachmentError> {
    if attachments.len() > MAX_ATTACHMENTS {
        return Err(AttachmentError::TooMany(attachments.len()));
    }

    let dir = attachments_dir().join(sanitize(prompt_id));
    fs::create_dir_all(&dir)?;

    let mut total: u64 = 0;
    let mut used_names: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut written = Vec::with_capacity(attachments.len());

    for (filename, data_uri) in attachments {
        let (mime, bytes) = decode_data_uri(data_uri)?;
        if !mime.starts_with("image/") {
            return Err(AttachmentError::UnsupportedMime(mime));
        }
        if bytes.len() as u64 > MAX_BYTES_PER_FILE {
            return Err(AttachmentError::TooLarge(filename.clone()));
        }
        total += bytes.len() as u64;
        if total > MAX_TOTAL_BYTES {
            return Err(AttachmentError::TotalTooLarge);
        }

        let safe_name = dedupe(sanitize(filename), &mut used_names);
        let path = dir.join(&safe_name);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)?;
        file.write_all(&bytes)?;
        // best-effort harden, in case an existing file had looser perms
        let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o600));

        written.push(WrittenAttachment {
            filename: safe_name,
            host_path: path,
        });
    }

    Ok(written)
}

/// Deterministic footer appended to prompt text listing the attached files.
pub fn footer(attachments: &[WrittenAttachment]) -> String {
    if attachments.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\nAttachments:\n");
    for a in attachments {
        out.push_str("- ");
        out.push_str(&a.filename);
        out.push('\n');
    }
    out
}

fn decode_data_uri(data_uri: &str) -> Result<(String, Vec<u8>), AttachmentError> {
    let without_scheme = data_uri.strip_prefix("data:").ok_or(AttachmentError::Malformed)?;
    let comma_pos = without_scheme.find(',').ok_or(AttachmentError::Malformed)?;
    let meta = &without_scheme[..comma_pos];
    let base64_data = &without_scheme[comma_pos + 1..];
    if !meta.ends_with(";base64") {
        return Err(AttachmentError::Malformed);
    }
    let mime = meta[..meta.len() - 7].to_string();
    let bytes = STANDARD.decode(base64_data).map_err(|_| AttachmentError::Malformed)?;
    Ok((mime, bytes))
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn dedupe(name: String, used: &mut std::collections::HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), format!(".{e}")),
        None => (name.clone(), String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize("../../etc/passwd"), ".._.._etc_passwd");
    }

    #[test]
    fn dedupes_colliding_names() {
        let mut used = std::collections::HashSet::new();
        assert_eq!(dedupe("a.png".into(), &mut used), "a.png");
        assert_eq!(dedupe("a.png".into(), &mut used), "a-2.png");
        assert_eq!(dedupe("a.png".into(), &mut used), "a-3.png");
    }

    #[test]
    fn rejects_non_base64_data_uri() {
        let err = decode_data_uri("data:image/png,notbase64").unwrap_err();
        assert!(matches!(err, AttachmentError::Malformed));
    }

    #[test]
    fn decodes_valid_data_uri() {
        let (mime, bytes) = decode_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"hello");
    }
}
