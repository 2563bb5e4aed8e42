use crate::config::UploadConfig;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Raw upload as read from the multipart body, before any validation.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// A validated upload persisted to the upload directory.
#[derive(Debug)]
pub struct StoredUpload {
    pub filename: String,
    pub path: PathBuf,
    /// Subpath the front-end uses to fetch the image back, e.g. `uploads/ear.png`.
    pub public_path: String,
}

/// Closed set of client-side intake failures. The display strings are the
/// wire messages returned in the `error` field.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntakeError {
    #[error("No file part")]
    MissingFilePart,
    #[error("No selected file")]
    NoSelectedFile,
    #[error("Invalid file type")]
    InvalidFileType,
}

/// Checks the client-supplied filename against the extension allow-list.
/// The extension is everything after the last dot, compared case-insensitively.
pub fn validate_filename(
    filename: &str,
    allowed_extensions: &[String],
) -> Result<(), IntakeError> {
    if filename.is_empty() {
        return Err(IntakeError::NoSelectedFile);
    }

    match filename.rsplit_once('.') {
        Some((_, extension))
            if allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(extension)) =>
        {
            Ok(())
        }
        _ => Err(IntakeError::InvalidFileType),
    }
}

/// Reduces a client filename to a safe basename: the final path component
/// with everything outside `[A-Za-z0-9._-]` dropped and leading dots or
/// dashes stripped.
pub fn sanitize_filename(raw: &str) -> String {
    let basename = raw.split(['/', '\\']).next_back().unwrap_or_default();

    basename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_start_matches(['.', '-'])
        .to_string()
}

/// Writes the upload under its sanitized name into the configured directory.
/// The directory itself is created once at startup.
pub async fn store_upload(
    config: &UploadConfig,
    client_filename: &str,
    data: &[u8],
) -> io::Result<StoredUpload> {
    let filename = sanitize_filename(client_filename);
    if filename.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "filename is empty after sanitization",
        ));
    }

    let public_path = format!("{}/{}", config.public_subdir(), filename);
    let path = config.dir.join(&filename);
    tokio::fs::write(&path, data).await?;

    Ok(StoredUpload {
        filename,
        path,
        public_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn allowed() -> Vec<String> {
        vec!["png".into(), "jpg".into(), "jpeg".into()]
    }

    fn temp_upload_config(tag: &str) -> UploadConfig {
        let dir = std::env::temp_dir().join(format!("otoscan-intake-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        UploadConfig {
            dir,
            allowed_extensions: allowed(),
        }
    }

    #[test]
    fn empty_filename_is_rejected() {
        assert_eq!(
            validate_filename("", &allowed()),
            Err(IntakeError::NoSelectedFile)
        );
    }

    #[test]
    fn disallowed_extensions_are_rejected() {
        assert_eq!(
            validate_filename("test.txt", &allowed()),
            Err(IntakeError::InvalidFileType)
        );
        assert_eq!(
            validate_filename("archive.png.zip", &allowed()),
            Err(IntakeError::InvalidFileType)
        );
        assert_eq!(
            validate_filename("no_extension", &allowed()),
            Err(IntakeError::InvalidFileType)
        );
        assert_eq!(
            validate_filename("trailing.", &allowed()),
            Err(IntakeError::InvalidFileType)
        );
    }

    #[test]
    fn allowed_extensions_pass_case_insensitively() {
        assert_eq!(validate_filename("ear.png", &allowed()), Ok(()));
        assert_eq!(validate_filename("ear.JPG", &allowed()), Ok(()));
        assert_eq!(validate_filename("ear.Jpeg", &allowed()), Ok(()));
    }

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd.png"), "passwd.png");
        assert_eq!(sanitize_filename("..\\..\\evil.jpg"), "evil.jpg");
        assert_eq!(sanitize_filename("ear image (1).png"), "earimage1.png");
        assert_eq!(sanitize_filename(".hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename("plain.jpeg"), "plain.jpeg");
    }

    #[tokio::test]
    async fn store_upload_writes_sanitized_file() {
        let config = temp_upload_config("store");
        let stored = store_upload(&config, "../nested/ear.png", b"bytes")
            .await
            .unwrap();

        assert_eq!(stored.filename, "ear.png");
        assert_eq!(stored.path, config.dir.join("ear.png"));
        assert!(stored.public_path.ends_with("/ear.png"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn store_upload_rejects_unsanitizable_names() {
        let config = UploadConfig {
            dir: PathBuf::from("static/uploads"),
            allowed_extensions: allowed(),
        };
        let result = store_upload(&config, "../..", b"bytes").await;
        assert!(result.is_err());
    }
}
