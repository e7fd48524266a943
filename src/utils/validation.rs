//! Centralized validation and helper functions for uploads.

/// Security-related constants for input validation
pub const MAX_FILENAME_LENGTH: usize = 255;
pub const MIN_FILE_CONTENT_SIZE: usize = 1;

/// Longest extension carried over from a client filename
pub const MAX_EXTENSION_LENGTH: usize = 10;

/// Security validation error types
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Filename too long: exceeds {MAX_FILENAME_LENGTH} characters")]
    FilenameTooLong,
    #[error("Invalid filename: contains path traversal or invalid characters")]
    InvalidFilename,
    #[error("Empty filename provided")]
    EmptyFilename,
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("Uploaded file exceeds the {limit} byte limit")]
    FileTooLarge { limit: usize },
}

/// Image formats recognised by their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// Conventional file extension, without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }
}

/// Detect an image format from its magic number.
///
/// # Examples
///
/// ```
/// use product_match::utils::validation::{detect_image_format, ImageFormat};
///
/// assert_eq!(detect_image_format(b"\x89PNG\r\n\x1a\n...."), Some(ImageFormat::Png));
/// assert_eq!(detect_image_format(b"hello"), None);
/// ```
#[must_use]
pub fn detect_image_format(content: &[u8]) -> Option<ImageFormat> {
    if content.starts_with(b"\xFF\xD8\xFF") {
        Some(ImageFormat::Jpeg)
    } else if content.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageFormat::Png)
    } else if content.starts_with(b"GIF87a") || content.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if content.len() >= 12 && &content[..4] == b"RIFF" && &content[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else if content.starts_with(b"BM") && content.len() >= 14 {
        Some(ImageFormat::Bmp)
    } else if content.starts_with(b"II*\0") || content.starts_with(b"MM\0*") {
        Some(ImageFormat::Tiff)
    } else {
        None
    }
}

/// Secure filename validation to prevent directory traversal and other attacks
///
/// Validates and sanitizes filenames by:
/// - Checking length limits
/// - Preventing directory traversal (../, ..\\)
/// - Removing potentially dangerous characters
/// - Ensuring filename is not empty after sanitization
///
/// # Errors
///
/// Returns `ValidationError::EmptyFilename` if the filename is empty,
/// `ValidationError::FilenameTooLong` if it exceeds the limit, or
/// `ValidationError::InvalidFilename` if it contains invalid characters.
pub fn validate_filename(filename: &str) -> Result<String, ValidationError> {
    if filename.trim().is_empty() {
        return Err(ValidationError::EmptyFilename);
    }

    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(ValidationError::FilenameTooLong);
    }

    // Prevent directory traversal attacks
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(ValidationError::InvalidFilename);
    }

    if filename.contains('\0') || filename.chars().any(|c| ('\x01'..='\x1F').contains(&c)) {
        return Err(ValidationError::InvalidFilename);
    }

    let sanitized = filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-' || *c == '_' || *c == ' ')
        .collect::<String>();

    if sanitized.trim().is_empty() || sanitized.starts_with('.') {
        return Err(ValidationError::InvalidFilename);
    }

    Ok(sanitized)
}

/// Check that an upload has content and fits within `max_size` bytes.
///
/// # Errors
///
/// Returns `ValidationError::EmptyFile` or `ValidationError::FileTooLarge`.
pub fn validate_upload_content(content: &[u8], max_size: usize) -> Result<(), ValidationError> {
    if content.len() < MIN_FILE_CONTENT_SIZE {
        return Err(ValidationError::EmptyFile);
    }
    if content.len() > max_size {
        return Err(ValidationError::FileTooLarge { limit: max_size });
    }
    Ok(())
}

/// Pick the suffix for the temporary copy of an upload.
///
/// Prefers the extension of the client filename when it validates, then the
/// sniffed image format, and otherwise returns an empty suffix. The result is
/// always lowercase and either empty or `.` followed by ASCII alphanumerics.
#[must_use]
pub fn upload_suffix(filename: Option<&str>, content: &[u8]) -> String {
    let from_name = filename
        .and_then(|name| validate_filename(name).ok())
        .and_then(|name| {
            let ext = std::path::Path::new(&name)
                .extension()?
                .to_str()?
                .to_ascii_lowercase();
            let usable = !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LENGTH
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            usable.then_some(ext)
        });

    from_name
        .or_else(|| detect_image_format(content).map(|f| f.extension().to_string()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_filename_safe() {
        assert_eq!(validate_filename("photo.jpg").unwrap(), "photo.jpg");
        assert_eq!(validate_filename("my-photo_1.PNG").unwrap(), "my-photo_1.PNG");
        assert_eq!(validate_filename("sofa (2).webp").unwrap(), "sofa 2.webp");
    }

    #[test]
    fn test_validate_filename_dangerous() {
        assert!(matches!(
            validate_filename("../etc/passwd"),
            Err(ValidationError::InvalidFilename)
        ));
        assert!(matches!(
            validate_filename("..\\windows\\system32"),
            Err(ValidationError::InvalidFilename)
        ));
        assert!(matches!(
            validate_filename("img\0.png"),
            Err(ValidationError::InvalidFilename)
        ));
        assert!(matches!(
            validate_filename(".hidden"),
            Err(ValidationError::InvalidFilename)
        ));
        assert!(matches!(
            validate_filename("   "),
            Err(ValidationError::EmptyFilename)
        ));
        assert!(matches!(
            validate_filename(&"a".repeat(MAX_FILENAME_LENGTH + 1)),
            Err(ValidationError::FilenameTooLong)
        ));
    }

    #[test]
    fn test_detect_image_format() {
        assert_eq!(
            detect_image_format(b"\xFF\xD8\xFF\xE0\x00\x10JFIF"),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(detect_image_format(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(
            detect_image_format(b"RIFF\x24\x00\x00\x00WEBPVP8 "),
            Some(ImageFormat::Webp)
        );
        assert_eq!(detect_image_format(b"MM\0*rest"), Some(ImageFormat::Tiff));
        assert_eq!(detect_image_format(b"RIFF\x24\x00\x00\x00WAVE"), None);
        assert_eq!(detect_image_format(b""), None);
    }

    #[test]
    fn test_validate_upload_content() {
        assert!(validate_upload_content(b"abc", 10).is_ok());
        assert!(matches!(
            validate_upload_content(b"", 10),
            Err(ValidationError::EmptyFile)
        ));
        assert!(matches!(
            validate_upload_content(&[0u8; 11], 10),
            Err(ValidationError::FileTooLarge { limit: 10 })
        ));
    }

    #[test]
    fn test_upload_suffix() {
        assert_eq!(upload_suffix(Some("Photo.JPEG"), b""), ".jpeg");
        assert_eq!(upload_suffix(Some("shot"), b"\x89PNG\r\n\x1a\n"), ".png");
        assert_eq!(upload_suffix(Some("../../x.sh"), b"GIF87a"), ".gif");
        assert_eq!(upload_suffix(None, b"\xFF\xD8\xFF\xDB"), ".jpg");
        assert_eq!(upload_suffix(None, b"plain text"), "");
        assert_eq!(upload_suffix(Some("file.averyveryverylongext"), b""), "");
    }
}
