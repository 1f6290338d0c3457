//! Document metadata types
//!
//! Mirrors the backend `documents` / `pdf_pages` rows the viewer reads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::MetadataError;

/// Backend processing state of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Optimizing,
    Optimized,
    Linearizing,
    Linearized,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Optimizing => "optimizing",
            Self::Optimized => "optimized",
            Self::Linearizing => "linearizing",
            Self::Linearized => "linearized",
        }
    }

    /// A job is still running and the status will change on its own
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Processing | Self::Optimizing | Self::Linearizing
        )
    }

    /// No running job will move this status any further
    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "optimizing" => Ok(Self::Optimizing),
            "optimized" => Ok(Self::Optimized),
            "linearizing" => Ok(Self::Linearizing),
            "linearized" => Ok(Self::Linearized),
            other => Err(MetadataError::InvalidRecord(format!(
                "unknown processing status '{}'",
                other
            ))),
        }
    }
}

/// Per-document metadata, read-only from the viewer's perspective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub id: String,
    /// Unknown until the split job has counted the pages
    pub total_pages: Option<u32>,
    pub processing_status: ProcessingStatus,
    /// Blob path of the original upload
    pub file_path: String,
    /// Blob path of the optimized or linearized variant
    pub optimized_file_path: Option<String>,
    pub compression_ratio: Option<f64>,
    pub original_size: Option<u64>,
    pub optimized_size: Option<u64>,
}

impl DocumentInfo {
    pub fn new(id: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            total_pages: None,
            processing_status: ProcessingStatus::Pending,
            file_path: file_path.into(),
            optimized_file_path: None,
            compression_ratio: None,
            original_size: None,
            optimized_size: None,
        }
    }

    pub fn with_status(mut self, status: ProcessingStatus) -> Self {
        self.processing_status = status;
        self
    }

    pub fn with_total_pages(mut self, total: u32) -> Self {
        self.total_pages = Some(total);
        self
    }

    pub fn with_optimized_path(mut self, path: impl Into<String>) -> Self {
        self.optimized_file_path = Some(path.into());
        self
    }

    /// Path of the linearized whole-file variant, if one was produced
    pub fn linearized_path(&self) -> Option<&str> {
        let path = self.optimized_file_path.as_deref()?;
        if self.processing_status == ProcessingStatus::Linearized
            || path.ends_with(crate::storage::keys::LINEARIZED_SUFFIX)
        {
            Some(path)
        } else {
            None
        }
    }
}

/// A single page extracted server-side from a larger document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitPage {
    pub page_number: u32,
    pub file_path: String,
    pub file_size: u64,
}

/// What a page resource contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    PdfPage,
    RasterImage,
}

impl ContentKind {
    /// Detect content kind from magic bytes
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(Self::PdfPage);
        }
        image::guess_format(bytes).ok().map(|_| Self::RasterImage)
    }

    /// Detect content kind from a blob path's extension.
    ///
    /// Anything that is not recognisably an image is treated as a PDF page.
    pub fn from_path(path: &str) -> Self {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        if mime.type_().as_str() == "image" {
            Self::RasterImage
        } else {
            Self::PdfPage
        }
    }

    /// Sniff bytes first, falling back to the path's extension
    pub fn detect(bytes: &[u8], path: &str) -> Self {
        Self::from_magic_bytes(bytes).unwrap_or_else(|| Self::from_path(path))
    }

    /// Concrete `Content-Type` for bytes of this kind.
    ///
    /// Raster formats are sniffed from the bytes, then guessed from the path.
    pub fn media_type(&self, bytes: &[u8], path: &str) -> &'static str {
        match self {
            Self::PdfPage => "application/pdf",
            Self::RasterImage => image::guess_format(bytes)
                .map(|format| format.to_mime_type())
                .ok()
                .or_else(|| {
                    mime_guess::from_path(path)
                        .first_raw()
                        .filter(|mime| mime.starts_with("image/"))
                })
                .unwrap_or("application/octet-stream"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Completed,
            ProcessingStatus::Linearizing,
            ProcessingStatus::Linearized,
        ] {
            assert_eq!(status.as_str().parse::<ProcessingStatus>().unwrap(), status);
        }
        assert!("exploded".parse::<ProcessingStatus>().is_err());
    }

    #[test]
    fn test_status_progress() {
        assert!(ProcessingStatus::Processing.is_in_progress());
        assert!(ProcessingStatus::Optimizing.is_in_progress());
        assert!(ProcessingStatus::Failed.is_terminal());
        assert!(ProcessingStatus::Completed.is_terminal());
    }

    #[test]
    fn test_content_kind_from_path() {
        assert_eq!(ContentKind::from_path("split_pages/d/page_1.pdf"), ContentKind::PdfPage);
        assert_eq!(ContentKind::from_path("split_pages/d/page_1.PNG"), ContentKind::RasterImage);
        assert_eq!(ContentKind::from_path("split_pages/d/page_1.jpeg"), ContentKind::RasterImage);
        assert_eq!(ContentKind::from_path("split_pages/d/page_1"), ContentKind::PdfPage);
    }

    #[test]
    fn test_content_kind_magic_bytes_win_over_extension() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(ContentKind::detect(&png, "page_3.pdf"), ContentKind::RasterImage);
        assert_eq!(ContentKind::detect(b"%PDF-1.7", "page_3.png"), ContentKind::PdfPage);
        assert_eq!(ContentKind::detect(b"????", "page_3.webp"), ContentKind::RasterImage);
    }

    #[test]
    fn test_media_type_is_concrete() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0];
        let raster = ContentKind::RasterImage;

        assert_eq!(raster.media_type(&png, "scan"), "image/png");
        assert_eq!(raster.media_type(&jpeg, "scan.png"), "image/jpeg");
        assert_eq!(raster.media_type(b"????", "page_3.webp"), "image/webp");
        assert_eq!(raster.media_type(b"????", "page_3"), "application/octet-stream");
        assert_eq!(ContentKind::PdfPage.media_type(b"%PDF-1.7", "page.pdf"), "application/pdf");
    }

    #[test]
    fn test_linearized_path() {
        let doc = DocumentInfo::new("d1", "uploads/1-a.pdf")
            .with_status(ProcessingStatus::Linearized)
            .with_optimized_path("uploads/1-a-linearized.pdf");
        assert_eq!(doc.linearized_path(), Some("uploads/1-a-linearized.pdf"));

        let optimized = DocumentInfo::new("d2", "uploads/2-b.pdf")
            .with_status(ProcessingStatus::Optimized)
            .with_optimized_path("uploads/2-b-optimized.pdf");
        assert_eq!(optimized.linearized_path(), None);
    }
}
