//! Pure-Rust decoder backed by `lopdf`
//!
//! Parses PDF bytes into a document model to validate them and count pages
//! from the page tree. Raster split pages are fully decoded and scaled with
//! the `image` crate. Real PDF rasterisation needs the `mupdf-render` feature.

use std::io::Cursor;

use image::imageops::FilterType;
use image::DynamicImage;
use lopdf::Document;

use crate::document::ContentKind;

use super::{DecodeError, DecodedInfo, PageSurface, PdfDecoder};

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfDecoder;

impl LopdfDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PdfDecoder for LopdfDecoder {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn inspect(&self, data: &[u8]) -> Result<DecodedInfo, DecodeError> {
        match ContentKind::from_magic_bytes(data) {
            Some(ContentKind::PdfPage) => inspect_pdf(data),
            Some(ContentKind::RasterImage) => {
                decode_image(data)?;
                Ok(DecodedInfo {
                    num_pages: Some(1),
                    kind: ContentKind::RasterImage,
                })
            }
            None => Err(DecodeError::InvalidHeader),
        }
    }

    fn render(
        &self,
        data: &[u8],
        kind: ContentKind,
        page_index: u32,
        scale: f32,
    ) -> Result<PageSurface, DecodeError> {
        match kind {
            ContentKind::RasterImage => render_raster(data, page_index, scale),
            ContentKind::PdfPage => Err(DecodeError::Unsupported(
                "PDF rasterisation requires the mupdf-render feature".to_string(),
            )),
        }
    }
}

fn inspect_pdf(data: &[u8]) -> Result<DecodedInfo, DecodeError> {
    let doc = Document::load_mem(data).map_err(|e| DecodeError::Corrupt(e.to_string()))?;

    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(DecodeError::Corrupt("page tree has no pages".to_string()));
    }

    Ok(DecodedInfo {
        num_pages: Some(u32::try_from(pages).unwrap_or(u32::MAX)),
        kind: ContentKind::PdfPage,
    })
}

fn decode_image(data: &[u8]) -> Result<DynamicImage, DecodeError> {
    image::load_from_memory(data).map_err(|e| DecodeError::Image(e.to_string()))
}

/// Decode, scale and re-encode a single-page raster image as PNG
pub(crate) fn render_raster(data: &[u8], page_index: u32, scale: f32) -> Result<PageSurface, DecodeError> {
    if page_index != 0 {
        return Err(DecodeError::PageOutOfRange {
            index: page_index,
            count: 1,
        });
    }

    let img = decode_image(data)?;
    let scale = scale.clamp(0.1, 4.0);
    let width = ((img.width() as f32) * scale).round().max(1.0) as u32;
    let height = ((img.height() as f32) * scale).round().max(1.0) as u32;
    let scaled = if width == img.width() && height == img.height() {
        img
    } else {
        img.resize_exact(width, height, FilterType::Triangle)
    };

    encode_png(&scaled)
}

pub(crate) fn encode_png(img: &DynamicImage) -> Result<PageSurface, DecodeError> {
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
        .map_err(|e| DecodeError::Image(e.to_string()))?;
    Ok(PageSurface {
        width: img.width(),
        height: img.height(),
        data: output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::fixtures::{pdf_with_pages, png};

    #[test]
    fn test_counts_pages() {
        let decoder = LopdfDecoder::new();
        let info = decoder.inspect(&pdf_with_pages(12)).unwrap();
        assert_eq!(info.kind, ContentKind::PdfPage);
        assert_eq!(info.num_pages, Some(12));
    }

    #[test]
    fn test_rejects_bad_bytes() {
        let decoder = LopdfDecoder::new();
        assert_eq!(decoder.inspect(b""), Err(DecodeError::InvalidHeader));
        assert_eq!(decoder.inspect(b"<html>oops</html>"), Err(DecodeError::InvalidHeader));
        assert!(matches!(
            decoder.inspect(b"%PDF-1.4\n<< /Type /Pages /Count 2 >>\ntruncated"),
            Err(DecodeError::Corrupt(_))
        ));
    }

    #[test]
    fn test_framed_garbage_is_corrupt() {
        // A proxy error page that happens to carry PDF framing
        let body = b"%PDF-1.7\n<html>gateway timeout, truncated body</html>\n%%EOF";
        assert!(matches!(
            LopdfDecoder::new().inspect(body),
            Err(DecodeError::Corrupt(_))
        ));
    }

    #[test]
    fn test_truncated_pdf_is_corrupt() {
        let data = pdf_with_pages(3);
        let truncated = &data[..data.len() / 2];
        assert!(LopdfDecoder::new().inspect(truncated).is_err());
    }

    #[test]
    fn test_inspects_and_renders_raster_pages() {
        let decoder = LopdfDecoder::new();
        let data = png(10, 4);

        let info = decoder.inspect(&data).unwrap();
        assert_eq!(info.kind, ContentKind::RasterImage);
        assert_eq!(info.num_pages, Some(1));

        let surface = decoder.render(&data, ContentKind::RasterImage, 0, 2.0).unwrap();
        assert_eq!((surface.width, surface.height), (20, 8));
        assert!(surface.data.starts_with(&[0x89, b'P', b'N', b'G']));

        assert!(matches!(
            decoder.render(&data, ContentKind::RasterImage, 1, 1.0),
            Err(DecodeError::PageOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_truncated_image_is_rejected() {
        let data = png(10, 4);
        let truncated = &data[..data.len() / 2];
        assert!(matches!(
            LopdfDecoder::new().inspect(truncated),
            Err(DecodeError::Image(_))
        ));
    }

    #[test]
    fn test_pdf_render_needs_renderer() {
        let result = LopdfDecoder::new().render(&pdf_with_pages(1), ContentKind::PdfPage, 0, 1.0);
        assert!(matches!(result, Err(DecodeError::Unsupported(_))));
    }
}
