//! MuPDF-backed decoder
//!
//! Opens the document per call; split pages are single-page files, so there
//! is nothing worth keeping open between calls.

use image::DynamicImage;
use mupdf::{Colorspace, Document, Matrix};

use crate::document::ContentKind;

use super::pdf_model::{encode_png, render_raster, LopdfDecoder};
use super::{DecodeError, DecodedInfo, PageSurface, PdfDecoder};

const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfDecoder {
    fallback: LopdfDecoder,
}

impl MupdfDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

fn open(data: &[u8]) -> Result<(Document, u32), DecodeError> {
    let doc = Document::from_bytes(data, PDF_MIME).map_err(|e| DecodeError::Corrupt(e.to_string()))?;
    let count = doc
        .page_count()
        .map_err(|e| DecodeError::Corrupt(e.to_string()))?;
    Ok((doc, count.max(0) as u32))
}

impl PdfDecoder for MupdfDecoder {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    fn inspect(&self, data: &[u8]) -> Result<DecodedInfo, DecodeError> {
        match ContentKind::from_magic_bytes(data) {
            Some(ContentKind::PdfPage) => {
                let (_, count) = open(data)?;
                if count == 0 {
                    return Err(DecodeError::Corrupt("document has no pages".to_string()));
                }
                Ok(DecodedInfo {
                    num_pages: Some(count),
                    kind: ContentKind::PdfPage,
                })
            }
            _ => self.fallback.inspect(data),
        }
    }

    fn render(
        &self,
        data: &[u8],
        kind: ContentKind,
        page_index: u32,
        scale: f32,
    ) -> Result<PageSurface, DecodeError> {
        if kind == ContentKind::RasterImage {
            return render_raster(data, page_index, scale);
        }

        let (doc, count) = open(data)?;
        if page_index >= count {
            return Err(DecodeError::PageOutOfRange {
                index: page_index,
                count,
            });
        }

        let page = doc
            .load_page(page_index as i32)
            .map_err(|e| DecodeError::Corrupt(e.to_string()))?;
        let scale = scale.clamp(0.1, 4.0);
        let matrix = Matrix::new_scale(scale, scale);
        let pixmap = page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), true, true)
            .map_err(|e| DecodeError::Corrupt(e.to_string()))?;

        encode_png(&pixmap_to_image(&pixmap)?)
    }
}

fn pixmap_to_image(pixmap: &mupdf::Pixmap) -> Result<DynamicImage, DecodeError> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for pixel in samples.chunks(n.max(1)).take((width * height) as usize) {
        let channel = |i: usize| pixel.get(i).copied().unwrap_or(0);
        let alpha = if n >= 4 { channel(3) } else { 255 };
        rgba.extend_from_slice(&[channel(0), channel(1), channel(2), alpha]);
    }

    image::RgbaImage::from_raw(width, height, rgba)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| DecodeError::Image("Failed to create image buffer".to_string()))
}
