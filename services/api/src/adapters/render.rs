//! services/api/src/adapters/render.rs
//!
//! The `DocumentRenderer` adapter. Text is laid out on a white canvas with the
//! configured font and encoded as PNG; PDFs embed that raster, either on one page
//! or sliced over A4 pages.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use printpdf::{Image, ImageTransform, Mm, PdfDocument, PdfDocumentReference, PdfLayerIndex, PdfPageIndex};
use std::io::{BufWriter, Cursor};
use std::path::PathBuf;
use study_assistant_core::ports::{DocumentRenderer, PageLayout, PortError, PortResult};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const CANVAS_WIDTH_PX: u32 = 1240;
const PADDING_PX: u32 = 60;
const FONT_PX: f32 = 28.0;
const LINE_HEIGHT: f32 = 1.6;
const A4_WIDTH_MM: f32 = 210.0;
const A4_HEIGHT_MM: f32 = 297.0;

pub struct RasterRenderer {
    font_path: Option<PathBuf>,
    font: OnceCell<FontArc>,
}

impl RasterRenderer {
    pub fn new(font_path: Option<PathBuf>) -> Self {
        Self {
            font_path,
            font: OnceCell::new(),
        }
    }

    async fn font(&self) -> PortResult<FontArc> {
        self.font
            .get_or_try_init(|| async {
                let path = self.font_path.as_ref().ok_or_else(|| {
                    PortError::NotFound("no export font configured (EXPORT_FONT_PATH)".to_string())
                })?;
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    PortError::NotFound(format!("font {}: {}", path.display(), e))
                })?;
                let font = FontArc::try_from_vec(bytes)
                    .map_err(|e| PortError::Corrupt(format!("font {}: {}", path.display(), e)))?;
                info!(path = %path.display(), "Export font loaded.");
                Ok::<FontArc, PortError>(font)
            })
            .await
            .cloned()
    }
}

fn join_error(e: tokio::task::JoinError) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// Text layout
//=========================================================================================

fn text_width(font: &FontArc, scale: PxScale, text: &str) -> f32 {
    let scaled = font.as_scaled(scale);
    text.chars().map(|c| scaled.h_advance(scaled.glyph_id(c))).sum()
}

/// Greedy word wrap. Words wider than a whole line are broken between characters.
fn wrap_text(font: &FontArc, scale: PxScale, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split(' ').filter(|w| !w.is_empty()) {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if text_width(font, scale, &candidate) <= max_width {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            for c in word.chars() {
                line.push(c);
                if text_width(font, scale, &line) > max_width && line.chars().count() > 1 {
                    line.pop();
                    lines.push(std::mem::take(&mut line));
                    line.push(c);
                }
            }
        }
        lines.push(line);
    }
    lines
}

fn draw(font: &FontArc, text: &str) -> PortResult<Vec<u8>> {
    let scale = PxScale::from(FONT_PX);
    let max_width = (CANVAS_WIDTH_PX - 2 * PADDING_PX) as f32;
    let lines = wrap_text(font, scale, text, max_width);
    let line_px = (FONT_PX * LINE_HEIGHT).ceil() as u32;
    let height = 2 * PADDING_PX + line_px * lines.len().max(1) as u32;

    let mut canvas = RgbImage::from_pixel(CANVAS_WIDTH_PX, height, Rgb([255, 255, 255]));
    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let y = PADDING_PX + i as u32 * line_px;
        draw_text_mut(&mut canvas, Rgb([26, 26, 26]), PADDING_PX as i32, y as i32, scale, font, line);
    }

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| PortError::Unexpected(format!("PNG encoding failed: {}", e)))?;
    debug!(lines = lines.len(), height, "Rasterized export text.");
    Ok(out.into_inner())
}

//=========================================================================================
// PDF composition
//=========================================================================================

fn place(
    doc: &PdfDocumentReference,
    page: PdfPageIndex,
    layer: PdfLayerIndex,
    raster: &printpdf::image_crate::DynamicImage,
    dpi: f32,
    translate_y: Mm,
) {
    let layer = doc.get_page(page).get_layer(layer);
    Image::from_dynamic_image(raster).add_to_layer(
        layer,
        ImageTransform {
            translate_x: Some(Mm(0.0)),
            translate_y: Some(translate_y),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
}

/// Lays the PNG out at A4 width. A single page takes the raster's own height;
/// multiple pages slice it into A4-tall pieces, the last one anchored at the top.
fn compose(png: &[u8], layout: PageLayout) -> PortResult<Vec<u8>> {
    let raster = printpdf::image_crate::load_from_memory(png)
        .map_err(|e| PortError::Corrupt(format!("raster could not be decoded: {}", e)))?;
    let (width, height) = (raster.width(), raster.height());
    if width == 0 || height == 0 {
        return Err(PortError::Unexpected("raster is empty".to_string()));
    }
    let dpi = width as f32 * 25.4 / A4_WIDTH_MM;
    let to_mm = |px: u32| Mm(px as f32 * 25.4 / dpi);

    let doc = match layout {
        PageLayout::SinglePage => {
            let page_height = to_mm(height);
            let (doc, page, layer) =
                PdfDocument::new("StudyAssistant", Mm(A4_WIDTH_MM), page_height, "Layer 1");
            place(&doc, page, layer, &raster, dpi, Mm(0.0));
            doc
        }
        PageLayout::MultiPage => {
            let slice_px = ((A4_HEIGHT_MM / 25.4) * dpi).floor().max(1.0) as u32;
            let (doc, first_page, first_layer) =
                PdfDocument::new("StudyAssistant", Mm(A4_WIDTH_MM), Mm(A4_HEIGHT_MM), "Layer 1");
            let mut top = 0;
            let mut pages = 0;
            while top < height {
                let slice_height = slice_px.min(height - top);
                let slice = raster.crop_imm(0, top, width, slice_height);
                let (page, layer) = if pages == 0 {
                    (first_page, first_layer)
                } else {
                    doc.add_page(Mm(A4_WIDTH_MM), Mm(A4_HEIGHT_MM), "Layer 1")
                };
                let offset = Mm(A4_HEIGHT_MM - to_mm(slice_height).0);
                place(&doc, page, layer, &slice, dpi, offset);
                top += slice_height;
                pages += 1;
            }
            debug!(pages, "Composed multi-page PDF.");
            doc
        }
    };

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| PortError::Unexpected(format!("PDF save error: {}", e)))?;
    buf.into_inner()
        .map_err(|e| PortError::Unexpected(format!("PDF buffer error: {}", e)))
}

//=========================================================================================
// `DocumentRenderer` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentRenderer for RasterRenderer {
    async fn ensure_fonts(&self) -> PortResult<()> {
        self.font().await.map(|_| ())
    }

    async fn rasterize(&self, text: &str) -> PortResult<Vec<u8>> {
        let font = self.font().await?;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || draw(&font, &text))
            .await
            .map_err(join_error)?
    }

    async fn compose_pdf(&self, png: &[u8], layout: PageLayout) -> PortResult<Vec<u8>> {
        let png = png.to_vec();
        tokio::task::spawn_blocking(move || compose(&png, layout))
            .await
            .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn test_font_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fonts/RobotoMedium.ttf")
    }

    fn test_font() -> FontArc {
        FontArc::try_from_vec(std::fs::read(test_font_path()).unwrap()).unwrap()
    }

    #[test]
    fn long_words_are_broken_and_blank_paragraphs_kept() {
        let font = test_font();
        let scale = PxScale::from(FONT_PX);
        let max_width = 100.0;
        let word = "abcdefghijklmnopqrstuvwxyz";

        let lines = wrap_text(&font, scale, &format!("{}\n\nend", word), max_width);
        let blank = lines.iter().position(|l| l.is_empty()).unwrap();
        assert!(blank >= 2, "lines: {:?}", lines);
        assert_eq!(lines[..blank].concat(), word);
        assert_eq!(lines[blank + 1..], ["end".to_string()]);
        for line in &lines {
            assert!(text_width(&font, scale, line) <= max_width, "too wide: {:?}", line);
        }
    }

    #[test]
    fn short_words_share_a_line() {
        let font = test_font();
        let scale = PxScale::from(FONT_PX);
        assert_eq!(wrap_text(&font, scale, "one  two", 1000.0), ["one two"]);
        assert_eq!(wrap_text(&font, scale, "", 1000.0), [""]);
    }

    #[test]
    fn canvas_height_follows_line_count() {
        let font = test_font();
        let png = draw(&font, "first\nsecond\n\nfourth").unwrap();
        let raster = printpdf::image_crate::load_from_memory(&png).unwrap();
        let line_px = (FONT_PX * LINE_HEIGHT).ceil() as u32;
        assert_eq!(raster.width(), CANVAS_WIDTH_PX);
        assert_eq!(raster.height(), 2 * PADDING_PX + 4 * line_px);
    }

    #[tokio::test]
    async fn configured_font_rasterizes() {
        let renderer = RasterRenderer::new(Some(test_font_path()));
        renderer.ensure_fonts().await.unwrap();
        let png = renderer.rasterize("Chapter 1").await.unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[tokio::test]
    async fn missing_font_is_reported() {
        let renderer = RasterRenderer::new(None);
        assert!(matches!(
            renderer.ensure_fonts().await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn pdfs_are_produced_for_both_layouts() {
        let renderer = RasterRenderer::new(None);
        let png = blank_png(620, 2000);
        let single = renderer.compose_pdf(&png, PageLayout::SinglePage).await.unwrap();
        let multi = renderer.compose_pdf(&png, PageLayout::MultiPage).await.unwrap();
        assert!(single.starts_with(b"%PDF"));
        assert!(multi.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn undecodable_raster_is_corrupt() {
        let renderer = RasterRenderer::new(None);
        assert!(matches!(
            renderer.compose_pdf(b"not a png", PageLayout::SinglePage).await,
            Err(PortError::Corrupt(_))
        ));
    }
}
