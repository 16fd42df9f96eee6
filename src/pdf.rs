use crate::canvas::{Command, Page};
use crate::font::{StandardFont, winansi_code};
use crate::types::{Color, Pt};
use image::GenericImageView;
use sha2::{Digest, Sha256};
use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }
}

/// Pixel data ready to become an image XObject. `filter` is the stream's
/// existing encoding; `None` means raw samples the writer may compress.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
    pub bits_per_component: u8,
    pub filter: Option<&'static str>,
    pub data: Vec<u8>,
    pub alpha: Option<AlphaData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlphaData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn raw_rgb(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            color_space: "DeviceRGB",
            bits_per_component: 8,
            filter: None,
            data,
            alpha: None,
        }
    }

    /// Bytes identifying the image content, for deduplication.
    pub fn content_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 16);
        out.extend_from_slice(&self.width.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.data);
        if let Some(alpha) = &self.alpha {
            out.extend_from_slice(&alpha.data);
        }
        out
    }
}

/// Decodes PNG or JPEG bytes by their declared kind. Gray and RGB JPEG data
/// passes through untouched as a DCT stream; PNG and four-component (CMYK or
/// YCCK) JPEG become RGB samples, PNG with an optional soft mask.
pub fn decode_image_bytes(data: &[u8], kind: ImageKind) -> Option<ImageData> {
    let format = match kind {
        ImageKind::Png => image::ImageFormat::Png,
        ImageKind::Jpeg => image::ImageFormat::Jpeg,
    };
    let decoded = image::load_from_memory_with_format(data, format).ok()?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    if kind == ImageKind::Jpeg && matches!(jpeg_component_count(data), Some(1 | 3)) {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => "DeviceGray",
            _ => "DeviceRGB",
        };
        return Some(ImageData {
            width,
            height,
            color_space,
            bits_per_component: 8,
            filter: Some("DCTDecode"),
            data: data.to_vec(),
            alpha: None,
        });
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    Some(ImageData {
        width,
        height,
        color_space: "DeviceRGB",
        bits_per_component: 8,
        filter: None,
        data: rgb,
        alpha: has_alpha.then_some(AlphaData {
            width,
            height,
            data: alpha,
        }),
    })
}

/// Component count from the first frame header, or `None` when no frame
/// header precedes the scan.
pub(crate) fn jpeg_component_count(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut i = 2usize;
    while i + 1 < bytes.len() {
        while i < bytes.len() && bytes[i] != 0xFF {
            i += 1;
        }
        while i < bytes.len() && bytes[i] == 0xFF {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let marker = bytes[i];
        i += 1;
        if marker == 0xD9 || marker == 0xDA {
            break;
        }
        if i + 1 >= bytes.len() {
            break;
        }
        let seg_len = u16::from_be_bytes([bytes[i], bytes[i + 1]]) as usize;
        if seg_len < 2 || i + seg_len > bytes.len() {
            break;
        }
        let is_sof = matches!(
            marker,
            0xC0 | 0xC1 | 0xC2 | 0xC3 | 0xC5 | 0xC6 | 0xC7 | 0xC9 | 0xCA | 0xCB | 0xCD | 0xCE | 0xCF
        );
        if is_sof && seg_len >= 8 {
            // precision(1) height(2) width(2) components(1)
            return Some(bytes[i + 7]);
        }
        i += seg_len;
    }
    None
}

/// Content stream bytes for one page plus the resources it references.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    pub content: Vec<u8>,
    pub fonts: BTreeSet<StandardFont>,
    pub images: BTreeSet<String>,
    pub opacities: BTreeSet<u16>,
    pub replaced_chars: usize,
}

impl RenderedPage {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

pub fn render_page(page: &Page) -> RenderedPage {
    let mut out = RenderedPage::default();
    let mut content = String::new();
    let mut font = (StandardFont::Helvetica, Pt::from_i32(12));

    for command in &page.commands {
        match command {
            Command::SaveState => content.push_str("q\n"),
            Command::RestoreState => content.push_str("Q\n"),
            Command::SetFillColor(color) => content.push_str(&color_op(*color, "rg")),
            Command::SetStrokeColor(color) => content.push_str(&color_op(*color, "RG")),
            Command::SetLineWidth(width) => {
                let _ = writeln!(content, "{} w", fmt_pt(*width));
            }
            Command::SetOpacity(alpha) => {
                let milli = opacity_milli(*alpha);
                out.opacities.insert(milli);
                let _ = writeln!(content, "/{} gs", extgstate_name(milli));
            }
            Command::SetFont { font: f, size } => font = (*f, *size),
            Command::MoveTo { x, y } => {
                let _ = writeln!(content, "{} {} m", fmt_pt(*x), fmt_pt(*y));
            }
            Command::LineTo { x, y } => {
                let _ = writeln!(content, "{} {} l", fmt_pt(*x), fmt_pt(*y));
            }
            Command::Stroke => content.push_str("S\n"),
            Command::StrokeRect(rect) => {
                let _ = writeln!(
                    content,
                    "{} {} {} {} re S",
                    fmt_pt(rect.x),
                    fmt_pt(rect.y),
                    fmt_pt(rect.width),
                    fmt_pt(rect.height)
                );
            }
            Command::DrawString { x, y, text } => {
                let encoded = encode_winansi_pdf_string(text);
                out.replaced_chars += encoded.replaced;
                out.fonts.insert(font.0);
                let _ = writeln!(
                    content,
                    "BT /{} {} Tf {} {} Td ({}) Tj ET",
                    font.0.resource_name(),
                    fmt_pt(font.1),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    encoded.text
                );
            }
            Command::DrawImage { rect, resource_id } => {
                out.images.insert(resource_id.clone());
                let _ = writeln!(
                    content,
                    "q {} 0 0 {} {} {} cm /{} Do Q",
                    fmt_pt(rect.width),
                    fmt_pt(rect.height),
                    fmt_pt(rect.x),
                    fmt_pt(rect.y),
                    resource_id
                );
            }
        }
    }

    if out.replaced_chars > 0 {
        tracing::warn!(
            replaced = out.replaced_chars,
            "text outside WinAnsi replaced with '?'"
        );
    }
    out.content = content.into_bytes();
    out
}

/// Writes font, image and graphics-state objects into a lopdf document,
/// sharing each object across every page that references it. Images are keyed
/// by content digest since resource names are only unique within one canvas.
#[derive(Debug, Default)]
pub struct ResourceWriter {
    fonts: BTreeMap<StandardFont, LoObjectId>,
    images: BTreeMap<[u8; 32], LoObjectId>,
    states: BTreeMap<u16, LoObjectId>,
}

impl ResourceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    fn font_id(&mut self, doc: &mut LoDocument, font: StandardFont) -> LoObjectId {
        *self.fonts.entry(font).or_insert_with(|| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            })
        })
    }

    fn state_id(&mut self, doc: &mut LoDocument, milli: u16) -> LoObjectId {
        *self.states.entry(milli).or_insert_with(|| {
            let alpha = milli as f32 / 1000.0;
            doc.add_object(dictionary! {
                "Type" => "ExtGState",
                "ca" => alpha,
                "CA" => alpha,
            })
        })
    }

    fn image_id(&mut self, doc: &mut LoDocument, image: &ImageData) -> LoObjectId {
        let digest: [u8; 32] = Sha256::digest(image.content_bytes()).into();
        if let Some(id) = self.images.get(&digest) {
            return *id;
        }
        let smask = image.alpha.as_ref().map(|alpha| {
            doc.add_object(LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => alpha.width as i64,
                    "Height" => alpha.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha.data.clone(),
            ))
        });
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => image.color_space,
            "BitsPerComponent" => image.bits_per_component as i64,
        };
        if let Some(filter) = image.filter {
            dict.set("Filter", LoObject::Name(filter.as_bytes().to_vec()));
        }
        if let Some(mask_id) = smask {
            dict.set("SMask", LoObject::Reference(mask_id));
        }
        let mut stream = LoStream::new(dict, image.data.clone());
        stream.allows_compression = image.filter.is_none();
        let id = doc.add_object(stream);
        self.images.insert(digest, id);
        id
    }

    /// Resource dictionary for a rendered page. Image names missing from
    /// `images` are skipped.
    pub fn resources(
        &mut self,
        doc: &mut LoDocument,
        page: &RenderedPage,
        images: &BTreeMap<String, Arc<ImageData>>,
    ) -> Dictionary {
        let mut resources = Dictionary::new();
        if !page.fonts.is_empty() {
            let mut fonts = Dictionary::new();
            for font in &page.fonts {
                let id = self.font_id(doc, *font);
                fonts.set(font.resource_name(), LoObject::Reference(id));
            }
            resources.set("Font", LoObject::Dictionary(fonts));
        }
        if !page.images.is_empty() {
            let mut xobjects = Dictionary::new();
            for name in &page.images {
                let Some(image) = images.get(name) else {
                    tracing::warn!(image = %name, "drawn image was never registered");
                    continue;
                };
                let id = self.image_id(doc, image);
                xobjects.set(name.as_bytes().to_vec(), LoObject::Reference(id));
            }
            resources.set("XObject", LoObject::Dictionary(xobjects));
        }
        if !page.opacities.is_empty() {
            let mut states = Dictionary::new();
            for milli in &page.opacities {
                let id = self.state_id(doc, *milli);
                states.set(extgstate_name(*milli).into_bytes(), LoObject::Reference(id));
            }
            resources.set("ExtGState", LoObject::Dictionary(states));
        }
        resources
    }
}

fn opacity_milli(alpha: f32) -> u16 {
    (alpha.clamp(0.0, 1.0) * 1000.0).round() as u16
}

fn extgstate_name(milli: u16) -> String {
    format!("GS{}", milli)
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = winansi_code(ch).unwrap_or_else(|| {
            replaced += 1;
            b'?'
        });
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if b < 0x20 || b >= 0x7f => {
                let _ = write!(out, "\\{:03o}", b);
            }
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

pub(crate) fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        return format!("{}{}", sign, int_part);
    }
    let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
    while s.ends_with('0') {
        s.pop();
    }
    s
}

pub(crate) fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn fmt_unit(value: f32) -> String {
    let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    format_milli((value * 1000.0).round() as i64)
}

fn color_op(color: Color, op: &str) -> String {
    format!(
        "{} {} {} {}\n",
        fmt_unit(color.r),
        fmt_unit(color.g),
        fmt_unit(color.b),
        op
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::signature::test_images::{cmyk_jpeg_bytes, jpeg_bytes, png_bytes};
    use crate::types::{Rect, Size};

    #[test]
    fn format_milli_trims_trailing_zeros() {
        assert_eq!(format_milli(0), "0");
        assert_eq!(format_milli(742_000), "742");
        assert_eq!(format_milli(87_740), "87.74");
        assert_eq!(format_milli(-1_500), "-1.5");
        assert_eq!(format_milli(5), "0.005");
    }

    #[test]
    fn winansi_escapes_delimiters_and_replaces_unmapped() {
        let encoded = encode_winansi_pdf_string("a(b)\\ \u{00e9} \u{2014} \u{4e2d}");
        assert_eq!(encoded.text, "a\\(b\\)\\\\ \\351 \\227 ?");
        assert_eq!(encoded.replaced, 1);
    }

    #[test]
    fn render_page_emits_text_lines_and_images() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.set_font(StandardFont::HelveticaBold, Pt::from_i32(18));
        canvas.draw_string(Pt::from_i32(50), Pt::from_i32(742), "Title");
        canvas.set_stroke_color(Color::gray(0.8));
        canvas.line(Pt::from_i32(50), Pt::from_i32(700), Pt::from_i32(562), Pt::from_i32(700));
        canvas.set_opacity(0.5);
        let image = decode_image_bytes(&png_bytes(2, 2), ImageKind::Png).expect("png");
        let id = canvas.register_image(image);
        canvas.draw_image(
            Rect::new(Pt::from_i32(10), Pt::from_i32(742), Pt::from_i32(5), Pt::from_i32(30)),
            id.clone(),
        );
        let doc = canvas.finish();
        let rendered = render_page(&doc.pages[0]);
        let text = String::from_utf8(rendered.content.clone()).expect("utf8");
        assert!(text.contains("BT /F2 18 Tf 50 742 Td (Title) Tj ET"));
        assert!(text.contains("0.8 0.8 0.8 RG"));
        assert!(text.contains("50 700 m\n562 700 l\nS"));
        assert!(text.contains("/GS500 gs"));
        assert!(text.contains(&format!("q 5 0 0 30 10 742 cm /{} Do Q", id)));
        assert!(rendered.fonts.contains(&StandardFont::HelveticaBold));
        assert!(rendered.images.contains(&id));
    }

    #[test]
    fn decode_png_with_alpha_produces_soft_mask() {
        let image = decode_image_bytes(&png_bytes(4, 2), ImageKind::Png).expect("png");
        assert_eq!(image.data.len(), 4 * 2 * 3);
        assert_eq!(image.filter, None);
        assert_eq!(image.alpha.as_ref().map(|a| a.data.len()), Some(8));
    }

    #[test]
    fn decode_rgb_jpeg_passes_through_as_dct() {
        let bytes = jpeg_bytes(3, 2);
        assert_eq!(jpeg_component_count(&bytes), Some(3));
        let image = decode_image_bytes(&bytes, ImageKind::Jpeg).expect("jpeg");
        assert_eq!(image.color_space, "DeviceRGB");
        assert_eq!(image.filter, Some("DCTDecode"));
        assert_eq!(image.data, bytes);
    }

    #[test]
    fn decode_cmyk_jpeg_becomes_rgb_samples() {
        let bytes = cmyk_jpeg_bytes();
        assert_eq!(jpeg_component_count(&bytes), Some(4));
        let image = decode_image_bytes(&bytes, ImageKind::Jpeg).expect("cmyk");
        assert_eq!((image.width, image.height), (8, 8));
        assert_eq!(image.color_space, "DeviceRGB");
        assert_eq!(image.filter, None);
        assert_eq!(image.data.len(), 8 * 8 * 3);
        assert!(image.alpha.is_none());
    }

    #[test]
    fn component_count_needs_a_frame_header() {
        assert_eq!(jpeg_component_count(&png_bytes(2, 2)), None);
        assert_eq!(jpeg_component_count(&[0xFF, 0xD8, 0xFF, 0xD9]), None);
    }

    #[test]
    fn decode_rejects_mismatched_kind() {
        assert!(decode_image_bytes(&png_bytes(2, 2), ImageKind::Jpeg).is_none());
        assert!(decode_image_bytes(&jpeg_bytes(2, 2), ImageKind::Png).is_none());
        assert!(decode_image_bytes(b"\0\0\0", ImageKind::Png).is_none());
    }

    #[test]
    fn resource_writer_shares_objects_between_pages() {
        let mut canvas = Canvas::new(Size::letter());
        let image = decode_image_bytes(&jpeg_bytes(3, 3), ImageKind::Jpeg).expect("jpeg");
        let id = canvas.register_image(image);
        let rect = Rect::new(Pt::ZERO, Pt::ZERO, Pt::from_i32(3), Pt::from_i32(3));
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "a");
        canvas.draw_image(rect, id.clone());
        canvas.show_page();
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "b");
        canvas.draw_image(rect, id.clone());
        let doc = canvas.finish();

        let mut lo = LoDocument::with_version("1.7");
        let mut writer = ResourceWriter::new();
        let first = writer.resources(&mut lo, &render_page(&doc.pages[0]), &doc.images);
        let second = writer.resources(&mut lo, &render_page(&doc.pages[1]), &doc.images);
        assert_eq!(writer.image_count(), 1);
        let image_ref = |resources: &Dictionary| {
            resources
                .get(b"XObject")
                .and_then(LoObject::as_dict)
                .and_then(|x| x.get(id.as_bytes()))
                .and_then(LoObject::as_reference)
                .expect("ref")
        };
        let image_id = image_ref(&first);
        assert_eq!(image_id, image_ref(&second));
        let stream = lo.get_object(image_id).and_then(LoObject::as_stream).expect("stream");
        assert!(!stream.allows_compression);
        assert_eq!(
            stream.dict.get(b"Filter").and_then(LoObject::as_name).expect("filter"),
            b"DCTDecode"
        );
    }
}
