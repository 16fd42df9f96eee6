use crate::canvas::{Document, Page};
use crate::error::ComposeError;
use crate::pdf::{ImageData, ResourceWriter, render_page};
use crate::template::{LoadedTemplate, deref_dict, inherited_attribute};
use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};
use std::collections::BTreeMap;
use std::sync::Arc;

const OVERLAY_XOBJECT_NAME: &str = "IntakeOvl";
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Serialized output of a composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPdf {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub images_embedded: usize,
}

fn lopdf_err(err: lopdf::Error) -> ComposeError {
    ComposeError::Compose(err.to_string())
}

fn page_box(page: &Dictionary) -> Vec<LoObject> {
    if let Ok(arr) = page.get(b"CropBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    if let Ok(arr) = page.get(b"MediaBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    vec![0.into(), 0.into(), 612.into(), 792.into()]
}

/// Lower-left corner and size of a page box.
fn box_geometry(bbox: &[LoObject]) -> (f32, f32, f32, f32) {
    let n = |i: usize| bbox.get(i).and_then(|v| v.as_float().ok());
    let (x0, y0) = (n(0).unwrap_or(0.0), n(1).unwrap_or(0.0));
    let (x1, y1) = (n(2).unwrap_or(612.0), n(3).unwrap_or(792.0));
    (x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs())
}

fn page_resources_dict(page: &Dictionary, doc: &LoDocument) -> Dictionary {
    page.get(b"Resources")
        .ok()
        .and_then(|r| deref_dict(doc, r))
        .cloned()
        .unwrap_or_default()
}

fn page_xobject_dict(resources: &Dictionary, doc: &LoDocument) -> Dictionary {
    resources
        .get(b"XObject")
        .ok()
        .and_then(|x| deref_dict(doc, x))
        .cloned()
        .unwrap_or_default()
}

fn content_refs(page: &Dictionary, doc: &LoDocument) -> Vec<LoObject> {
    match page.get(b"Contents") {
        Ok(LoObject::Reference(id)) => match doc.get_object(*id) {
            Ok(LoObject::Array(items)) => items.clone(),
            _ => vec![LoObject::Reference(*id)],
        },
        Ok(LoObject::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn import_document_objects(dst: &mut LoDocument, mut src: LoDocument) -> Result<Vec<LoObjectId>, ComposeError> {
    if src.is_encrypted() {
        return Err(ComposeError::Configuration(
            "template PDF is encrypted".to_string(),
        ));
    }
    let start_id = dst.max_id + 1;
    src.renumber_objects_with(start_id);
    let page_ids: Vec<LoObjectId> = src.get_pages().values().copied().collect();
    if src.max_id > dst.max_id {
        dst.max_id = src.max_id;
    }
    dst.objects.extend(src.objects);
    Ok(page_ids)
}

/// Accumulates output pages into a fresh lopdf document. Generated pages and
/// imported template pages share one page tree and one resource writer.
pub struct PdfComposer {
    out: LoDocument,
    pages_id: LoObjectId,
    kids: Vec<LoObject>,
    resources: ResourceWriter,
}

impl Default for PdfComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfComposer {
    pub fn new() -> Self {
        let mut out = LoDocument::with_version("1.7");
        let pages_id = out.new_object_id();
        Self {
            out,
            pages_id,
            kids: Vec::new(),
            resources: ResourceWriter::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Appends every page of a generated document as a new output page.
    pub fn append_document(&mut self, doc: &Document) -> Result<usize, ComposeError> {
        let media_box: Vec<LoObject> = vec![
            0.into(),
            0.into(),
            doc.page_size.width.to_f32().into(),
            doc.page_size.height.to_f32().into(),
        ];
        for page in &doc.pages {
            let rendered = render_page(page);
            let resources = self.resources.resources(&mut self.out, &rendered, &doc.images);
            let content_id = self
                .out
                .add_object(LoStream::new(dictionary! {}, rendered.content));
            let page_id = self.out.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_id,
                "MediaBox" => LoObject::Array(media_box.clone()),
                "Contents" => content_id,
                "Resources" => resources,
            });
            self.kids.push(LoObject::Reference(page_id));
        }
        Ok(doc.pages.len())
    }

    /// Moves the template's objects into the output and returns its page ids
    /// in page order. Nothing is added to the page tree yet.
    pub fn import_template(&mut self, template: LoadedTemplate) -> Result<Vec<LoObjectId>, ComposeError> {
        import_document_objects(&mut self.out, template.document)
    }

    /// Adds an imported template page to the output. Inherited attributes are
    /// copied onto the page, the original content is isolated in `q`/`Q`, and
    /// the overlay (if any) is drawn as a Form XObject on top.
    pub fn append_template_page(
        &mut self,
        page_id: LoObjectId,
        overlay: Option<&Page>,
        images: &BTreeMap<String, Arc<ImageData>>,
    ) -> Result<(), ComposeError> {
        let mut page = self
            .out
            .get_object(page_id)
            .and_then(LoObject::as_dict)
            .map_err(lopdf_err)?
            .clone();
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(&self.out, page_id, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        if !page.has(b"MediaBox") {
            page.set("MediaBox", LoObject::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]));
        }

        let mut contents = content_refs(&page, &self.out);
        if !contents.is_empty() {
            let open_id = self.out.add_object(LoStream::new(dictionary! {}, b"q\n".to_vec()));
            let close_id = self.out.add_object(LoStream::new(dictionary! {}, b"\nQ\n".to_vec()));
            contents.insert(0, LoObject::Reference(open_id));
            contents.push(LoObject::Reference(close_id));
        }

        if let Some(overlay) = overlay.filter(|p| !p.is_blank()) {
            let rendered = render_page(overlay);
            let form_resources = self.resources.resources(&mut self.out, &rendered, images);
            let (dx, dy, width, height) = box_geometry(&page_box(&page));
            let form_id = self.out.add_object(LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "FormType" => 1,
                    "BBox" => LoObject::Array(vec![0.into(), 0.into(), width.into(), height.into()]),
                    "Resources" => form_resources,
                },
                rendered.content,
            ));

            let mut resources = page_resources_dict(&page, &self.out);
            let mut xobjects = page_xobject_dict(&resources, &self.out);
            xobjects.set(OVERLAY_XOBJECT_NAME, LoObject::Reference(form_id));
            resources.set("XObject", LoObject::Dictionary(xobjects));
            page.set("Resources", LoObject::Dictionary(resources));

            let do_content =
                format!("q 1 0 0 1 {} {} cm /{} Do Q\n", dx, dy, OVERLAY_XOBJECT_NAME).into_bytes();
            let do_id = self.out.add_object(LoStream::new(dictionary! {}, do_content));
            contents.push(LoObject::Reference(do_id));
        }

        page.set("Contents", LoObject::Array(contents));
        page.set("Parent", LoObject::Reference(self.pages_id));
        self.out.objects.insert(page_id, LoObject::Dictionary(page));
        self.kids.push(LoObject::Reference(page_id));
        Ok(())
    }

    /// Writes the page tree and catalog, then prunes, renumbers, compresses
    /// and serializes the document.
    pub fn finish(mut self) -> Result<ComposedPdf, ComposeError> {
        if self.kids.is_empty() {
            return Err(ComposeError::Compose("no pages to write".to_string()));
        }
        let page_count = self.kids.len();
        self.out.objects.insert(
            self.pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = self.out.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.out.trailer.set("Root", catalog_id);
        self.out.prune_objects();
        self.out.renumber_objects();
        self.out.compress();
        let mut bytes = Vec::new();
        self.out.save_to(&mut bytes)?;
        Ok(ComposedPdf {
            bytes,
            page_count,
            images_embedded: self.resources.image_count(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::font::StandardFont;
    use crate::pdf::{ImageKind, decode_image_bytes};
    use crate::signature::test_images::png_bytes;
    use crate::template::TemplateAsset;
    use crate::template::test_pdfs::template_pdf_bytes;
    use crate::types::{Pt, Rect, Size};

    pub(crate) fn page_text(doc: &LoDocument, page_number: u32) -> String {
        let page_id = doc.get_pages()[&page_number];
        let content = doc.get_page_content(page_id).expect("content");
        String::from_utf8_lossy(&content).into_owned()
    }

    fn generated(texts: &[&str]) -> Document {
        let mut canvas = Canvas::new(Size::letter());
        for text in texts {
            canvas.set_font(StandardFont::Helvetica, Pt::from_i32(10));
            canvas.draw_string(Pt::from_i32(50), Pt::from_i32(700), *text);
            canvas.show_page();
        }
        canvas.finish()
    }

    #[test]
    fn finish_requires_pages() {
        let err = PdfComposer::new().finish().expect_err("empty");
        assert!(matches!(err, ComposeError::Compose(_)));
    }

    #[test]
    fn generated_pages_precede_template_pages() {
        let template = TemplateAsset::from_bytes(template_pdf_bytes(5)).load().expect("template");
        let mut composer = PdfComposer::new();
        composer.append_document(&generated(&["SUMMARY ONE", "SUMMARY TWO"])).expect("summary");
        let ids = composer.import_template(template).expect("import");
        assert_eq!(ids.len(), 5);
        for id in &ids[1..4] {
            composer.append_template_page(*id, None, &BTreeMap::new()).expect("page");
        }
        let out = composer.finish().expect("finish");
        assert_eq!(out.page_count, 5);

        let doc = LoDocument::load_mem(&out.bytes).expect("reload");
        assert_eq!(doc.get_pages().len(), 5);
        assert!(page_text(&doc, 1).contains("SUMMARY ONE"));
        assert!(page_text(&doc, 2).contains("SUMMARY TWO"));
        assert!(page_text(&doc, 3).contains("TEMPLATE PAGE 2"));
        assert!(page_text(&doc, 4).contains("TEMPLATE PAGE 3"));
        assert!(page_text(&doc, 5).contains("TEMPLATE PAGE 4"));
    }

    #[test]
    fn template_pages_get_flattened_attributes_and_overlay_form() {
        let template = TemplateAsset::from_bytes(template_pdf_bytes(4)).load().expect("template");
        let mut composer = PdfComposer::new();
        let ids = composer.import_template(template).expect("import");

        let mut canvas = Canvas::new(Size::letter());
        let image = decode_image_bytes(&png_bytes(4, 2), ImageKind::Png).expect("png");
        let image_id = canvas.register_image(image);
        canvas.draw_image(
            Rect::new(Pt::from_i32(100), Pt::from_i32(100), Pt::from_i32(40), Pt::from_i32(20)),
            image_id,
        );
        canvas.set_font(StandardFont::Helvetica, Pt::from_i32(10));
        canvas.draw_string(Pt::from_i32(100), Pt::from_i32(90), "STAMPED");
        let overlay = canvas.finish();

        composer
            .append_template_page(ids[1], overlay.pages.first(), &overlay.images)
            .expect("page");
        let out = composer.finish().expect("finish");
        assert_eq!(out.images_embedded, 1);

        let doc = LoDocument::load_mem(&out.bytes).expect("reload");
        let page_id = *doc.get_pages().get(&1).expect("page 1");
        let page = doc.get_object(page_id).and_then(LoObject::as_dict).expect("dict");
        assert!(page.has(b"MediaBox"));
        let resources = page_resources_dict(page, &doc);
        assert!(resources.has(b"Font"));
        let xobjects = page_xobject_dict(&resources, &doc);
        assert!(xobjects.has(OVERLAY_XOBJECT_NAME.as_bytes()));

        let content = doc.get_page_content(page_id).expect("content");
        let content = String::from_utf8_lossy(&content);
        assert!(content.starts_with("q\n"));
        assert!(content.contains("TEMPLATE PAGE 2"));
        assert!(content.trim_end().ends_with("/IntakeOvl Do Q"));
    }

    #[test]
    fn blank_overlay_adds_no_form() {
        let template = TemplateAsset::from_bytes(template_pdf_bytes(4)).load().expect("template");
        let mut composer = PdfComposer::new();
        let ids = composer.import_template(template).expect("import");
        let blank = Page::default();
        composer
            .append_template_page(ids[3], Some(&blank), &BTreeMap::new())
            .expect("page");
        let out = composer.finish().expect("finish");
        let doc = LoDocument::load_mem(&out.bytes).expect("reload");
        let page_id = *doc.get_pages().get(&1).expect("page 1");
        let page = doc.get_object(page_id).and_then(LoObject::as_dict).expect("dict");
        let resources = page_resources_dict(page, &doc);
        assert!(!page_xobject_dict(&resources, &doc).has(OVERLAY_XOBJECT_NAME.as_bytes()));
    }
}
