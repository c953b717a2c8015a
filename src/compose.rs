use crate::canvas::Layer;
use crate::debug::DebugLog;
use crate::error::FormStampError;
use crate::overlay::{OverlaySet, SIGNATURE_RESOURCE_ID};
use crate::pdf::{embed_signature_xobject, layer_resources, render_layer};
use crate::types::Size;
use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    dictionary,
};
use sha2::{Digest, Sha256};
use std::path::Path;

const BOX_LOOKUP_DEPTH: usize = 10;

fn lopdf_err(err: lopdf::Error) -> FormStampError {
    FormStampError::InvalidConfiguration(format!("pdf compose error: {err}"))
}

/// The fixed-layout template document. Loaded once, held as raw bytes plus
/// the parsed per-page boxes; every compose run re-parses from the cached
/// bytes so the in-memory template is never mutated and can be shared
/// read-only across concurrent requests.
#[derive(Debug)]
pub struct Template {
    bytes: Vec<u8>,
    boxes: Vec<[f32; 4]>,
    sizes: Vec<Size>,
    sha256: String,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self, FormStampError> {
        if !path.exists() {
            return Err(FormStampError::TemplateMissing(path.to_path_buf()));
        }
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FormStampError> {
        let doc = LoDocument::load_mem(&bytes).map_err(lopdf_err)?;
        if doc.is_encrypted() {
            return Err(FormStampError::InvalidConfiguration(
                "template PDF is encrypted".to_string(),
            ));
        }
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(FormStampError::InvalidConfiguration(
                "template PDF has no pages".to_string(),
            ));
        }

        let mut boxes = Vec::with_capacity(pages.len());
        let mut sizes = Vec::with_capacity(pages.len());
        for (index, page_id) in pages.values().enumerate() {
            let page = doc
                .get_object(*page_id)
                .and_then(LoObject::as_dict)
                .map_err(lopdf_err)?;
            let page_box = page_box(&doc, page);
            let size = Size::new(page_box[2] - page_box[0], page_box[3] - page_box[1]);
            if size.width <= 0.0 || size.height <= 0.0 {
                return Err(FormStampError::InvalidConfiguration(format!(
                    "template page {} has degenerate dimensions {}x{}",
                    index + 1,
                    size.width,
                    size.height
                )));
            }
            boxes.push(page_box);
            sizes.push(size);
        }

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();
        let mut sha256 = String::with_capacity(64);
        for byte in digest {
            sha256.push_str(&format!("{:02x}", byte));
        }

        Ok(Self {
            bytes,
            boxes,
            sizes,
            sha256,
        })
    }

    pub fn page_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn page_sizes(&self) -> &[Size] {
        &self.sizes
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeSummary {
    pub pages_written: usize,
    pub lossy_chars: usize,
}

/// Composite each template page with its overlay layer and, when requested,
/// a grid layer, into a brand-new document. Every output page is built fresh:
/// the template page's content and resources become a Form XObject painted
/// first, the overlay and grid forms paint on top, back to front. Page count
/// and page boxes always match the template.
pub(crate) fn compose(
    template: &Template,
    overlays: &OverlaySet,
    grid_layers: Option<&[Layer]>,
    debug: Option<&DebugLog>,
) -> Result<(Vec<u8>, ComposeSummary), FormStampError> {
    if overlays.layers.len() != template.page_count() {
        return Err(FormStampError::InvalidConfiguration(format!(
            "overlay/template page count mismatch (overlay={}, template={})",
            overlays.layers.len(),
            template.page_count()
        )));
    }
    if let Some(grids) = grid_layers {
        if grids.len() != template.page_count() {
            return Err(FormStampError::InvalidConfiguration(format!(
                "grid/template page count mismatch (grid={}, template={})",
                grids.len(),
                template.page_count()
            )));
        }
    }

    let src = LoDocument::load_mem(&template.bytes).map_err(lopdf_err)?;
    let mut composed = LoDocument::with_version("1.7");
    let template_page_ids = import_document_objects(&mut composed, src)?;

    let signature_id = overlays
        .signature
        .as_ref()
        .map(|fitted| embed_signature_xobject(&mut composed, fitted));

    let pages_id = composed.new_object_id();
    let mut kids: Vec<LoObject> = Vec::with_capacity(template_page_ids.len());
    let mut lossy_chars = 0usize;

    for (idx, template_page_id) in template_page_ids.iter().enumerate() {
        let template_page = composed
            .get_object(*template_page_id)
            .and_then(LoObject::as_dict)
            .map_err(lopdf_err)?
            .clone();
        let template_content = composed
            .get_page_content(*template_page_id)
            .map_err(lopdf_err)?;
        let template_resources = page_resources_object(&composed, &template_page);
        let bbox: Vec<LoObject> = template.boxes[idx]
            .iter()
            .map(|v| LoObject::Real(*v))
            .collect();

        let template_form_id = composed.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "FormType" => 1,
                "BBox" => LoObject::Array(bbox.clone()),
                "Resources" => template_resources,
            },
            template_content,
        ));

        let rendered_overlay = render_layer(&overlays.layers[idx]);
        lossy_chars += rendered_overlay.lossy_chars;
        let overlay_resources = layer_resources(&rendered_overlay, |resource_id| {
            (resource_id == SIGNATURE_RESOURCE_ID)
                .then_some(signature_id)
                .flatten()
        })?;
        let overlay_form_id = composed.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "FormType" => 1,
                "BBox" => LoObject::Array(bbox.clone()),
                "Resources" => LoObject::Dictionary(overlay_resources),
            },
            rendered_overlay.content,
        ));

        let grid_form_id = match grid_layers {
            Some(grids) => {
                let rendered_grid = render_layer(&grids[idx]);
                let grid_resources = layer_resources(&rendered_grid, |_| None)?;
                Some(composed.add_object(LoStream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Form",
                        "FormType" => 1,
                        "BBox" => LoObject::Array(bbox.clone()),
                        "Resources" => LoObject::Dictionary(grid_resources),
                    },
                    rendered_grid.content,
                )))
            }
            None => None,
        };

        let mut page_content = format!(
            "q /FS_TPL_{} Do Q\nq /FS_OVL_{} Do Q\n",
            idx + 1,
            idx + 1
        );
        if grid_form_id.is_some() {
            page_content.push_str(&format!("q /FS_GRID_{} Do Q\n", idx + 1));
        }
        let page_content_id =
            composed.add_object(LoStream::new(dictionary! {}, page_content.into_bytes()));

        let mut xobjects = lopdf::Dictionary::new();
        xobjects.set(
            format!("FS_TPL_{}", idx + 1).into_bytes(),
            LoObject::Reference(template_form_id),
        );
        xobjects.set(
            format!("FS_OVL_{}", idx + 1).into_bytes(),
            LoObject::Reference(overlay_form_id),
        );
        if let Some(grid_id) = grid_form_id {
            xobjects.set(
                format!("FS_GRID_{}", idx + 1).into_bytes(),
                LoObject::Reference(grid_id),
            );
        }

        let page_id = composed.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => page_content_id,
            "Resources" => dictionary! {
                "XObject" => LoObject::Dictionary(xobjects),
            },
            "MediaBox" => LoObject::Array(bbox),
        });
        kids.push(LoObject::Reference(page_id));
    }

    let pages_written = kids.len();
    composed.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages_written as i64,
        }),
    );
    let catalog_id = composed.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    composed.trailer.set("Root", catalog_id);
    composed.prune_objects();
    composed.renumber_objects();
    composed.compress();

    let mut out = Vec::new();
    composed.save_to(&mut out)?;

    if let Some(logger) = debug {
        logger.increment("compose.pages_written", pages_written as u64);
        if lossy_chars > 0 {
            logger.log_event(
                "compose.lossy_text",
                &[("replaced", lossy_chars.to_string())],
            );
        }
    }

    Ok((
        out,
        ComposeSummary {
            pages_written,
            lossy_chars,
        },
    ))
}

fn import_document_objects(
    dst: &mut LoDocument,
    mut src: LoDocument,
) -> Result<Vec<LoObjectId>, FormStampError> {
    if src.is_encrypted() {
        return Err(FormStampError::InvalidConfiguration(
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

fn page_resources_object(doc: &LoDocument, page: &lopdf::Dictionary) -> LoObject {
    match page.get(b"Resources") {
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .map(|object| object.clone())
            .unwrap_or_else(|_| LoObject::Dictionary(lopdf::Dictionary::new())),
        Ok(LoObject::Dictionary(dict)) => LoObject::Dictionary(dict.clone()),
        _ => LoObject::Dictionary(lopdf::Dictionary::new()),
    }
}

/// CropBox when present, else MediaBox, walking up the page tree with a
/// depth limit for malformed documents. Defaults to US Letter.
fn page_box(doc: &LoDocument, page: &lopdf::Dictionary) -> [f32; 4] {
    resolve_page_box(doc, page, BOX_LOOKUP_DEPTH).unwrap_or([0.0, 0.0, 612.0, 792.0])
}

fn resolve_page_box(
    doc: &LoDocument,
    dict: &lopdf::Dictionary,
    depth: usize,
) -> Option<[f32; 4]> {
    if depth == 0 {
        return None;
    }
    for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
        let Ok(value) = dict.get(key) else {
            continue;
        };
        let array = match value {
            LoObject::Array(array) => Some(array.clone()),
            LoObject::Reference(id) => doc
                .get_object(*id)
                .ok()
                .and_then(|object| object.as_array().ok())
                .cloned(),
            _ => None,
        };
        if let Some(found) = array.as_deref().and_then(box_from_array) {
            return Some(found);
        }
    }
    if let Ok(LoObject::Reference(parent_id)) = dict.get(b"Parent") {
        if let Ok(parent) = doc.get_object(*parent_id).and_then(LoObject::as_dict) {
            return resolve_page_box(doc, parent, depth - 1);
        }
    }
    None
}

fn box_from_array(array: &[LoObject]) -> Option<[f32; 4]> {
    if array.len() != 4 {
        return None;
    }
    let mut out = [0.0f32; 4];
    for (slot, object) in out.iter_mut().zip(array) {
        *slot = match object {
            LoObject::Integer(value) => *value as f32,
            LoObject::Real(value) => *value,
            _ => return None,
        };
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{FieldLayout, FieldPosition};
    use crate::overlay::build_overlays;
    use std::collections::BTreeMap;

    fn make_template_pdf(pages: usize, width: f32, height: f32) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids: Vec<LoObject> = Vec::new();
        for index in 0..pages {
            let content =
                format!("BT /F1 18 Tf 72 720 Td (TEMPLATE {}) Tj ET", index + 1).into_bytes();
            let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    LoObject::Real(width),
                    LoObject::Real(height),
                ],
            });
            kids.push(LoObject::Reference(page_id));
        }
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save template");
        out
    }

    fn letter_layout() -> FieldLayout {
        let mut layout = FieldLayout::new(
            "firma",
            FieldPosition {
                page: 0,
                x: 105.0,
                y: 60.0,
            },
            200.0,
            45.0,
        )
        .expect("layout");
        layout
            .insert(
                "apellidos_nombres",
                FieldPosition {
                    page: 0,
                    x: 35.0,
                    y: 708.0,
                },
            )
            .expect("insert");
        layout
    }

    fn empty_overlays(template: &Template) -> OverlaySet {
        build_overlays(
            &letter_layout(),
            &BTreeMap::new(),
            None,
            template.page_sizes(),
            None,
        )
        .expect("overlays")
    }

    #[test]
    fn template_load_rejects_missing_file() {
        let err = Template::load(Path::new("/nonexistent/plantilla.pdf")).expect_err("missing");
        assert!(matches!(err, FormStampError::TemplateMissing(_)));
    }

    #[test]
    fn template_load_rejects_malformed_bytes() {
        let err = Template::from_bytes(b"this is not a pdf".to_vec()).expect_err("malformed");
        assert!(err.to_string().contains("pdf compose error"));
    }

    #[test]
    fn template_parses_page_sizes_and_digest() {
        let template = Template::from_bytes(make_template_pdf(2, 612.0, 792.0)).expect("template");
        assert_eq!(template.page_count(), 2);
        assert_eq!(template.page_sizes()[0], Size::letter());
        assert_eq!(template.sha256().len(), 64);
        let again = Template::from_bytes(make_template_pdf(2, 612.0, 792.0)).expect("template");
        assert_eq!(template.sha256(), again.sha256());
    }

    #[test]
    fn output_page_count_always_matches_the_template() {
        for pages in [1usize, 2, 5] {
            let template =
                Template::from_bytes(make_template_pdf(pages, 612.0, 792.0)).expect("template");
            let overlays = empty_overlays(&template);
            let (bytes, summary) = compose(&template, &overlays, None, None).expect("compose");
            assert_eq!(summary.pages_written, pages);
            let out = LoDocument::load_mem(&bytes).expect("load output");
            assert_eq!(out.get_pages().len(), pages);
        }
    }

    #[test]
    fn output_pages_keep_template_dimensions() {
        let template = Template::from_bytes(make_template_pdf(1, 420.0, 595.0)).expect("template");
        let overlays = empty_overlays(&template);
        let (bytes, _) = compose(&template, &overlays, None, None).expect("compose");
        let out = Template::from_bytes(bytes).expect("reload");
        assert_eq!(out.page_sizes()[0], Size::new(420.0, 595.0));
    }

    #[test]
    fn page_content_invokes_forms_back_to_front() {
        let template = Template::from_bytes(make_template_pdf(1, 612.0, 792.0)).expect("template");
        let overlays = empty_overlays(&template);
        let grids = vec![crate::grid::grid_layer(Size::letter(), 20.0, 100.0)];
        let (bytes, _) = compose(&template, &overlays, Some(&grids), None).expect("compose");
        let out = LoDocument::load_mem(&bytes).expect("load output");
        let pages = out.get_pages();
        let page_id = pages[&1];
        let content = out.get_page_content(page_id).expect("content");
        let text = String::from_utf8_lossy(&content);
        let template_at = text.find("/FS_TPL_1 Do").expect("template form");
        let overlay_at = text.find("/FS_OVL_1 Do").expect("overlay form");
        let grid_at = text.find("/FS_GRID_1 Do").expect("grid form");
        assert!(template_at < overlay_at && overlay_at < grid_at);
    }

    #[test]
    fn overlay_page_count_mismatch_is_rejected() {
        let template = Template::from_bytes(make_template_pdf(2, 612.0, 792.0)).expect("template");
        let one_page = Template::from_bytes(make_template_pdf(1, 612.0, 792.0)).expect("template");
        let overlays = empty_overlays(&one_page);
        let err = compose(&template, &overlays, None, None).expect_err("mismatch");
        assert!(err.to_string().contains("page count mismatch"));
    }

    #[test]
    fn compose_output_is_deterministic() {
        let template = Template::from_bytes(make_template_pdf(2, 612.0, 792.0)).expect("template");
        let values: BTreeMap<String, String> = [(
            "apellidos_nombres".to_string(),
            "DOE JOHN".to_string(),
        )]
        .into();
        let overlays_a = build_overlays(
            &letter_layout(),
            &values,
            None,
            template.page_sizes(),
            None,
        )
        .expect("overlays");
        let overlays_b = build_overlays(
            &letter_layout(),
            &values,
            None,
            template.page_sizes(),
            None,
        )
        .expect("overlays");
        let (bytes_a, _) = compose(&template, &overlays_a, None, None).expect("compose a");
        let (bytes_b, _) = compose(&template, &overlays_b, None, None).expect("compose b");
        assert_eq!(bytes_a, bytes_b, "identical inputs must produce identical bytes");
    }

    #[test]
    fn box_from_array_handles_integers_and_reals() {
        let array = vec![
            LoObject::Integer(0),
            LoObject::Integer(0),
            LoObject::Real(612.0),
            LoObject::Real(792.0),
        ];
        assert_eq!(box_from_array(&array), Some([0.0, 0.0, 612.0, 792.0]));
        assert_eq!(box_from_array(&array[..3]), None);
    }
}
