use crate::canvas::{Canvas, Layer};
use crate::debug::DebugLog;
use crate::error::FormStampError;
use crate::layout::FieldLayout;
use crate::signature::{FittedSignature, fit_signature};
use crate::types::Size;
use std::collections::BTreeMap;

const FIELD_FONT: &str = "Times-Roman";
const FIELD_FONT_SIZE: f32 = 8.0;

/// Resource id the compositor records for the signature image; the merge
/// pipeline binds it to the embedded image XObject.
pub(crate) const SIGNATURE_RESOURCE_ID: &str = "signature";

/// The compositor's output: one recorded layer per template page, plus the
/// fitted signature those layers reference.
#[derive(Debug)]
pub struct OverlaySet {
    pub layers: Vec<Layer>,
    pub signature: Option<FittedSignature>,
}

/// Paint every mapped, non-blank value onto its page, and the fitted
/// signature into its box. Values for ids outside the layout must already be
/// filtered out; blank values are skipped here. The signature field is
/// reserved for the image and never drawn as text.
///
/// A signature that fails to decode rejects the whole request before any
/// page is painted.
pub(crate) fn build_overlays(
    layout: &FieldLayout,
    values: &BTreeMap<String, String>,
    signature_bytes: Option<&[u8]>,
    page_sizes: &[Size],
    debug: Option<&DebugLog>,
) -> Result<OverlaySet, FormStampError> {
    let signature_box = layout.signature_box();
    let signature = match signature_bytes {
        Some(bytes) if !bytes.is_empty() => Some(fit_signature(
            bytes,
            signature_box.max_width,
            signature_box.max_height,
        )?),
        _ => None,
    };
    if let (Some(fitted), Some(logger)) = (signature.as_ref(), debug) {
        logger.log_event(
            "signature.fitted",
            &[
                ("width", fitted.width.to_string()),
                ("height", fitted.height.to_string()),
            ],
        );
    }

    let mut layers = Vec::with_capacity(page_sizes.len());
    for (page, size) in page_sizes.iter().enumerate() {
        let mut canvas = Canvas::new(*size);
        canvas.set_font(FIELD_FONT, FIELD_FONT_SIZE);
        let (dx, dy) = layout.offset_for(page);

        for (field_id, position) in layout.entries_for_page(page) {
            if field_id == layout.signature_field() {
                continue;
            }
            let Some(value) = values.get(field_id) else {
                continue;
            };
            let text = value.trim();
            if text.is_empty() {
                if let Some(logger) = debug {
                    logger.increment("overlay.fields_blank", 1);
                }
                continue;
            }
            canvas.draw_string(position.x + dx, position.y + dy, text);
            if let Some(logger) = debug {
                logger.increment("overlay.fields_drawn", 1);
            }
        }

        if let Some(fitted) = signature.as_ref() {
            if page == signature_box.page {
                // Anchored at the box corner, drawn at the fitted size; the
                // nominal box is an upper bound, not a stretch target.
                canvas.draw_image(
                    signature_box.x + dx,
                    signature_box.y + dy,
                    fitted.width as f32,
                    fitted.height as f32,
                    SIGNATURE_RESOURCE_ID,
                );
            }
        }

        layers.push(canvas.finish());
    }

    Ok(OverlaySet { layers, signature })
}
