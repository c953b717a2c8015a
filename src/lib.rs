mod canvas;
mod compose;
mod debug;
mod error;
mod grid;
mod layout;
mod overlay;
mod pdf;
#[cfg(feature = "python")]
mod python;
mod signature;
mod types;

pub use canvas::{Canvas, Command, Layer};
pub use compose::{ComposeSummary, Template};
pub use error::FormStampError;
pub use grid::{DEFAULT_GRID_STEP, DEFAULT_LABEL_STEP, grid_layer};
pub use layout::{FieldLayout, FieldPosition, SignatureBox};
pub use overlay::OverlaySet;
pub use signature::{FittedSignature, decode_data_uri, fit_signature};
pub use types::{Color, Size};

use debug::DebugLog;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Filename of the grid-only calibration document.
pub const PREVIEW_FILENAME: &str = "preview_debug.pdf";

const DEFAULT_OUTPUT_DIR: &str = "salidas";
const ID_FIELD: &str = "numero_id";
const DEFAULT_ID: &str = "NA";

/// Configures and validates a [`FormStamp`]. Validation is front-loaded:
/// a missing template, an encrypted template, or a layout entry pointing at
/// a page the template does not have all fail `build()`, never a request.
pub struct FormStampBuilder {
    template_path: Option<PathBuf>,
    output_dir: PathBuf,
    layout: FieldLayout,
    grid_step: f32,
    grid_label_step: f32,
    debug_path: Option<PathBuf>,
}

impl FormStampBuilder {
    pub fn new() -> Self {
        Self {
            template_path: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            layout: FieldLayout::credit_application(),
            grid_step: DEFAULT_GRID_STEP,
            grid_label_step: DEFAULT_LABEL_STEP,
            debug_path: None,
        }
    }

    pub fn template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn layout(mut self, layout: FieldLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn grid_spacing(mut self, step: f32, label_step: f32) -> Self {
        self.grid_step = step;
        self.grid_label_step = label_step;
        self
    }

    /// Write a JSON-lines debug log (counters, template digest, lossy text
    /// replacements) to the given path.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<FormStamp, FormStampError> {
        let template_path = self.template_path.ok_or_else(|| {
            FormStampError::InvalidConfiguration("template path is required".to_string())
        })?;
        if self.grid_step <= 0.0 || self.grid_label_step <= 0.0 {
            return Err(FormStampError::InvalidConfiguration(format!(
                "grid spacing must be positive: step={} label_step={}",
                self.grid_step, self.grid_label_step
            )));
        }
        let template = Template::load(&template_path)?;
        self.layout.validate_pages(template.page_count())?;
        std::fs::create_dir_all(&self.output_dir)?;

        let debug = match self.debug_path {
            Some(path) => Some(Arc::new(DebugLog::new(path)?)),
            None => None,
        };
        if let Some(logger) = debug.as_deref() {
            logger.log_event(
                "template.loaded",
                &[
                    ("pages", template.page_count().to_string()),
                    ("sha256", format!("\"{}\"", template.sha256())),
                ],
            );
            logger.flush();
        }

        Ok(FormStamp {
            template,
            layout: self.layout,
            output_dir: self.output_dir,
            grid_step: self.grid_step,
            grid_label_step: self.grid_label_step,
            debug,
        })
    }
}

impl Default for FormStampBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A generated document: where it was written and the bytes that were
/// written, ready to stream back to the caller.
#[derive(Debug, Clone)]
pub struct StampedDocument {
    pub filename: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub pages_written: usize,
}

/// Stamps submitted values onto the template. All state is immutable after
/// `build()`; concurrent requests share it read-only.
#[derive(Debug)]
pub struct FormStamp {
    template: Template,
    layout: FieldLayout,
    output_dir: PathBuf,
    grid_step: f32,
    grid_label_step: f32,
    debug: Option<Arc<DebugLog>>,
}

impl FormStamp {
    pub fn builder() -> FormStampBuilder {
        FormStampBuilder::new()
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Stamp `raw_values` (and optionally a signature image) onto the
    /// template. Keys outside the layout table are ignored; blank values are
    /// skipped; a `grid` flag additionally overlays the calibration grid.
    /// The document is written to the output directory as
    /// `solicitud_{numero_id}.pdf` (sanitized, `NA` when absent), replacing
    /// any prior output for the same id.
    pub fn generate(
        &self,
        raw_values: &BTreeMap<String, String>,
        signature: Option<&[u8]>,
        grid: bool,
    ) -> Result<StampedDocument, FormStampError> {
        let values = self
            .layout
            .filter_values(raw_values.iter().map(|(k, v)| (k.clone(), v.clone())));
        let overlays = overlay::build_overlays(
            &self.layout,
            &values,
            signature,
            self.template.page_sizes(),
            self.debug.as_deref(),
        )?;
        let grid_layers = if grid { Some(self.grid_layers()) } else { None };
        let (bytes, summary) = compose::compose(
            &self.template,
            &overlays,
            grid_layers.as_deref(),
            self.debug.as_deref(),
        )?;
        let document = self.write_output(derive_filename(&values), bytes, summary.pages_written)?;
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary("generate");
            logger.flush();
        }
        Ok(document)
    }

    /// Write `preview_debug.pdf`: the raw template with the calibration grid
    /// over every page. No field values are painted.
    pub fn preview_grid(&self) -> Result<StampedDocument, FormStampError> {
        let overlays = overlay::build_overlays(
            &self.layout,
            &BTreeMap::new(),
            None,
            self.template.page_sizes(),
            self.debug.as_deref(),
        )?;
        let grid_layers = self.grid_layers();
        let (bytes, summary) = compose::compose(
            &self.template,
            &overlays,
            Some(&grid_layers),
            self.debug.as_deref(),
        )?;
        let document =
            self.write_output(PREVIEW_FILENAME.to_string(), bytes, summary.pages_written)?;
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary("preview");
            logger.flush();
        }
        Ok(document)
    }

    fn grid_layers(&self) -> Vec<Layer> {
        self.template
            .page_sizes()
            .iter()
            .map(|size| grid_layer(*size, self.grid_step, self.grid_label_step))
            .collect()
    }

    fn write_output(
        &self,
        filename: String,
        bytes: Vec<u8>,
        pages_written: usize,
    ) -> Result<StampedDocument, FormStampError> {
        let path = self.output_dir.join(&filename);
        std::fs::write(&path, &bytes)?;
        if let Some(logger) = self.debug.as_deref() {
            logger.log_event(
                "output.written",
                &[
                    ("filename", format!("\"{}\"", debug::json_escape(&filename))),
                    ("bytes", bytes.len().to_string()),
                ],
            );
        }
        Ok(StampedDocument {
            filename,
            path,
            bytes,
            pages_written,
        })
    }
}

/// `solicitud_{id}.pdf`, where `{id}` is the submitted identifier with
/// whitespace and path separators replaced by underscores, or `NA` when the
/// field is absent or blank.
fn derive_filename(values: &BTreeMap<String, String>) -> String {
    let id = values
        .get(ID_FIELD)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_ID);
    let sanitized: String = id
        .chars()
        .map(|ch| {
            if ch.is_whitespace() || ch == '/' || ch == '\\' {
                '_'
            } else {
                ch
            }
        })
        .collect();
    format!("solicitud_{}.pdf", sanitized)
}
