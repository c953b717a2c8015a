use crate::error::FormStampError;
use std::collections::BTreeMap;

/// Static binding of one form field to a template page and a bottom-left
/// origin coordinate, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldPosition {
    pub page: usize,
    pub x: f32,
    pub y: f32,
}

/// Rectangular region reserved for the signature image, derived from the
/// signature field's position plus fixed maximum dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignatureBox {
    pub page: usize,
    pub x: f32,
    pub y: f32,
    pub max_width: f32,
    pub max_height: f32,
}

const SIGNATURE_MAX_WIDTH: f32 = 200.0;
const SIGNATURE_MAX_HEIGHT: f32 = 45.0;

/// Hand-tuned positions for the credit application template. All entries
/// target page 0 of the 612x792 form.
const CREDIT_APPLICATION_FIELDS: &[(&str, usize, f32, f32)] = &[
    // header / meta
    ("vitrina_asesor", 0, 105.0, 785.0),
    ("cc_asesor", 0, 210.0, 785.0),
    ("fecha_rad", 0, 308.0, 785.0),
    ("linea_financiacion", 0, 100.0, 771.0),
    ("tipo_solicitante", 0, 440.0, 771.0),
    ("tipo_bien", 0, 35.0, 380.0),
    ("direccion_servicio", 0, 210.0, 380.0),
    ("vr_comercial_bien", 0, 380.0, 380.0),
    // applicant identity
    ("apellidos_nombres", 0, 35.0, 708.0),
    ("tipo_id", 0, 390.0, 708.0),
    ("numero_id", 0, 430.0, 708.0),
    ("fecha_expedicion", 0, 85.0, 690.0),
    ("ciudad_expedicion", 0, 135.0, 690.0),
    ("fecha_nac", 0, 265.0, 690.0),
    ("ciudad_nac", 0, 314.0, 690.0),
    ("sexo", 0, 310.0, 708.0),
    ("nacionalidad", 0, 380.0, 690.0),
    ("estado_civil", 0, 459.0, 690.0),
    ("nivel_estudios", 0, 35.0, 675.0),
    ("tipo_vivienda", 0, 380.0, 675.0),
    ("personas_a_cargo", 0, 460.0, 675.0),
    ("direccion", 0, 35.0, 657.0),
    ("ciudad", 0, 310.0, 657.0),
    ("celular", 0, 210.0, 675.0),
    ("email", 0, 380.0, 657.0),
    // economic activity
    ("actividad_economica", 0, 35.0, 570.0),
    ("empresa", 0, 210.0, 570.0),
    ("cargo", 0, 380.0, 535.0),
    ("tipo_contrato", 0, 460.0, 535.0),
    ("antiguedad", 0, 460.0, 553.0),
    ("ingresos_mensuales", 0, 460.0, 623.0),
    ("otros_ingresos", 0, 210.0, 415.0),
    ("pep", 0, 338.0, 520.0),
    // vehicle / service
    ("marca", 0, 35.0, 750.0),
    ("linea", 0, 105.0, 750.0),
    ("tipo_servicio", 0, 210.0, 750.0),
    ("modelo", 0, 308.0, 750.0),
    ("estado_bien", 0, 380.0, 757.0),
    ("plazo", 0, 505.0, 757.0),
    ("vr_comercial", 0, 395.0, 745.0),
    ("vr_financiacion", 0, 502.0, 745.0),
    // spouse
    ("conyuge_nombre", 0, 210.0, 640.0),
    ("conyuge_tipo_id", 0, 45.0, 621.0),
    ("conyuge_numero_id", 0, 80.0, 621.0),
    ("conyuge_celular", 0, 55.0, 605.0),
    // income and expenses
    ("sueldo_basico", 0, 210.0, 483.0),
    ("comisiones", 0, 210.0, 467.0),
    ("otros_ingresos_valor", 0, 210.0, 448.0),
    ("total_ingresos", 0, 210.0, 432.0),
    ("gastos_familiares", 0, 460.0, 483.0),
    ("prestamos_bancarios", 0, 460.0, 467.0),
    ("detalle_otros_gastos", 0, 460.0, 415.0),
    ("otros_gastos", 0, 460.0, 448.0),
    ("total_egresos", 0, 460.0, 432.0),
    // references
    ("ref_familiar", 0, 125.0, 327.0),
    ("ref_familiar_parentesco", 0, 487.0, 327.0),
    ("ref_familiar_cel", 0, 325.0, 327.0),
    ("ref_personal", 0, 125.0, 310.0),
    ("ref_personal_parentesco", 0, 487.0, 310.0),
    ("ref_personal_cel", 0, 325.0, 310.0),
    ("ref_comercial", 0, 125.0, 293.0),
    ("ref_comercial_cel", 0, 487.0, 293.0),
    ("ref_comercial2", 0, 125.0, 276.0),
    ("ref_comercial2_cel", 0, 487.0, 276.0),
    // workplace
    ("empresa_trabajo_alt", 0, 210.0, 622.0),
    ("email_conyuge", 0, 210.0, 605.0),
    ("direccion_trabajo", 0, 210.0, 553.0),
    ("ciudad_trabajo", 0, 375.0, 553.0),
    ("nit_trabajo", 0, 460.0, 575.0),
    ("telefono_trabajo", 0, 210.0, 535.0),
    // collateral (second asset)
    ("tipo_bien_respaldo2", 0, 35.0, 362.0),
    ("tipo_servicio_respaldo2", 0, 210.0, 362.0),
    ("vr_comercial_respaldo2", 0, 380.0, 362.0),
    ("nit_ref1", 0, 325.0, 293.0),
    ("nit_ref2", 0, 325.0, 276.0),
];

const CREDIT_APPLICATION_SIGNATURE: (&str, FieldPosition) = (
    "firma",
    FieldPosition {
        page: 0,
        x: 105.0,
        y: 60.0,
    },
);

/// Immutable mapping from field ids to page positions, plus the signature box
/// and per-page calibration offsets. Built once at startup and passed by
/// reference into the compositor; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FieldLayout {
    fields: BTreeMap<String, FieldPosition>,
    signature_field: String,
    signature_box: SignatureBox,
    offsets: BTreeMap<usize, (f32, f32)>,
}

impl FieldLayout {
    /// Start a layout containing only the signature field. The box anchors at
    /// the field's position with the given maximum dimensions.
    pub fn new(
        signature_field: impl Into<String>,
        position: FieldPosition,
        max_width: f32,
        max_height: f32,
    ) -> Result<Self, FormStampError> {
        let signature_field = signature_field.into();
        if signature_field.trim().is_empty() {
            return Err(FormStampError::InvalidConfiguration(
                "signature field id cannot be empty".to_string(),
            ));
        }
        if max_width <= 0.0 || max_height <= 0.0 {
            return Err(FormStampError::InvalidConfiguration(format!(
                "signature box dimensions must be positive: {}x{}",
                max_width, max_height
            )));
        }
        let mut fields = BTreeMap::new();
        fields.insert(signature_field.clone(), position);
        Ok(Self {
            fields,
            signature_field,
            signature_box: SignatureBox {
                page: position.page,
                x: position.x,
                y: position.y,
                max_width,
                max_height,
            },
            offsets: BTreeMap::new(),
        })
    }

    /// The production loan-application table.
    pub fn credit_application() -> Self {
        let (signature_field, signature_position) = CREDIT_APPLICATION_SIGNATURE;
        let mut fields = BTreeMap::new();
        for &(id, page, x, y) in CREDIT_APPLICATION_FIELDS {
            fields.insert(id.to_string(), FieldPosition { page, x, y });
        }
        fields.insert(signature_field.to_string(), signature_position);
        Self {
            fields,
            signature_field: signature_field.to_string(),
            signature_box: SignatureBox {
                page: signature_position.page,
                x: signature_position.x,
                y: signature_position.y,
                max_width: SIGNATURE_MAX_WIDTH,
                max_height: SIGNATURE_MAX_HEIGHT,
            },
            offsets: BTreeMap::new(),
        }
    }

    /// Add a field position. Blank and duplicate ids are configuration
    /// defects, rejected up front.
    pub fn insert(
        &mut self,
        field_id: impl Into<String>,
        position: FieldPosition,
    ) -> Result<(), FormStampError> {
        let field_id = field_id.into();
        if field_id.trim().is_empty() {
            return Err(FormStampError::InvalidConfiguration(
                "field id cannot be empty".to_string(),
            ));
        }
        if self.fields.contains_key(&field_id) {
            return Err(FormStampError::InvalidConfiguration(format!(
                "duplicate field id in layout: {}",
                field_id
            )));
        }
        self.fields.insert(field_id, position);
        Ok(())
    }

    /// Translate every position rendered on `page` by `(dx, dy)`.
    pub fn set_page_offset(&mut self, page: usize, dx: f32, dy: f32) {
        self.offsets.insert(page, (dx, dy));
    }

    pub fn offset_for(&self, page: usize) -> (f32, f32) {
        self.offsets.get(&page).copied().unwrap_or((0.0, 0.0))
    }

    pub fn position(&self, field_id: &str) -> Option<&FieldPosition> {
        self.fields.get(field_id)
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.fields.contains_key(field_id)
    }

    pub fn signature_field(&self) -> &str {
        &self.signature_field
    }

    pub fn signature_box(&self) -> SignatureBox {
        self.signature_box
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn entries_for_page(
        &self,
        page: usize,
    ) -> impl Iterator<Item = (&str, &FieldPosition)> {
        self.fields
            .iter()
            .filter(move |(_, position)| position.page == page)
            .map(|(id, position)| (id.as_str(), position))
    }

    /// Fail fast when any entry or the signature box targets a page the
    /// template does not have. Skipping such entries silently would mask a
    /// configuration bug.
    pub fn validate_pages(&self, page_count: usize) -> Result<(), FormStampError> {
        for (field_id, position) in &self.fields {
            if position.page >= page_count {
                return Err(FormStampError::PageIndexOutOfRange {
                    field: field_id.clone(),
                    page: position.page,
                    page_count,
                });
            }
        }
        if self.signature_box.page >= page_count {
            return Err(FormStampError::PageIndexOutOfRange {
                field: self.signature_field.clone(),
                page: self.signature_box.page,
                page_count,
            });
        }
        Ok(())
    }

    /// Keep only the values whose key appears in the table. Intake forms may
    /// submit more fields than the template uses; extras are ignored.
    pub fn filter_values<I>(&self, raw: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        raw.into_iter()
            .filter(|(key, _)| self.fields.contains_key(key))
            .collect()
    }
}
