use crate::canvas::{self, Command, Layer};
use crate::signature::FittedSignature;
use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    dictionary,
};
use std::io::Write;

/// A layer rendered to raw content-stream bytes, plus the resources its
/// operators reference. Resource names are assigned in first-use order so
/// identical layers render to identical bytes.
pub(crate) struct RenderedLayer {
    pub content: Vec<u8>,
    /// (resource name, base-14 font name)
    pub fonts: Vec<(String, String)>,
    /// (resource name, canvas resource id)
    pub images: Vec<(String, String)>,
    /// Characters replaced with '?' because WinAnsi cannot represent them.
    pub lossy_chars: usize,
}

pub(crate) fn render_layer(layer: &Layer) -> RenderedLayer {
    let mut out = String::new();
    let mut fonts: Vec<(String, String)> = Vec::new();
    let mut images: Vec<(String, String)> = Vec::new();
    let mut lossy_chars = 0usize;
    let mut font_name = canvas::DEFAULT_FONT.to_string();
    let mut font_size = canvas::DEFAULT_FONT_SIZE;

    for command in &layer.commands {
        match command {
            Command::SetFillColor(color) => {
                out.push_str(&format!(
                    "{} {} {} rg\n",
                    fmt(color.r),
                    fmt(color.g),
                    fmt(color.b)
                ));
            }
            Command::SetStrokeColor(color) => {
                out.push_str(&format!(
                    "{} {} {} RG\n",
                    fmt(color.r),
                    fmt(color.g),
                    fmt(color.b)
                ));
            }
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt(*width)));
            }
            Command::SetFont { name, size } => {
                font_name = name.clone();
                font_size = *size;
            }
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt(*x), fmt(*y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt(*x), fmt(*y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::DrawString { x, y, text } => {
                let resource = resource_name(&mut fonts, &font_name, "F");
                let encoded = encode_winansi_pdf_string(text);
                lossy_chars += encoded.replaced;
                out.push_str(&format!(
                    "BT\n/{} {} Tf\n{} {} Td\n({}) Tj\nET\n",
                    resource,
                    fmt(font_size),
                    fmt(*x),
                    fmt(*y),
                    encoded.text
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let resource = resource_name(&mut images, resource_id, "Im");
                out.push_str("q\n");
                out.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt(*width),
                    fmt(*height),
                    fmt(*x),
                    fmt(*y)
                ));
                out.push_str(&format!("/{} Do\n", resource));
                out.push_str("Q\n");
            }
        }
    }

    RenderedLayer {
        content: out.into_bytes(),
        fonts,
        images,
        lossy_chars,
    }
}

/// Embed the fitted signature as an opaque DeviceRGB image XObject. The
/// fitter already flattened transparency, so no soft mask is needed.
pub(crate) fn embed_signature_xobject(
    doc: &mut LoDocument,
    fitted: &FittedSignature,
) -> LoObjectId {
    doc.add_object(LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => fitted.width as i64,
            "Height" => fitted.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        flate_compress(&fitted.rgb),
    ))
}

/// Build the resource dictionary for a rendered layer. Fonts are base-14
/// Type1 with WinAnsi encoding; image names resolve through `resolve_image`.
pub(crate) fn layer_resources(
    rendered: &RenderedLayer,
    mut resolve_image: impl FnMut(&str) -> Option<LoObjectId>,
) -> Result<lopdf::Dictionary, crate::error::FormStampError> {
    let mut resources = lopdf::Dictionary::new();
    if !rendered.fonts.is_empty() {
        let mut fonts = lopdf::Dictionary::new();
        for (resource, base_font) in &rendered.fonts {
            fonts.set(
                resource.as_bytes().to_vec(),
                LoObject::Dictionary(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => LoObject::Name(base_font.clone().into_bytes()),
                    "Encoding" => "WinAnsiEncoding",
                }),
            );
        }
        resources.set("Font", LoObject::Dictionary(fonts));
    }
    if !rendered.images.is_empty() {
        let mut xobjects = lopdf::Dictionary::new();
        for (resource, resource_id) in &rendered.images {
            let object_id = resolve_image(resource_id).ok_or_else(|| {
                crate::error::FormStampError::InvalidConfiguration(format!(
                    "layer references unknown image resource: {}",
                    resource_id
                ))
            })?;
            xobjects.set(resource.as_bytes().to_vec(), LoObject::Reference(object_id));
        }
        resources.set("XObject", LoObject::Dictionary(xobjects));
    }
    Ok(resources)
}

fn resource_name(table: &mut Vec<(String, String)>, key: &str, prefix: &str) -> String {
    if let Some((name, _)) = table.iter().find(|(_, existing)| existing == key) {
        return name.clone();
    }
    let name = format!("{}{}", prefix, table.len() + 1);
    table.push((name.clone(), key.to_string()));
    name
}

pub(crate) fn flate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn fmt(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let mut out = format!("{:.3}", value);
        while out.ends_with('0') {
            out.pop();
        }
        if out.ends_with('.') {
            out.pop();
        }
        out
    }
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

/// Encode text as an escaped PDF literal string in WinAnsi (cp1252) bytes.
/// Characters outside cp1252 become '?' and are counted for the debug log.
fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };

        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
    }
}
