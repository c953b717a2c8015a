use crate::types::{Color, Size};

pub(crate) const DEFAULT_FONT: &str = "Helvetica";
pub(crate) const DEFAULT_FONT_SIZE: f32 = 12.0;

/// Drawing commands recorded for one overlay layer.
///
/// All coordinates are PDF user space: origin at the bottom-left corner of
/// the page, x to the right, y upward. This is the same coordinate system the
/// template pages use, so recorded positions land on the merged page without
/// any conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(f32),
    SetFont {
        name: String,
        size: f32,
    },
    MoveTo {
        x: f32,
        y: f32,
    },
    LineTo {
        x: f32,
        y: f32,
    },
    Stroke,
    DrawString {
        x: f32,
        y: f32,
        text: String,
    },
    DrawImage {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        resource_id: String,
    },
}

/// One recorded overlay layer, sized to exactly one template page.
#[derive(Debug, Clone)]
pub struct Layer {
    pub size: Size,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: f32,
    font_name: String,
    font_size: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: 1.0,
            font_name: DEFAULT_FONT.to_string(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

/// Records drawing commands for a single overlay layer. Redundant state
/// changes (same color, width, font) are elided so layers stay minimal.
pub struct Canvas {
    size: Size,
    commands: Vec<Command>,
    state: GraphicsState,
}

impl Canvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
            state: GraphicsState::default(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.state.fill_color == color {
            return;
        }
        self.state.fill_color = color;
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.state.stroke_color == color {
            return;
        }
        self.state.stroke_color = color;
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: f32) {
        let width = if width < 0.0 { 0.0 } else { width };
        if self.state.line_width == width {
            return;
        }
        self.state.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_font(&mut self, name: &str, size: f32) {
        if self.state.font_name == name && self.state.font_size == size {
            return;
        }
        self.state.font_name = name.to_string();
        self.state.font_size = size;
        self.commands.push(Command::SetFont {
            name: self.state.font_name.clone(),
            size,
        });
    }

    /// Stroke a straight segment with the current stroke color and width.
    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.commands.push(Command::MoveTo { x: x1, y: y1 });
        self.commands.push(Command::LineTo { x: x2, y: y2 });
        self.commands.push(Command::Stroke);
    }

    pub fn draw_string(&mut self, x: f32, y: f32, text: impl Into<String>) {
        self.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn draw_image(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        resource_id: impl Into<String>,
    ) {
        self.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn finish(self) -> Layer {
        Layer {
            size: self.size,
            commands: self.commands,
        }
    }
}
