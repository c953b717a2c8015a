use crate::canvas::{Canvas, Layer};
use crate::types::{Color, Size};

pub const DEFAULT_GRID_STEP: f32 = 20.0;
pub const DEFAULT_LABEL_STEP: f32 = 100.0;

const LINE_COLOR: Color = Color {
    r: 0.85,
    g: 0.85,
    b: 0.85,
};
const LABEL_FONT: &str = "Helvetica";
const LABEL_SIZE: f32 = 7.0;
const LABEL_NUDGE: f32 = 2.0;

/// Render a calibration grid layer: ruled lines every `step` points and
/// axis coordinate labels every `label_step` points, on a page of the given
/// size. Deterministic and stateless; merged on top of everything else so the
/// rulings stay visible.
pub fn grid_layer(size: Size, step: f32, label_step: f32) -> Layer {
    let mut canvas = Canvas::new(size);
    if step <= 0.0 || label_step <= 0.0 {
        return canvas.finish();
    }

    canvas.set_stroke_color(LINE_COLOR);
    let mut x = 0.0;
    while x < size.width {
        canvas.line(x, 0.0, x, size.height);
        x += step;
    }
    let mut y = 0.0;
    while y < size.height {
        canvas.line(0.0, y, size.width, y);
        y += step;
    }

    canvas.set_fill_color(Color::BLACK);
    canvas.set_font(LABEL_FONT, LABEL_SIZE);
    let mut x = 0.0;
    while x < size.width {
        canvas.draw_string(x + LABEL_NUDGE, LABEL_NUDGE, format!("{}", x as i64));
        x += label_step;
    }
    let mut y = 0.0;
    while y < size.height {
        canvas.draw_string(LABEL_NUDGE, y + LABEL_NUDGE, format!("{}", y as i64));
        y += label_step;
    }

    canvas.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;

    fn count_strokes(layer: &Layer) -> usize {
        layer
            .commands
            .iter()
            .filter(|command| matches!(command, Command::Stroke))
            .count()
    }

    fn labels(layer: &Layer) -> Vec<String> {
        layer
            .commands
            .iter()
            .filter_map(|command| match command {
                Command::DrawString { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn letter_page_gets_expected_rulings_and_labels() {
        let layer = grid_layer(Size::letter(), DEFAULT_GRID_STEP, DEFAULT_LABEL_STEP);
        // 612/20 -> lines at 0..=600, 792/20 -> lines at 0..=780.
        assert_eq!(count_strokes(&layer), 31 + 40);
        let labels = labels(&layer);
        assert_eq!(labels.len(), 7 + 8);
        assert!(labels.contains(&"0".to_string()));
        assert!(labels.contains(&"600".to_string()));
        assert!(labels.contains(&"700".to_string()));
        assert!(!labels.contains(&"800".to_string()));
    }

    #[test]
    fn lines_span_the_full_page() {
        let layer = grid_layer(Size::letter(), DEFAULT_GRID_STEP, DEFAULT_LABEL_STEP);
        assert!(layer.commands.contains(&Command::MoveTo { x: 600.0, y: 0.0 }));
        assert!(layer.commands.contains(&Command::LineTo { x: 600.0, y: 792.0 }));
        assert!(layer.commands.contains(&Command::LineTo { x: 612.0, y: 780.0 }));
    }

    #[test]
    fn grid_is_deterministic() {
        let a = grid_layer(Size::a4(), DEFAULT_GRID_STEP, DEFAULT_LABEL_STEP);
        let b = grid_layer(Size::a4(), DEFAULT_GRID_STEP, DEFAULT_LABEL_STEP);
        assert_eq!(a.commands, b.commands);
    }

    #[test]
    fn non_positive_spacing_yields_an_empty_layer() {
        let layer = grid_layer(Size::letter(), 0.0, DEFAULT_LABEL_STEP);
        assert!(layer.commands.is_empty());
    }
}
