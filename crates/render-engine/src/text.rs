//! Text overlay content resolution and rasterization.

use director_common::config::TextDefaults;
use director_common::{PROGRAM_HEIGHT, PROGRAM_WIDTH};
use director_program_model::{
    Composition, LabelNames, Orientation, Rect, Schedule, TextAlign, TextElement, TextKind,
};
use image::{Pixel, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

use crate::surface::{parse_color, Bitmap, RasterSurface, Surface};

const LINE_SPACING: f32 = 1.2;
const INFO_SEPARATOR: &str = "  ";
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Caption strings for label elements after applying defaults.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedLabels {
    pub host: String,
    pub subject: String,
    pub guest: String,
}

impl ResolvedLabels {
    pub fn resolve(names: &LabelNames, defaults: &TextDefaults) -> Self {
        Self {
            host: names.host.clone().unwrap_or_else(|| defaults.host_label.clone()),
            subject: names
                .subject
                .clone()
                .unwrap_or_else(|| defaults.subject_label.clone()),
            guest: names
                .guest
                .clone()
                .unwrap_or_else(|| defaults.guest_label.clone()),
        }
    }

    fn caption(&self, kind: TextKind) -> Option<&str> {
        match kind {
            TextKind::HostLabel => Some(&self.host),
            TextKind::SubjectLabel => Some(&self.subject),
            TextKind::GuestLabel => Some(&self.guest),
            _ => None,
        }
    }
}

/// The lines an element draws, top to bottom.
///
/// Horizontal elements draw one row: a label's caption, or every info item
/// joined. Vertical elements draw a column: one character per line for
/// labels, one item per line for info.
pub fn text_lines(element: &TextElement, schedule: &Schedule, labels: &ResolvedLabels) -> Vec<String> {
    let items = match labels.caption(element.kind) {
        Some(caption) => vec![caption.to_string()],
        None => match element.kind {
            TextKind::HostInfo => schedule.host_lines(),
            TextKind::SubjectInfo => schedule.subject_lines(),
            TextKind::GuestInfo => schedule.guest_lines(),
            _ => Vec::new(),
        },
    };
    let items: Vec<String> = items.into_iter().filter(|s| !s.trim().is_empty()).collect();
    if items.is_empty() {
        return Vec::new();
    }

    match element.orientation {
        Orientation::Horizontal => vec![items.join(INFO_SEPARATOR)],
        Orientation::Vertical if element.kind.is_label() => items
            .iter()
            .flat_map(|caption| caption.chars())
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect(),
        Orientation::Vertical => items,
    }
}

/// Visual parameters of one text block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub bold: bool,
    pub color: Rgba<u8>,
    pub align: TextAlign,
}

/// Width in pixels of `text` set in `font` at `scale`.
pub fn measure(font: &Font<'_>, scale: Scale, text: &str) -> f32 {
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Draw `lines` inside `rect`, clipped to it.
///
/// The block is vertically centered when it fits and top-aligned otherwise;
/// each line is aligned on the horizontal axis per `style.align`. Weights
/// rendered bold get a second pass offset by one pixel.
pub fn draw_text_block(
    canvas: &mut RgbaImage,
    rect: &Rect,
    lines: &[String],
    style: &TextStyle,
    font: &Font<'_>,
) {
    if lines.is_empty() || rect.is_empty() || style.size <= 0.0 {
        return;
    }
    let scale = Scale::uniform(style.size);
    let line_height = style.size * LINE_SPACING;
    let ascent = font.v_metrics(scale).ascent;
    let block_height = line_height * lines.len() as f32;
    let top = rect.y as f32 + ((rect.h as f32 - block_height) / 2.0).max(0.0);

    let clip = rect
        .intersect(&Rect::from_size(canvas.width() as f64, canvas.height() as f64))
        .unwrap_or_default();
    if clip.is_empty() {
        return;
    }

    for (i, line) in lines.iter().enumerate() {
        let width = measure(font, scale, line);
        let x = match style.align {
            TextAlign::Start => rect.x as f32,
            TextAlign::Center => rect.x as f32 + (rect.w as f32 - width) / 2.0,
            TextAlign::End => rect.right() as f32 - width,
        };
        let baseline = top + line_height * i as f32 + ascent;
        draw_line(canvas, font, scale, (x, baseline), line, style, &clip);
    }
}

fn draw_line(
    canvas: &mut RgbaImage,
    font: &Font<'_>,
    scale: Scale,
    origin: (f32, f32),
    text: &str,
    style: &TextStyle,
    clip: &Rect,
) {
    let x0 = clip.x.floor() as i32;
    let y0 = clip.y.floor() as i32;
    let x1 = clip.right().ceil() as i32;
    let y1 = clip.bottom().ceil() as i32;
    let passes: &[i32] = if style.bold { &[0, 1] } else { &[0] };

    for glyph in font.layout(text, scale, point(origin.0, origin.1)) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let y = bb.min.y + gy as i32;
            for offset in passes {
                let x = bb.min.x + gx as i32 + offset;
                if x < x0 || x >= x1 || y < y0 || y >= y1 {
                    continue;
                }
                let alpha = (coverage * style.color.0[3] as f32).round().clamp(0.0, 255.0) as u8;
                if alpha == 0 {
                    continue;
                }
                let [r, g, b, _] = style.color.0;
                canvas
                    .get_pixel_mut(x as u32, y as u32)
                    .blend(&Rgba([r, g, b, alpha]));
            }
        });
    }
}

/// Render every text element of a composition onto a transparent
/// program-sized bitmap.
///
/// Elements paint in ascending z order. Label elements get
/// `label_background` stretched under them when one is given. Without a
/// font only backgrounds are drawn.
pub fn render_text_layer(
    composition: &Composition,
    defaults: &TextDefaults,
    label_background: Option<&Bitmap>,
    font: Option<&Font<'static>>,
) -> Bitmap {
    let Composition {
        schedule,
        layout,
        plan,
    } = composition;
    let mut surface = RasterSurface::new(PROGRAM_WIDTH, PROGRAM_HEIGHT);
    let labels = ResolvedLabels::resolve(&layout.effective_labels(plan), defaults);
    let layout_color = layout
        .effective_text_color(plan)
        .unwrap_or_else(|| defaults.default_text_color.clone());

    for element in layout.text_elements_by_z() {
        if element.kind.is_label() {
            if let Some(background) = label_background {
                let source = Rect::from_size(background.width() as f64, background.height() as f64);
                surface.draw_image(background.image(), &source, &element.rect);
            }
        }

        let Some(font) = font else {
            continue;
        };
        let lines = text_lines(element, schedule, &labels);
        let color_value = element.font_style.font_color.as_deref().unwrap_or(&layout_color);
        let style = TextStyle {
            size: element.font_style.font_size,
            bold: element.font_style.is_bold(),
            color: parse_color(color_value).unwrap_or(WHITE),
            align: element.font_style.align,
        };
        draw_text_block(surface.image_mut(), &element.rect, &lines, &style, font);
    }

    Bitmap::new(surface.into_image())
}
