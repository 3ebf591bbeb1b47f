//! Fit-mode scaling math.
//!
//! Maps a source frame onto a target rectangle, producing the source
//! sub-rectangle to sample and the destination rectangle to paint.

use director_program_model::{FitMode, Rect};

/// Where to sample and where to paint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledDraw {
    /// Sub-rectangle of the source frame, in source pixels.
    pub source: Rect,
    /// Destination rectangle, in target pixels.
    pub dest: Rect,
}

/// Compute the draw for a `source_w`x`source_h` frame into `target`.
///
/// Given source aspect `Rs` and target aspect `Rd`:
/// - `Fill` crops the longer source axis, centered, so the crop has aspect `Rd`
///   and covers the whole target.
/// - `Fit` keeps the full source and letterboxes it, centered.
/// - `Stretch` maps the full source onto the full target.
/// - `Center` paints the source at native size when it fits, otherwise
///   behaves like `Fill`.
///
/// Returns `None` for empty sources or targets.
pub fn compute_draw(source_w: f64, source_h: f64, target: &Rect, mode: FitMode) -> Option<ScaledDraw> {
    if source_w <= 0.0 || source_h <= 0.0 || target.is_empty() {
        return None;
    }
    let full = Rect::from_size(source_w, source_h);

    let draw = match mode {
        FitMode::Stretch => ScaledDraw {
            source: full,
            dest: *target,
        },
        FitMode::Fill => fill(source_w, source_h, target),
        FitMode::Fit => {
            let rs = source_w / source_h;
            let rd = target.w / target.h;
            let (w, h) = if rs > rd {
                (target.w, target.w / rs)
            } else {
                (target.h * rs, target.h)
            };
            ScaledDraw {
                source: full,
                dest: Rect::centered_in(target, w, h),
            }
        }
        FitMode::Center => {
            if source_w <= target.w && source_h <= target.h {
                ScaledDraw {
                    source: full,
                    dest: Rect::centered_in(target, source_w, source_h),
                }
            } else {
                fill(source_w, source_h, target)
            }
        }
    };
    Some(draw)
}

fn fill(source_w: f64, source_h: f64, target: &Rect) -> ScaledDraw {
    let rs = source_w / source_h;
    let rd = target.w / target.h;
    let source = if rs > rd {
        let crop_w = source_h * rd;
        Rect::new((source_w - crop_w) / 2.0, 0.0, crop_w, source_h)
    } else {
        let crop_h = source_w / rd;
        Rect::new(0.0, (source_h - crop_h) / 2.0, source_w, crop_h)
    };
    ScaledDraw {
        source,
        dest: *target,
    }
}

/// Restrict a draw to `clip`, trimming the source proportionally.
///
/// Returns `None` when nothing of the destination is visible.
pub fn clip_draw(draw: &ScaledDraw, clip: &Rect) -> Option<ScaledDraw> {
    let visible = draw.dest.intersect(clip)?;
    if visible.is_empty() || draw.dest.is_empty() {
        return None;
    }
    let sx = draw.source.w / draw.dest.w;
    let sy = draw.source.h / draw.dest.h;
    let source = Rect::new(
        draw.source.x + (visible.x - draw.dest.x) * sx,
        draw.source.y + (visible.y - draw.dest.y) * sy,
        visible.w * sx,
        visible.h * sy,
    );
    Some(ScaledDraw {
        source,
        dest: visible,
    })
}

/// Scale a rectangle from program space into a canvas of another size.
pub fn program_to_canvas(rect: &Rect, program: (u32, u32), canvas: (u32, u32)) -> Rect {
    let sx = canvas.0 as f64 / program.0.max(1) as f64;
    let sy = canvas.1 as f64 / program.1.max(1) as f64;
    Rect::new(rect.x * sx, rect.y * sy, rect.w * sx, rect.h * sy)
}
