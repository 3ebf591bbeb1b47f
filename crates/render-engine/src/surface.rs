//! Drawing surfaces and immutable bitmaps.
//!
//! The compositing algorithm only needs a handful of primitives, captured
//! by [`Surface`]. [`RasterSurface`] implements them on the CPU over an
//! RGBA buffer.

use std::sync::Arc;

use director_program_model::Rect;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;

use crate::scaling::{clip_draw, ScaledDraw};

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
pub const OPAQUE_BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// An immutable, cheaply clonable RGBA image.
///
/// Clones share pixels; [`Bitmap::same_instance`] tells whether two bitmaps
/// are the same allocation.
#[derive(Debug, Clone)]
pub struct Bitmap(Arc<RgbaImage>);

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    /// A fully transparent bitmap.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, TRANSPARENT))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn same_instance(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// This bitmap stretched to `width`x`height`. Returns a clone of `self`
    /// when the size already matches.
    pub fn resized(&self, width: u32, height: u32) -> Bitmap {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Bitmap::new(imageops::resize(
            self.image(),
            width.max(1),
            height.max(1),
            FilterType::Triangle,
        ))
    }

    /// True when every pixel is fully transparent.
    pub fn is_transparent(&self) -> bool {
        self.0.pixels().all(|p| p.0[3] == 0)
    }
}

/// 2D drawing capability a compositor paints onto.
pub trait Surface: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Reset every pixel to transparent.
    fn clear(&mut self);

    /// Fill a rectangle with an opaque color, replacing what is there.
    fn fill_rect(&mut self, rect: &Rect, color: Rgba<u8>);

    /// Draw `source` of `image` scaled into `dest`, alpha-blended.
    fn draw_image(&mut self, image: &RgbaImage, source: &Rect, dest: &Rect);

    /// Copy of the current contents.
    fn to_bitmap(&self) -> Bitmap;

    fn bounds(&self) -> Rect {
        Rect::from_size(self.width() as f64, self.height() as f64)
    }

    /// Fill the whole surface.
    fn fill(&mut self, color: Rgba<u8>) {
        let bounds = self.bounds();
        self.fill_rect(&bounds, color);
    }

    /// Draw a bitmap stretched over the whole surface.
    fn draw_bitmap(&mut self, bitmap: &Bitmap) {
        let source = Rect::from_size(bitmap.width() as f64, bitmap.height() as f64);
        let bounds = self.bounds();
        self.draw_image(bitmap.image(), &source, &bounds);
    }
}

/// CPU raster surface.
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    /// Allocate a transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width.max(1), height.max(1), TRANSPARENT),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        (x < self.image.width() && y < self.image.height()).then(|| *self.image.get_pixel(x, y))
    }
}

/// Round a rectangle to whole pixels inside `0..max_w` x `0..max_h`.
fn pixel_bounds(rect: &Rect, max_w: u32, max_h: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = rect.x.round().max(0.0) as u32;
    let y0 = rect.y.round().max(0.0) as u32;
    let x1 = (rect.right().round().max(0.0) as u32).min(max_w);
    let y1 = (rect.bottom().round().max(0.0) as u32).min(max_h);
    (x1 > x0 && y1 > y0).then(|| (x0, y0, x1 - x0, y1 - y0))
}

impl Surface for RasterSurface {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    fn fill_rect(&mut self, rect: &Rect, color: Rgba<u8>) {
        let Some((x, y, w, h)) = pixel_bounds(rect, self.width(), self.height()) else {
            return;
        };
        draw_filled_rect_mut(
            &mut self.image,
            imageproc::rect::Rect::at(x as i32, y as i32).of_size(w, h),
            color,
        );
    }

    fn draw_image(&mut self, image: &RgbaImage, source: &Rect, dest: &Rect) {
        let draw = ScaledDraw {
            source: *source,
            dest: *dest,
        };
        let Some(visible) = clip_draw(&draw, &self.bounds()) else {
            return;
        };
        let Some((sx, sy, sw, sh)) = pixel_bounds(&visible.source, image.width(), image.height())
        else {
            return;
        };
        let Some((dx, dy, dw, dh)) = pixel_bounds(&visible.dest, self.width(), self.height())
        else {
            return;
        };

        let region = imageops::crop_imm(image, sx, sy, sw, sh).to_image();
        if (sw, sh) == (dw, dh) {
            imageops::overlay(&mut self.image, &region, dx as i64, dy as i64);
        } else {
            let scaled = imageops::resize(&region, dw, dh, FilterType::Triangle);
            imageops::overlay(&mut self.image, &scaled, dx as i64, dy as i64);
        }
    }

    fn to_bitmap(&self) -> Bitmap {
        Bitmap::new(self.image.clone())
    }
}

/// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
pub fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                rgb[i] = v * 17;
            }
            Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
        }
        6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
        8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => None,
    }
}

/// Parse a color, falling back to `fallback` and logging bad input.
pub fn color_or(value: &str, fallback: Rgba<u8>) -> Rgba<u8> {
    parse_color(value).unwrap_or_else(|| {
        tracing::warn!(color = value, "Unparseable color, using fallback");
        fallback
    })
}
