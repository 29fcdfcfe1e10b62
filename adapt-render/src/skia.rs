use anyhow::{Context, Result};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform};

use crate::render::{Renderer, Rgb};
use crate::text::{TextCache, TextFont};

/// Software rasteriser backed by a tiny-skia pixmap. The windowed front end
/// copies [`SkiaRenderer::pixmap`] into its frame buffer after `present`.
pub struct SkiaRenderer {
    canvas: Pixmap,
    background: Color,
    transform: Transform,
    mirror_horizontal: bool,
    mirror_vertical: bool,
    text: Option<TextCache>,
    frames: u64,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let mut canvas = Pixmap::new(width, height)
            .with_context(|| format!("cannot allocate {width}x{height} canvas"))?;
        let background = Color::from_rgba8(0, 0, 0, 255);
        canvas.fill(background);

        Ok(Self {
            canvas,
            background,
            transform: Transform::identity(),
            mirror_horizontal: false,
            mirror_vertical: false,
            text: None,
            frames: 0,
        })
    }

    /// Flips drawing about the vertical and/or horizontal screen axis, for
    /// mirror or back-projection setups.
    pub fn set_mirroring(&mut self, horizontal: bool, vertical: bool) {
        self.mirror_horizontal = horizontal;
        self.mirror_vertical = vertical;

        let w = self.canvas.width() as f32;
        let h = self.canvas.height() as f32;
        let (sx, tx) = if horizontal { (-1.0, w) } else { (1.0, 0.0) };
        let (sy, ty) = if vertical { (-1.0, h) } else { (1.0, 0.0) };
        self.transform = Transform::from_row(sx, 0.0, 0.0, sy, tx, ty);
    }

    /// Font for [`Renderer::draw_text`]; without one text is skipped.
    pub fn set_font(&mut self, font: TextFont) {
        self.text = Some(TextCache::new(font));
    }

    pub fn has_font(&self) -> bool {
        self.text.is_some()
    }

    pub fn mirroring(&self) -> (bool, bool) {
        (self.mirror_horizontal, self.mirror_vertical)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = Pixmap::new(width, height)
            .with_context(|| format!("cannot allocate {width}x{height} canvas"))?;
        self.canvas.fill(self.background);
        let (h, v) = (self.mirror_horizontal, self.mirror_vertical);
        self.set_mirroring(h, v);
        Ok(())
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.canvas
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn paint(color: Rgb) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color[0], color[1], color[2], 255);
        paint.anti_alias = true;
        paint
    }
}

impl Renderer for SkiaRenderer {
    fn clear(&mut self) {
        self.canvas.fill(self.background);
    }

    fn draw_circle(&mut self, color: Rgb, center: (f64, f64), radius: f64, stroke: Option<f64>) {
        let Some(path) = PathBuilder::from_circle(center.0 as f32, center.1 as f32, radius as f32)
        else {
            return;
        };
        let paint = Self::paint(color);
        match stroke {
            Some(width) if width > 0.0 => {
                let stroke = Stroke {
                    width: width as f32,
                    ..Stroke::default()
                };
                self.canvas
                    .stroke_path(&path, &paint, &stroke, self.transform, None);
            }
            _ => {
                self.canvas
                    .fill_path(&path, &paint, FillRule::Winding, self.transform, None);
            }
        }
    }

    fn draw_line(&mut self, color: Rgb, from: (f64, f64), to: (f64, f64), width: f64) {
        let mut pb = PathBuilder::new();
        pb.move_to(from.0 as f32, from.1 as f32);
        pb.line_to(to.0 as f32, to.1 as f32);
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width: width.max(1.0) as f32,
            ..Stroke::default()
        };
        self.canvas
            .stroke_path(&path, &Self::paint(color), &stroke, self.transform, None);
    }

    fn draw_text(&mut self, color: Rgb, text: &str, center: (f64, f64), size: f64) {
        let Some(cache) = self.text.as_mut() else {
            return;
        };
        let Some(pm) = cache.get_or_render(text, size as f32, color) else {
            return;
        };
        let x = (center.0 - pm.width() as f64 / 2.0).round() as i32;
        let y = (center.1 - pm.height() as f64 / 2.0).round() as i32;
        self.canvas.draw_pixmap(
            x,
            y,
            pm.as_ref(),
            &PixmapPaint::default(),
            self.transform,
            None,
        );
    }

    fn present(&mut self) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}
