use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow, bail};
use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::render::Rgb;

/// Tried in order when no font file is configured.
pub const SYSTEM_FONTS: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// A TrueType/OpenType font read from disk.
pub struct TextFont {
    font: FontVec,
    path: PathBuf,
}

impl TextFont {
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("cannot read font {}", path.display()))?;
        let font = FontVec::try_from_vec(data)
            .map_err(|e| anyhow!("{} is not a usable font: {e}", path.display()))?;
        Ok(Self {
            font,
            path: path.to_path_buf(),
        })
    }

    /// Loads `preferred` when given, otherwise the first of
    /// [`SYSTEM_FONTS`] that exists.
    pub fn find(preferred: Option<&Path>) -> Result<Self> {
        if let Some(path) = preferred {
            return Self::load(path);
        }
        for candidate in SYSTEM_FONTS.iter().map(Path::new) {
            if candidate.is_file() {
                if let Ok(font) = Self::load(candidate) {
                    return Ok(font);
                }
            }
        }
        bail!("no system font found, set display.font")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for TextFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextFont").field("path", &self.path).finish()
    }
}

/// Rasterises one line of text into a tight, transparent pixmap.
/// `None` when nothing in `text` has an outline.
pub fn render_text_pixmap(text: &str, size_px: f32, font: &TextFont, color: Rgb) -> Option<Pixmap> {
    let font = &font.font;
    let scale = PxScale::from(size_px);
    let sf = font.as_scaled(scale);

    // layout with the baseline at the ascent
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlined: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    if outlined.is_empty() {
        return None;
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for out in &outlined {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    for out in &outlined {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // source premultiplied by coverage, then "over" the existing pixel
            let a = cov.clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let inv = 1.0 - sa as f32 / 255.0;
            let bg = dst[i];
            let blend = |s: u8, d: u8| ((s as f32 * a) as u8).saturating_add((d as f32 * inv) as u8);
            let px = PremultipliedColorU8::from_rgba(
                blend(color[0], bg.red()),
                blend(color[1], bg.green()),
                blend(color[2], bg.blue()),
                sa.saturating_add((bg.alpha() as f32 * inv) as u8),
            );
            if let Some(px) = px {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Rendered text keyed by content, size and color.
#[derive(Debug)]
pub struct TextCache {
    font: TextFont,
    map: HashMap<(String, u32, Rgb), Option<Pixmap>>,
}

impl TextCache {
    pub fn new(font: TextFont) -> Self {
        Self {
            font,
            map: HashMap::new(),
        }
    }

    pub fn font(&self) -> &TextFont {
        &self.font
    }

    pub fn get_or_render(&mut self, text: &str, size_px: f32, color: Rgb) -> Option<&Pixmap> {
        let key = (text.to_string(), size_px.to_bits(), color);
        let font = &self.font;
        self.map
            .entry(key)
            .or_insert_with(|| render_text_pixmap(text, size_px, font, color))
            .as_ref()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_font_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        assert!(TextFont::load(&path).is_err());
        assert!(TextFont::find(Some(&path)).is_err());
    }

    #[test]
    fn missing_font_is_an_error() {
        assert!(TextFont::load(Path::new("/nonexistent/font.ttf")).is_err());
    }

    #[test]
    fn text_is_rasterised_when_a_system_font_exists() {
        // machines without any of the known fonts have nothing to check
        let Ok(font) = TextFont::find(None) else {
            return;
        };
        let pm = render_text_pixmap("Welcome", 32.0, &font, [255, 255, 255]).unwrap();
        assert!(pm.width() > pm.height());
        assert!(pm.pixels().iter().any(|p| p.alpha() > 200));
        assert!(pm.pixels().iter().any(|p| p.alpha() == 0));
        assert!(render_text_pixmap("   ", 32.0, &font, [255, 255, 255]).is_none());

        let mut cache = TextCache::new(font);
        assert!(cache.get_or_render("Welcome", 32.0, [255, 255, 255]).is_some());
        assert!(cache.get_or_render("Welcome", 32.0, [255, 255, 255]).is_some());
        assert_eq!(cache.len(), 1);
    }
}
