use adapt_core::Target;
use anyhow::Result;

pub type Rgb = [u8; 3];

/// Fixation spot while the cursor rests inside it and no target is shown.
pub const FIXATION_ACTIVE_COLOR: Rgb = [0, 0, 255];
pub const FIXATION_IDLE_COLOR: Rgb = [255, 255, 0];
pub const CURSOR_COLOR: Rgb = [128, 128, 128];
pub const TARGET_COLOR: Rgb = [128, 128, 0];
pub const FEEDBACK_COLOR: Rgb = [255, 0, 0];
pub const TEXT_COLOR: Rgb = [255, 255, 255];

/// Immediate-mode drawing surface. Coordinates are screen pixels with the
/// origin top-left; implementations handle mirroring and rounding.
pub trait Renderer {
    /// Blanks the back buffer.
    fn clear(&mut self);

    /// Filled circle, or an outline of width `stroke`.
    fn draw_circle(&mut self, color: Rgb, center: (f64, f64), radius: f64, stroke: Option<f64>);

    fn draw_line(&mut self, color: Rgb, from: (f64, f64), to: (f64, f64), width: f64);

    /// One line of text centered on `center`, `size` pixels high.
    fn draw_text(&mut self, color: Rgb, text: &str, center: (f64, f64), size: f64);

    /// Makes the back buffer visible.
    fn present(&mut self) -> Result<()>;

    /// Ring with a cross through its center.
    fn draw_fixation(&mut self, color: Rgb, center: (f64, f64), radius: f64, width: f64) {
        let (x, y) = center;
        self.draw_circle(color, center, radius, Some(width));
        self.draw_line(color, (x - radius, y), (x + radius, y), width);
        self.draw_line(color, (x, y - radius), (x, y + radius), width);
    }
}

/// What a trial wants on screen at one redraw.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scene {
    pub center: (f64, f64),
    pub fixation_radius: f64,
    pub fixation_stroke: f64,
    pub cursor_radius: f64,
    pub target_radius: f64,

    pub show_fixation: bool,
    pub show_cursor: bool,
    pub show_target: bool,
    pub show_feedback: bool,

    pub cursor: (f64, f64),
    pub target: Option<Target>,
    pub feedback: Option<(f64, f64)>,
}

impl Scene {
    fn cursor_in_fixation(&self) -> bool {
        let dx = self.cursor.0 - self.center.0;
        let dy = self.cursor.1 - self.center.1;
        dx.hypot(dy) < self.fixation_radius
    }

    pub fn fixation_color(&self) -> Rgb {
        if self.cursor_in_fixation() && !self.show_target {
            FIXATION_ACTIVE_COLOR
        } else {
            FIXATION_IDLE_COLOR
        }
    }
}

/// Redraws the whole scene and presents it.
pub fn draw_scene<R: Renderer + ?Sized>(renderer: &mut R, scene: &Scene) -> Result<()> {
    renderer.clear();

    if scene.show_fixation {
        renderer.draw_fixation(
            scene.fixation_color(),
            scene.center,
            scene.fixation_radius,
            scene.fixation_stroke,
        );
    }

    if scene.show_cursor {
        renderer.draw_circle(CURSOR_COLOR, scene.cursor, scene.cursor_radius, None);
    }

    if scene.show_target {
        if let Some(target) = scene.target {
            renderer.draw_circle(TARGET_COLOR, (target.x, target.y), scene.target_radius, None);
        }
    }

    if scene.show_feedback {
        if let Some(point) = scene.feedback {
            renderer.draw_circle(FEEDBACK_COLOR, point, scene.cursor_radius, None);
        }
    }

    renderer.present()
}

/// Discards everything; counts presented frames.
#[derive(Debug, Default, Clone)]
pub struct NullRenderer {
    frames: u64,
    shapes: usize,
    last_frame_shapes: usize,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Shapes drawn into the most recently presented frame.
    pub fn last_frame_shapes(&self) -> usize {
        self.last_frame_shapes
    }
}

impl Renderer for NullRenderer {
    fn clear(&mut self) {
        self.shapes = 0;
    }

    fn draw_circle(&mut self, _: Rgb, _: (f64, f64), _: f64, _: Option<f64>) {
        self.shapes += 1;
    }

    fn draw_line(&mut self, _: Rgb, _: (f64, f64), _: (f64, f64), _: f64) {
        self.shapes += 1;
    }

    fn draw_text(&mut self, _: Rgb, _: &str, _: (f64, f64), _: f64) {
        self.shapes += 1;
    }

    fn present(&mut self) -> Result<()> {
        self.frames += 1;
        self.last_frame_shapes = self.shapes;
        Ok(())
    }
}
