pub mod render;
pub mod skia;
pub mod text;

pub use render::{
    CURSOR_COLOR, FEEDBACK_COLOR, FIXATION_ACTIVE_COLOR, FIXATION_IDLE_COLOR, NullRenderer,
    Renderer, Rgb, Scene, TARGET_COLOR, TEXT_COLOR, draw_scene,
};
pub use skia::SkiaRenderer;
pub use text::{SYSTEM_FONTS, TextCache, TextFont, render_text_pixmap};
