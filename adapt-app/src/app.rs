use std::sync::Arc;

use adapt_experiment::{
    AbortSignals, BlockSource, ExperimentConfig, MotionFeed, RelativeMotion, Session,
    SessionStatus, SessionSummary, TsvSink,
};
use adapt_render::{Renderer, SkiaRenderer, TEXT_COLOR, TextFont};
use adapt_timing::{MonotonicTimer, TimeSource};
use anyhow::{Result, anyhow};
use pixels::{Pixels, SurfaceTexture};
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Fullscreen, Window, WindowId},
};

type WindowSession = Session<MonotonicTimer, RelativeMotion, Box<dyn BlockSource>, TsvSink>;

/// Instruction text height [px].
const TEXT_SIZE: f64 = 32.0;
const LINE_SPACING: f64 = 48.0;

/// Between blocks the screen shows instructions and the keys choose what
/// happens next; during a block the session drives the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppPhase {
    Welcome,
    Running,
    Between,
    Done,
}

/// Inputs consumed when the window exists and its size is known.
struct Pending {
    config: ExperimentConfig,
    schedule: Box<dyn BlockSource>,
    subject: String,
    seed: Option<u64>,
}

pub struct App {
    pending: Option<Pending>,
    session: Option<WindowSession>,
    feed: MotionFeed,
    signals: AbortSignals,
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    phase: AppPhase,
    subject: String,
    summary: SessionSummary,
    error: Option<anyhow::Error>,
}

/// Instruction lines shown while no block is running.
fn status_lines(phase: AppPhase, subject: &str, blocks: u32) -> Vec<String> {
    match phase {
        AppPhase::Welcome => vec![
            format!("Welcome, {subject}"),
            "Press <SPACE> to begin, <END> to quit".to_string(),
        ],
        AppPhase::Between => vec![
            format!("You have run {blocks} block{}", if blocks == 1 { "" } else { "s" }),
            "Press <SPACE> to continue, <END> to quit".to_string(),
        ],
        AppPhase::Running | AppPhase::Done => Vec::new(),
    }
}

impl App {
    pub fn new(
        config: ExperimentConfig,
        schedule: Box<dyn BlockSource>,
        subject: String,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pending: Some(Pending {
                config,
                schedule,
                subject: subject.clone(),
                seed,
            }),
            session: None,
            feed: MotionFeed::new(),
            signals: AbortSignals::new(),
            window: None,
            pixels: None,
            renderer: None,
            phase: AppPhase::Welcome,
            subject,
            summary: SessionSummary::default(),
            error: None,
        })
    }

    pub fn run(mut self) -> Result<SessionSummary> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        info!("SPACE starts a block, ESC aborts it (or quits between blocks), END quits");

        event_loop.run_app(&mut self)?;

        if let Some(e) = self.error.take() {
            return Err(e);
        }
        Ok(self.summary)
    }

    fn create_window_and_session(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let Pending {
            mut config,
            schedule,
            subject,
            seed,
        } = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("session already created"))?;

        let mut attributes = Window::default_attributes()
            .with_title(format!("adapt: {subject}"))
            .with_resizable(false);
        if config.display.fullscreen {
            let monitor = event_loop
                .primary_monitor()
                .or_else(|| event_loop.available_monitors().next())
                .ok_or_else(|| anyhow!("no monitor available"))?;
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))));
        } else {
            attributes = attributes.with_inner_size(LogicalSize::new(
                config.display.width,
                config.display.height,
            ));
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            scale = window.scale_factor(),
            "window created"
        );

        // targets are placed around the center of the actual surface
        config.display.width = size.width;
        config.display.height = size.height;
        let config = Arc::new(config);

        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface)?);

        let mut renderer = SkiaRenderer::new(size.width, size.height)?;
        renderer.set_mirroring(config.display.mirror_horizontal, config.display.mirror_vertical);
        match TextFont::find(config.display.font.as_deref()) {
            Ok(font) => {
                info!(path = %font.path().display(), "font loaded");
                renderer.set_font(font);
            }
            Err(e) if config.display.font.is_some() => return Err(e),
            Err(e) => warn!(error = %e, "instructions are shown in the log only"),
        }
        self.renderer = Some(renderer);

        window.set_cursor_visible(false);
        if let Err(e) = window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
        {
            warn!(error = %e, "pointer could not be grabbed");
        }

        let sink = TsvSink::new(&config.data.directory, subject)?;
        let motion = RelativeMotion::new(self.feed.clone());
        let mut session = Session::new(config, MonotonicTimer::new(), motion, schedule, sink)?
            .with_signals(self.signals.clone());
        if let Some(seed) = seed {
            session = session.with_seed(seed);
        }

        self.session = Some(session);
        self.window = Some(window);
        self.show_status()
    }

    /// Copies the renderer's canvas to the surface and shows it.
    fn present(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_ref()) else {
            return Ok(());
        };
        let frame = pixels.frame_mut();
        let data = renderer.pixmap().data();
        if frame.len() == data.len() {
            frame.copy_from_slice(data);
        }
        pixels.render()?;
        Ok(())
    }

    fn show_status(&mut self) -> Result<()> {
        let blocks = self.session.as_ref().map_or(0, |s| s.summary().blocks);
        let lines = status_lines(self.phase, &self.subject, blocks);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.clear();
            let cx = renderer.width() as f64 / 2.0;
            let top = renderer.height() as f64 / 2.0
                - LINE_SPACING * lines.len().saturating_sub(1) as f64 / 2.0;
            for (i, line) in lines.iter().enumerate() {
                renderer.draw_text(TEXT_COLOR, line, (cx, top + i as f64 * LINE_SPACING), TEXT_SIZE);
            }
            renderer.present()?;
        }
        self.present()
    }

    /// Raises the run abort and lets the session flush the trial in
    /// progress before the window goes away.
    fn abort_session(&mut self) -> Result<()> {
        self.signals.run.trigger();
        if let (Some(session), Some(renderer)) = (self.session.as_mut(), self.renderer.as_mut()) {
            let tick = session.abort_run(renderer)?;
            if let Some(outcome) = tick.trial_ended {
                info!(?outcome, "trial in progress saved");
            }
        }
        Ok(())
    }

    fn start_block(&mut self, event_loop: &ActiveEventLoop) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.start_next_block() {
            Some(block) => {
                info!(block, "block running");
                self.phase = AppPhase::Running;
            }
            None => self.finish(event_loop),
        }
    }

    fn handle_key(&mut self, key: PhysicalKey, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        match (code, self.phase) {
            (KeyCode::Space, AppPhase::Welcome | AppPhase::Between) => self.start_block(event_loop),
            (KeyCode::Escape, AppPhase::Running) => {
                info!("block abort requested");
                self.signals.block.trigger();
            }
            (KeyCode::End, AppPhase::Running) => {
                info!("run abort requested");
                self.signals.run.trigger();
            }
            (KeyCode::Escape | KeyCode::End, AppPhase::Welcome | AppPhase::Between) => {
                self.finish(event_loop)
            }
            _ => {}
        }
    }

    fn step(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (Some(session), Some(renderer)) = (self.session.as_mut(), self.renderer.as_mut())
        else {
            return Ok(());
        };

        let tick = session.tick(renderer)?;
        let pause = session.config().loop_pause();
        let timer = session.clock().source().clone();
        if tick.rendered {
            self.present()?;
        }

        match tick.status {
            SessionStatus::Running | SessionStatus::Idle => timer.sleep(pause),
            SessionStatus::BlockFinished { block } => {
                info!(block, "block done, SPACE for the next one");
                self.phase = AppPhase::Between;
                self.show_status()?;
            }
            SessionStatus::Finished => self.finish(event_loop),
        }
        Ok(())
    }

    fn fail(&mut self, e: anyhow::Error, event_loop: &ActiveEventLoop) {
        error!("{e:#}");
        self.error = Some(e);
        self.finish(event_loop);
    }

    fn finish(&mut self, event_loop: &ActiveEventLoop) {
        if self.phase == AppPhase::Done {
            return;
        }
        self.phase = AppPhase::Done;
        if let Some(session) = &self.session {
            self.summary = session.summary().clone();
        }
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
            let _ = window.set_cursor_grab(CursorGrabMode::None);
        }
        event_loop.exit();
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        if let Some(pixels) = self.pixels.as_mut() {
            pixels.resize_surface(size.width, size.height)?;
            pixels.resize_buffer(size.width, size.height)?;
        }
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.resize(size.width, size.height)?;
        }
        debug!(width = size.width, height = size.height, "surface resized");
        if self.phase == AppPhase::Welcome || self.phase == AppPhase::Between {
            self.show_status()?;
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_session(event_loop) {
                self.fail(e, event_loop);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("window closed, aborting run");
                match self.abort_session() {
                    Ok(()) => self.finish(event_loop),
                    Err(e) => self.fail(e, event_loop),
                }
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed() && !event.repeat =>
            {
                self.handle_key(event.physical_key, event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Err(e) = self.handle_resize(size) {
                    self.fail(e, event_loop);
                }
            }
            WindowEvent::RedrawRequested => {
                if self.phase != AppPhase::Running {
                    if let Err(e) = self.present() {
                        warn!(error = %e, "redraw failed");
                    }
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.feed.push(delta.0, delta.1);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.phase == AppPhase::Running {
            if let Err(e) = self.step(event_loop) {
                self.fail(e, event_loop);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_names_the_subject() {
        let lines = status_lines(AppPhase::Welcome, "s07", 0);
        assert_eq!(lines[0], "Welcome, s07");
        assert!(lines[1].contains("<SPACE>") && lines[1].contains("<END>"));
    }

    #[test]
    fn between_blocks_counts_what_was_run() {
        assert_eq!(status_lines(AppPhase::Between, "s07", 1)[0], "You have run 1 block");
        assert_eq!(status_lines(AppPhase::Between, "s07", 3)[0], "You have run 3 blocks");
    }

    #[test]
    fn nothing_is_written_over_a_running_block() {
        assert!(status_lines(AppPhase::Running, "s07", 2).is_empty());
        assert!(status_lines(AppPhase::Done, "s07", 2).is_empty());
    }
}
