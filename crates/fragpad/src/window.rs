use std::ffi::CString;
use std::num::NonZeroU32;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use codestore::DraftCache;
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, PossiblyCurrentContext, Version};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use crossbeam_channel::Receiver;
use playground::{
    GlowBackend, SampleSource, SessionOptions, ShaderPlaygroundSession, TextSource, TracingSink,
    STARTER_SHADER,
};
use raw_window_handle::HasRawWindowHandle;
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use crate::controls::{self, ControlCommand};

pub struct WindowOptions {
    pub title: String,
    pub vsync: bool,
}

/// Collaborators feeding the running session.
pub struct Inputs {
    pub text: Box<dyn TextSource>,
    pub samples: Box<dyn SampleSource>,
    pub controls: Receiver<ControlCommand>,
}

/// Everything owned by the running window.
struct Live {
    session: ShaderPlaygroundSession<GlowBackend>,
    text: Box<dyn TextSource>,
    samples: Box<dyn SampleSource>,
    controls: Receiver<ControlCommand>,
    /// Uniform the arrow keys adjust.
    selected: Option<String>,
    drafts: Option<DraftCache>,
    last_cached: Option<String>,
    sink: TracingSink,
    title: String,
    shown_title: String,
    // Dropped after the session so GL objects go before the context.
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    window: Window,
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// Opens the playground window and runs until it is closed.
pub fn run_window(
    options: WindowOptions,
    session_options: SessionOptions,
    inputs: Inputs,
    drafts: Option<DraftCache>,
) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;

    let window_builder = WindowBuilder::new()
        .with_title(&options.title)
        .with_inner_size(PhysicalSize::new(
            session_options.width,
            session_options.height,
        ));
    let template = ConfigTemplateBuilder::new().with_alpha_size(8);
    let (window, gl_config) = DisplayBuilder::new()
        .with_window_builder(Some(window_builder))
        .build(&event_loop, template, |configs| {
            configs
                .reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
                .expect("display offered no GL configs")
        })
        .map_err(|err| anyhow!("failed to create GL display: {err}"))?;
    let window = window.ok_or_else(|| anyhow!("display builder did not create a window"))?;

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();
    let gles3 = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(3, 0))))
        .build(Some(raw_window_handle));
    let gles2 = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(2, 0))))
        .build(Some(raw_window_handle));
    let not_current = unsafe {
        gl_display
            .create_context(&gl_config, &gles3)
            .or_else(|_| gl_display.create_context(&gl_config, &gles2))
    }
    .context("failed to create a GLES context")?;

    let size = window.inner_size();
    let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        non_zero(size.width),
        non_zero(size.height),
    );
    let surface = unsafe { gl_display.create_window_surface(&gl_config, &surface_attributes) }
        .context("failed to create window surface")?;
    let context = not_current
        .make_current(&surface)
        .context("failed to make GL context current")?;

    if options.vsync {
        if let Err(err) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN))
        {
            warn!(%err, "vsync unavailable; rendering unthrottled");
        }
    }

    let gl = unsafe {
        glow::Context::from_loader_function(|symbol| {
            CString::new(symbol)
                .map(|name| gl_display.get_proc_address(&name))
                .unwrap_or(std::ptr::null())
        })
    };
    let backend = GlowBackend::new(gl).context("failed to initialise GL resources")?;

    let mut session_options = session_options;
    session_options.width = size.width;
    session_options.height = size.height;
    let session = ShaderPlaygroundSession::new(backend, session_options);
    info!(width = size.width, height = size.height, "window ready");

    let mut live = Some(Live {
        session,
        text: inputs.text,
        samples: inputs.samples,
        controls: inputs.controls,
        selected: None,
        drafts,
        last_cached: None,
        sink: TracingSink::default(),
        shown_title: options.title.clone(),
        title: options.title,
        surface,
        context,
        window,
    });

    event_loop
        .run(move |event, target| {
            target.set_control_flow(ControlFlow::Poll);

            if let Event::LoopExiting = event {
                if let Some(app) = live.take() {
                    app.shutdown();
                }
                return;
            }
            let Some(app) = live.as_mut() else {
                return;
            };

            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => target.exit(),
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                physical_key: PhysicalKey::Code(KeyCode::Escape),
                                state: ElementState::Pressed,
                                ..
                            },
                        ..
                    } => target.exit(),
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                physical_key: PhysicalKey::Code(code),
                                state: ElementState::Pressed,
                                ..
                            },
                        ..
                    } => match code {
                        KeyCode::Tab => app.select_next(),
                        KeyCode::ArrowUp => app.nudge_selected(true),
                        KeyCode::ArrowDown => app.nudge_selected(false),
                        _ => {}
                    },
                    WindowEvent::Resized(size) => app.resize(size),
                    WindowEvent::CursorMoved { position, .. } => {
                        // GL's origin is bottom-left.
                        let height = f64::from(app.window.inner_size().height);
                        app.session
                            .set_pointer(position.x as f32, (height - position.y) as f32);
                    }
                    WindowEvent::MouseInput {
                        state,
                        button: MouseButton::Left,
                        ..
                    } => app.session.set_button(state == ElementState::Pressed),
                    WindowEvent::RedrawRequested => app.frame(),
                    _ => {}
                },
                Event::AboutToWait => app.window.request_redraw(),
                _ => {}
            }
        })
        .context("event loop terminated with an error")?;

    Ok(())
}

impl Live {
    fn frame(&mut self) {
        self.apply_controls();
        self.session.tick(
            self.text.as_mut(),
            self.samples.as_mut(),
            &mut self.sink,
            Instant::now(),
        );
        self.cache_draft();
        self.refresh_title();
        if let Err(err) = self.surface.swap_buffers(&self.context) {
            warn!(%err, "failed to present frame");
        }
    }

    fn apply_controls(&mut self) {
        while let Ok(command) = self.controls.try_recv() {
            match command {
                ControlCommand::Set { name, args } => self.set_from_args(&name, &args),
                ControlCommand::List => {
                    for line in controls::describe(self.session.registry()) {
                        println!("{line}");
                    }
                }
            }
        }
    }

    fn set_from_args(&mut self, name: &str, args: &[String]) {
        let Some(entry) = self.session.registry().get(name) else {
            warn!(name, "no such uniform in the current shader");
            return;
        };
        let value = match controls::value_from_args(entry.glsl_type, args) {
            Ok(value) => value,
            Err(err) => {
                warn!(name, "{err:#}");
                return;
            }
        };
        match self.session.set_uniform(name, value) {
            Ok(()) => {
                if let Some(current) = self.session.registry().value(name) {
                    info!(name, value = %current, "uniform set");
                }
            }
            Err(err) => warn!(%err, "uniform rejected"),
        }
    }

    fn select_next(&mut self) {
        self.selected = controls::next_selection(self.session.registry(), self.selected.as_deref());
        match &self.selected {
            Some(name) => {
                let control = self.session.registry().control_for(name);
                info!(name = %name, ?control, "selected uniform");
            }
            None => debug!("no uniforms to select"),
        }
    }

    fn nudge_selected(&mut self, up: bool) {
        let Some(name) = self.selected.clone() else {
            return;
        };
        let registry = self.session.registry();
        let (Some(value), Some(spec)) = (registry.value(&name), registry.control_for(&name)) else {
            self.selected = None;
            return;
        };
        let Some(next) = controls::nudged(value, spec, up) else {
            debug!(name = %name, "uniform cannot be nudged; use `set`");
            return;
        };
        match self.session.set_uniform(&name, next) {
            Ok(()) => {
                if let Some(current) = self.session.registry().value(&name) {
                    info!(name = %name, value = %current, "uniform nudged");
                }
            }
            Err(err) => warn!(%err, "uniform rejected"),
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.surface
            .resize(&self.context, non_zero(size.width), non_zero(size.height));
        self.session.resize(size.width, size.height);
        debug!(width = size.width, height = size.height, "resized");
        self.window.request_redraw();
    }

    /// Stores each newly compiled text, skipping the starter shader.
    fn cache_draft(&mut self) {
        let Some(drafts) = &self.drafts else {
            return;
        };
        let Some(source) = self.session.source() else {
            return;
        };
        if source == STARTER_SHADER || self.last_cached.as_deref() == Some(source) {
            return;
        }
        if let Err(err) = drafts.store(source) {
            warn!(%err, "failed to cache draft");
        }
        self.last_cached = Some(source.to_string());
    }

    fn refresh_title(&mut self) {
        let title = match self.session.last_error() {
            Some(error) => match error.detail().and_then(|detail| detail.first_line()) {
                Some(line) => format!("{} (error on line {line})", self.title),
                None => format!("{} (error)", self.title),
            },
            None => self.title.clone(),
        };
        if title != self.shown_title {
            self.window.set_title(&title);
            self.shown_title = title;
        }
    }

    fn shutdown(self) {
        let backend = self.session.shutdown();
        backend.destroy();
        info!("window closed");
    }
}
