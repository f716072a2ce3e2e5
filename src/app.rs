//! Windowed front end: a `winit` event loop driving a [`Renderer`] on the
//! `wgpu` backend, with control updates read from stdin.

use std::any::Any;
use std::fmt;
use std::io::{self, BufRead};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::window::{Window, WindowId};

use crate::config::HarnessConfig;
use crate::controls::{control_id, ControlEvent, UniformControlRegistry};
use crate::error::{InitError, UpdateError};
use crate::gpu::native::WgpuBackend;
use crate::render::Renderer;
use crate::shaders::ShaderSources;

/// Events delivered to the event loop from outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessEvent {
    Control(ControlEvent),
    Reset,
    Quit,
}

impl HarnessEvent {
    /// Parses one line of the stdin protocol. Blank lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Result<Self, crate::error::ControlError>> {
        let line = line.trim();
        match line {
            "" => None,
            "reset" => Some(Ok(HarnessEvent::Reset)),
            "quit" | "exit" => Some(Ok(HarnessEvent::Quit)),
            command => Some(ControlEvent::parse_command(command).map(HarnessEvent::Control)),
        }
    }
}

/// The window system or GPU could not be brought up. Callers may fall back
/// to headless mode.
#[derive(Debug)]
pub struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

/// Prints every control's current value on the 0-255 scale.
pub fn print_controls<L>(controls: &UniformControlRegistry<L>) {
    println!("Controls:");
    for control in controls.iter() {
        let value = control.current_value;
        println!(
            " - {} ({}) = ({:.2}, {:.2}, {:.2}) [{}]",
            control.uniform_name,
            control.label,
            value.x,
            value.y,
            value.z,
            if control.is_bound() { "bound" } else { "absent" }
        );
    }
}

struct NativeApp {
    config: HarnessConfig,
    sources: ShaderSources,
    renderer: Option<Renderer<WgpuBackend>>,
    last_error: Option<anyhow::Error>,
}

impl NativeApp {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title("lumen-harness")
            .with_inner_size(LogicalSize::new(800.0, 600.0));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let backend = block_on(WgpuBackend::new(Arc::clone(&window))).map_err(|err| match err {
            InitError::ContextUnavailable(reason) => {
                anyhow::Error::new(WindowInitError::from_error("GPU", reason))
            }
            other => anyhow::Error::new(other),
        })?;
        let renderer = Renderer::init(backend, &self.config, &self.sources, window.scale_factor())
            .context("failed to initialize renderer")?;
        println!(
            "Linked program with {} uniform control(s)",
            renderer.controls().len()
        );
        self.renderer = Some(renderer);
        Ok(())
    }

    fn handle(&mut self, event: HarnessEvent) -> Result<bool> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(true);
        };
        match event {
            HarnessEvent::Control(event) => {
                let id = control_id(&event.uniform_name, event.channel);
                match renderer.apply_event(&event) {
                    Ok(true) => debug!("applied {id} = {}", event.raw_value),
                    Ok(false) => warn!("ignored {id}: no bound control with that name"),
                    Err(UpdateError::Control(err)) => warn!("discarded {id}: {err}"),
                    Err(UpdateError::Gpu(err)) => return Err(err).context("failed to redraw"),
                }
            }
            HarnessEvent::Reset => renderer.reset_controls().context("failed to redraw")?,
            HarnessEvent::Quit => return Ok(false),
        }
        Ok(true)
    }
}

impl ApplicationHandler<HarnessEvent> for NativeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                let scale = renderer.backend().window().scale_factor();
                renderer.resize(scale).map(|(width, height)| {
                    debug!("viewport {width}x{height}");
                })
            }
            WindowEvent::RedrawRequested => renderer.render(),
            _ => Ok(()),
        };
        if let Err(err) = result {
            self.fail(event_loop, anyhow::Error::new(err).context("failed to draw frame"));
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: HarnessEvent) {
        match self.handle(event) {
            Ok(true) => {}
            Ok(false) => event_loop.exit(),
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.take() {
            print_controls(renderer.controls());
            drop(renderer.shutdown());
        }
    }
}

/// Reads stdin commands on a helper thread and forwards them into the
/// event loop. The thread ends at EOF or once the loop has closed.
fn spawn_stdin_reader(proxy: EventLoopProxy<HarnessEvent>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match HarnessEvent::parse_line(&line) {
                None => {}
                Some(Ok(event)) => {
                    if proxy.send_event(event).is_err() {
                        break;
                    }
                }
                Some(Err(err)) => warn!("discarded `{}`: {err}", line.trim()),
            }
        }
    });
}

/// Opens a window and runs until it is closed. Window-system and GPU
/// failures are reported as [`WindowInitError`].
pub fn run_native(config: HarnessConfig, sources: ShaderSources) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(|| {
        EventLoop::<HarnessEvent>::with_user_event().build()
    }));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    spawn_stdin_reader(event_loop.create_proxy());
    info!("reading control updates from stdin (`<uniform>-<channel>=<value>`, `reset`, `quit`)");

    let mut app = NativeApp {
        config,
        sources,
        renderer: None,
        last_error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated with error")?;

    match app.last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
