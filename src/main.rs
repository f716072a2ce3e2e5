#[cfg(not(target_arch = "wasm32"))]
use std::env;

#[cfg(not(target_arch = "wasm32"))]
use anyhow::{anyhow, Context, Result};

#[cfg(not(target_arch = "wasm32"))]
use lumen_harness::{
    app::{print_controls, run_native, WindowInitError},
    ControlEvent, HarnessConfig, RecordingBackend, Renderer, ShaderLanguage, UpdateError,
};

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let config = match &options.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("failed to load harness description {path}"))?,
        None if options.solid => HarnessConfig::solid(),
        None => HarnessConfig::default(),
    };

    if options.headless {
        return run_headless(&config, &options);
    }

    let sources = config
        .shader_sources(ShaderLanguage::Wgsl)
        .context("failed to read shader sources")?;
    match run_native(config.clone(), sources) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!("{err}. Falling back to --headless mode.");
                run_headless(&config, &options)
            } else {
                Err(err)
            }
        }
    }
}

/// Drives the recording backend through init, the `--set` updates and a
/// final frame, then prints what happened.
#[cfg(not(target_arch = "wasm32"))]
fn run_headless(config: &HarnessConfig, options: &CliOptions) -> Result<()> {
    let sources = config
        .shader_sources(ShaderLanguage::Glsl)
        .context("failed to read shader sources")?;
    let (width, height) = options.size;
    let backend = RecordingBackend::with_client_size(f64::from(width), f64::from(height));
    let mut renderer = Renderer::init(backend, config, &sources, options.device_pixel_ratio)
        .context("failed to initialize renderer")?;

    println!(
        "Linked program with {} uniform control(s)",
        renderer.controls().len()
    );

    for (id, value) in &options.updates {
        let event = match ControlEvent::from_id(id, value.as_str()) {
            Ok(event) => event,
            Err(err) => {
                println!("Rejected {id}={value}: {err}");
                continue;
            }
        };
        match renderer.apply_event(&event) {
            Ok(true) => println!("Applied {id}={value}"),
            Ok(false) => println!("Ignored {id}={value}: no bound control"),
            Err(UpdateError::Control(err)) => println!("Rejected {id}={value}: {err}"),
            Err(UpdateError::Gpu(err)) => return Err(err).context("failed to redraw"),
        }
    }

    print_controls(renderer.controls());
    let stats = renderer.backend().stats();
    println!(
        "Rendered {} frame(s): {} draw call(s), {} control upload(s)",
        stats.frames, stats.draw_calls, stats.control_uploads
    );
    if let Some(rect) = renderer.viewport().current() {
        println!("Viewport: {}x{}", rect.width, rect.height);
    }

    let backend = renderer.shutdown();
    log::debug!("{} GPU object(s) left after shutdown", backend.live_objects());
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
const USAGE: &str = "Usage: lumen-harness [config.xml] [--headless] [--solid] [--set ID=VALUE]... [--size WxH] [--dpr N]";

#[cfg(not(target_arch = "wasm32"))]
struct CliOptions {
    config: Option<String>,
    headless: bool,
    solid: bool,
    updates: Vec<(String, String)>,
    size: (u32, u32),
    device_pixel_ratio: f64,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliOptions {
    fn parse() -> Result<Self> {
        Self::parse_from(env::args().skip(1))
    }

    fn parse_from(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            config: None,
            headless: false,
            solid: false,
            updates: Vec::new(),
            size: (800, 600),
            device_pixel_ratio: 1.0,
        };

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--solid" => options.solid = true,
                "--set" => {
                    let value = args.next().ok_or_else(|| anyhow!("--set needs ID=VALUE\n{USAGE}"))?;
                    let (id, raw) = value
                        .split_once('=')
                        .ok_or_else(|| anyhow!("--set expects ID=VALUE, got `{value}`"))?;
                    options.updates.push((id.to_string(), raw.to_string()));
                }
                "--size" => {
                    let value = args.next().ok_or_else(|| anyhow!("--size needs WxH\n{USAGE}"))?;
                    options.size = value
                        .split_once('x')
                        .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
                        .ok_or_else(|| anyhow!("--size expects WxH, got `{value}`"))?;
                }
                "--dpr" => {
                    let value = args.next().ok_or_else(|| anyhow!("--dpr needs a number\n{USAGE}"))?;
                    options.device_pixel_ratio = value
                        .parse::<f64>()
                        .ok()
                        .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
                        .ok_or_else(|| anyhow!("--dpr expects a positive number, got `{value}`"))?;
                }
                "-h" | "--help" => return Err(anyhow!(USAGE)),
                other if other.starts_with('-') => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
                path if options.config.is_none() => options.config = Some(path.to_string()),
                extra => return Err(anyhow!("Unexpected argument: {extra}\n{USAGE}")),
            }
        }
        if options.solid && options.config.is_some() {
            return Err(anyhow!("--solid cannot be combined with a harness description"));
        }
        Ok(options)
    }
}
