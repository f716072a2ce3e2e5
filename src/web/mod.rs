//! Browser entry point: WebGL rendering into a canvas with DOM range inputs
//! for the controls.

mod controls;

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{console, Event, EventTarget, HtmlCanvasElement};

use crate::config::HarnessConfig;
use crate::controls::ControlEvent;
use crate::error::UpdateError;
use crate::gpu::reflect::ShaderLanguage;
use crate::gpu::webgl::WebGlBackend;
use crate::render::Renderer;

pub(crate) type SharedRenderer = Rc<RefCell<Renderer<WebGlBackend>>>;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
}

/// Event listener that is removed again when dropped.
pub(crate) struct Listener {
    target: EventTarget,
    kind: &'static str,
    closure: Closure<dyn FnMut(Event)>,
}

impl Listener {
    pub(crate) fn attach(
        target: &EventTarget,
        kind: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
        target.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref())?;
        Ok(Self {
            target: target.clone(),
            kind,
            closure,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.closure.as_ref().unchecked_ref());
    }
}

fn device_pixel_ratio() -> f64 {
    web_sys::window().map_or(1.0, |window| window.device_pixel_ratio())
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Applies one update and reports discarded ones to the console.
pub(crate) fn apply_update(renderer: &SharedRenderer, id: &str, value: &str) -> Result<bool, JsValue> {
    let event = match ControlEvent::from_id(id, value) {
        Ok(event) => event,
        Err(err) => {
            console::warn_1(&format!("discarded {id}: {err}").into());
            return Ok(false);
        }
    };
    match renderer.borrow_mut().apply_event(&event) {
        Ok(applied) => Ok(applied),
        Err(UpdateError::Control(err)) => {
            console::warn_1(&format!("discarded {id}: {err}").into());
            Ok(false)
        }
        Err(UpdateError::Gpu(err)) => Err(js_error(err)),
    }
}

#[wasm_bindgen]
pub struct WasmHarness {
    inner: SharedRenderer,
    _listeners: Vec<Listener>,
}

#[wasm_bindgen]
impl WasmHarness {
    /// Initializes WebGL on `canvas_id`. When `controls_id` names an
    /// element, one fieldset of range inputs per control is added to it.
    #[wasm_bindgen(constructor)]
    pub fn new(
        canvas_id: String,
        controls_id: Option<String>,
        config_xml: Option<String>,
    ) -> Result<WasmHarness, JsValue> {
        let config = match config_xml {
            Some(xml) => HarnessConfig::from_xml(&xml).map_err(js_error)?,
            None => HarnessConfig::default(),
        };
        if config.shaders.is_some() {
            return Err(JsValue::from_str(
                "shader files cannot be read in the browser; use the embedded variants",
            ));
        }
        let sources = config.variant.sources(ShaderLanguage::Glsl);

        let window = web_sys::window().ok_or_else(|| JsValue::from_str("window not available"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("document not available"))?;
        let canvas = document
            .get_element_by_id(&canvas_id)
            .ok_or_else(|| JsValue::from_str("canvas element not found"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str("element is not a canvas"))?;

        let backend = WebGlBackend::new(canvas).map_err(js_error)?;
        let renderer = Renderer::init(backend, &config, &sources, device_pixel_ratio())
            .map_err(js_error)?;
        console::info_1(
            &format!(
                "linked program with {} uniform control(s)",
                renderer.controls().len()
            )
            .into(),
        );
        let inner: SharedRenderer = Rc::new(RefCell::new(renderer));

        let mut listeners = Vec::new();
        if let Some(controls_id) = controls_id {
            let container = document
                .get_element_by_id(&controls_id)
                .ok_or_else(|| JsValue::from_str("controls element not found"))?;
            listeners.extend(controls::build(&document, &container, &inner)?);
        }

        let resize_target = Rc::clone(&inner);
        listeners.push(Listener::attach(&window, "resize", move |_| {
            if let Err(err) = resize_target.borrow_mut().resize(device_pixel_ratio()) {
                console::error_1(&format!("resize failed: {err}").into());
            }
        })?);

        Ok(Self {
            inner,
            _listeners: listeners,
        })
    }

    /// Sets one channel by control id (`<uniform>-<channel>`) and redraws.
    pub fn update(&self, id: &str, value: &str) -> Result<bool, JsValue> {
        apply_update(&self.inner, id, value)
    }

    pub fn resize(&self) -> Result<(), JsValue> {
        self.inner
            .borrow_mut()
            .resize(device_pixel_ratio())
            .map(|_| ())
            .map_err(js_error)
    }

    pub fn render(&self) -> Result<(), JsValue> {
        self.inner.borrow_mut().render().map_err(js_error)
    }

    pub fn reset(&self) -> Result<(), JsValue> {
        self.inner.borrow_mut().reset_controls().map_err(js_error)
    }
}
