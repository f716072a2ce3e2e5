use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlInputElement};

use super::{apply_update, Listener, SharedRenderer};
use crate::controls::control_id;
use crate::vector::Channel;

/// Adds one fieldset per control to `container`, each with a range input
/// per channel. Returns the change listeners, which must be kept alive.
pub(crate) fn build(
    document: &Document,
    container: &Element,
    renderer: &SharedRenderer,
) -> Result<Vec<Listener>, JsValue> {
    let controls: Vec<_> = renderer
        .borrow()
        .controls()
        .iter()
        .map(|control| (control.uniform_name.clone(), control.label.clone(), control.current_value))
        .collect();

    let mut listeners = Vec::with_capacity(controls.len() * Channel::ALL.len());
    for (uniform_name, label, value) in controls {
        let fieldset = document.create_element("fieldset")?;
        let legend = document.create_element("legend")?;
        legend.set_text_content(Some(&label));
        fieldset.append_child(&legend)?;

        for channel in Channel::ALL {
            let id = control_id(&uniform_name, channel);
            let (row, listener) = range_input(document, renderer, &id, channel, channel.get(value))?;
            fieldset.append_child(&row)?;
            listeners.push(listener);
        }
        container.append_child(&fieldset)?;
    }
    Ok(listeners)
}

fn range_input(
    document: &Document,
    renderer: &SharedRenderer,
    id: &str,
    channel: Channel,
    initial: f32,
) -> Result<(Element, Listener), JsValue> {
    let label = document.create_element("label")?;
    label.set_attribute("for", id)?;
    let caption = document.create_element("span")?;
    caption.set_text_content(Some(channel.color_label()));
    label.append_child(&caption)?;

    let input = document
        .create_element("input")?
        .dyn_into::<HtmlInputElement>()
        .map_err(|_| JsValue::from_str("failed to create input element"))?;
    input.set_id(id);
    input.set_name(id);
    input.set_type("range");
    input.set_min("0");
    input.set_max("255");
    input.set_value(&initial.to_string());
    label.append_child(&input)?;

    let readout = document.create_element("span")?;
    readout.set_text_content(Some(&format!("({})", input.value())));
    label.append_child(&readout)?;

    let renderer = Rc::clone(renderer);
    let source = input.clone();
    let id = id.to_string();
    let listener = Listener::attach(&input, "change", move |_| {
        let value = source.value();
        match apply_update(&renderer, &id, &value) {
            Ok(_) => readout.set_text_content(Some(&format!("({value})"))),
            Err(err) => web_sys::console::error_1(&err),
        }
    })?;

    Ok((label, listener))
}
