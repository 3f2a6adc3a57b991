//! Capture listeners: turn page events into upstream messages

use super::PuppetInner;
use crate::dom::{DomEvent, ElementInfo, NodeId};
use crate::error::Result;
use crate::protocol::{CapturedEvent, CapturedEventType, TargetNode, UpstreamMessage};
use log::{debug, error};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SHIFT_KEY: u32 = 16;
pub const CTRL_KEY: u32 = 17;

/// Ctrl+Shift, pressed in either order
pub fn is_insert_assertion_chord(key_code: u32, ctrl_key: bool, shift_key: bool) -> bool {
    (key_code == SHIFT_KEY && ctrl_key) || (key_code == CTRL_KEY && shift_key)
}

impl PuppetInner {
    pub(super) fn on_dom_event(self: &Arc<Self>, event: DomEvent) {
        match event {
            DomEvent::Mutation => self.on_mutation(),
            DomEvent::Console { message_type, message } => self.on_console(message_type, message),
            DomEvent::WindowBlur => self.on_window_blur(),
            DomEvent::Scroll { target } => self.on_scroll(target),
            DomEvent::Keydown { target, key_code, ctrl_key, shift_key, alt_key } => {
                self.on_keydown(target, key_code, ctrl_key, shift_key, alt_key)
            }
            DomEvent::Click { target } => self.capture_simple(CapturedEventType::Click, target),
            DomEvent::Input { target } => self.capture_simple(CapturedEventType::Input, target),
            DomEvent::Change { target } => self.capture_simple(CapturedEventType::Change, target),
            DomEvent::Focus { target } => self.on_focus(target),
            DomEvent::Mouseover { target } => self.on_mouseover(target),
        }
    }

    fn capture_simple(&self, event_type: CapturedEventType, target: NodeId) {
        if !self.can_capture() {
            return;
        }
        self.capture(event_type, target, |_, _| {});
    }

    fn on_focus(&self, target: NodeId) {
        if !self.can_capture() {
            return;
        }

        {
            let mut before_blur = self.active_before_blur.lock();
            if *before_blur == Some(target) {
                debug!("focus capture prevented during window re-focus");
                *before_blur = None;
                return;
            }
        }

        self.capture(CapturedEventType::Focus, target, |_, _| {});
    }

    fn on_keydown(
        self: &Arc<Self>,
        target: NodeId,
        key_code: u32,
        ctrl_key: bool,
        shift_key: bool,
        alt_key: bool,
    ) {
        if !self.can_capture() {
            return;
        }

        if is_insert_assertion_chord(key_code, ctrl_key, shift_key) {
            self.request_insert_assertion();
            return;
        }

        self.capture(CapturedEventType::Keydown, target, |event, _| {
            event.key_code = Some(key_code);
            event.ctrl_key = Some(ctrl_key);
            event.shift_key = Some(shift_key);
            event.alt_key = Some(alt_key);
        });
    }

    fn on_mouseover(&self, target: NodeId) {
        if !self.can_capture() {
            return;
        }

        let Some(selector) = self.mouseover_selector.read().clone() else {
            return;
        };

        match self.document.matches(target, &selector) {
            Ok(true) => self.capture(CapturedEventType::Mouseover, target, |_, _| {}),
            Ok(false) => {}
            Err(e) => error!("mouseover capture: {}", e),
        }
    }

    /// Debounced; only the last scroll of a burst is captured
    fn on_scroll(self: &Arc<Self>, target: NodeId) {
        let Some(runtime) = self.runtime.get() else {
            return;
        };

        let weak = Arc::downgrade(self);
        self.scroll_debounce.schedule(runtime, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.can_capture() {
                return;
            }
            inner.capture(CapturedEventType::Scroll, target, |event, info| {
                event.target.scroll_top = Some(info.scroll_top);
            });
        });
    }

    fn request_insert_assertion(self: &Arc<Self>) {
        let Some(runtime) = self.runtime.get() else {
            return;
        };

        let weak = Arc::downgrade(self);
        self.insert_assertion_debounce.schedule(runtime, move || {
            if let Some(inner) = weak.upgrade() {
                inner.notify(&UpstreamMessage::InsertAssertion);
            }
        });
    }

    fn on_window_blur(&self) {
        match self.document.active_element() {
            Ok(active) => *self.active_before_blur.lock() = active,
            Err(e) => error!("window blur: {}", e),
        }
    }

    fn on_console(&self, message_type: String, message: String) {
        if !self.is_connected() {
            return;
        }
        self.notify(&UpstreamMessage::ConsolePipe { message_type, message });
    }

    fn on_mutation(&self) {
        let became_visible = {
            let mut observer = self.observer.lock();
            match observer.as_mut() {
                Some(observer) => observer.check(self.document.as_ref()),
                None => return,
            }
        };

        for selector in became_visible {
            self.notify(&UpstreamMessage::SelectorBecameVisible { selector });
        }
    }

    /// Build and send a captured event; failures are logged and the capture skipped
    fn capture(
        &self,
        event_type: CapturedEventType,
        target: NodeId,
        decorate: impl FnOnce(&mut CapturedEvent, &ElementInfo),
    ) {
        match self.captured_event(event_type, target) {
            Ok((mut event, info)) => {
                decorate(&mut event, &info);
                self.notify(&UpstreamMessage::CapturedEvent { event });
            }
            Err(e) => error!("{} capture failed: {}", event_type_name(event_type), e),
        }
    }

    fn captured_event(
        &self,
        event_type: CapturedEventType,
        target: NodeId,
    ) -> Result<(CapturedEvent, ElementInfo)> {
        let unique_selector = self.unique_selector.read().clone();
        let document = self.document.as_ref();

        let selector = unique_selector.get(document, target)?;
        let full_selector_path = match event_type {
            CapturedEventType::Change => None,
            _ => Some(unique_selector.full_selector_path(document, target)?),
        };
        let info = document.element(target)?;

        let event = CapturedEvent {
            event_type,
            timestamp: now_millis(),
            selector: Some(selector),
            full_selector_path,
            value: match event_type {
                CapturedEventType::Input => info.value.clone(),
                _ => None,
            },
            key_code: None,
            ctrl_key: None,
            shift_key: None,
            alt_key: None,
            target: target_node(&info),
        };

        Ok((event, info))
    }
}

/// Target snapshot: basic properties, every `data-*` attribute, file names of file inputs
pub fn target_node(info: &ElementInfo) -> TargetNode {
    let input_type = info.input_type();
    let is_file_input = info.tag_name == "INPUT" && input_type.as_deref() == Some("file");

    TargetNode {
        class_name: info.class_name.clone(),
        id: info.id.clone(),
        inner_text: info.inner_text.clone(),
        tag_name: info.tag_name.clone(),
        input_type,
        scroll_top: None,
        file_names: is_file_input.then(|| info.file_names.clone()),
        data: info
            .attributes
            .iter()
            .filter(|(name, _)| name.starts_with("data-"))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    }
}

fn event_type_name(event_type: CapturedEventType) -> &'static str {
    match event_type {
        CapturedEventType::Click => "click",
        CapturedEventType::Focus => "focus",
        CapturedEventType::Input => "input",
        CapturedEventType::Scroll => "scroll",
        CapturedEventType::Keydown => "keydown",
        CapturedEventType::Change => "change",
        CapturedEventType::Mouseover => "mouseover",
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
