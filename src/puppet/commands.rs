use super::BrowserPuppet;
use crate::codec::{JsFunction, Jsonf};
use crate::dom::{Document, NodeId, UploadedFile};
use crate::error::{BrowserError, Result};
use crate::protocol::{AssertOptions, Command, FileData, WaitTimings};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use std::sync::Arc;
use tokio::time::Instant;

/// Operations the puppet can perform on its page
#[async_trait]
pub trait PuppetCommands: Send + Sync {
    fn click(&self, selector: &str, options: Option<&AssertOptions>) -> Result<()>;

    /// Only `INPUT` and `TEXTAREA` elements accept a value
    fn set_value(&self, selector: &str, value: &str) -> Result<()>;

    /// Checked state of checkboxes, value of text controls, text of anything else
    fn get_value(&self, selector: &str) -> Result<Jsonf>;

    fn press_key(&self, selector: &str, key_code: u32) -> Result<()>;

    fn scroll(&self, selector: &str, scroll_top: f64) -> Result<()>;

    fn scroll_to(&self, selector: &str) -> Result<()>;

    fn mouseover(&self, selector: &str) -> Result<()>;

    fn focus(&self, selector: &str, options: Option<&AssertOptions>) -> Result<()>;

    fn is_visible(&self, selector: &str) -> Result<bool>;

    async fn wait_for_visible(&self, selector: &str, timings: WaitTimings) -> Result<()>;

    async fn wait_while_visible(&self, selector: &str, timings: WaitTimings) -> Result<()>;

    fn upload_file_and_assign(
        &self,
        selector: &str,
        file_data: &FileData,
        destination_variable: &str,
    ) -> Result<()>;

    async fn exec_function(&self, function: &JsFunction, args: Vec<Jsonf>) -> Result<Jsonf>;

    /// Run one command; composites run their children in order and stop at the first failure
    async fn exec_command(&self, command: &Command) -> Result<Option<Jsonf>> {
        debug!("exec {}", command.name());

        match command {
            Command::Click { selector, options } => {
                self.click(selector, options.as_ref()).map(|_| None)
            }
            Command::SetValue { selector, value } => self.set_value(selector, value).map(|_| None),
            Command::GetValue { selector } => self.get_value(selector).map(Some),
            Command::PressKey { selector, key_code } => {
                self.press_key(selector, *key_code).map(|_| None)
            }
            Command::Scroll { selector, scroll_top } => {
                self.scroll(selector, *scroll_top).map(|_| None)
            }
            Command::ScrollTo { selector } => self.scroll_to(selector).map(|_| None),
            Command::Mouseover { selector } => self.mouseover(selector).map(|_| None),
            Command::WaitForVisible { selector, poll_interval, timeout } => {
                let timings = WaitTimings::resolve(*poll_interval, None, *timeout);
                self.wait_for_visible(selector, timings).await.map(|_| None)
            }
            Command::WaitWhileVisible { selector, poll_interval, initial_delay, timeout } => {
                let timings = WaitTimings::resolve(*poll_interval, *initial_delay, *timeout);
                self.wait_while_visible(selector, timings).await.map(|_| None)
            }
            Command::Focus { selector, options } => {
                self.focus(selector, options.as_ref()).map(|_| None)
            }
            Command::IsVisible { selector } => {
                self.is_visible(selector).map(|v| Some(Jsonf::from(v)))
            }
            Command::UploadFileAndAssign { selector, file_data, destination_variable } => self
                .upload_file_and_assign(selector, file_data, destination_variable)
                .map(|_| None),
            Command::Composite { commands } => {
                for command in commands {
                    self.exec_command(command).await?;
                }
                Ok(None)
            }
        }
    }
}

impl BrowserPuppet {
    fn page(&self) -> &dyn Document {
        self.inner.document.as_ref()
    }

    /// Resolve `selector` to exactly one (optionally visible) element
    fn assert_element(
        &self,
        command: &str,
        selector: &str,
        assert_visibility: bool,
    ) -> Result<NodeId> {
        let nodes = self.page().query_selector_all(selector)?;

        let node = match nodes.as_slice() {
            [] => {
                return Err(BrowserError::SelectorNotFound {
                    command: command.to_string(),
                    selector: selector.to_string(),
                })
            }
            [node] => *node,
            _ => {
                return Err(BrowserError::SelectorNotUnique {
                    command: command.to_string(),
                    selector: selector.to_string(),
                })
            }
        };

        if assert_visibility && !is_node_visible(self.page(), node)? {
            return Err(BrowserError::SelectorNotVisible {
                command: command.to_string(),
                selector: selector.to_string(),
            });
        }

        Ok(node)
    }

    /// True if any match is displayed and on top at its own center
    pub fn is_selector_visible(&self, selector: &str) -> Result<bool> {
        for node in self.page().query_selector_all(selector)? {
            if is_node_visible(self.page(), node)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Displayed, and the hit test at its center lands on it or inside it
pub fn is_node_visible(document: &dyn Document, node: NodeId) -> Result<bool> {
    if !document.is_displayed(node)? {
        return Ok(false);
    }

    let (x, y) = document.bounding_box(node)?.center();
    match document.element_from_point(x, y)? {
        Some(hit) => document.contains(node, hit),
        None => Ok(false),
    }
}

fn timed_out(command: &str, selector: &str, timings: &WaitTimings) -> BrowserError {
    BrowserError::Timeout(format!(
        "{}: timed out (time: {}ms, selector: \"{}\")",
        command,
        timings.timeout.as_millis(),
        selector
    ))
}

#[async_trait]
impl PuppetCommands for BrowserPuppet {
    fn click(&self, selector: &str, options: Option<&AssertOptions>) -> Result<()> {
        let visible = AssertOptions::assert_visibility(options);
        let node = self.assert_element("click", selector, visible)?;
        self.page().click(node)
    }

    fn set_value(&self, selector: &str, value: &str) -> Result<()> {
        let node = self.assert_element("setValue", selector, true)?;
        let tag_name = self.page().element(node)?.tag_name;

        if tag_name != "INPUT" && tag_name != "TEXTAREA" {
            return Err(BrowserError::CommandFailed {
                command: "setValue".to_string(),
                reason: format!(
                    "Unable to set value of \"{}\": unsupported tag \"{}\"",
                    selector, tag_name
                ),
            });
        }

        self.page().set_value(node, value)
    }

    fn get_value(&self, selector: &str) -> Result<Jsonf> {
        let node = self.assert_element("getValue", selector, true)?;
        let info = self.page().element(node)?;

        if info.tag_name == "INPUT" && info.input_type().as_deref() == Some("checkbox") {
            return Ok(Jsonf::from(info.checked));
        }

        let text = match info.tag_name.as_str() {
            "INPUT" | "TEXTAREA" => info.value.unwrap_or_default(),
            _ => info.inner_text,
        };
        Ok(Jsonf::from(text.replace('\n', "\\n")))
    }

    fn press_key(&self, selector: &str, key_code: u32) -> Result<()> {
        let node = self.assert_element("pressKey", selector, true)?;
        self.page().press_key(node, key_code)
    }

    fn scroll(&self, selector: &str, scroll_top: f64) -> Result<()> {
        let node = self.assert_element("scroll", selector, true)?;
        self.page().set_scroll_top(node, scroll_top)
    }

    fn scroll_to(&self, selector: &str) -> Result<()> {
        let node = self.assert_element("scrollTo", selector, false)?;
        self.page().scroll_into_view(node)
    }

    fn mouseover(&self, selector: &str) -> Result<()> {
        let node = self.assert_element("mouseover", selector, true)?;
        self.page().mouseover(node)
    }

    fn focus(&self, selector: &str, options: Option<&AssertOptions>) -> Result<()> {
        let visible = AssertOptions::assert_visibility(options);
        let node = self.assert_element("focus", selector, visible)?;
        self.page().focus(node)
    }

    fn is_visible(&self, selector: &str) -> Result<bool> {
        self.is_selector_visible(selector)
    }

    async fn wait_for_visible(&self, selector: &str, timings: WaitTimings) -> Result<()> {
        let started = Instant::now();

        loop {
            if self.is_selector_visible(selector)? {
                return Ok(());
            }
            if started.elapsed() >= timings.timeout {
                return Err(timed_out("waitForVisible", selector, &timings));
            }
            tokio::time::sleep(timings.poll_interval).await;
        }
    }

    async fn wait_while_visible(&self, selector: &str, timings: WaitTimings) -> Result<()> {
        tokio::time::sleep(timings.initial_delay).await;
        let started = Instant::now();

        loop {
            if !self.is_selector_visible(selector)? {
                return Ok(());
            }
            if started.elapsed() >= timings.timeout {
                return Err(timed_out("waitWhileVisible", selector, &timings));
            }
            tokio::time::sleep(timings.poll_interval).await;
        }
    }

    fn upload_file_and_assign(
        &self,
        selector: &str,
        file_data: &FileData,
        destination_variable: &str,
    ) -> Result<()> {
        self.assert_element("uploadFileAndAssign", selector, false)?;

        let bytes = STANDARD
            .decode(file_data.base64.trim())
            .map_err(|e| BrowserError::CommandFailed {
                command: "uploadFileAndAssign".to_string(),
                reason: format!("invalid base64 data: {}", e),
            })?;

        let file = UploadedFile {
            name: file_data.name.clone(),
            mime_type: file_data.mime_type().to_string(),
            bytes,
        };
        self.page().assign_file(destination_variable, file)
    }

    /// Page scripts may block on promises, so they run off the async workers
    async fn exec_function(&self, function: &JsFunction, args: Vec<Jsonf>) -> Result<Jsonf> {
        let document: Arc<dyn Document> = self.inner.document.clone();
        let function = function.clone();

        tokio::task::spawn_blocking(move || document.exec_function(&function, &args))
            .await
            .map_err(|e| BrowserError::ScriptFailed(format!("script task failed: {}", e)))?
    }
}
