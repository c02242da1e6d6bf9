//! Scripted collaborators shared by the unit tests.

use crate::capture::{BackendKind, CaptureHost, DomToImageOptions, HtmlToCanvasOptions};
use crate::debugger::{OverrideMessage, OverrideSink};
use crate::error::{BridgeError, BridgeResult};
use crate::fetch::ScriptFetcher;
use async_trait::async_trait;
use reqwest::Url;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

pub(crate) async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}

/// Serves canned script bodies; unknown urls fail like a refused connection.
pub(crate) struct FakeFetcher {
    responses: Mutex<HashMap<String, String>>,
    requests: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            requests: AtomicUsize::new(0),
            gate: watch::channel(false).0,
        }
    }
}

impl FakeFetcher {
    pub(crate) fn respond(&self, url: &str, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    /// Parks every fetch until [`FakeFetcher::release`].
    pub(crate) fn hold(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn release(&self) {
        self.gate.send_replace(false);
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptFetcher for FakeFetcher {
    async fn fetch_text(&self, url: &Url) -> BridgeResult<String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|held| !*held).await;
        self.responses
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| BridgeError::InternalError(format!("connection refused: {}", url)))
    }
}

#[derive(Default)]
pub(crate) struct RecordingOverrides {
    messages: Mutex<Vec<OverrideMessage>>,
}

impl RecordingOverrides {
    pub(crate) fn messages(&self) -> Vec<OverrideMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl OverrideSink for RecordingOverrides {
    fn post(&self, message: OverrideMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

/// Capture host whose libraries load and render after a short delay.
#[derive(Default)]
pub(crate) struct FakeCaptureHost {
    preloaded: Mutex<HashSet<BackendKind>>,
    failing_loads: Mutex<HashSet<BackendKind>>,
    failing_renders: Mutex<HashSet<BackendKind>>,
    loads: Mutex<Vec<(BackendKind, String)>>,
    renders: Mutex<HashMap<BackendKind, usize>>,
    last_jpeg: Mutex<Option<DomToImageOptions>>,
    last_canvas: Mutex<Option<HtmlToCanvasOptions>>,
}

impl FakeCaptureHost {
    pub(crate) fn preload(&self, backend: BackendKind) {
        self.preloaded.lock().unwrap().insert(backend);
    }

    pub(crate) fn fail_load(&self, backend: BackendKind) {
        self.failing_loads.lock().unwrap().insert(backend);
    }

    pub(crate) fn fail_render(&self, backend: BackendKind) {
        self.failing_renders.lock().unwrap().insert(backend);
    }

    pub(crate) fn loads(&self) -> Vec<(BackendKind, String)> {
        self.loads.lock().unwrap().clone()
    }

    pub(crate) fn render_count(&self, backend: BackendKind) -> usize {
        self.renders
            .lock()
            .unwrap()
            .get(&backend)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn last_jpeg_options(&self) -> Option<DomToImageOptions> {
        self.last_jpeg.lock().unwrap().clone()
    }

    pub(crate) fn last_canvas_options(&self) -> Option<HtmlToCanvasOptions> {
        self.last_canvas.lock().unwrap().clone()
    }

    fn rendered(&self, backend: BackendKind) -> Result<String, String> {
        *self.renders.lock().unwrap().entry(backend).or_insert(0) += 1;
        if self.failing_renders.lock().unwrap().contains(&backend) {
            return Err("render exploded".to_string());
        }
        Ok(format!("data:image/jpeg;base64,{}", backend))
    }
}

#[async_trait]
impl CaptureHost for FakeCaptureHost {
    fn is_loaded(&self, backend: BackendKind) -> bool {
        self.preloaded.lock().unwrap().contains(&backend)
    }

    async fn load_library(&self, backend: BackendKind, url: &str) -> Result<(), String> {
        self.loads.lock().unwrap().push((backend, url.to_string()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.failing_loads.lock().unwrap().contains(&backend) {
            return Err("load refused".to_string());
        }
        Ok(())
    }

    async fn to_jpeg(&self, options: &DomToImageOptions) -> Result<String, String> {
        *self.last_jpeg.lock().unwrap() = Some(options.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.rendered(BackendKind::DomToImage)
    }

    async fn render_canvas(&self, options: &HtmlToCanvasOptions) -> Result<String, String> {
        *self.last_canvas.lock().unwrap() = Some(options.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.rendered(BackendKind::HtmlToCanvas)
    }
}
