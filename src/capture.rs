//! Still-image capture of the visual surface.
//!
//! Two interchangeable rendering libraries can produce the image. dom-to-image
//! is tried first; after its first failure the capture permanently switches to
//! html2canvas. Libraries are loaded into the page only when first needed, and
//! concurrent captures share a single in-flight load.

use crate::config::BridgeConfig;
use crate::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error};

pub const DEVTOOL_OVERLAY: &str = "__devtools-overlay__";
pub const DEVTOOL_STYLESHEET: &str = "__devtools-stylesheet__";
pub const HTML_TO_CANVAS_CONTAINER: &str = "html2canvas-container";
pub const HTML_TO_CANVAS_CANVAS: &str = "html2canvas-canvas";

/// Class names of elements injected by the bridge or the capture libraries.
pub const IGNORED_CLASSES: [&str; 4] = [
    DEVTOOL_OVERLAY,
    DEVTOOL_STYLESHEET,
    HTML_TO_CANVAS_CONTAINER,
    HTML_TO_CANVAS_CANVAS,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    DomToImage,
    HtmlToCanvas,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::DomToImage => write!(f, "dom-to-image"),
            BackendKind::HtmlToCanvas => write!(f, "html2canvas"),
        }
    }
}

/// What the exclusion predicate gets to see of an element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementInfo {
    pub tag_name: String,
    pub class_names: Vec<String>,
    pub display: Option<String>,
    pub opacity: Option<f64>,
    pub visibility: Option<String>,
}

/// `true` for elements that must not appear in a capture.
pub fn is_excluded(element: &ElementInfo) -> bool {
    if element.tag_name.eq_ignore_ascii_case("script") {
        return true;
    }
    element
        .class_names
        .iter()
        .any(|class| IGNORED_CLASSES.contains(&class.as_str()))
        || element.display.as_deref() == Some("none")
        || element.opacity == Some(0.0)
        || element.visibility.as_deref() == Some("hidden")
}

fn is_included(element: &ElementInfo) -> bool {
    !is_excluded(element)
}

pub type ElementFilter = fn(&ElementInfo) -> bool;

/// Arguments for dom-to-image's `toJpeg`. `filter` keeps an element when it
/// returns `true`.
#[derive(Debug, Clone)]
pub struct DomToImageOptions {
    pub quality: f64,
    pub filter: ElementFilter,
}

/// Arguments for `html2canvas`. `ignore_elements` drops an element when it
/// returns `true`.
#[derive(Debug, Clone)]
pub struct HtmlToCanvasOptions {
    pub allow_taint: bool,
    pub background_color: Option<String>,
    pub use_cors: bool,
    pub image_timeout: Duration,
    pub scale: f64,
    pub logging: bool,
    pub foreign_object_rendering: bool,
    pub ignore_elements: ElementFilter,
}

/// The page side of capture: library injection and the two render calls.
/// Errors are the library's own messages.
#[async_trait]
pub trait CaptureHost: Send + Sync {
    /// Whether the library's global is already present in the page.
    fn is_loaded(&self, backend: BackendKind) -> bool;

    async fn load_library(&self, backend: BackendKind, url: &str) -> Result<(), String>;

    /// Renders the document body, returning a JPEG data URL.
    async fn to_jpeg(&self, options: &DomToImageOptions) -> Result<String, String>;

    /// Renders the document body to a canvas and returns it as a JPEG data URL.
    async fn render_canvas(&self, options: &HtmlToCanvasOptions) -> Result<String, String>;
}

type SharedLoad = Shared<BoxFuture<'static, CaptureResult<()>>>;
type SharedCapture = Shared<BoxFuture<'static, CaptureResult<String>>>;

enum LibraryState {
    NotLoaded,
    Loading(SharedLoad),
    Loaded,
    Failed,
}

#[derive(Default)]
struct CaptureGate {
    last_run: Option<Instant>,
    pending: Option<SharedCapture>,
}

struct CaptureInner {
    host: Arc<dyn CaptureHost>,
    config: BridgeConfig,
    prefer_dom_to_image: AtomicBool,
    libraries: Mutex<HashMap<BackendKind, LibraryState>>,
    gate: Mutex<CaptureGate>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct CaptureBackend {
    inner: Arc<CaptureInner>,
}

impl CaptureBackend {
    pub fn new(host: Arc<dyn CaptureHost>, config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(CaptureInner {
                host,
                config,
                prefer_dom_to_image: AtomicBool::new(true),
                libraries: Mutex::new(HashMap::new()),
                gate: Mutex::new(CaptureGate::default()),
            }),
        }
    }

    pub fn active_backend(&self) -> BackendKind {
        self.inner.active_backend()
    }

    /// Captures the visual surface as a JPEG data URL.
    ///
    /// At most one capture runs per window. Calls landing inside the window
    /// wait for its end and share the single capture that runs then.
    pub async fn capture_screen(&self) -> CaptureResult<String> {
        let scheduled = {
            let mut gate = lock(&self.inner.gate);
            if let Some(pending) = gate.pending.clone() {
                pending
            } else {
                let now = Instant::now();
                let start = gate
                    .last_run
                    .map(|last| last + self.inner.config.capture_window())
                    .filter(|due| *due > now)
                    .unwrap_or(now);
                let inner = Arc::clone(&self.inner);
                let run = async move {
                    if start > Instant::now() {
                        sleep_until(start).await;
                    }
                    {
                        let mut gate = lock(&inner.gate);
                        gate.pending = None;
                        gate.last_run = Some(Instant::now());
                    }
                    inner.run_capture().await
                }
                .boxed()
                .shared();
                gate.pending = Some(run.clone());
                run
            }
        };
        scheduled.await
    }
}

impl CaptureInner {
    fn active_backend(&self) -> BackendKind {
        if self.prefer_dom_to_image.load(Ordering::SeqCst) {
            BackendKind::DomToImage
        } else {
            BackendKind::HtmlToCanvas
        }
    }

    fn library_url(&self, backend: BackendKind) -> String {
        match backend {
            BackendKind::DomToImage => self.config.dom_to_image_url.clone(),
            BackendKind::HtmlToCanvas => self.config.html_to_canvas_url.clone(),
        }
    }

    async fn run_capture(&self) -> CaptureResult<String> {
        let backend = self.active_backend();
        let result = match self.ensure_loaded(backend).await {
            Ok(()) => self.render(backend).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!("Failed to capture screen with {}: {}", backend, e);
            if backend == BackendKind::DomToImage
                && self.prefer_dom_to_image.swap(false, Ordering::SeqCst)
            {
                debug!("Switching screen capture to {}", BackendKind::HtmlToCanvas);
            }
        }
        result
    }

    async fn ensure_loaded(&self, backend: BackendKind) -> CaptureResult<()> {
        let load = {
            let mut libraries = lock(&self.libraries);
            let state = libraries.entry(backend).or_insert(LibraryState::NotLoaded);
            match state {
                LibraryState::Loaded => return Ok(()),
                LibraryState::Failed => return Err(CaptureError::LibraryUnavailable(backend)),
                LibraryState::Loading(load) => load.clone(),
                LibraryState::NotLoaded => {
                    if self.host.is_loaded(backend) {
                        *state = LibraryState::Loaded;
                        return Ok(());
                    }
                    let host = Arc::clone(&self.host);
                    let url = self.library_url(backend);
                    debug!("Loading {} from {}", backend, url);
                    let load = async move {
                        host.load_library(backend, &url)
                            .await
                            .map_err(|message| CaptureError::LibraryLoad { backend, message })
                    }
                    .boxed()
                    .shared();
                    *state = LibraryState::Loading(load.clone());
                    load
                }
            }
        };

        let result = load.await;
        let mut libraries = lock(&self.libraries);
        if let Some(state) = libraries.get_mut(&backend) {
            if matches!(state, LibraryState::Loading(_)) {
                *state = match &result {
                    Ok(()) => LibraryState::Loaded,
                    Err(_) => LibraryState::Failed,
                };
            }
        }
        result
    }

    async fn render(&self, backend: BackendKind) -> CaptureResult<String> {
        let rendered = match backend {
            BackendKind::DomToImage => {
                let options = DomToImageOptions {
                    quality: self.config.jpeg_quality,
                    filter: is_included,
                };
                self.host.to_jpeg(&options).await
            }
            BackendKind::HtmlToCanvas => {
                let options = HtmlToCanvasOptions {
                    allow_taint: true,
                    background_color: None,
                    use_cors: true,
                    image_timeout: self.config.image_timeout(),
                    scale: 1.0,
                    logging: false,
                    foreign_object_rendering: false,
                    ignore_elements: is_excluded,
                };
                self.host.render_canvas(&options).await
            }
        };
        rendered.map_err(|message| CaptureError::Render { backend, message })
    }
}
