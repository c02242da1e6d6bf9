//! ScreenPreview domain: a live structural mirror of the page.
//!
//! While a preview is running the frontend receives a `captured` snapshot on
//! every (throttled) mutation of the content tree, plus the page's scroll
//! position and pointer location. Snapshots carry the body markup every time,
//! but the serialized stylesheets only when the number of style elements has
//! changed since the previous snapshot. The receiver keeps the last `head` it
//! saw when one arrives without it.

use crate::capture::CaptureBackend;
use crate::config::BridgeConfig;
use crate::domain::{DomainSender, ProtocolDomain};
use crate::error::CaptureResult;
use crate::page::{effective_scroll, is_mobile, ContentTree, PageActivity, PointerEvent, StyleSource};
use crate::protocol::event;
use crate::throttle::Throttle;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuralSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    pub body: String,
    pub width: u32,
    pub height: u32,
    pub is_mobile: bool,
}

impl StructuralSnapshot {
    fn of(tree: &dyn ContentTree, head: Option<String>) -> Self {
        let viewport = tree.viewport();
        Self {
            head,
            body: tree.body_html(),
            width: viewport.width,
            height: viewport.height,
            is_mobile: is_mobile(&tree.user_agent()),
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrollState {
    pub scroll_top: f64,
    pub scroll_left: f64,
}

/// Serializes stylesheet elements into a standalone `<head>`.
pub fn join_style_tags(styles: &[StyleSource]) -> String {
    let tags: String = styles
        .iter()
        .map(|style| match style {
            StyleSource::Link { href } => format!(r#"<link href="{}" rel="stylesheet">"#, href),
            StyleSource::Inline { text } => format!("<style>{}</style>", text),
        })
        .collect();
    format!("<head>{}</head>", tags)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything `startPreview` attached, torn down together.
struct PreviewSession {
    active: Arc<AtomicBool>,
    listener: JoinHandle<()>,
    mutations: Arc<Throttle<()>>,
    scroll: Arc<Throttle<()>>,
    pointer: Arc<Throttle<PointerEvent>>,
}

impl PreviewSession {
    fn close(self) {
        self.active.store(false, Ordering::SeqCst);
        self.listener.abort();
        self.mutations.cancel();
        self.scroll.cancel();
        self.pointer.cancel();
    }
}

pub struct ScreenMirror {
    sender: DomainSender,
    tree: Arc<dyn ContentTree>,
    capture: CaptureBackend,
    config: BridgeConfig,
    session: Mutex<Option<PreviewSession>>,
}

impl ProtocolDomain for ScreenMirror {
    const NAMESPACE: &'static str = "ScreenPreview";

    fn sender(&self) -> &DomainSender {
        &self.sender
    }
}

impl ScreenMirror {
    pub fn new(
        sender: DomainSender,
        tree: Arc<dyn ContentTree>,
        capture: CaptureBackend,
        config: BridgeConfig,
    ) -> Self {
        Self {
            sender,
            tree,
            capture,
            config,
            session: Mutex::new(None),
        }
    }

    pub fn is_observing(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// Sends a full snapshot and starts mirroring. Calling it while already
    /// observing restarts the preview. Must run inside a tokio runtime.
    pub fn start_preview(&self) {
        let previous = lock(&self.session).take();
        if let Some(previous) = previous {
            debug!("Restarting screen preview");
            previous.close();
        }

        // Subscribe first so nothing between the snapshot and the listener is lost
        let activity = self.tree.subscribe();
        let styles = self.tree.style_sources();
        let style_count = Arc::new(Mutex::new(styles.len()));
        // Sent without the session lock held, the channel may call back in
        self.send(
            event::CAPTURED,
            StructuralSnapshot::of(self.tree.as_ref(), Some(join_style_tags(&styles))),
        );

        let active = Arc::new(AtomicBool::new(true));

        let mutations = {
            let sender = self.sender.clone();
            let tree = Arc::clone(&self.tree);
            let active = Arc::clone(&active);
            Arc::new(Throttle::new(self.config.mutation_window(), move |()| {
                if !active.load(Ordering::SeqCst) {
                    return;
                }
                let styles = tree.style_sources();
                let head = {
                    let mut count = lock(&style_count);
                    if styles.len() != *count {
                        *count = styles.len();
                        Some(join_style_tags(&styles))
                    } else {
                        None
                    }
                };
                sender.send(event::CAPTURED, StructuralSnapshot::of(tree.as_ref(), head));
            }))
        };

        let scroll = {
            let sender = self.sender.clone();
            let tree = Arc::clone(&self.tree);
            let active = Arc::clone(&active);
            Arc::new(Throttle::new(self.config.scroll_window(), move |()| {
                if !active.load(Ordering::SeqCst) {
                    return;
                }
                let offsets = effective_scroll(tree.as_ref());
                sender.send(
                    event::SYNC_SCROLL,
                    ScrollState {
                        scroll_top: offsets.top,
                        scroll_left: offsets.left,
                    },
                );
            }))
        };

        let pointer = {
            let sender = self.sender.clone();
            let active = Arc::clone(&active);
            Arc::new(Throttle::new(
                self.config.pointer_window(),
                move |pointer: PointerEvent| {
                    if active.load(Ordering::SeqCst) {
                        sender.send(event::SYNC_MOUSE, pointer);
                    }
                },
            ))
        };

        let listener = tokio::spawn(observe(
            activity,
            Arc::clone(&mutations),
            Arc::clone(&scroll),
            Arc::clone(&pointer),
        ));

        let replaced = lock(&self.session).replace(PreviewSession {
            active,
            listener,
            mutations,
            scroll,
            pointer,
        });
        // A concurrent start may have won the race, the latest session stays
        if let Some(replaced) = replaced {
            replaced.close();
        }
        debug!("Screen preview started");
    }

    /// Detaches the observer and listeners and drops any throttled send still
    /// waiting for its window. A no-op when no preview is running.
    pub fn stop_preview(&self) {
        let session = lock(&self.session).take();
        if let Some(session) = session {
            session.close();
            debug!("Screen preview stopped");
        }
    }

    pub async fn capture_screen(&self) -> CaptureResult<String> {
        self.capture.capture_screen().await
    }
}

impl Drop for ScreenMirror {
    fn drop(&mut self) {
        self.stop_preview();
    }
}

async fn observe(
    mut activity: broadcast::Receiver<PageActivity>,
    mutations: Arc<Throttle<()>>,
    scroll: Arc<Throttle<()>>,
    pointer: Arc<Throttle<PointerEvent>>,
) {
    loop {
        match activity.recv().await {
            Ok(PageActivity::Mutation(_)) => mutations.call(()),
            Ok(PageActivity::Scroll) => scroll.call(()),
            Ok(PageActivity::Input(input)) => match input.normalize() {
                Some(event) => pointer.call(event),
                None => trace!("Ignoring touch event without touch points"),
            },
            Err(RecvError::Lagged(skipped)) => {
                // Whatever was skipped, a fresh snapshot covers it
                trace!("Preview listener skipped {} page events", skipped);
                mutations.call(());
            }
            Err(RecvError::Closed) => break,
        }
    }
}
