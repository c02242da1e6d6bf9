//! The inspected page as seen by the domains.
//!
//! Domains never touch a real document directly. Everything they read from the
//! live content tree goes through [`ContentTree`], and every change they react
//! to arrives as a [`PageActivity`] on the tree's activity stream.

use crate::error::{BridgeError, BridgeResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Identity of a node in the content tree, stable for the node's lifetime.
pub type NodeId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptNode {
    pub node: NodeId,
    /// Raw `src` attribute, `None` for inline scripts.
    pub src: Option<String>,
}

/// A stylesheet-bearing element, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleSource {
    /// `<link rel="stylesheet">` with its resolved href.
    Link { href: String },
    /// `<style>` with its inner text.
    Inline { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollOffsets {
    pub top: f64,
    pub left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerType {
    Mousemove,
    Mousedown,
    Mouseup,
    Touchmove,
    Touchstart,
    Touchend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    Move,
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchKind {
    Move,
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub client_x: f64,
    pub client_y: f64,
}

/// Raw input as the page dispatches it.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Mouse {
        kind: MouseKind,
        client_x: f64,
        client_y: f64,
    },
    Touch {
        kind: TouchKind,
        touches: Vec<TouchPoint>,
        changed_touches: Vec<TouchPoint>,
    },
}

/// Canonical pointer position forwarded to the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    #[serde(rename = "type")]
    pub kind: PointerType,
    pub left: f64,
    pub top: f64,
}

impl InputEvent {
    /// Folds mouse and touch shapes into one [`PointerEvent`]. Touch events
    /// use the first active touch, or the first changed touch when none is
    /// active (as on `touchend`). Touch events without any point yield `None`.
    pub fn normalize(&self) -> Option<PointerEvent> {
        match self {
            InputEvent::Mouse {
                kind,
                client_x,
                client_y,
            } => Some(PointerEvent {
                kind: match kind {
                    MouseKind::Move => PointerType::Mousemove,
                    MouseKind::Down => PointerType::Mousedown,
                    MouseKind::Up => PointerType::Mouseup,
                },
                left: *client_x,
                top: *client_y,
            }),
            InputEvent::Touch {
                kind,
                touches,
                changed_touches,
            } => {
                let point = touches.first().or_else(|| changed_touches.first())?;
                Some(PointerEvent {
                    kind: match kind {
                        TouchKind::Move => PointerType::Touchmove,
                        TouchKind::Start => PointerType::Touchstart,
                        TouchKind::End => PointerType::Touchend,
                    },
                    left: point.client_x,
                    top: point.client_y,
                })
            }
        }
    }
}

/// Something happened in the page that observers may care about.
#[derive(Debug, Clone, PartialEq)]
pub enum PageActivity {
    Mutation(MutationKind),
    Scroll,
    Input(InputEvent),
}

/// Read access to the live content tree plus its activity stream.
pub trait ContentTree: Send + Sync {
    fn base_url(&self) -> Url;

    fn user_agent(&self) -> String;

    /// Every `<script>` element currently in the document, in document order.
    fn scripts(&self) -> Vec<ScriptNode>;

    /// Every `link[rel="stylesheet"]` and `<style>` element, in document order.
    fn style_sources(&self) -> Vec<StyleSource>;

    fn body_html(&self) -> String;

    fn viewport(&self) -> Viewport;

    fn body_scroll(&self) -> ScrollOffsets;

    fn document_scroll(&self) -> ScrollOffsets;

    /// Subscribes to mutations, scrolls and input. Dropping the receiver
    /// removes the subscription.
    fn subscribe(&self) -> broadcast::Receiver<PageActivity>;
}

/// Resolves a possibly relative URL against the page's base URL.
pub fn resolve_url(base: &Url, raw: &str) -> BridgeResult<Url> {
    base.join(raw.trim()).map_err(|e| BridgeError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

pub fn is_mobile(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    ["iphone", "ipad", "ipod", "android", "mobile", "windows phone"]
        .iter()
        .any(|marker| ua.contains(marker))
}

/// Per-axis scroll position: body offsets win when non-zero, otherwise the
/// root document element's offsets are used.
pub fn effective_scroll(tree: &dyn ContentTree) -> ScrollOffsets {
    let body = tree.body_scroll();
    let document = tree.document_scroll();
    ScrollOffsets {
        top: if body.top != 0.0 { body.top } else { document.top },
        left: if body.left != 0.0 { body.left } else { document.left },
    }
}
