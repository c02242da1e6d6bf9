use crate::page::{
    resolve_url, ContentTree, InputEvent, MutationKind, NodeId, PageActivity, ScriptNode,
    ScrollOffsets, StyleSource, Viewport,
};
use reqwest::Url;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) cdp-mirror";

struct PageState {
    base_url: Url,
    user_agent: String,
    scripts: Vec<ScriptNode>,
    styles: Vec<StyleSource>,
    body: String,
    viewport: Viewport,
    body_scroll: ScrollOffsets,
    document_scroll: ScrollOffsets,
}

/// A content tree held entirely in memory.
///
/// Every mutating method publishes the matching [`PageActivity`], the way a
/// browser would notify mutation observers and event listeners.
pub struct MemoryPage {
    state: Mutex<PageState>,
    activity_tx: broadcast::Sender<PageActivity>,
    next_node: AtomicU64,
}

impl MemoryPage {
    pub fn new(base_url: Url) -> Self {
        let (activity_tx, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(PageState {
                base_url,
                user_agent: DEFAULT_USER_AGENT.to_string(),
                scripts: Vec::new(),
                styles: Vec::new(),
                body: String::new(),
                viewport: Viewport {
                    width: 1280,
                    height: 720,
                },
                body_scroll: ScrollOffsets::default(),
                document_scroll: ScrollOffsets::default(),
            }),
            activity_tx,
            next_node: AtomicU64::new(1),
        }
    }

    pub fn with_user_agent(self, user_agent: &str) -> Self {
        self.lock().user_agent = user_agent.to_string();
        self
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, activity: PageActivity) {
        let _ = self.activity_tx.send(activity);
    }

    pub fn add_script(&self, src: Option<&str>) -> NodeId {
        let node = self.next_node.fetch_add(1, Ordering::SeqCst);
        self.lock().scripts.push(ScriptNode {
            node,
            src: src.map(str::to_string),
        });
        self.publish(PageActivity::Mutation(MutationKind::ChildList));
        node
    }

    pub fn remove_script(&self, node: NodeId) {
        self.lock().scripts.retain(|script| script.node != node);
        self.publish(PageActivity::Mutation(MutationKind::ChildList));
    }

    pub fn add_stylesheet_link(&self, href: &str) {
        {
            let mut state = self.lock();
            let href = resolve_url(&state.base_url, href)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| href.to_string());
            state.styles.push(StyleSource::Link { href });
        }
        self.publish(PageActivity::Mutation(MutationKind::ChildList));
    }

    pub fn add_style(&self, text: &str) {
        self.lock().styles.push(StyleSource::Inline {
            text: text.to_string(),
        });
        self.publish(PageActivity::Mutation(MutationKind::ChildList));
    }

    pub fn set_body(&self, html: &str) {
        self.lock().body = html.to_string();
        self.publish(PageActivity::Mutation(MutationKind::ChildList));
    }

    /// Publishes a mutation without changing any content, like an attribute
    /// write that sets the current value again.
    pub fn touch(&self, kind: MutationKind) {
        self.publish(PageActivity::Mutation(kind));
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.lock().viewport = Viewport { width, height };
    }

    pub fn scroll_body(&self, top: f64, left: f64) {
        self.lock().body_scroll = ScrollOffsets { top, left };
        self.publish(PageActivity::Scroll);
    }

    pub fn scroll_document(&self, top: f64, left: f64) {
        self.lock().document_scroll = ScrollOffsets { top, left };
        self.publish(PageActivity::Scroll);
    }

    pub fn dispatch_input(&self, event: InputEvent) {
        self.publish(PageActivity::Input(event));
    }

    pub fn observer_count(&self) -> usize {
        self.activity_tx.receiver_count()
    }
}

impl ContentTree for MemoryPage {
    fn base_url(&self) -> Url {
        self.lock().base_url.clone()
    }

    fn user_agent(&self) -> String {
        self.lock().user_agent.clone()
    }

    fn scripts(&self) -> Vec<ScriptNode> {
        self.lock().scripts.clone()
    }

    fn style_sources(&self) -> Vec<StyleSource> {
        self.lock().styles.clone()
    }

    fn body_html(&self) -> String {
        self.lock().body.clone()
    }

    fn viewport(&self) -> Viewport {
        self.lock().viewport
    }

    fn body_scroll(&self) -> ScrollOffsets {
        self.lock().body_scroll
    }

    fn document_scroll(&self) -> ScrollOffsets {
        self.lock().document_scroll
    }

    fn subscribe(&self) -> broadcast::Receiver<PageActivity> {
        self.activity_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::effective_scroll;

    fn page() -> MemoryPage {
        MemoryPage::new(Url::parse("https://example.com/docs/").unwrap())
    }

    #[test]
    fn test_link_href_is_resolved() {
        let page = page();
        page.add_stylesheet_link("theme.css");
        assert_eq!(
            page.style_sources(),
            vec![StyleSource::Link {
                href: "https://example.com/docs/theme.css".to_string()
            }]
        );
    }

    #[test]
    fn test_mutations_are_published() {
        let page = page();
        let mut rx = page.subscribe();
        let node = page.add_script(Some("a.js"));
        page.remove_script(node);
        page.scroll_body(10.0, 0.0);

        assert_eq!(
            rx.try_recv().unwrap(),
            PageActivity::Mutation(MutationKind::ChildList)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            PageActivity::Mutation(MutationKind::ChildList)
        );
        assert_eq!(rx.try_recv().unwrap(), PageActivity::Scroll);
        assert!(page.scripts().is_empty());
    }

    #[test]
    fn test_effective_scroll_per_axis() {
        let page = page();
        page.scroll_body(0.0, 15.0);
        page.scroll_document(240.0, 99.0);
        assert_eq!(
            effective_scroll(&page),
            ScrollOffsets {
                top: 240.0,
                left: 15.0
            }
        );
    }

    #[test]
    fn test_observer_count_tracks_receivers() {
        let page = page();
        let rx = page.subscribe();
        assert_eq!(page.observer_count(), 1);
        drop(rx);
        assert_eq!(page.observer_count(), 0);
    }
}
