//! Debugger domain: the page's script inventory.
//!
//! Script elements are discovered in the content tree, tagged with a local id
//! exactly once, and fetched in the background. The frontend learns about each
//! script through `Debugger.scriptParsed` and pulls its text later with
//! `getScriptSource`.

use crate::domain::{DomainSender, ProtocolDomain};
use crate::error::{BridgeError, BridgeResult};
use crate::fetch::ScriptFetcher;
use crate::page::{resolve_url, ContentTree, NodeId};
use crate::protocol::event;
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

pub const SCRIPT_SOURCE_UNAVAILABLE: &str = "Cannot get script source code";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// Source positions are not tracked, every script spans the whole file
const WHOLE_FILE: u32 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(u64);

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ScriptId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScriptId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map(ScriptId)
            .map_err(|_| serde::de::Error::custom(format!("invalid scriptId {:?}", raw)))
    }
}

/// Everything the registry knows about one script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRecord {
    pub id: ScriptId,
    pub url: String,
    /// `None` until the fetch settles.
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsed {
    pub script_id: ScriptId,
    pub url: String,
    pub script_language: &'static str,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl ScriptParsed {
    fn whole_file(script_id: ScriptId, url: String) -> Self {
        Self {
            script_id,
            url,
            script_language: "JavaScript",
            start_line: 0,
            start_column: 0,
            end_line: WHOLE_FILE,
            end_column: WHOLE_FILE,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetScriptSourceParams {
    pub script_id: ScriptId,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScriptSourceParams {
    pub script_id: ScriptId,
    pub script_source: String,
}

#[derive(Debug, Deserialize)]
pub struct GetDynamicScriptParams {
    pub url: String,
}

/// Request for the interception layer to serve `content` for `url` on
/// subsequent loads.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverrideMessage {
    pub action: &'static str,
    pub url: String,
    pub content: String,
    pub content_type: String,
}

/// Out-of-band layer able to rewrite script responses, such as a resident
/// service worker.
pub trait OverrideSink: Send + Sync {
    fn post(&self, message: OverrideMessage);
}

type ScriptMap = Arc<Mutex<HashMap<ScriptId, ScriptRecord>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ScriptRegistry {
    sender: DomainSender,
    tree: Arc<dyn ContentTree>,
    fetcher: Arc<dyn ScriptFetcher>,
    overrides: Option<Arc<dyn OverrideSink>>,
    fetch_timeout: Duration,
    scripts: ScriptMap,
    tagged: Mutex<HashMap<NodeId, ScriptId>>,
    last_id: AtomicU64,
}

impl ProtocolDomain for ScriptRegistry {
    const NAMESPACE: &'static str = "Debugger";

    fn sender(&self) -> &DomainSender {
        &self.sender
    }
}

impl ScriptRegistry {
    pub fn new(
        sender: DomainSender,
        tree: Arc<dyn ContentTree>,
        fetcher: Arc<dyn ScriptFetcher>,
    ) -> Self {
        Self {
            sender,
            tree,
            fetcher,
            overrides: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            scripts: Arc::new(Mutex::new(HashMap::new())),
            tagged: Mutex::new(HashMap::new()),
            last_id: AtomicU64::new(0),
        }
    }

    pub fn with_overrides(mut self, overrides: Arc<dyn OverrideSink>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// A fetch still running after `fetch_timeout` settles on the sentinel.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Reports every script not seen by an earlier pass. Safe to call again
    /// after a reconnect: already tagged nodes are neither re-fetched nor
    /// re-announced. Must run inside a tokio runtime.
    pub fn enable(&self) {
        let discovered = self.collect_scripts();
        debug!(
            "Debugger enabled, {} new scripts, {} tracked",
            discovered.len(),
            self.script_count()
        );

        for (script_id, url) in discovered {
            self.send(
                event::SCRIPT_PARSED,
                ScriptParsed::whole_file(script_id, url.to_string()),
            );
        }
    }

    pub fn get_script_source(&self, params: GetScriptSourceParams) -> BridgeResult<ScriptSource> {
        let scripts = lock(&self.scripts);
        let record = scripts
            .get(&params.script_id)
            .ok_or_else(|| BridgeError::UnknownScript(params.script_id.to_string()))?;
        Ok(ScriptSource {
            script_source: record.content.clone(),
        })
    }

    /// Forwards an override to the interception layer. Missing layer or
    /// unknown script is only worth a warning.
    pub fn set_script_source(&self, params: SetScriptSourceParams) {
        let Some(overrides) = &self.overrides else {
            warn!("Script source overrides need a registered interception worker (cdp_overrides)");
            return;
        };
        let Some(url) = lock(&self.scripts)
            .get(&params.script_id)
            .map(|record| record.url.clone())
        else {
            warn!("Ignoring override for unknown script {}", params.script_id);
            return;
        };

        debug!("Registering source override for {}", url);
        overrides.post(OverrideMessage {
            action: "cdp_override_add",
            url,
            content: params.script_source,
            content_type: String::new(),
        });
    }

    /// Registers a script the static scan cannot see. The id is minted and
    /// announced before the fetch has a chance to finish.
    pub fn get_dynamic_script(&self, url: &str) -> ScriptId {
        let script_id = self.mint_id();
        match resolve_url(&self.tree.base_url(), url) {
            Ok(absolute) => self.track(script_id, absolute),
            Err(e) => {
                warn!("Dynamic script {} cannot be fetched: {}", url, e);
                lock(&self.scripts).insert(
                    script_id,
                    ScriptRecord {
                        id: script_id,
                        url: url.to_string(),
                        content: Some(SCRIPT_SOURCE_UNAVAILABLE.to_string()),
                    },
                );
            }
        }

        self.send(
            event::SCRIPT_PARSED,
            ScriptParsed::whole_file(script_id, url.to_string()),
        );
        script_id
    }

    pub fn script(&self, script_id: ScriptId) -> Option<ScriptRecord> {
        lock(&self.scripts).get(&script_id).cloned()
    }

    pub fn script_count(&self) -> usize {
        lock(&self.scripts).len()
    }

    fn collect_scripts(&self) -> Vec<(ScriptId, Url)> {
        let base = self.tree.base_url();
        let mut discovered = Vec::new();
        let mut tagged = lock(&self.tagged);

        for script in self.tree.scripts() {
            if tagged.contains_key(&script.node) {
                continue;
            }
            let script_id = self.mint_id();
            tagged.insert(script.node, script_id);

            // Inline scripts keep their tag but have nothing to fetch
            let Some(src) = script.src else {
                continue;
            };
            match resolve_url(&base, &src) {
                Ok(url) => discovered.push((script_id, url)),
                Err(e) => warn!("Skipping script {}: {}", script_id, e),
            }
        }
        drop(tagged);

        for (script_id, url) in &discovered {
            self.track(*script_id, url.clone());
        }
        discovered
    }

    fn track(&self, script_id: ScriptId, url: Url) {
        lock(&self.scripts).insert(
            script_id,
            ScriptRecord {
                id: script_id,
                url: url.to_string(),
                content: None,
            },
        );
        self.fetch_script_source(script_id, url);
    }

    fn fetch_script_source(&self, script_id: ScriptId, url: Url) {
        let fetcher = Arc::clone(&self.fetcher);
        let scripts = Arc::clone(&self.scripts);
        let limit = self.fetch_timeout;

        tokio::spawn(async move {
            let fetched = match timeout(limit, fetcher.fetch_text(&url)).await {
                Ok(result) => result,
                Err(_) => Err(BridgeError::Timeout {
                    url: url.to_string(),
                    timeout: limit,
                }),
            };
            let content = match fetched {
                Ok(text) => text,
                Err(e) => {
                    warn!("Cannot get source of script {} ({}): {}", script_id, url, e);
                    SCRIPT_SOURCE_UNAVAILABLE.to_string()
                }
            };
            if let Some(record) = lock(&scripts).get_mut(&script_id) {
                record.content = Some(content);
            }
        });
    }

    fn mint_id(&self) -> ScriptId {
        ScriptId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::BroadcastChannel;
    use crate::memory_page::MemoryPage;
    use crate::protocol::EventMessage;
    use crate::test_support::{wait_until, FakeFetcher, RecordingOverrides};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use tokio::sync::broadcast;

    /// Accepts the request and never answers.
    struct StalledFetcher;

    #[async_trait]
    impl ScriptFetcher for StalledFetcher {
        async fn fetch_text(&self, _url: &Url) -> BridgeResult<String> {
            std::future::pending().await
        }
    }

    struct Fixture {
        page: Arc<MemoryPage>,
        fetcher: Arc<FakeFetcher>,
        registry: ScriptRegistry,
        events: broadcast::Receiver<EventMessage>,
    }

    fn fixture() -> Fixture {
        let page = Arc::new(MemoryPage::new(
            Url::parse("https://example.com/app/").unwrap(),
        ));
        let fetcher = Arc::new(FakeFetcher::default());
        let channel = BroadcastChannel::new(64);
        let events = channel.subscribe();
        let registry = ScriptRegistry::new(
            DomainSender::new(ScriptRegistry::NAMESPACE, Arc::new(channel)),
            page.clone(),
            fetcher.clone(),
        );
        Fixture {
            page,
            fetcher,
            registry,
            events,
        }
    }

    fn drain(events: &mut broadcast::Receiver<EventMessage>) -> Vec<EventMessage> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn source_of(registry: &ScriptRegistry, id: &str) -> Option<String> {
        registry
            .get_script_source(GetScriptSourceParams {
                script_id: id.parse().map(ScriptId).unwrap(),
            })
            .unwrap()
            .script_source
    }

    #[tokio::test]
    async fn test_enable_announces_external_scripts() {
        let mut fx = fixture();
        fx.fetcher.respond("https://example.com/app/main.js", "console.log(1)");
        fx.page.add_script(Some("main.js"));
        fx.page.add_script(None);
        fx.page.add_script(Some("https://cdn.test/lib.js"));

        fx.registry.enable();

        let events = drain(&mut fx.events);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].method, "Debugger.scriptParsed");
        assert_eq!(
            events[0].params,
            json!({
                "scriptId": "1",
                "url": "https://example.com/app/main.js",
                "scriptLanguage": "JavaScript",
                "startLine": 0,
                "startColumn": 0,
                "endLine": 999999,
                "endColumn": 999999
            })
        );
        // The inline script consumed id 2
        assert_eq!(events[1].params["scriptId"], "3");
        assert_eq!(events[1].params["url"], "https://cdn.test/lib.js");
    }

    #[tokio::test]
    async fn test_repeated_enable_is_idempotent() {
        let mut fx = fixture();
        fx.page.add_script(Some("a.js"));
        fx.page.add_script(Some("b.js"));

        fx.registry.enable();
        fx.registry.enable();
        let first = drain(&mut fx.events);
        assert_eq!(first.len(), 2);

        fx.page.add_script(Some("c.js"));
        fx.registry.enable();
        let second = drain(&mut fx.events);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].params["url"], "https://example.com/app/c.js");

        let ids: HashSet<_> = first
            .iter()
            .chain(second.iter())
            .map(|e| e.params["scriptId"].clone())
            .collect();
        assert_eq!(ids.len(), 3);

        wait_until(|| fx.fetcher.request_count() == 3).await;
        assert_eq!(fx.fetcher.request_count(), 3);
        println!("✅ No node was fetched or announced twice");
    }

    #[tokio::test]
    async fn test_source_available_after_fetch() {
        let fx = fixture();
        fx.fetcher.respond("https://example.com/app/main.js", "let x = 42;");
        fx.page.add_script(Some("main.js"));
        fx.registry.enable();

        wait_until(|| fx.registry.script(ScriptId(1)).unwrap().content.is_some()).await;
        assert_eq!(source_of(&fx.registry, "1").as_deref(), Some("let x = 42;"));
    }

    #[tokio::test]
    async fn test_failed_fetch_yields_sentinel() {
        let fx = fixture();
        fx.page.add_script(Some("missing.js"));
        fx.registry.enable();

        wait_until(|| fx.registry.script(ScriptId(1)).unwrap().content.is_some()).await;
        assert_eq!(
            source_of(&fx.registry, "1").as_deref(),
            Some(SCRIPT_SOURCE_UNAVAILABLE)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_fetch_times_out_to_sentinel() {
        let page = Arc::new(MemoryPage::new(
            Url::parse("https://example.com/app/").unwrap(),
        ));
        page.add_script(Some("slow.js"));
        let registry = ScriptRegistry::new(
            DomainSender::new(ScriptRegistry::NAMESPACE, Arc::new(BroadcastChannel::new(8))),
            page,
            Arc::new(StalledFetcher),
        )
        .with_fetch_timeout(Duration::from_secs(5));

        registry.enable();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(registry.script(ScriptId(1)).unwrap().content, None);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            source_of(&registry, "1").as_deref(),
            Some(SCRIPT_SOURCE_UNAVAILABLE)
        );
    }

    #[tokio::test]
    async fn test_unknown_script_is_an_error() {
        let fx = fixture();
        let result = fx.registry.get_script_source(GetScriptSourceParams {
            script_id: ScriptId(77),
        });
        assert!(matches!(result, Err(BridgeError::UnknownScript(id)) if id == "77"));
    }

    #[tokio::test]
    async fn test_dynamic_script_announced_before_fetch_resolves() {
        let mut fx = fixture();
        fx.fetcher.hold();
        fx.fetcher.respond("https://example.com/app/lazy.js", "lazy()");
        fx.page.add_script(Some("main.js"));
        fx.registry.enable();
        drain(&mut fx.events);

        let script_id = fx.registry.get_dynamic_script("lazy.js");
        assert_eq!(script_id, ScriptId(2));

        let events = drain(&mut fx.events);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].params["scriptId"], "2");
        assert_eq!(events[0].params["url"], "lazy.js");
        assert_eq!(source_of(&fx.registry, "2"), None);

        fx.fetcher.release();
        wait_until(|| fx.registry.script(script_id).unwrap().content.is_some()).await;
        assert_eq!(source_of(&fx.registry, "2").as_deref(), Some("lazy()"));
    }

    #[tokio::test]
    async fn test_set_script_source_posts_override() {
        let overrides = Arc::new(RecordingOverrides::default());
        let fx = fixture();
        let registry = fx.registry.with_overrides(overrides.clone());
        fx.page.add_script(Some("main.js"));
        registry.enable();

        registry.set_script_source(SetScriptSourceParams {
            script_id: ScriptId(1),
            script_source: "patched()".to_string(),
        });

        assert_eq!(
            overrides.messages(),
            vec![OverrideMessage {
                action: "cdp_override_add",
                url: "https://example.com/app/main.js".to_string(),
                content: "patched()".to_string(),
                content_type: String::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_set_script_source_without_layer_is_noop() {
        let mut fx = fixture();
        fx.page.add_script(Some("main.js"));
        fx.registry.enable();
        drain(&mut fx.events);

        fx.registry.set_script_source(SetScriptSourceParams {
            script_id: ScriptId(1),
            script_source: "patched()".to_string(),
        });
        fx.registry.set_script_source(SetScriptSourceParams {
            script_id: ScriptId(404),
            script_source: "ignored".to_string(),
        });

        assert!(drain(&mut fx.events).is_empty());
        assert_eq!(fx.registry.script_count(), 1);
        assert_eq!(
            fx.registry.script(ScriptId(1)).unwrap().url,
            "https://example.com/app/main.js"
        );
        assert!(fx.registry.script(ScriptId(404)).is_none());
    }

    #[tokio::test]
    async fn test_override_for_unknown_script_is_dropped() {
        let overrides = Arc::new(RecordingOverrides::default());
        let fx = fixture();
        let registry = fx.registry.with_overrides(overrides.clone());
        registry.set_script_source(SetScriptSourceParams {
            script_id: ScriptId(404),
            script_source: "ignored".to_string(),
        });
        assert!(overrides.messages().is_empty());
        assert_eq!(registry.script_count(), 0);
    }

    #[test]
    fn test_script_id_wire_format() {
        assert_eq!(serde_json::to_value(ScriptId(12)).unwrap(), json!("12"));
        let params: GetScriptSourceParams =
            serde_json::from_value(json!({"scriptId": "5"})).unwrap();
        assert_eq!(params.script_id, ScriptId(5));
        assert!(serde_json::from_value::<GetScriptSourceParams>(json!({"scriptId": "x"})).is_err());
    }
}
