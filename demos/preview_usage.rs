use async_trait::async_trait;
use cdp_mirror::capture::{BackendKind, CaptureHost, DomToImageOptions, HtmlToCanvasOptions};
use cdp_mirror::channel::BroadcastChannel;
use cdp_mirror::config::BridgeConfig;
use cdp_mirror::dispatch::Bridge;
use cdp_mirror::error::BridgeResult;
use cdp_mirror::fetch::HttpFetcher;
use cdp_mirror::memory_page::MemoryPage;
use cdp_mirror::page::{InputEvent, MouseKind};
use cdp_mirror::protocol::InboundCall;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Pretends dom-to-image is broken so the capture falls back to html2canvas.
struct HeadlessHost;

#[async_trait]
impl CaptureHost for HeadlessHost {
    fn is_loaded(&self, _backend: BackendKind) -> bool {
        true
    }

    async fn load_library(&self, _backend: BackendKind, _url: &str) -> Result<(), String> {
        Ok(())
    }

    async fn to_jpeg(&self, _options: &DomToImageOptions) -> Result<String, String> {
        Err("SecurityError: tainted canvas".to_string())
    }

    async fn render_canvas(&self, options: &HtmlToCanvasOptions) -> Result<String, String> {
        Ok(format!("data:image/jpeg;scale={};base64,", options.scale))
    }
}

#[tokio::main]
async fn main() -> BridgeResult<()> {
    fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = BridgeConfig::from_json(r#"{"mutationThrottleMs": 200}"#)?;
    let page = Arc::new(MemoryPage::new(
        Url::parse("https://example.com/").expect("static url"),
    ));
    page.add_stylesheet_link("/site.css");
    page.set_body("<h1>Hello</h1>");

    let channel = BroadcastChannel::new(config.event_buffer);
    let bridge = Bridge::with_collaborators(
        Arc::new(channel.clone()),
        page.clone(),
        Arc::new(HttpFetcher::new()),
        Arc::new(HeadlessHost),
        config,
    );

    let mut preview = channel.on_domain("ScreenPreview");
    tokio::spawn(async move {
        while let Some(event) = preview.next().await {
            info!("📢 {}: {}", event.method, event.params);
        }
    });

    bridge
        .handle(InboundCall {
            id: 1,
            method: "ScreenPreview.startPreview".to_string(),
            params: None,
        })
        .await;

    for i in 0..5 {
        page.set_body(&format!("<h1>Hello {}</h1>", i));
        page.dispatch_input(InputEvent::Mouse {
            kind: MouseKind::Move,
            client_x: 10.0 * i as f64,
            client_y: 5.0,
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    page.add_style("h1 { color: rebeccapurple }");
    page.scroll_document(300.0, 0.0);
    tokio::time::sleep(Duration::from_millis(500)).await;

    for id in 2..4 {
        let response = bridge
            .handle(InboundCall {
                id,
                method: "ScreenPreview.captureScreen".to_string(),
                params: None,
            })
            .await;
        info!("Capture reply: {:?}", response);
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    bridge.preview().stop_preview();
    Ok(())
}
