use cdp_mirror::channel::BroadcastChannel;
use cdp_mirror::debugger::{GetScriptSourceParams, ScriptRegistry};
use cdp_mirror::domain::{DomainSender, ProtocolDomain};
use cdp_mirror::error::BridgeResult;
use cdp_mirror::fetch::HttpFetcher;
use cdp_mirror::memory_page::MemoryPage;
use reqwest::Url;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> BridgeResult<()> {
    fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let page = Arc::new(MemoryPage::new(
        Url::parse("https://www.rust-lang.org/").expect("static url"),
    ));
    page.add_script(Some("/static/scripts/tools-install.js"));
    page.add_script(None);

    let channel = BroadcastChannel::new(128);
    let mut parsed = channel.on_domain("Debugger");
    let debugger = ScriptRegistry::new(
        DomainSender::new(ScriptRegistry::NAMESPACE, Arc::new(channel.clone())),
        page.clone(),
        Arc::new(HttpFetcher::new()),
    );

    debugger.enable();
    let dynamic = debugger.get_dynamic_script("https://www.rust-lang.org/static/scripts/init.js");
    info!("Registered dynamic script {}", dynamic);

    // Two scriptParsed events: the static script and the dynamic one
    for _ in 0..2 {
        let Some(event) = parsed.next().await else {
            break;
        };
        info!("📢 {} {}", event.method, event.params["url"]);

        let params: GetScriptSourceParams =
            serde_json::from_value(json!({ "scriptId": event.params["scriptId"] }))?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        match debugger.get_script_source(params)?.script_source {
            Some(source) => info!("Fetched {} bytes", source.len()),
            None => warn!("Source not fetched yet"),
        }
    }

    Ok(())
}
