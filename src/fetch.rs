use crate::error::BridgeResult;
use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

/// Retrieves the text of a script resource.
#[async_trait]
pub trait ScriptFetcher: Send + Sync {
    async fn fetch_text(&self, url: &Url) -> BridgeResult<String>;
}

/// Fetches scripts over HTTP. Any response body counts as the source, only
/// transport failures are errors.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScriptFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &Url) -> BridgeResult<String> {
        let response = self.client.get(url.clone()).send().await?;
        debug!("Fetched script {} ({})", url, response.status());
        Ok(response.text().await?)
    }
}
