use crate::error::BridgeResult;
use serde::Deserialize;
use std::time::Duration;

pub const DOM_TO_IMAGE_URL: &str = "https://unpkg.com/dom-to-image@2.6.0/dist/dom-to-image.min.js";
pub const HTML_TO_CANVAS_URL: &str = "https://unpkg.com/html2canvas@1.4.1/dist/html2canvas.min.js";

/// Tunables shared by the bridge domains.
///
/// Every field has a default, so a JSON override only needs the keys it changes:
///
/// ```rust
/// use cdp_mirror::config::BridgeConfig;
///
/// let config = BridgeConfig::from_json(r#"{"mutationThrottleMs": 500}"#).unwrap();
/// assert_eq!(config.mutation_throttle_ms, 500);
/// assert_eq!(config.scroll_throttle_ms, 100);
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub mutation_throttle_ms: u64,
    pub scroll_throttle_ms: u64,
    pub pointer_throttle_ms: u64,
    pub capture_throttle_ms: u64,
    pub jpeg_quality: f64,
    pub image_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub dom_to_image_url: String,
    pub html_to_canvas_url: String,
    pub event_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mutation_throttle_ms: 350,
            scroll_throttle_ms: 100,
            pointer_throttle_ms: 50,
            capture_throttle_ms: 300,
            jpeg_quality: 0.6,
            image_timeout_ms: 10_000,
            fetch_timeout_ms: 10_000,
            dom_to_image_url: DOM_TO_IMAGE_URL.to_string(),
            html_to_canvas_url: HTML_TO_CANVAS_URL.to_string(),
            event_buffer: 128,
        }
    }
}

impl BridgeConfig {
    pub fn from_json(text: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn mutation_window(&self) -> Duration {
        Duration::from_millis(self.mutation_throttle_ms)
    }

    pub fn scroll_window(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }

    pub fn pointer_window(&self) -> Duration {
        Duration::from_millis(self.pointer_throttle_ms)
    }

    pub fn capture_window(&self) -> Duration {
        Duration::from_millis(self.capture_throttle_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }

    /// Upper bound on a single script fetch.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
