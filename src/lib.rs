//! # cdp-mirror
//!
//! Chrome DevTools Protocol domains that live inside an inspected page and
//! report its scripts and screen to a remote frontend.
//!
//! Two domains are provided:
//! - **Debugger** ([`debugger::ScriptRegistry`]): discovers `<script>` elements,
//!   announces them with `Debugger.scriptParsed`, fetches their sources and
//!   forwards source overrides to an interception worker.
//! - **ScreenPreview** ([`screen_preview::ScreenMirror`]): mirrors the page as
//!   throttled structural snapshots plus scroll and pointer positions, and
//!   captures still images through a pluggable [`capture::CaptureHost`].
//!
//! The page itself is reached through [`page::ContentTree`]; events leave
//! through a [`channel::Channel`].
//!
//! ## Examples
//! ### 1. Listing scripts
//!
//! ```rust
//! use cdp_mirror::channel::BroadcastChannel;
//! use cdp_mirror::debugger::ScriptRegistry;
//! use cdp_mirror::domain::{DomainSender, ProtocolDomain};
//! use cdp_mirror::fetch::HttpFetcher;
//! use cdp_mirror::memory_page::MemoryPage;
//! use reqwest::Url;
//! use std::sync::Arc;
//!
//! # async fn doc_example() -> cdp_mirror::error::BridgeResult<()> {
//! let page = Arc::new(MemoryPage::new(Url::parse("https://www.rust-lang.org/").unwrap()));
//! page.add_script(Some("/static/scripts/tools-install.js"));
//!
//! let channel = BroadcastChannel::new(128);
//! let mut events = channel.subscribe();
//! let debugger = ScriptRegistry::new(
//!     DomainSender::new(ScriptRegistry::NAMESPACE, Arc::new(channel)),
//!     page,
//!     Arc::new(HttpFetcher::new()),
//! );
//!
//! debugger.enable();
//! let parsed = events.recv().await.unwrap();
//! assert_eq!(parsed.method, "Debugger.scriptParsed");
//! # Ok(())
//! # }
//! ```
//!
//! ### 2. Following the preview of one domain
//!
//! ```rust
//! use cdp_mirror::channel::BroadcastChannel;
//! use cdp_mirror::dispatch::Bridge;
//! use tokio_stream::StreamExt;
//!
//! # async fn doc_example(bridge: Bridge, channel: BroadcastChannel) -> cdp_mirror::error::BridgeResult<()> {
//! let mut preview = channel.on_domain("ScreenPreview");
//! bridge.dispatch("ScreenPreview.startPreview", None).await?;
//! while let Some(event) = preview.next().await {
//!     println!("📢 {}", event.method);
//! }
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod channel;
pub mod config;
pub mod debugger;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod event_filter;
pub mod fetch;
pub mod memory_page;
pub mod page;
pub mod protocol;
pub mod screen_preview;
pub mod throttle;

#[cfg(test)]
mod test_support;
