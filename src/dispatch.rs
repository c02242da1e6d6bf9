use crate::capture::{CaptureBackend, CaptureHost};
use crate::channel::Channel;
use crate::config::BridgeConfig;
use crate::debugger::{GetDynamicScriptParams, ScriptRegistry, SetScriptSourceParams};
use crate::domain::{DomainSender, ProtocolDomain};
use crate::error::{BridgeError, BridgeResult};
use crate::fetch::ScriptFetcher;
use crate::page::ContentTree;
use crate::protocol::{CallResponse, InboundCall};
use crate::screen_preview::ScreenMirror;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const SERVER_ERROR: i64 = -32000;

/// The domains running in one inspected page, addressed by qualified method name.
pub struct Bridge {
    debugger: ScriptRegistry,
    preview: ScreenMirror,
}

impl Bridge {
    pub fn new(debugger: ScriptRegistry, preview: ScreenMirror) -> Self {
        Self { debugger, preview }
    }

    /// Wires both domains to the same channel and content tree.
    pub fn with_collaborators(
        channel: Arc<dyn Channel>,
        tree: Arc<dyn ContentTree>,
        fetcher: Arc<dyn ScriptFetcher>,
        capture_host: Arc<dyn CaptureHost>,
        config: BridgeConfig,
    ) -> Self {
        let debugger = ScriptRegistry::new(
            DomainSender::new(ScriptRegistry::NAMESPACE, Arc::clone(&channel)),
            Arc::clone(&tree),
            fetcher,
        )
        .with_fetch_timeout(config.fetch_timeout());
        let capture = CaptureBackend::new(capture_host, config.clone());
        let preview = ScreenMirror::new(
            DomainSender::new(ScreenMirror::NAMESPACE, channel),
            tree,
            capture,
            config,
        );
        Self::new(debugger, preview)
    }

    pub fn debugger(&self) -> &ScriptRegistry {
        &self.debugger
    }

    pub fn preview(&self) -> &ScreenMirror {
        &self.preview
    }

    /// Runs `method` and returns its result, `None` for methods that only
    /// produce events.
    pub async fn dispatch(&self, method: &str, params: Option<Value>) -> BridgeResult<Option<Value>> {
        debug!("Dispatching {}", method);
        match method {
            "Debugger.enable" => {
                self.debugger.enable();
                Ok(None)
            }
            "Debugger.getScriptSource" => {
                let source = self.debugger.get_script_source(parse(params)?)?;
                Ok(Some(serde_json::to_value(source)?))
            }
            "Debugger.setScriptSource" => {
                let params: SetScriptSourceParams = parse(params)?;
                self.debugger.set_script_source(params);
                Ok(None)
            }
            "Debugger.getDynamicScript" => {
                let params: GetDynamicScriptParams = parse(params)?;
                let script_id = self.debugger.get_dynamic_script(&params.url);
                Ok(Some(json!({ "scriptId": script_id })))
            }
            "ScreenPreview.startPreview" => {
                self.preview.start_preview();
                Ok(None)
            }
            "ScreenPreview.stopPreview" => {
                self.preview.stop_preview();
                Ok(None)
            }
            "ScreenPreview.captureScreen" => {
                let data = self.preview.capture_screen().await?;
                Ok(Some(json!({ "data": data })))
            }
            _ => Err(BridgeError::UnknownMethod(method.to_string())),
        }
    }

    /// Answers a call with a response correlated by its id. Failures become
    /// protocol errors rather than escaping to the transport.
    pub async fn handle(&self, call: InboundCall) -> CallResponse {
        match self.dispatch(&call.method, call.params).await {
            Ok(result) => CallResponse {
                id: call.id,
                result: Some(result.unwrap_or_else(|| json!({}))),
                error: None,
            },
            Err(e) => {
                warn!("{} failed: {}", call.method, e);
                CallResponse {
                    id: call.id,
                    result: None,
                    error: Some(json!({
                        "code": error_code(&e),
                        "message": e.to_string(),
                    })),
                }
            }
        }
    }
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> BridgeResult<T> {
    Ok(serde_json::from_value(params.unwrap_or_else(|| json!({})))?)
}

fn error_code(error: &BridgeError) -> i64 {
    match error {
        BridgeError::UnknownMethod(_) => METHOD_NOT_FOUND,
        BridgeError::Json(_) | BridgeError::UnknownScript(_) | BridgeError::InvalidUrl { .. } => {
            INVALID_PARAMS
        }
        _ => SERVER_ERROR,
    }
}
