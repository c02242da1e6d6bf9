use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound event pushed by a domain toward the frontend.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EventMessage {
    pub method: String,
    pub params: Value,
}

impl EventMessage {
    pub fn domain(&self) -> Option<&str> {
        self.method.split_once('.').map(|(domain, _)| domain)
    }
}

/// Inbound protocol call as delivered by the frontend.
#[derive(Debug, Deserialize, Clone)]
pub struct InboundCall {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Reply correlated to an [`InboundCall`] by its id.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CallResponse {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

pub mod event {
    pub const SCRIPT_PARSED: &str = "scriptParsed";
    pub const CAPTURED: &str = "captured";
    pub const SYNC_SCROLL: &str = "syncScroll";
    pub const SYNC_MOUSE: &str = "syncMouse";
}
