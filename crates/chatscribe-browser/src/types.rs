//! DevTools discovery endpoint types.

use serde::Deserialize;

/// `GET /json/version` response of a browser started with a debugging port.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}
