//! JSON line messages exchanged with backend plugins

use crate::client::{BackendError, CallResourceRequest, CallResourceResponse, Headers};
use crate::context::PluginContext;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CODE_NOT_IMPLEMENTED: &str = "methodNotImplemented";
const CODE_HEALTH_CHECK_FAILED: &str = "healthCheckFailed";
const CODE_UNAVAILABLE: &str = "unavailable";
const CODE_INTERNAL: &str = "internal";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub(crate) enum WireRequest {
    CheckHealth {
        #[serde(rename = "pluginContext")]
        plugin_context: PluginContext,
    },
    CallResource {
        #[serde(rename = "pluginContext")]
        plugin_context: PluginContext,
        request: WireResourceRequest,
    },
    CollectMetrics {
        #[serde(rename = "pluginId")]
        plugin_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireResourceRequest {
    pub path: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
    /// base64
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireResourceResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    /// base64
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMetrics {
    pub prometheus_metrics: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct WireResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl WireResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: &BackendError) -> Self {
        Self {
            result: None,
            error: Some(WireError::from_backend_error(error)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl WireError {
    pub fn from_backend_error(error: &BackendError) -> Self {
        let code = match error {
            BackendError::MethodNotImplemented => CODE_NOT_IMPLEMENTED,
            BackendError::HealthCheckFailed => CODE_HEALTH_CHECK_FAILED,
            BackendError::Unavailable => CODE_UNAVAILABLE,
            _ => CODE_INTERNAL,
        };
        Self {
            code: code.to_string(),
            message: error.to_string(),
        }
    }

    pub fn into_backend_error(self) -> BackendError {
        match self.code.as_str() {
            CODE_NOT_IMPLEMENTED => BackendError::MethodNotImplemented,
            CODE_HEALTH_CHECK_FAILED => BackendError::HealthCheckFailed,
            CODE_UNAVAILABLE => BackendError::Unavailable,
            _ => BackendError::Protocol(format!("{}: {}", self.code, self.message)),
        }
    }
}

impl From<CallResourceRequest> for WireResourceRequest {
    fn from(req: CallResourceRequest) -> Self {
        Self {
            path: req.path,
            method: req.method,
            url: req.url,
            headers: req.headers,
            body: STANDARD.encode(&req.body),
        }
    }
}

impl TryFrom<WireResourceRequest> for CallResourceRequest {
    type Error = BackendError;

    fn try_from(req: WireResourceRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            path: req.path,
            method: req.method,
            url: req.url,
            headers: req.headers,
            body: decode_body(&req.body)?,
        })
    }
}

impl From<CallResourceResponse> for WireResourceResponse {
    fn from(resp: CallResourceResponse) -> Self {
        Self {
            status: resp.status,
            headers: resp.headers,
            body: STANDARD.encode(&resp.body),
        }
    }
}

impl TryFrom<WireResourceResponse> for CallResourceResponse {
    type Error = BackendError;

    fn try_from(resp: WireResourceResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            status: resp.status,
            headers: resp.headers,
            body: decode_body(&resp.body)?,
        })
    }
}

fn decode_body(body: &str) -> Result<Bytes, BackendError> {
    STANDARD
        .decode(body)
        .map(Bytes::from)
        .map_err(|e| BackendError::Protocol(format!("invalid body encoding: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_tagged_by_method() {
        let req = WireRequest::CollectMetrics {
            plugin_id: "ops-ds".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["method"], "collectMetrics");
        assert_eq!(json["pluginId"], "ops-ds");

        let req = WireRequest::CheckHealth {
            plugin_context: PluginContext {
                org_id: 3,
                plugin_id: "ops-ds".to_string(),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["method"], "checkHealth");
        assert_eq!(json["pluginContext"]["orgId"], 3);
    }

    #[test]
    fn test_error_codes_map_back() {
        let codes = [
            BackendError::MethodNotImplemented,
            BackendError::HealthCheckFailed,
            BackendError::Unavailable,
        ];
        for err in codes {
            let wire = WireError::from_backend_error(&err);
            let back = wire.into_backend_error();
            assert_eq!(back.to_string(), err.to_string());
        }

        let unknown = WireError {
            code: "boom".to_string(),
            message: "exploded".to_string(),
        };
        assert!(matches!(unknown.into_backend_error(), BackendError::Protocol(_)));
    }

    #[test]
    fn test_bad_body_encoding() {
        let wire = WireResourceResponse {
            status: 200,
            headers: Headers::new(),
            body: "***".to_string(),
        };
        assert!(CallResourceResponse::try_from(wire).is_err());
    }
}
