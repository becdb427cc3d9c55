//!
//! Action router / gateway
//! -----------------------
//! Stateless decode → route → encode pipeline. The registry of
//! `(service, action) -> handler` entries is built once at process start and
//! validated for completeness against the declared action set, so a missing
//! handler fails at boot rather than at first request. The gateway never
//! inspects resource semantics; response shaping is table-driven per service
//! through `ServiceSpec`, never per action.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::store::SharedStore;
use crate::value::Value;
use crate::wire;

/// Wire protocol family for a service: flat query parameters with XML
/// responses, or JSON bodies selected by a target header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Query,
    Json,
}

/// Per-service response-shaping table.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: &'static str,
    pub protocol: Protocol,
    pub xmlns: &'static str,
    pub api_version: &'static str,
}

/// The shipped compute/networking service speaks the query protocol.
pub const EC2: ServiceSpec = ServiceSpec {
    name: "ec2",
    protocol: Protocol::Query,
    xmlns: "http://ec2.amazonaws.com/doc/2016-11-15/",
    api_version: "2016-11-15",
};

/// A decoded request handed to a resource handler.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: String,
    pub params: Value,
}

impl ActionRequest {
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get_str(key)
    }

    /// Required scalar parameter or the provider's MissingParameter error.
    pub fn require_str(&self, key: &str) -> ApiResult<&str> {
        self.param_str(key).ok_or_else(|| ApiError::missing_parameter(key))
    }

    /// Collect the string elements of a list-shaped parameter such as
    /// `VpcId.N`; a single scalar is accepted as a one-element list.
    pub fn str_list(&self, key: &str) -> Vec<String> {
        match self.params.get(key) {
            Some(Value::List(items)) => items.iter().filter_map(|v| v.scalar_string()).collect(),
            Some(v) => v.scalar_string().into_iter().collect(),
            None => Vec::new(),
        }
    }
}

/// Resource handlers are plain functions over the store and the decoded
/// request; they return the result body to be enveloped by the gateway.
pub type Handler = fn(&SharedStore, &ActionRequest) -> ApiResult<Value>;

/// A serialized wire response ready for the transport layer.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub request_id: String,
}

#[derive(Debug)]
pub struct Registry {
    services: HashMap<&'static str, ServiceSpec>,
    handlers: HashMap<(String, String), Handler>,
}

pub struct RegistryBuilder {
    services: HashMap<&'static str, ServiceSpec>,
    declared: Vec<(&'static str, &'static str)>,
    handlers: HashMap<(String, String), Handler>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder { services: HashMap::new(), declared: Vec::new(), handlers: HashMap::new() }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name)
    }

    pub fn action_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Decode, route, invoke, and encode one request. Handler panics are
    /// contained and surfaced as the internal-error envelope; every error in
    /// the taxonomy becomes the provider's error document, never a transport
    /// failure.
    pub async fn dispatch(&self, store: &SharedStore, service: &str, action: &str, params: Value) -> WireResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        let spec = self.services.get(service).cloned().unwrap_or(EC2);

        let key = (service.to_string(), action.to_string());
        let Some(handler) = self.handlers.get(&key).copied() else {
            warn!(target: "nimbus::gateway", "unsupported action '{}' for service '{}'", action, service);
            return self.encode_error(&spec, &ApiError::unsupported(action), &request_id);
        };

        let req = ActionRequest { action: action.to_string(), params };
        let store = store.clone();
        let outcome = AssertUnwindSafe(async move { handler(&store, &req) }).catch_unwind().await;

        match outcome {
            Ok(Ok(body)) => {
                info!(target: "nimbus::gateway", "{} {} ok request_id={}", service, action, request_id);
                self.encode_success(&spec, action, &body, &request_id)
            }
            Ok(Err(e)) => {
                match e {
                    ApiError::Internal { .. } => error!(target: "nimbus::gateway", "{} {} failed: {}", service, action, e),
                    _ => info!(target: "nimbus::gateway", "{} {} rejected: {}", service, action, e),
                }
                self.encode_error(&spec, &e, &request_id)
            }
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    *s
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.as_str()
                } else {
                    "panic"
                };
                error!(target: "panic", "handler panic in {} {}: {}", service, action, msg);
                self.encode_error(&spec, &ApiError::internal("internal server error"), &request_id)
            }
        }
    }

    fn encode_success(&self, spec: &ServiceSpec, action: &str, body: &Value, request_id: &str) -> WireResponse {
        match spec.protocol {
            Protocol::Query => WireResponse {
                status: 200,
                content_type: "text/xml;charset=UTF-8",
                body: wire::xml_response(action, spec.xmlns, request_id, body),
                request_id: request_id.to_string(),
            },
            Protocol::Json => WireResponse {
                status: 200,
                content_type: "application/x-amz-json-1.1",
                body: wire::json_response(body),
                request_id: request_id.to_string(),
            },
        }
    }

    fn encode_error(&self, spec: &ServiceSpec, err: &ApiError, request_id: &str) -> WireResponse {
        match spec.protocol {
            Protocol::Query => WireResponse {
                status: err.http_status(),
                content_type: "text/xml;charset=UTF-8",
                body: wire::xml_error(err.code_str(), err.message(), request_id),
                request_id: request_id.to_string(),
            },
            Protocol::Json => WireResponse {
                status: err.http_status(),
                content_type: "application/x-amz-json-1.1",
                body: wire::json_error(err.code_str(), err.message()),
                request_id: request_id.to_string(),
            },
        }
    }
}

impl RegistryBuilder {
    pub fn service(mut self, spec: ServiceSpec) -> Self {
        self.services.insert(spec.name, spec);
        self
    }

    /// Declare the complete action surface of a service. `build` verifies a
    /// handler was registered for every declared action.
    pub fn declare(mut self, service: &'static str, actions: &[&'static str]) -> Self {
        for a in actions {
            self.declared.push((service, a));
        }
        self
    }

    pub fn action(mut self, service: &str, action: &str, handler: Handler) -> Self {
        self.handlers.insert((service.to_string(), action.to_string()), handler);
        self
    }

    /// Validate completeness and freeze the table.
    pub fn build(self) -> anyhow::Result<Registry> {
        for (service, action) in &self.declared {
            if !self.services.contains_key(service) {
                anyhow::bail!("action '{}' declared for unknown service '{}'", action, service);
            }
            if !self.handlers.contains_key(&(service.to_string(), action.to_string())) {
                anyhow::bail!("no handler registered for declared action '{}' of service '{}'", action, service);
            }
        }
        for (service, action) in self.handlers.keys() {
            if !self.services.contains_key(service.as_str()) {
                anyhow::bail!("handler for '{}' registered under unknown service '{}'", action, service);
            }
        }
        Ok(Registry { services: self.services, handlers: self.handlers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_handler(_: &SharedStore, _: &ActionRequest) -> ApiResult<Value> {
        let mut body = Value::empty_map();
        body.set("return", Value::Bool(true));
        Ok(body)
    }

    fn panicking_handler(_: &SharedStore, _: &ActionRequest) -> ApiResult<Value> {
        panic!("boom");
    }

    #[test]
    fn build_fails_fast_on_missing_handler() {
        let err = Registry::builder()
            .service(EC2)
            .declare("ec2", &["CreateVpc", "DeleteVpc"])
            .action("ec2", "CreateVpc", ok_handler)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("DeleteVpc"));
    }

    #[test]
    fn build_fails_on_unknown_service() {
        let err = Registry::builder()
            .action("s3", "PutObject", ok_handler)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown service"));
    }

    #[tokio::test]
    async fn unsupported_action_gets_standard_envelope() {
        let registry = Registry::builder().service(EC2).build().unwrap();
        let store = SharedStore::new();
        let resp = registry.dispatch(&store, "ec2", "DescribeWidgets", Value::empty_map()).await;
        assert_eq!(resp.status, 400);
        assert!(resp.body.contains("<Code>InvalidAction</Code>"));
        assert!(resp.body.contains(&resp.request_id));
    }

    #[tokio::test]
    async fn success_is_enveloped_with_request_id() {
        let registry = Registry::builder()
            .service(EC2)
            .declare("ec2", &["Ping"])
            .action("ec2", "Ping", ok_handler)
            .build()
            .unwrap();
        let store = SharedStore::new();
        let resp = registry.dispatch(&store, "ec2", "Ping", Value::empty_map()).await;
        assert_eq!(resp.status, 200);
        assert!(resp.body.contains("<PingResponse"));
        assert!(resp.body.contains("<return>true</return>"));
        assert!(resp.body.contains(&format!("<requestId>{}</requestId>", resp.request_id)));
    }

    #[tokio::test]
    async fn json_protocol_service_encodes_json() {
        let spec = ServiceSpec {
            name: "kv",
            protocol: Protocol::Json,
            xmlns: "",
            api_version: "2016-11-15",
        };
        let registry = Registry::builder()
            .service(spec)
            .declare("kv", &["Ping"])
            .action("kv", "Ping", ok_handler)
            .build()
            .unwrap();
        let store = SharedStore::new();
        let resp = registry.dispatch(&store, "kv", "Ping", Value::empty_map()).await;
        assert_eq!(resp.content_type, "application/x-amz-json-1.1");
        assert!(resp.body.contains("\"return\":true"));

        let err = registry.dispatch(&store, "kv", "Nope", Value::empty_map()).await;
        assert_eq!(err.status, 400);
        assert!(err.body.contains("\"__type\":\"InvalidAction\""));
    }

    #[tokio::test]
    async fn handler_panic_becomes_internal_envelope() {
        let registry = Registry::builder()
            .service(EC2)
            .declare("ec2", &["Boom"])
            .action("ec2", "Boom", panicking_handler)
            .build()
            .unwrap();
        let store = SharedStore::new();
        let resp = registry.dispatch(&store, "ec2", "Boom", Value::empty_map()).await;
        assert_eq!(resp.status, 500);
        assert!(resp.body.contains("<Code>InternalError</Code>"));
    }
}
