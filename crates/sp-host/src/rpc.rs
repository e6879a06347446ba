//! JSON-RPC request handling for the hosted resource

use base64::Engine;
use oic_sp::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use thiserror::Error;
use tracing::{debug, error, info};

/// Directory of the file store; unset means an in-memory store
pub const STORE_DIR_ENV: &str = "SP_STORE_DIR";

/// Path of a JSON configuration file
pub const CONFIG_ENV: &str = "SP_CONFIG";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32000;

// --- Struct Definitions ---
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Serialize, Debug)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Serialize, Debug)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Deserialize, Debug, Default)]
struct GetParams {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PostParams {
    payload: String,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    Config(#[from] SpError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// --- Helper Functions ---
pub fn create_error_response(id: Value, code: i32, message: String) -> RpcResponse {
    error!("Responding with error: code={}, message={}", code, message);
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}

pub fn create_success_response(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: Some(result),
        error: None,
    }
}

fn result_name(result: EntityHandlerResult) -> &'static str {
    match result {
        EntityHandlerResult::Ok => "ok",
        EntityHandlerResult::Error => "error",
        EntityHandlerResult::NotAcceptable => "not_acceptable",
    }
}
// --- Helper Functions End ---

pub type HostStore = Box<dyn PersistentStore + Send>;

/// The resource as served over stdio
pub struct Host {
    resource: SpResource<HostStore>,
}

impl Host {
    pub fn new(resource: SpResource<HostStore>) -> Self {
        Self { resource }
    }

    /// Builds the host from `SP_CONFIG` and `SP_STORE_DIR`
    pub fn from_env() -> Result<Self, HostError> {
        let config = match env::var(CONFIG_ENV) {
            Ok(path) => {
                info!("Loading configuration from {}", path);
                SpConfig::from_file(path)?
            }
            Err(_) => SpConfig::default(),
        };

        let store: HostStore = match env::var(STORE_DIR_ENV) {
            Ok(dir) => {
                info!("Using file store in {}", dir);
                Box::new(FileStore::open(dir)?)
            }
            Err(_) => {
                info!("{} not set, state will not survive a restart", STORE_DIR_ENV);
                Box::new(MemoryStore::new())
            }
        };

        Ok(Self::new(SpResource::init(config, store)?))
    }

    pub fn resource(&self) -> &SpResource<HostStore> {
        &self.resource
    }

    // --- Main Request Processor ---
    pub fn process_request(&mut self, req: RpcRequest) -> RpcResponse {
        debug!("Processing request: {:?}", req);

        if req.jsonrpc != "2.0" {
            return create_error_response(
                req.id,
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"".to_string(),
            );
        }

        match req.method.as_str() {
            "help" => {
                info!("Received help request");
                let help_info = json!({
                    "message": "Security profile host: JSON-RPC access to /oic/sec/sp.",
                    "commands": {
                        "help": { "description": "Displays this help message." },
                        "sp/get": {
                            "description": "GET the resource as base64 CBOR.",
                            "params": { "query": "optional, e.g. if=oic.if.baseline" }
                        },
                        "sp/post": {
                            "description": "POST a (partial) base64 CBOR representation.",
                            "params": { "payload": "base64 CBOR map" }
                        },
                        "sp/profile": { "description": "Returns the live profile as JSON." }
                    }
                });
                create_success_response(req.id, help_info)
            }

            "sp/get" => {
                let params: GetParams = if req.params.is_null() {
                    GetParams::default()
                } else {
                    match serde_json::from_value(req.params) {
                        Ok(p) => p,
                        Err(e) => {
                            return create_error_response(
                                req.id,
                                INVALID_PARAMS,
                                format!("Invalid params: {}", e),
                            )
                        }
                    }
                };

                let response = self.resource.handle(SpRequest::Get {
                    query: params.query,
                });
                let payload = response
                    .payload
                    .map(|p| base64::engine::general_purpose::STANDARD.encode(p));
                create_success_response(
                    req.id,
                    json!({ "result": result_name(response.result), "payload": payload }),
                )
            }

            "sp/post" => {
                let params: PostParams = match serde_json::from_value(req.params) {
                    Ok(p) => p,
                    Err(e) => {
                        return create_error_response(
                            req.id,
                            INVALID_PARAMS,
                            format!("Invalid params: {}", e),
                        )
                    }
                };
                let engine = base64::engine::general_purpose::STANDARD;
                let payload = match engine.decode(&params.payload) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        return create_error_response(
                            req.id,
                            INVALID_PARAMS,
                            format!("Invalid params: payload is not base64: {}", e),
                        )
                    }
                };

                let response = self.resource.handle(SpRequest::Post { payload });
                create_success_response(
                    req.id,
                    json!({ "result": result_name(response.result) }),
                )
            }

            "sp/profile" => {
                let profile = self.resource.profile();
                match serde_json::to_value(profile) {
                    Ok(mut value) => {
                        let required = self
                            .resource
                            .codec()
                            .policy()
                            .requires_credential(&profile.active_profile);
                        if let Value::Object(fields) = &mut value {
                            fields.insert("credential_required".to_string(), json!(required));
                        }
                        create_success_response(req.id, value)
                    }
                    Err(e) => create_error_response(
                        req.id,
                        INTERNAL_ERROR,
                        format!("Failed to serialize profile: {}", e),
                    ),
                }
            }

            other => create_error_response(
                req.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        }
    }
}
