mod rpc;

use rpc::{create_error_response, Host, RpcRequest, RpcResponse, INTERNAL_ERROR, PARSE_ERROR};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

async fn send(stdout: &mut Stdout, response: &RpcResponse) {
    let resp_str = serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to serialize response for ID {:?}: {}", response.id, e);
        json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": INTERNAL_ERROR, "message": "Serialization error" }
        })
        .to_string()
    });
    debug!(">>> Sending response: {}", resp_str);
    if let Err(e) = stdout.write_all(format!("{}\r\n", resp_str).as_bytes()).await {
        error!("Failed to write response for ID {:?}: {}", response.id, e);
    } else if let Err(e) = stdout.flush().await {
        error!("Failed to flush stdout for ID {:?}: {}", response.id, e);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Starting security profile host on stdio...");
    let mut host = match Host::from_env() {
        Ok(host) => host,
        Err(e) => {
            error!("Fatal: {}", e);
            std::process::exit(1);
        }
    };
    info!("Serving {}", host.resource().profile());

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut stdout = tokio::io::stdout();
    let mut line_buffer = String::new();

    let ready_msg = json!({
        "jsonrpc": "2.0",
        "method": "server/ready",
        "params": {"status": "ready"}
    });
    info!("Sending server/ready notification.");
    if let Err(e) = stdout.write_all(format!("{}\r\n", ready_msg).as_bytes()).await {
        error!("Fatal: Failed to write ready message: {}", e);
        return;
    }
    if let Err(e) = stdout.flush().await {
        error!("Fatal: Failed to flush after ready message: {}", e);
        return;
    }

    loop {
        line_buffer.clear();
        match reader.read_line(&mut line_buffer).await {
            Ok(0) => {
                info!("Stdin closed (EOF). Exiting host.");
                break;
            }
            Ok(_) => {
                let trimmed_line = line_buffer.trim();
                if trimmed_line.is_empty() || !trimmed_line.starts_with('{') {
                    if !trimmed_line.is_empty() {
                        warn!("Received non-JSON input line, ignoring.");
                    }
                    continue;
                }
                debug!("<<< Received raw line ({} bytes)", trimmed_line.len());

                let parsed_json: Value = match serde_json::from_str(trimmed_line) {
                    Ok(v) => v,
                    Err(e) => {
                        let error_resp = create_error_response(
                            Value::Null,
                            PARSE_ERROR,
                            format!("Parse error: {}", e),
                        );
                        send(&mut stdout, &error_resp).await;
                        continue;
                    }
                };

                // Notifications get no response
                if parsed_json.get("id").map_or(true, Value::is_null) {
                    match parsed_json.get("method").and_then(|m| m.as_str()) {
                        Some(method) => info!("Received notification: {}", method),
                        None => warn!("Received notification without method field"),
                    }
                    continue;
                }

                let id = parsed_json.get("id").cloned().unwrap_or(Value::Null);
                let req: RpcRequest = match serde_json::from_value(parsed_json) {
                    Ok(r) => r,
                    Err(e) => {
                        let error_resp =
                            create_error_response(id, PARSE_ERROR, format!("Parse error: {}", e));
                        send(&mut stdout, &error_resp).await;
                        continue;
                    }
                };

                let response = host.process_request(req);
                send(&mut stdout, &response).await;
            }
            Err(e) => {
                error!("Error reading from stdin: {}. Exiting.", e);
                break;
            }
        }
    }
    info!("Security profile host shutting down.");
}
