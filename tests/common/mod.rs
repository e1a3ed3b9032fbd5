//! Minimal in-process JSON-RPC node for exercising the wallet client
//! without a live network. Speaks just enough HTTP/1.1 for the provider's
//! POST requests.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Maps a JSON-RPC method plus params to a `result` value. Return
/// `Value::Null` for "no result" (e.g. a receipt that does not exist yet).
pub type RpcHandler = dyn Fn(&str, &Value) -> Value + Send + Sync;

pub struct MockNode {
    addr: SocketAddr,
}

impl MockNode {
    pub async fn spawn(handler: Arc<RpcHandler>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock node");
        let addr = listener.local_addr().expect("mock node addr");

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(serve_connection(stream, handler.clone()));
            }
        });

        Self { addr }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn serve_connection(mut stream: TcpStream, handler: Arc<RpcHandler>) {
    let mut buf: Vec<u8> = Vec::new();

    loop {
        let header_end = loop {
            if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
            if !read_more(&mut stream, &mut buf).await {
                return;
            }
        };

        let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            if !read_more(&mut stream, &mut buf).await {
                return;
            }
        }

        let request: Value =
            serde_json::from_slice(&buf[header_end..header_end + content_length])
                .unwrap_or(Value::Null);
        buf.drain(..header_end + content_length);

        let body = respond(&request, &*handler).to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        if stream.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 4096];
    match stream.read(&mut chunk).await {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn respond(request: &Value, handler: &RpcHandler) -> Value {
    match request {
        Value::Array(batch) => {
            Value::Array(batch.iter().map(|r| respond_single(r, handler)).collect())
        }
        single => respond_single(single, handler),
    }
}

fn respond_single(request: &Value, handler: &RpcHandler) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let result = handler(method, &params);
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// ABI-encodes a uint256 return value.
pub fn encode_uint(value: u128) -> String {
    format!("0x{:064x}", value)
}

/// Extracts the calldata from an `eth_call` params array, whichever of the
/// `input`/`data` keys the client used.
pub fn calldata_of(params: &Value) -> String {
    params
        .get(0)
        .and_then(|tx| tx.get("input").or_else(|| tx.get("data")))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}
