//! Scripted HTTP node for driving the harness without real binaries.
//!
//! Every accepted connection serves exactly one request and is then closed.
//! The reply is chosen by a handler that sees the request and the index of the
//! connection it arrived on.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use twinchain_harness::rpc::NodeEndpoint;

/// A request as seen by the mock.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request path, e.g. `/` or `/debug/info`.
    pub path: String,
    /// Raw body.
    pub body: String,
}

impl Request {
    /// JSON-RPC method name, if the body is a JSON-RPC request.
    pub fn rpc_method(&self) -> Option<String> {
        serde_json::from_str::<Value>(&self.body)
            .ok()?
            .get("method")?
            .as_str()
            .map(str::to_owned)
    }
}

/// What the mock does with a request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with a status code and a body.
    Status(u16, String),
    /// Close the connection without answering.
    Reset,
}

impl Reply {
    /// A successful JSON-RPC reply carrying `result`.
    pub fn rpc_result(result: Value) -> Self {
        Self::Status(
            200,
            json!({ "result": result, "error": null, "id": 1 }).to_string(),
        )
    }

    /// A JSON-RPC error reply.
    pub fn rpc_error(status: u16, code: i64, message: &str) -> Self {
        Self::Status(
            status,
            json!({ "result": null, "error": { "code": code, "message": message }, "id": 1 })
                .to_string(),
        )
    }

    /// A sidechain API reply carrying `result`.
    pub fn api_result(result: Value) -> Self {
        Self::Status(200, json!({ "result": result }).to_string())
    }
}

type Handler = dyn Fn(&Request, usize) -> Reply + Send + Sync;

/// A running mock node.
pub struct MockNode {
    port: u16,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Request>>>,
    task: JoinHandle<()>,
}

impl MockNode {
    /// Serve on an ephemeral localhost port.
    pub async fn serve<F>(handler: F) -> Self
    where
        F: Fn(&Request, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve_on(listener, handler)
    }

    /// Connection `n` gets `replies[n]`; the last reply repeats.
    pub async fn scripted(replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty());
        Self::serve(move |_, n| replies[n.min(replies.len() - 1)].clone()).await
    }

    /// `count` mocks on consecutive ports, as node sets expect. The handler
    /// also gets the index of the node a request reached.
    pub async fn serve_consecutive<F>(count: usize, handler: F) -> Vec<Self>
    where
        F: Fn(usize, &Request, usize) -> Reply + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        'search: loop {
            let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = first.local_addr().unwrap().port();
            let mut listeners = vec![first];
            for offset in 1..count {
                let Some(port) = u16::try_from(offset).ok().and_then(|o| base.checked_add(o)) else {
                    continue 'search;
                };
                match TcpListener::bind(("127.0.0.1", port)).await {
                    Ok(listener) => listeners.push(listener),
                    Err(_) => continue 'search,
                }
            }
            return listeners
                .into_iter()
                .enumerate()
                .map(|(node, listener)| {
                    let handler = Arc::clone(&handler);
                    Self::serve_on(listener, move |request, n| handler(node, request, n))
                })
                .collect();
        }
    }

    fn serve_on<F>(listener: TcpListener, handler: F) -> Self
    where
        F: Fn(&Request, usize) -> Reply + Send + Sync + 'static,
    {
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let task = {
            let connections = Arc::clone(&connections);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let n = connections.fetch_add(1, Ordering::SeqCst);
                    let handler = Arc::clone(&handler);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        let _ = answer(stream, n, handler.as_ref(), &requests).await;
                    });
                }
            })
        };

        Self {
            port,
            connections,
            requests,
            task,
        }
    }

    /// Listening port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Endpoint of the mock.
    pub fn endpoint(&self) -> NodeEndpoint {
        NodeEndpoint::localhost(self.port)
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn answer(
    mut stream: TcpStream,
    n: usize,
    handler: &Handler,
    requests: &Mutex<Vec<Request>>,
) -> std::io::Result<()> {
    let request = read_request(&mut stream).await?;
    let reply = handler(&request, n);
    requests.lock().push(request);

    match reply {
        Reply::Reset => Ok(()),
        Reply::Status(status, body) => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reason(status),
                body.len()
            );
            stream.write_all(head.as_bytes()).await?;
            stream.write_all(body.as_bytes()).await?;
            stream.shutdown().await
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
    }

    let end = buf.len().min(header_end + content_length);
    Ok(Request {
        path,
        body: String::from_utf8_lossy(&buf[header_end..end]).to_string(),
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
