//! Minimal static file server for compiled test bundles.
//!
//! Serves one directory over HTTP/1.1 on an OS-assigned loopback port.
//! Only `GET` and `HEAD` are supported; every connection is closed after
//! one response.

use std::fmt::Write as _;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

/// Longest accepted request head.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// A running file server; stopped explicitly with [`TestServer::stop`] or
/// when dropped.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    accept: JoinHandle<()>,
}

impl TestServer {
    /// Binds `127.0.0.1:0` and starts serving `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be resolved or the socket cannot be
    /// bound.
    pub async fn start(root: &Path) -> io::Result<Self> {
        let root = tokio::fs::canonicalize(root).await?;
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        log::debug!("serving {} on http://{addr}", root.display());
        let accept = tokio::spawn(accept_loop(listener, root));
        Ok(Self { addr, accept })
    }

    /// `http://<host>:<port>`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of an absolute request path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        debug_assert!(path.starts_with('/'), "path must start with a slash");
        format!("{}{path}", self.base_url())
    }

    /// Stops accepting connections and aborts in-flight ones. Once this
    /// returns the port no longer accepts connections.
    pub async fn stop(mut self) {
        self.accept.abort();
        let _ = (&mut self.accept).await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn accept_loop(listener: TcpListener, root: PathBuf) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let root = root.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle(stream, &root).await {
                            log::debug!("test server connection failed: {e}");
                        }
                    });
                }
                Err(e) => log::warn!("test server accept failed: {e}"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn handle(stream: TcpStream, root: &Path) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut request_line = Vec::new();
    reader.read_until(b'\n', &mut request_line).await?;
    let mut head_len = request_line.len();
    loop {
        let mut line = Vec::new();
        let n = reader.read_until(b'\n', &mut line).await?;
        head_len += n;
        if n == 0 || line == b"\r\n" || line == b"\n" || head_len > MAX_HEAD_BYTES {
            break;
        }
    }

    let response = match std::str::from_utf8(&request_line) {
        Ok(request_line) => {
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or_default();
            let target = parts.next().unwrap_or_default();
            respond(root, method, target).await
        }
        Err(_) => Response::empty(400),
    };
    let mut stream = reader.into_inner();
    stream.write_all(&response.head()).await?;
    if let Some(body) = &response.body {
        stream.write_all(body).await?;
    }
    stream.shutdown().await
}

/// A response ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Header name/value pairs, excluding `Connection`.
    pub headers: Vec<(&'static str, String)>,
    /// Body; `None` for header-only responses.
    pub body: Option<Vec<u8>>,
}

impl Response {
    fn empty(status: u16) -> Self {
        Self { status, headers: vec![("Content-Length", "0".to_string())], body: None }
    }

    fn head(&self) -> Vec<u8> {
        let reason = match self.status {
            200 => "OK",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Bad Request",
        };
        let mut head = format!("HTTP/1.1 {} {reason}\r\n", self.status);
        for (name, value) in &self.headers {
            let _ = write!(head, "{name}: {value}\r\n");
        }
        head.push_str("Connection: close\r\n\r\n");
        head.into_bytes()
    }
}

/// Computes the response for `method` on `target` below `root`.
///
/// `root` must be canonical.
pub async fn respond(root: &Path, method: &str, target: &str) -> Response {
    let head_only = match method {
        "GET" => false,
        "HEAD" => true,
        "" => return Response::empty(400),
        _ => {
            let mut response = Response::empty(405);
            response.headers.push(("Allow", "GET,HEAD".to_string()));
            return response;
        }
    };
    let Some(file) = resolve(root, target).await else {
        return Response::empty(404);
    };
    let content_type = content_type(&file);
    if head_only {
        let len = match tokio::fs::metadata(&file).await {
            Ok(meta) => meta.len(),
            Err(_) => return Response::empty(404),
        };
        return Response {
            status: 200,
            headers: vec![("Content-Type", content_type), ("Content-Length", len.to_string())],
            body: None,
        };
    }
    match tokio::fs::read(&file).await {
        Ok(body) => Response {
            status: 200,
            headers: vec![("Content-Type", content_type), ("Content-Length", body.len().to_string())],
            body: Some(body),
        },
        Err(_) => Response::empty(404),
    }
}

/// Maps a request target to a regular file inside `root`.
async fn resolve(root: &Path, target: &str) -> Option<PathBuf> {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    let decoded = percent_decode(path)?;
    let candidate = root.join(decoded.trim_start_matches('/'));
    let resolved = tokio::fs::canonicalize(&candidate).await.ok()?;
    if !resolved.starts_with(root) {
        return None;
    }
    let meta = tokio::fs::metadata(&resolved).await.ok()?;
    meta.is_file().then_some(resolved)
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Content type by extension: a fixed table first, then a general probe.
#[must_use]
pub fn content_type(path: &Path) -> String {
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();
    let fixed = match ext.as_str() {
        "js" => Some("application/javascript;charset=utf-8"),
        "html" => Some("text/html;charset=utf-8"),
        "css" => Some("text/css;charset=utf-8"),
        "txt" => Some("text/plain;charset=utf-8"),
        "xml" => Some("application/xml;charset=utf-8"),
        "gif" => Some("image/gif"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    };
    fixed
        .or_else(|| mime_guess::from_path(path).first_raw())
        .unwrap_or("application/octet-stream")
        .to_string()
}
