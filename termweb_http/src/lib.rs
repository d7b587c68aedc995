//! Static file server for the terminal-streaming web client (spec §1 "the
//! static HTTP file server" external collaborator, §6 "HTTP endpoint").

pub mod error;
pub mod parser;

use error::ErrorKind;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use termweb_core::{log_error, log_info};

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const REQUEST_BUF_CAP: usize = 8192;

pub struct HttpServer {
    listener: TcpListener,
    web_root: PathBuf,
    running: Arc<AtomicBool>,
}

impl HttpServer {
    pub fn bind(addr: &str, web_root: PathBuf) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(HttpServer { listener, web_root, running: Arc::new(AtomicBool::new(true)) })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop on the calling thread until `stop()` is called.
    pub fn serve(&self) {
        self.listener.set_nonblocking(false).ok();
        while self.running.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let _ = stream.set_nodelay(true);
                    let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
                    let web_root = self.web_root.clone();
                    std::thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &web_root) {
                            log_error!("http connection error: {e}");
                        }
                    });
                }
                Err(_) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                }
            }
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Ok(addr) = self.listener.local_addr() {
            let _ = TcpStream::connect(addr);
        }
    }
}

fn handle_connection(mut stream: TcpStream, web_root: &Path) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(REQUEST_BUF_CAP);
    let mut chunk = [0u8; 1024];
    let (method, path) = loop {
        if buf.len() >= REQUEST_BUF_CAP {
            write_error(&mut stream, ErrorKind::MalformedRequest)?;
            return Ok(());
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        match parser::parse(&buf) {
            Ok(Some((req, _))) => break (req.method.to_string(), req.path.to_string()),
            Ok(None) => continue,
            Err(_) => {
                write_error(&mut stream, ErrorKind::MalformedRequest)?;
                return Ok(());
            }
        }
    };

    let head_only = match method.as_str() {
        "GET" => false,
        "HEAD" => true,
        _ => return write_error(&mut stream, ErrorKind::MethodNotAllowed),
    };

    match resolve_path(web_root, &path) {
        Some(file_path) => serve_file(&mut stream, &file_path, head_only),
        None => write_error(&mut stream, ErrorKind::NotFound),
    }
}

/// Resolve a URL path to a file under `web_root`, rejecting traversal
/// outside the root and falling back to `index.html` for directories.
fn resolve_path(web_root: &Path, url_path: &str) -> Option<PathBuf> {
    let trimmed = url_path.split('?').next().unwrap_or(url_path);
    let relative = trimmed.trim_start_matches('/');
    let mut resolved = web_root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if resolved.is_dir() {
        resolved.push("index.html");
    }
    if resolved.exists() { Some(resolved) } else { None }
}

fn serve_file(stream: &mut TcpStream, path: &Path, head_only: bool) -> std::io::Result<()> {
    let body = std::fs::read(path)?;
    let content_type = guess_content_type(path);
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    if !head_only {
        stream.write_all(&body)?;
    }
    log_info!("served {} ({} bytes){}", path.display(), body.len(), if head_only { " [HEAD]" } else { "" });
    Ok(())
}

fn write_error(stream: &mut TcpStream, kind: ErrorKind) -> std::io::Result<()> {
    let body = kind.reason_phrase();
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        kind.status_code(),
        kind.reason_phrase(),
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body.as_bytes())
}

fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_rejects_parent_traversal() {
        let dir = tempdir();
        std::fs::write(dir.join("index.html"), b"hi").unwrap();
        assert!(resolve_path(&dir, "/../../etc/passwd").is_none());
    }

    #[test]
    fn resolve_path_serves_index_for_directory() {
        let dir = tempdir();
        std::fs::write(dir.join("index.html"), b"hi").unwrap();
        let resolved = resolve_path(&dir, "/").unwrap();
        assert_eq!(resolved, dir.join("index.html"));
    }

    #[test]
    fn resolve_path_missing_file_is_none() {
        let dir = tempdir();
        assert!(resolve_path(&dir, "/nope.js").is_none());
    }

    #[test]
    fn head_request_gets_headers_without_body() {
        let dir = tempdir();
        std::fs::write(dir.join("index.html"), b"hello world").unwrap();
        let response = raw_request(&dir, "HEAD /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
        let (head, body) = split_response(&response);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Length: 11"));
        assert!(body.is_empty());
    }

    #[test]
    fn post_request_is_rejected() {
        let dir = tempdir();
        std::fs::write(dir.join("index.html"), b"hi").unwrap();
        let response = raw_request(&dir, "POST /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
        let (head, _) = split_response(&response);
        assert!(head.starts_with("HTTP/1.1 405 Method Not Allowed"));
    }

    fn raw_request(web_root: &Path, request: &str) -> Vec<u8> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let web_root = web_root.to_path_buf();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let _ = stream.set_read_timeout(Some(Duration::from_millis(500)));
            handle_connection(stream, &web_root)
        });
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(request.as_bytes()).unwrap();
        client.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        let mut response = Vec::new();
        let _ = client.read_to_end(&mut response);
        handle.join().unwrap().unwrap();
        response
    }

    fn split_response(response: &[u8]) -> (String, Vec<u8>) {
        let text = String::from_utf8_lossy(response);
        let idx = text.find("\r\n\r\n").unwrap();
        let head = text[..idx].to_string();
        let body = response[idx + 4..].to_vec();
        (head, body)
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("termweb_http_test_{:?}", std::thread::current().id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
