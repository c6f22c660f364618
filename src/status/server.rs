use crate::domain::StatusSnapshot;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn};

const MAP_PAGE: &str = include_str!("../../static/map.html");

/// Upper bound for the request line plus headers.
const MAX_REQUEST_HEAD: u64 = 8 * 1024;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq)]
pub struct Response {
    status: u16,
    reason: &'static str,
    content_type: &'static str,
    body: String,
}

impl Response {
    fn ok(content_type: &'static str, body: String) -> Self {
        Response {
            status: 200,
            reason: "OK",
            content_type,
            body,
        }
    }

    fn error(status: u16, reason: &'static str) -> Self {
        Response {
            status,
            reason,
            content_type: "text/plain; charset=utf-8",
            body: format!("{} {}", status, reason),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        );
        [head.into_bytes(), self.body.as_bytes().to_vec()].concat()
    }
}

/// Listens on all interfaces.
pub async fn bind(port: u16) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?;
    info!("🗺️ Status page listening on http://{}", listener.local_addr()?);
    Ok(listener)
}

/// Answers each connection with the latest snapshot. Runs until the listener fails.
pub async fn serve(listener: TcpListener, status: watch::Receiver<StatusSnapshot>) -> io::Result<()> {
    accept_loop(listener, status, READ_TIMEOUT).await
}

#[instrument(skip_all)]
async fn accept_loop(listener: TcpListener, status: watch::Receiver<StatusSnapshot>, read_timeout: Duration) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let status = status.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, status, read_timeout).await {
                warn!("⚠️ Failed to answer {}: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, status: watch::Receiver<StatusSnapshot>, read_timeout: Duration) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();

    let response = match timeout(read_timeout, read_request_line(reader)).await {
        Ok(Ok(Some(request_line))) => {
            let snapshot = status.borrow().clone();
            let response = route(&request_line, &snapshot);
            debug!(request = %request_line, status = response.status, "Served status request");
            response
        }
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
            debug!("Rejected request: {}", e);
            Response::error(400, "Bad Request")
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            debug!("Request not received within {:?}", read_timeout);
            Response::error(408, "Request Timeout")
        }
    };

    writer.write_all(&response.to_bytes()).await?;
    writer.shutdown().await
}

/// Reads the request line and skips the headers. `None` when the client closed without
/// sending anything.
async fn read_request_line<R: AsyncRead + Unpin>(reader: R) -> io::Result<Option<String>> {
    let mut reader = BufReader::new(reader.take(MAX_REQUEST_HEAD));

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    if request_line.is_empty() {
        return Ok(None);
    }
    if !request_line.ends_with('\n') {
        return Err(head_error(&reader));
    }

    let mut header = String::new();
    loop {
        header.clear();
        let read = reader.read_line(&mut header).await?;
        if read == 0 || header.trim_end().is_empty() {
            break;
        }
        if !header.ends_with('\n') && reader.get_ref().limit() == 0 {
            return Err(head_error(&reader));
        }
        trace!(header = header.trim_end(), "Request header");
    }

    Ok(Some(request_line.trim_end().to_string()))
}

fn head_error<R: AsyncRead>(reader: &BufReader<tokio::io::Take<R>>) -> io::Error {
    let message = if reader.get_ref().limit() == 0 {
        format!("request head exceeds {} bytes", MAX_REQUEST_HEAD)
    } else {
        "request line is incomplete".to_string()
    };
    io::Error::new(io::ErrorKind::InvalidData, message)
}

pub fn route(request_line: &str, snapshot: &StatusSnapshot) -> Response {
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Response::error(400, "Bad Request");
    };
    let path = target.split('?').next().unwrap_or(target);

    if method != "GET" {
        return Response::error(405, "Method Not Allowed");
    }

    match path {
        "/" => Response::ok("text/html; charset=utf-8", MAP_PAGE.to_string()),
        "/position" => match serde_json::to_string(snapshot) {
            Ok(body) => Response::ok("application/json", body),
            Err(e) => {
                warn!("⚠️ Unable to serialize status: {}", e);
                Response::error(500, "Internal Server Error")
            }
        },
        _ => Response::error(404, "Not Found"),
    }
}
