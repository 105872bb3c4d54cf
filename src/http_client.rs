//! Shared blocking HTTP agent and bounded GET helper.
//!
//! Requests are never retried; callers report the first failure.

use std::io::{self, Read};
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("railcast/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("failed to read response from {url}: {source}")]
    Body { url: String, source: io::Error },
}

/// Return a shared HTTP agent with consistent timeouts.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
    })
}

/// GET `url` once and return at most `max_bytes` of body.
///
/// Any status >= 400 is an error.
pub(crate) fn get_bytes(url: &Url, max_bytes: usize) -> Result<Vec<u8>, HttpError> {
    let response = match agent().get(url.as_str()).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(status, _)) => {
            return Err(HttpError::Status {
                url: url.to_string(),
                status,
            });
        }
        Err(ureq::Error::Transport(transport)) => {
            return Err(HttpError::Transport {
                url: url.to_string(),
                message: transport.to_string(),
            });
        }
    };
    read_response_bytes(response, max_bytes).map_err(|source| HttpError::Body {
        url: url.to_string(),
        source,
    })
}

/// Read a response into memory, enforcing a maximum byte size.
fn read_response_bytes(response: ureq::Response, max_bytes: usize) -> Result<Vec<u8>, io::Error> {
    if let Some(length) = response
        .header("Content-Length")
        .and_then(|value| value.parse::<u64>().ok())
    {
        if length > max_bytes as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Response too large: {length} bytes"),
            ));
        }
    }
    let mut limited = response.into_reader().take(max_bytes as u64 + 1);
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response exceeded {max_bytes} bytes"),
        ));
    }
    Ok(bytes)
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Answer one request with `response`; the receiver yields the raw request head.
    pub(crate) fn serve_once(response: String) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let read = stream.read(&mut buf).unwrap_or(0);
                let _ = tx.send(String::from_utf8_lossy(&buf[..read]).into_owned());
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{addr}"), rx)
    }
}
