//! Minimal HTTP/1.x framing for script commands.
//!
//! A request carries one payload, either as the query string of a `GET`
//! or as the body of a `POST` with `Content-Length`. The payload is
//! form-decoded and must read `SQL=<statement>`.

use std::fmt;
use std::io;

use percent_encoding::percent_decode_str;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Raw payload, not yet decoded.
    pub payload: String,
    pub keep_alive: bool,
}

#[derive(Debug)]
pub enum RequestError {
    /// Declared body larger than the limit.
    TooLarge { limit: usize },
    /// Connection ended before the declared body arrived.
    Incomplete,
    HeadersTooLarge { limit: usize },
    MissingLength,
    BadRequestLine,
    UnsupportedMethod(String),
    NotSql,
    Io(io::Error),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::TooLarge { limit } => write!(f, "Invalid request >{} bytes", limit),
            RequestError::Incomplete => write!(f, "Incomplete request"),
            RequestError::HeadersTooLarge { limit } => {
                write!(f, "Request headers >{} bytes", limit)
            }
            RequestError::MissingLength => write!(f, "Missing Content-Length"),
            RequestError::BadRequestLine => write!(f, "Malformed request line"),
            RequestError::UnsupportedMethod(m) => write!(f, "Unsupported method {}", m),
            RequestError::NotSql => write!(f, "Expected SQL=<statement>"),
            RequestError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RequestError {
    fn from(e: io::Error) -> Self {
        RequestError::Io(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Fail,
}

impl Status {
    pub fn line(&self) -> &'static str {
        match self {
            Status::Ok => "200 OK",
            Status::Fail => "400 Fail",
        }
    }
}

/// Read one request. `Ok(None)` means the peer closed the connection
/// cleanly between requests.
pub async fn read_request<R>(reader: &mut R, limit: usize) -> Result<Option<Request>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = limit;
    let mut lines = Vec::new();

    loop {
        let mut line = String::new();
        let n = (&mut *reader).take(budget as u64).read_line(&mut line).await?;
        if n == 0 {
            if budget == 0 {
                return Err(RequestError::HeadersTooLarge { limit });
            }
            if lines.is_empty() {
                return Ok(None);
            }
            return Err(RequestError::Incomplete);
        }
        if !line.ends_with('\n') {
            if n == budget {
                return Err(RequestError::HeadersTooLarge { limit });
            }
            return Err(RequestError::Incomplete);
        }
        budget -= n;

        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if line.is_empty() {
            // Tolerate stray blank lines before a request line.
            if lines.is_empty() {
                continue;
            }
            break;
        }
        lines.push(line);
    }

    let mut parts = lines[0].split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v)) if v.starts_with("HTTP/") => (m, t, v),
        _ => return Err(RequestError::BadRequestLine),
    };
    let method = match method.to_ascii_uppercase().as_str() {
        "GET" => Method::Get,
        "POST" => Method::Post,
        _ => return Err(RequestError::UnsupportedMethod(method.to_string())),
    };

    let mut content_length = None;
    let mut keep_alive = version.eq_ignore_ascii_case("HTTP/1.1");
    for header in &lines[1..] {
        let Some((name, value)) = header.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = Some(
                value
                    .parse::<usize>()
                    .map_err(|_| RequestError::MissingLength)?,
            );
        } else if name.eq_ignore_ascii_case("connection") {
            if value.eq_ignore_ascii_case("close") {
                keep_alive = false;
            } else if value.eq_ignore_ascii_case("keep-alive") {
                keep_alive = true;
            }
        }
    }

    let payload = match method {
        Method::Get => match target.split_once('?') {
            Some((_, query)) => query.to_string(),
            None => target.trim_start_matches('/').to_string(),
        },
        Method::Post => {
            let length = content_length.ok_or(RequestError::MissingLength)?;
            if length > limit {
                return Err(RequestError::TooLarge { limit });
            }
            let mut body = vec![0u8; length];
            reader.read_exact(&mut body).await.map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    RequestError::Incomplete
                } else {
                    RequestError::Io(e)
                }
            })?;
            String::from_utf8_lossy(&body).into_owned()
        }
    };

    Ok(Some(Request {
        method,
        payload,
        keep_alive,
    }))
}

/// Form-decode a payload: `+` is a space, then `%XX` escapes.
pub fn decode_payload(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Extract the statement from a decoded payload.
pub fn parse_command(decoded: &str) -> Result<&str, RequestError> {
    let sql = decoded.strip_prefix("SQL=").ok_or(RequestError::NotSql)?;
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(RequestError::NotSql);
    }
    Ok(sql)
}

pub async fn write_response<W>(
    writer: &mut W,
    status: Status,
    body: &str,
    keep_alive: bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {}\r\nServer: sqlgrid\r\nAccess-Control-Allow-Origin: *\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: {}\r\nCache-Control: no-cache\r\n\r\n",
        status.line(),
        body.len(),
        if keep_alive { "keep-alive" } else { "close" }
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn parse(raw: &str) -> Result<Option<Request>, RequestError> {
        let mut reader = BufReader::new(raw.as_bytes());
        read_request(&mut reader, 4095).await
    }

    #[tokio::test]
    async fn test_get_with_query() {
        let req = parse("GET /?SQL=select+1 HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.payload, "SQL=select+1");
        assert!(req.keep_alive);
    }

    #[tokio::test]
    async fn test_post_with_body() {
        let req = parse("POST / HTTP/1.1\r\nContent-Length: 12\r\nConnection: close\r\n\r\nSQL=select 1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.payload, "SQL=select 1");
        assert!(!req.keep_alive);
    }

    #[tokio::test]
    async fn test_http10_defaults_to_close() {
        let req = parse("GET /?SQL=x HTTP/1.0\r\n\r\n").await.unwrap().unwrap();
        assert!(!req.keep_alive);
    }

    #[tokio::test]
    async fn test_two_requests_on_one_stream() {
        let raw = "POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nSQL=aGET /?SQL=b HTTP/1.1\r\n\r\n";
        let mut reader = BufReader::new(raw.as_bytes());
        let first = read_request(&mut reader, 4095).await.unwrap().unwrap();
        assert_eq!(first.payload, "SQL=a");
        let second = read_request(&mut reader, 4095).await.unwrap().unwrap();
        assert_eq!(second.payload, "SQL=b");
        assert!(read_request(&mut reader, 4095).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let err = parse("POST / HTTP/1.1\r\nContent-Length: 5000\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::TooLarge { limit: 4095 }));
        assert_eq!(err.to_string(), "Invalid request >4095 bytes");
    }

    #[tokio::test]
    async fn test_incomplete_body() {
        let err = parse("POST / HTTP/1.1\r\nContent-Length: 50\r\n\r\nSQL=short")
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Incomplete));
    }

    #[tokio::test]
    async fn test_incomplete_headers() {
        let err = parse("GET /?SQL=x HTTP/1.1\r\nHost").await.unwrap_err();
        assert!(matches!(err, RequestError::Incomplete));
    }

    #[tokio::test]
    async fn test_headers_too_large() {
        let raw = format!("GET /?SQL={} HTTP/1.1\r\n\r\n", "x".repeat(5000));
        let err = parse(&raw).await.unwrap_err();
        assert!(matches!(err, RequestError::HeadersTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_post_without_length() {
        let err = parse("POST / HTTP/1.1\r\n\r\nSQL=x").await.unwrap_err();
        assert!(matches!(err, RequestError::MissingLength));
    }

    #[tokio::test]
    async fn test_unsupported_method_and_bad_line() {
        assert!(matches!(
            parse("DELETE / HTTP/1.1\r\n\r\n").await.unwrap_err(),
            RequestError::UnsupportedMethod(_)
        ));
        assert!(matches!(
            parse("hello\r\n\r\n").await.unwrap_err(),
            RequestError::BadRequestLine
        ));
    }

    #[tokio::test]
    async fn test_clean_eof() {
        assert!(parse("").await.unwrap().is_none());
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload("SQL=select+*+from+t"), "SQL=select * from t");
        assert_eq!(decode_payload("SQL=a%2Bb%3D%27x%27"), "SQL=a+b='x'");
        assert_eq!(decode_payload("SQL=100%"), "SQL=100%");
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("SQL=select 1").unwrap(), "select 1");
        assert!(matches!(parse_command("sql=select 1"), Err(RequestError::NotSql)));
        assert!(matches!(parse_command("SQL=  "), Err(RequestError::NotSql)));
    }

    #[tokio::test]
    async fn test_write_response() {
        let mut out = Vec::new();
        write_response(&mut out, Status::Ok, "name\nalice", true)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 10\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\nname\nalice"));
    }
}
