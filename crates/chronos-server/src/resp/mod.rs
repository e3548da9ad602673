//! RESP2 framing: a value type, its wire encoder, and a request-frame
//! reader. Hand-rolled rather than pulled in from a `redis`-protocol
//! crate — this is a nine-verb subset and owning the wire format keeps
//! the dependency surface small.

pub mod dispatcher;
pub mod server;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt};

/// A RESP2 reply value. Requests are always parsed as an array of bulk
/// strings (`parse_command`); this type only needs to cover what the
/// dispatcher ever sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// A `+OK\r\n`-style simple string. Must not contain `\r` or `\n`.
    Simple(String),
    /// A `-ERR message\r\n`-style error line.
    Error(String),
    /// A `:123\r\n`-style signed integer.
    Integer(i64),
    /// A `$5\r\nhello\r\n`-style bulk string.
    Bulk(Vec<u8>),
    /// A `$-1\r\n` null bulk string (absence).
    NullBulk,
    /// A `*N\r\n`-style array of further values.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Encodes this value into its RESP2 wire form, appended to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Self::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Self::Integer(n) => {
                out.push(b':');
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Self::Bulk(bytes) => {
                out.push(b'$');
                out.extend_from_slice(bytes.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
            }
            Self::NullBulk => out.extend_from_slice(b"$-1\r\n"),
            Self::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

/// Errors encountered while reading a request frame off the wire.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The connection was closed before a full frame arrived.
    #[error("connection closed")]
    Closed,
    /// The frame did not follow the RESP2 array-of-bulk-strings shape the
    /// dispatcher expects.
    #[error("protocol error: {0}")]
    Malformed(String),
    /// The underlying I/O read failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one RESP2 request frame — an array of bulk strings — from
/// `reader`. Returns `Ok(None)` on a clean EOF between frames (the client
/// disconnected), `Err` on anything malformed (the caller closes the
/// connection per the protocol error policy).
pub async fn read_command<R>(reader: &mut R) -> Result<Option<Vec<Vec<u8>>>, FrameError>
where
    R: AsyncRead + AsyncBufReadExt + Unpin,
{
    let mut header = String::new();
    let bytes_read = reader.read_line(&mut header).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let header = header.trim_end_matches(['\r', '\n']);
    let Some(count_str) = header.strip_prefix('*') else {
        return Err(FrameError::Malformed(format!(
            "expected array header starting with '*', got {header:?}"
        )));
    };
    let count: usize = count_str
        .parse()
        .map_err(|_| FrameError::Malformed(format!("invalid array length {count_str:?}")))?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let mut bulk_header = String::new();
        if reader.read_line(&mut bulk_header).await? == 0 {
            return Err(FrameError::Malformed("truncated frame".to_string()));
        }
        let bulk_header = bulk_header.trim_end_matches(['\r', '\n']);
        let Some(len_str) = bulk_header.strip_prefix('$') else {
            return Err(FrameError::Malformed(format!(
                "expected bulk header starting with '$', got {bulk_header:?}"
            )));
        };
        let len: usize = len_str
            .parse()
            .map_err(|_| FrameError::Malformed(format!("invalid bulk length {len_str:?}")))?;

        let mut buf = vec![0u8; len + 2]; // + trailing CRLF
        tokio::io::AsyncReadExt::read_exact(reader, &mut buf).await?;
        buf.truncate(len);
        args.push(buf);
    }

    if args.is_empty() {
        return Err(FrameError::Malformed("empty command array".to_string()));
    }

    Ok(Some(args))
}

/// Writes `value`'s RESP2 encoding to `writer` and flushes.
pub async fn write_reply<W>(writer: &mut W, value: &RespValue) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    value.encode(&mut buf);
    writer.write_all(&buf).await?;
    writer.flush().await
}
