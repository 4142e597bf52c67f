//! Content-Length framing for LSP traffic.
//!
//! Every message on an LSP stdio channel travels as a header block
//! (`Content-Length: N\r\n`, then a blank line) followed by exactly N bytes
//! of JSON. [`MessageReader`] and [`MessageWriter`] apply that framing over
//! any async byte stream, so the same code serves a child process's pipes
//! and an in-memory pipe in tests.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single message body (8 MiB).
const MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

/// Decodes framed JSON-RPC messages from an async stream.
pub struct MessageReader<R> {
    stream: BufReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Read one framed message.
    ///
    /// `Ok(None)` means the peer closed the stream between messages. EOF
    /// anywhere inside a frame is an error, as is a header block without a
    /// `Content-Length` or a body that exceeds [`MAX_MESSAGE_BYTES`].
    pub async fn read_message(&mut self) -> Result<Option<serde_json::Value>> {
        let Some(length) = self.read_content_length().await? else {
            return Ok(None);
        };

        if length > MAX_MESSAGE_BYTES {
            bail!("message body of {length} bytes exceeds the {MAX_MESSAGE_BYTES} byte limit");
        }

        let mut body = vec![0u8; length];
        self.stream
            .read_exact(&mut body)
            .await
            .context("reading message body")?;

        serde_json::from_slice(&body)
            .context("decoding message body")
            .map(Some)
    }

    /// Consume the header block and return the announced body length.
    ///
    /// `Content-Length` counts bytes, not characters. Header names are
    /// matched case-insensitively; unknown headers (`Content-Type`) are
    /// skipped.
    async fn read_content_length(&mut self) -> Result<Option<usize>> {
        let mut announced: Option<usize> = None;
        let mut line = String::new();
        let mut inside_block = false;

        loop {
            line.clear();
            let read = self
                .stream
                .read_line(&mut line)
                .await
                .context("reading header line")?;

            if read == 0 {
                // EOF between messages is a clean close; EOF after the
                // block started is a truncated frame.
                if inside_block {
                    bail!("stream closed in the middle of a header block");
                }
                return Ok(None);
            }
            inside_block = true;

            let header = line.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                break;
            }

            if let Some((name, value)) = header.split_once(':')
                && name.trim().eq_ignore_ascii_case("content-length")
            {
                announced = Some(
                    value
                        .trim()
                        .parse()
                        .context("parsing Content-Length value")?,
                );
            }
        }

        match announced {
            Some(length) => Ok(Some(length)),
            None => bail!("header block without Content-Length"),
        }
    }
}

/// Encodes framed JSON-RPC messages onto an async stream.
pub struct MessageWriter<W> {
    stream: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(stream: W) -> Self {
        Self { stream }
    }

    /// Frame and write one message, flushing before returning.
    pub async fn write_message(&mut self, message: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(message).context("encoding message body")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.stream
            .write_all(header.as_bytes())
            .await
            .context("writing message header")?;
        self.stream
            .write_all(&body)
            .await
            .context("writing message body")?;
        self.stream.flush().await.context("flushing message")?;

        Ok(())
    }
}
