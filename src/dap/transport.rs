use super::transport_trait::{DapReader, DapWriter};
use super::types::Message;
use crate::{Error, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace};

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// DAP Transport - Content-Length framed JSON over STDIO or a TCP socket
///
/// The editor side of the proxy usually talks over the process' own
/// stdin/stdout; the kernel side is a TCP connection to the debugger that
/// ipykernel (debugpy) listens on.
pub struct DapTransport {
    reader: FramedReader,
    writer: FramedWriter,
}

/// Read half of a [`DapTransport`]
pub struct FramedReader {
    stream: BufReader<BoxedRead>,
}

/// Write half of a [`DapTransport`]
pub struct FramedWriter {
    sink: BoxedWrite,
}

impl DapTransport {
    /// Transport over this process' stdin/stdout (editor launches the proxy)
    pub fn stdio() -> Self {
        Self::from_io(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Transport over a TCP socket (editor or kernel debugger connection)
    pub fn socket(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self::from_io(read, write)
    }

    pub fn from_io<R, W>(read: R, write: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: FramedReader {
                stream: BufReader::new(Box::new(read)),
            },
            writer: FramedWriter {
                sink: Box::new(write),
            },
        }
    }

    pub fn into_split(self) -> (FramedReader, FramedWriter) {
        (self.reader, self.writer)
    }
}

impl FramedReader {
    pub async fn read_message(&mut self) -> Result<Message> {
        let content = Self::read_frame(&mut self.stream).await?;

        debug!("DAP received: {}", content);

        let msg: Message = serde_json::from_str(&content)
            .map_err(|e| Error::Dap(format!("Failed to parse DAP message: {}", e)))?;

        Ok(msg)
    }

    /// Read one framed payload: headers up to a blank line, then
    /// `Content-Length` bytes of UTF-8.
    async fn read_frame<R: AsyncBufReadExt + AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
        let mut headers = String::new();
        loop {
            let mut line = String::new();
            let read = reader.read_line(&mut line).await?;

            if read == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "DAP stream closed",
                )));
            }

            if line == "\r\n" || line == "\n" {
                break;
            }

            headers.push_str(&line);
        }

        let content_length = headers
            .lines()
            .find(|line| line.starts_with("Content-Length:"))
            .and_then(|line| line.split(':').nth(1))
            .and_then(|s| s.trim().parse::<usize>().ok())
            .ok_or_else(|| Error::Dap("Missing Content-Length header".to_string()))?;

        trace!("DAP: Reading message with Content-Length: {}", content_length);

        let mut buffer = vec![0u8; content_length];
        reader.read_exact(&mut buffer).await?;

        String::from_utf8(buffer).map_err(|e| Error::Dap(format!("Invalid UTF-8: {}", e)))
    }
}

impl FramedWriter {
    pub async fn write_message(&mut self, msg: &Message) -> Result<()> {
        let content = serde_json::to_string(msg)
            .map_err(|e| Error::Dap(format!("Failed to serialize DAP message: {}", e)))?;

        debug!("DAP sending: {}", content);

        let headers = format!("Content-Length: {}\r\n\r\n", content.len());

        self.sink.write_all(headers.as_bytes()).await?;
        self.sink.write_all(content.as_bytes()).await?;
        self.sink.flush().await?;

        Ok(())
    }
}

#[async_trait]
impl DapReader for FramedReader {
    async fn read_message(&mut self) -> Result<Message> {
        FramedReader::read_message(self).await
    }
}

#[async_trait]
impl DapWriter for FramedWriter {
    async fn write_message(&mut self, msg: &Message) -> Result<()> {
        FramedWriter::write_message(self, msg).await
    }
}

/// Whether `err` means the peer went away rather than sent garbage.
pub fn is_disconnect(err: &Error) -> bool {
    matches!(
        err,
        Error::Io(e) if matches!(
            e.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
        )
    )
}
