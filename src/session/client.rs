//! Per-client connection state (SPEC_FULL §4.6/§6). Outbound video/audio
//! framing stays on the main loop task so ordering (§5) is trivially
//! preserved; inbound input events get their own spawned reader task, since
//! nothing about their ordering is coupled to the video/audio send path.

use std::io::ErrorKind;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ErrorContext, Result, StreamError};
use crate::input::InputSink;
use crate::protocol::{read_framed, write_framed, Packet, PacketType};

pub struct Client {
    writer: OwnedWriteHalf,
    reader_task: JoinHandle<()>,
}

impl Client {
    /// Sets `TCP_NODELAY`, splits the stream, and spawns the input-event
    /// reader task that owns `input_sink` for the lifetime of the
    /// connection.
    pub fn accept(stream: TcpStream, input_sink: Box<dyn InputSink>) -> Result<Self> {
        stream.set_nodelay(true).map_err(|e| classify_io(e, "setsockopt TCP_NODELAY"))?;
        let (read_half, write_half) = stream.into_split();
        let reader_task = tokio::spawn(read_input_events(read_half, input_sink));
        Ok(Self { writer: write_half, reader_task })
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<()> {
        write_framed(&mut self.writer, packet).await.map_err(|e| classify_io(e, "write client frame"))
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_input_events(mut reader: tokio::net::tcp::OwnedReadHalf, mut sink: Box<dyn InputSink>) {
    loop {
        match read_framed(&mut reader).await {
            Ok(packet) if packet.kind == PacketType::Misc => {
                if let Err(e) = sink.inject(&packet.body) {
                    warn!(error = %e, "input injection failed");
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "client input stream ended");
                return;
            }
        }
    }
}

/// A closed or reset client socket is session-fatal but not a process
/// error (SPEC_FULL §7 `SinkClosed`); anything else is a generic `Io`.
fn classify_io(e: std::io::Error, operation: &'static str) -> StreamError {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof | ErrorKind::WriteZero => {
            StreamError::SinkClosed(ErrorContext::new(operation, e.to_string()))
        }
        _ => StreamError::Io(e),
    }
}
