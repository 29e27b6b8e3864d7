//! Client end of the control stream

use crate::error::ClientError;
use log::{debug, info, warn};
use shared::{FrameReassembler, Message};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_BUFFER_SIZE: usize = 2048;

/// An established control stream to the server
///
/// A background task reads and decodes frames; [`ControlConnection::next_message`]
/// returns `None` once the server has closed the stream.
pub struct ControlConnection {
    writer: OwnedWriteHalf,
    local_addr: SocketAddr,
    inbound: mpsc::UnboundedReceiver<Message>,
    reader_task: JoinHandle<()>,
}

impl ControlConnection {
    pub async fn connect(host: &str, port: u16) -> Result<Self, ClientError> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = stream.local_addr()?;
        info!("Control stream to {} established from {}", addr, local_addr);

        let (reader, writer) = stream.into_split();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_frames(reader, inbound_tx));

        Ok(ControlConnection {
            writer,
            local_addr,
            inbound,
            reader_task,
        })
    }

    /// Local end of the stream; the broadcast endpoint is opened on the same host
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        self.writer.write_all(message.encode().as_bytes()).await?;
        self.writer.flush().await?;
        debug!("Sent {} on control stream", message.verb());
        Ok(())
    }

    pub async fn next_message(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    /// Shuts down the write side and stops the reader task
    pub async fn disconnect(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Control stream shutdown error: {}", e);
        }
        drop(self.writer);
        // The server may keep its end open after EXIT
        self.reader_task.abort();
        let _ = self.reader_task.await;
        info!("Control stream closed");
    }
}

async fn read_frames<R>(mut reader: R, inbound: mpsc::UnboundedSender<Message>)
where
    R: AsyncRead + Unpin,
{
    let mut reassembler = FrameReassembler::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        let len = match reader.read(&mut buffer).await {
            Ok(0) => {
                info!("Server closed the control stream");
                break;
            }
            Ok(len) => len,
            Err(e) => {
                warn!("Control stream read error: {}", e);
                break;
            }
        };

        for frame in reassembler.feed(&buffer[..len]) {
            match Message::decode(&frame) {
                Ok(Some(message)) => {
                    if inbound.send(message).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Dropping control frame {:?}: {}", frame, e),
            }
        }
    }
}
