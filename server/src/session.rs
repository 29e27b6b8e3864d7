//! Per-connection control session task

use crate::network::ServerMessage;
use crate::registry::SessionId;
use log::{debug, info, warn};
use shared::{FrameReassembler, Message};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const READ_BUFFER_SIZE: usize = 2048;

/// Instructions from the server loop to one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Write a message to the peer
    Send(Message),
    /// Close the stream
    Close,
}

/// Drives one control stream until it closes
///
/// Incoming bytes are reassembled into frames and decoded. Every decoded message is
/// forwarded to the server loop; empty and malformed frames are dropped here. Commands
/// from the server loop are written in the order they were sent. The stream is owned by
/// this task and dropped exactly once when the loop ends, after which the server loop is
/// told the session closed.
pub async fn run_session<S>(
    session_id: SessionId,
    stream: S,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) where
    S: AsyncRead + AsyncWrite,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut reassembler = FrameReassembler::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            result = reader.read(&mut buffer) => match result {
                Ok(0) => {
                    info!("Session {} closed by peer", session_id);
                    break;
                }
                Ok(len) => {
                    for frame in reassembler.feed(&buffer[..len]) {
                        match Message::decode(&frame) {
                            Ok(Some(message)) => {
                                debug!("Session {} sent {}", session_id, message.verb());
                                let _ = server_tx.send(ServerMessage::FrameReceived { session_id, message });
                            }
                            Ok(None) => {}
                            Err(e) => debug!("Session {} dropped frame {:?}: {}", session_id, frame, e),
                        }
                    }
                }
                Err(e) => {
                    warn!("Session {} read error: {}", session_id, e);
                    break;
                }
            },

            command = commands.recv() => match command {
                Some(SessionCommand::Send(message)) => {
                    let data = message.encode();
                    let written = async {
                        writer.write_all(data.as_bytes()).await?;
                        writer.flush().await
                    };
                    if let Err(e) = written.await {
                        warn!("Session {} write error: {}", session_id, e);
                        break;
                    }
                }
                Some(SessionCommand::Close) | None => {
                    debug!("Closing session {}", session_id);
                    break;
                }
            },
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Session {} shutdown error: {}", session_id, e);
    }
    drop(writer);
    drop(reader);

    let _ = server_tx.send(ServerMessage::SessionClosed { session_id });
}
