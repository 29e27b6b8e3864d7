//! Connectionless broadcast endpoint running on its own reactor
//!
//! The UDP socket and the list of peers it fans out to live on a dedicated thread with a
//! single-threaded tokio runtime. Nothing outside that thread touches them: other reactors
//! hold a [`BroadcastHandle`] and submit [`BroadcastRequest`]s over a channel. Requests that
//! need an answer (open, close) carry a oneshot sender for the result.
//!
//! Sends are fire-and-forget. A datagram that cannot be delivered is logged and dropped.
//! Datagrams received on the endpoint are split into frames, decoded, and forwarded to the
//! inbound channel given at spawn time.

use crate::error::BroadcastError;
use crate::member::{Member, Roster};
use crate::message::Message;
use log::{debug, info, warn};
use std::future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};

/// Large enough for any chat line a peer is likely to send in one datagram
const DATAGRAM_BUFFER_SIZE: usize = 8192;

/// Work submitted to the broadcast reactor
#[derive(Debug)]
pub enum BroadcastRequest {
    /// Bind the socket on `host` with an OS-chosen port and report the local address
    Open {
        host: IpAddr,
        reply: oneshot::Sender<io::Result<SocketAddr>>,
    },
    /// Replace the peer list
    SetPeers(Vec<Member>),
    /// Add a peer unless one with the same screen name is known
    AddPeer(Member),
    /// Forget the peer with this screen name
    RemovePeer(String),
    /// Send to an explicit set of members
    SendTo {
        message: Message,
        peers: Vec<Member>,
    },
    /// Send to every known peer except the one named by `exclude`
    Fanout {
        message: Message,
        exclude: Option<String>,
    },
    /// Close the socket; the reply fires once it has been dropped
    Close { reply: oneshot::Sender<()> },
}

/// Sending side of a broadcast reactor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BroadcastHandle {
    requests: mpsc::UnboundedSender<BroadcastRequest>,
}

impl BroadcastHandle {
    fn submit(&self, request: BroadcastRequest) -> Result<(), BroadcastError> {
        self.requests
            .send(request)
            .map_err(|_| BroadcastError::ReactorGone)
    }

    /// Schedules an open and returns the pending result without waiting for it
    ///
    /// Dropping the receiver discards the result; the socket still opens on the
    /// reactor and stays open until a later [`BroadcastHandle::close`].
    pub fn request_open(
        &self,
        host: IpAddr,
    ) -> Result<oneshot::Receiver<io::Result<SocketAddr>>, BroadcastError> {
        let (reply, pending) = oneshot::channel();
        self.submit(BroadcastRequest::Open { host, reply })?;
        Ok(pending)
    }

    /// Opens the endpoint and waits for its local address
    pub async fn open(&self, host: IpAddr) -> Result<SocketAddr, BroadcastError> {
        let pending = self.request_open(host)?;
        let local_addr = pending.await.map_err(|_| BroadcastError::ReactorGone)??;
        Ok(local_addr)
    }

    /// Closes the endpoint and waits until the socket is gone
    pub async fn close(&self) -> Result<(), BroadcastError> {
        let (reply, closed) = oneshot::channel();
        self.submit(BroadcastRequest::Close { reply })?;
        closed.await.map_err(|_| BroadcastError::ReactorGone)
    }

    pub fn set_peers(&self, peers: Vec<Member>) -> Result<(), BroadcastError> {
        self.submit(BroadcastRequest::SetPeers(peers))
    }

    pub fn add_peer(&self, peer: Member) -> Result<(), BroadcastError> {
        self.submit(BroadcastRequest::AddPeer(peer))
    }

    pub fn remove_peer(&self, screen_name: impl Into<String>) -> Result<(), BroadcastError> {
        self.submit(BroadcastRequest::RemovePeer(screen_name.into()))
    }

    pub fn send_to(&self, message: Message, peers: Vec<Member>) -> Result<(), BroadcastError> {
        self.submit(BroadcastRequest::SendTo { message, peers })
    }

    pub fn fanout(&self, message: Message, exclude: Option<String>) -> Result<(), BroadcastError> {
        self.submit(BroadcastRequest::Fanout { message, exclude })
    }
}

/// Spawns broadcast reactors
pub struct BroadcastReactor;

impl BroadcastReactor {
    /// Starts a reactor thread and returns the handle used to drive it
    ///
    /// The thread runs until every handle has been dropped. Decoded datagrams go to
    /// `inbound` when one is given and are discarded otherwise.
    pub fn spawn(
        name: &str,
        inbound: Option<mpsc::UnboundedSender<Message>>,
    ) -> io::Result<BroadcastHandle> {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let endpoint = Endpoint {
                    requests: requests_rx,
                    socket: None,
                    peers: Roster::new(),
                    inbound,
                };
                runtime.block_on(endpoint.run());
                debug!("Broadcast reactor stopped");
            })?;

        Ok(BroadcastHandle {
            requests: requests_tx,
        })
    }
}

enum Event {
    Request(Option<BroadcastRequest>),
    Datagram(io::Result<(usize, SocketAddr)>),
}

/// State owned by the reactor thread
struct Endpoint {
    requests: mpsc::UnboundedReceiver<BroadcastRequest>,
    socket: Option<UdpSocket>,
    peers: Roster,
    inbound: Option<mpsc::UnboundedSender<Message>>,
}

impl Endpoint {
    async fn run(mut self) {
        let mut buffer = vec![0u8; DATAGRAM_BUFFER_SIZE];

        loop {
            let event = tokio::select! {
                request = self.requests.recv() => Event::Request(request),
                result = recv_datagram(self.socket.as_ref(), &mut buffer) => Event::Datagram(result),
            };

            match event {
                Event::Request(Some(request)) => self.handle_request(request).await,
                Event::Request(None) => break,
                Event::Datagram(Ok((len, from))) => self.handle_datagram(&buffer[..len], from),
                // ICMP errors from earlier sends surface here on some platforms
                Event::Datagram(Err(e)) => debug!("Datagram receive error: {}", e),
            }
        }

        if self.socket.take().is_some() {
            info!("Closed broadcast endpoint");
        }
    }

    async fn handle_request(&mut self, request: BroadcastRequest) {
        match request {
            BroadcastRequest::Open { host, reply } => {
                let result = self.open(host).await;
                if reply.send(result).is_err() {
                    debug!("Open result discarded by requester");
                }
            }
            BroadcastRequest::SetPeers(peers) => {
                debug!("Resetting broadcast peer list to {} members", peers.len());
                self.peers.replace(peers);
            }
            BroadcastRequest::AddPeer(peer) => {
                if self.peers.insert(peer.clone()) {
                    debug!("Added {} to broadcast peer list", peer.screen_name());
                }
            }
            BroadcastRequest::RemovePeer(screen_name) => {
                if self.peers.remove(&screen_name).is_some() {
                    debug!("Removed {} from broadcast peer list", screen_name);
                }
            }
            BroadcastRequest::SendTo { message, peers } => {
                self.send(&message, peers.iter()).await;
            }
            BroadcastRequest::Fanout { message, exclude } => {
                let targets: Vec<Member> = self
                    .peers
                    .iter()
                    .filter(|peer| Some(peer.screen_name()) != exclude.as_deref())
                    .cloned()
                    .collect();
                self.send(&message, targets.iter()).await;
            }
            BroadcastRequest::Close { reply } => {
                if self.socket.take().is_some() {
                    info!("Closed broadcast endpoint");
                }
                let _ = reply.send(());
            }
        }
    }

    async fn open(&mut self, host: IpAddr) -> io::Result<SocketAddr> {
        if let Some(socket) = &self.socket {
            warn!("Broadcast endpoint already open");
            return socket.local_addr();
        }

        let socket = UdpSocket::bind(SocketAddr::new(host, 0)).await?;
        let local_addr = socket.local_addr()?;
        info!("Broadcast endpoint listening on {}", local_addr);
        self.socket = Some(socket);
        Ok(local_addr)
    }

    async fn send<'a>(&self, message: &Message, peers: impl Iterator<Item = &'a Member>) {
        let Some(socket) = &self.socket else {
            debug!("Dropping {} while broadcast endpoint is closed", message.verb());
            return;
        };

        let data = message.encode();
        for peer in peers {
            let target = (peer.address(), peer.port());
            if let Err(e) = socket.send_to(data.as_bytes(), target).await {
                debug!(
                    "Failed to send {} to {} at {}:{}: {}",
                    message.verb(),
                    peer.screen_name(),
                    peer.address(),
                    peer.port(),
                    e
                );
            }
        }
    }

    fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        let text = String::from_utf8_lossy(data);
        for frame in text.split('\n') {
            match Message::decode(frame) {
                Ok(Some(message)) => {
                    debug!("Received {} from {}", message.verb(), from);
                    if let Some(inbound) = &self.inbound {
                        if inbound.send(message).is_err() {
                            debug!("Inbound datagram receiver dropped");
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Dropping datagram frame from {}: {}", from, e),
            }
        }
    }
}

async fn recv_datagram(
    socket: Option<&UdpSocket>,
    buffer: &mut [u8],
) -> io::Result<(usize, SocketAddr)> {
    match socket {
        Some(socket) => socket.recv_from(buffer).await,
        None => future::pending().await,
    }
}
