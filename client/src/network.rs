//! Client coordinator: drives the control stream and the broadcast reactor together
//!
//! The control stream runs on the caller's runtime; the broadcast endpoint lives on its own
//! reactor thread and is only reached through a [`BroadcastHandle`]. The coordinator keeps
//! the two in step:
//!
//! - the control stream is connected before the endpoint is opened, because the endpoint
//!   binds to the control stream's local host and its port goes out in HELO
//! - a failed connect never opens the endpoint
//! - a disconnect while the open is still pending discards the open
//! - after EXIT the endpoint is closed only once the server's acknowledgement arrives

use crate::control::ControlConnection;
use crate::mirror::{ClientMirror, MirrorEvent};
use log::{debug, error, info, warn};
use shared::{
    validate_port, validate_screen_name, BroadcastHandle, BroadcastReactor, Member, Message,
    ValidationError,
};
use std::future;
use std::io;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};

/// Validated parameters for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    screen_name: String,
    host: String,
    port: u16,
}

impl ConnectParams {
    /// Trims every field, then checks the screen name and port
    pub fn new(screen_name: &str, host: &str, port: &str) -> Result<Self, ValidationError> {
        let screen_name = screen_name.trim();
        validate_screen_name(screen_name)?;
        let port = validate_port(port.trim())?;

        Ok(ConnectParams {
            screen_name: screen_name.to_string(),
            host: host.trim().to_string(),
            port,
        })
    }

    pub fn screen_name(&self) -> &str {
        &self.screen_name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Notifications for the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    StatusChanged(ClientStatus),
    MembersChanged(Vec<Member>),
    MessageReceived { screen_name: String, text: String },
    Info(String),
    Error(String),
}

/// Requests from the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Connect(ConnectParams),
    Disconnect,
    SendMessage(String),
    /// Disconnect, then end [`Client::run`]
    Stop,
}

enum Event {
    Command(Option<ClientCommand>),
    Control(Option<Message>),
    Datagram(Option<Message>),
}

enum OpenEvent {
    Opened(Result<io::Result<SocketAddr>, oneshot::error::RecvError>),
    Command(Option<ClientCommand>),
}

pub struct Client {
    broadcast: BroadcastHandle,
    datagrams: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<ClientEvent>,
    commands: Option<mpsc::UnboundedReceiver<ClientCommand>>,

    status: ClientStatus,
    control: Option<ControlConnection>,
    mirror: Option<ClientMirror>,
    awaiting_exit_ack: bool,
    stopping: bool,
}

impl Client {
    /// Starts the broadcast reactor. Nothing is connected until a
    /// [`ClientCommand::Connect`] arrives.
    pub fn new(
        commands: mpsc::UnboundedReceiver<ClientCommand>,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> io::Result<Self> {
        let (datagram_tx, datagrams) = mpsc::unbounded_channel();
        let broadcast = BroadcastReactor::spawn("client-broadcast", Some(datagram_tx))?;

        Ok(Client {
            broadcast,
            datagrams,
            events,
            commands: Some(commands),
            status: ClientStatus::Disconnected,
            control: None,
            mirror: None,
            awaiting_exit_ack: false,
            stopping: false,
        })
    }

    /// Processes commands, control messages and datagrams until stopped
    ///
    /// Stops after a [`ClientCommand::Stop`] or once the command channel closes, in both
    /// cases after disconnecting. Dropping the client shuts the broadcast reactor down.
    pub async fn run(mut self) {
        info!("Client started");

        loop {
            let event = tokio::select! {
                command = next_command(self.commands.as_mut()) => Event::Command(command),
                message = next_control(self.control.as_mut()) => Event::Control(message),
                datagram = self.datagrams.recv() => Event::Datagram(datagram),
            };

            match event {
                Event::Command(Some(command)) => self.handle_command(command).await,
                Event::Command(None) => {
                    debug!("Command channel closed");
                    self.commands = None;
                    self.stop().await;
                }
                Event::Control(Some(message)) => match message {
                    Message::Acpt(_) | Message::Rjct { .. } => self.handle_message(message).await,
                    other => warn!("Unexpected {} on control stream. Ignoring.", other.verb()),
                },
                Event::Control(None) => {
                    if !self.awaiting_exit_ack {
                        warn!("Server closed the control stream");
                        self.emit(ClientEvent::Error("Server closed the connection".into()));
                    }
                    self.teardown().await;
                }
                // Anyone can send a datagram; only peer traffic is accepted here
                Event::Datagram(Some(message)) => match message {
                    Message::Join(_)
                    | Message::Exit {
                        screen_name: Some(_),
                    }
                    | Message::Mesg { .. } => self.handle_message(message).await,
                    other => warn!("Unexpected {} datagram. Ignoring.", other.verb()),
                },
                Event::Datagram(None) => {
                    error!("Broadcast reactor stopped unexpectedly");
                    break;
                }
            }

            if self.stopping && self.status == ClientStatus::Disconnected {
                break;
            }
        }

        info!("Client stopped");
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Connect(params) => self.connect(params).await,
            ClientCommand::Disconnect => self.disconnect().await,
            ClientCommand::SendMessage(text) => self.send_message(text),
            ClientCommand::Stop => self.stop().await,
        }
    }

    async fn connect(&mut self, params: ConnectParams) {
        if self.status != ClientStatus::Disconnected {
            self.emit(ClientEvent::Error("Already connected".into()));
            return;
        }

        self.set_status(ClientStatus::Connecting);
        self.info(format!("Connecting to {}:{}", params.host(), params.port()));

        let mut control = match ControlConnection::connect(params.host(), params.port()).await {
            Ok(control) => control,
            Err(e) => {
                error!("{}", e);
                self.emit(ClientEvent::Error(e.to_string()));
                self.set_status(ClientStatus::Disconnected);
                return;
            }
        };

        let local_addr = match self.open_broadcast(&control).await {
            Some(addr) => addr,
            None => {
                control.disconnect().await;
                if let Err(e) = self.broadcast.close().await {
                    warn!("Failed to close broadcast endpoint: {}", e);
                }
                self.set_status(ClientStatus::Disconnected);
                return;
            }
        };

        let helo = Member::new(
            params.screen_name(),
            local_addr.ip().to_string(),
            local_addr.port(),
        )
        .map(Message::Helo);
        let sent = match helo {
            Ok(helo) => control.send(&helo).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        self.control = Some(control);
        self.mirror = Some(ClientMirror::new(params.screen_name()));

        if let Err(e) = sent {
            error!("Failed to register: {}", e);
            self.emit(ClientEvent::Error(e));
            self.teardown().await;
        }
    }

    /// Opens the endpoint on the control stream's local host, still serving commands
    /// while the reactor works. Returns `None` if the open failed or was cancelled.
    async fn open_broadcast(&mut self, control: &ControlConnection) -> Option<SocketAddr> {
        let mut pending = match self.broadcast.request_open(control.local_addr().ip()) {
            Ok(pending) => pending,
            Err(e) => {
                self.emit(ClientEvent::Error(e.to_string()));
                return None;
            }
        };

        loop {
            // Queued commands win over the open, so a pending disconnect discards it
            let event = tokio::select! {
                biased;
                command = next_command(self.commands.as_mut()) => OpenEvent::Command(command),
                result = &mut pending => OpenEvent::Opened(result),
            };

            match event {
                OpenEvent::Opened(Ok(Ok(addr))) => return Some(addr),
                OpenEvent::Opened(Ok(Err(e))) => {
                    error!("Failed to open broadcast endpoint: {}", e);
                    self.emit(ClientEvent::Error(format!(
                        "Failed to open broadcast endpoint: {}",
                        e
                    )));
                    return None;
                }
                OpenEvent::Opened(Err(_)) => {
                    self.emit(ClientEvent::Error("Broadcast reactor stopped".into()));
                    return None;
                }
                OpenEvent::Command(Some(ClientCommand::Disconnect)) => {
                    self.info("Connection cancelled".to_string());
                    return None;
                }
                OpenEvent::Command(Some(ClientCommand::Stop)) => {
                    self.stopping = true;
                    self.info("Connection cancelled".to_string());
                    return None;
                }
                OpenEvent::Command(None) => {
                    self.commands = None;
                    self.stopping = true;
                    return None;
                }
                OpenEvent::Command(Some(ClientCommand::Connect(_))) => {
                    self.emit(ClientEvent::Error("Already connected".into()));
                }
                OpenEvent::Command(Some(ClientCommand::SendMessage(_))) => {
                    warn!("Not connected. Dropping message.");
                }
            }
        }
    }

    async fn handle_message(&mut self, message: Message) {
        let Some(mirror) = self.mirror.as_mut() else {
            debug!("Ignoring {} while disconnected", message.verb());
            return;
        };

        match mirror.apply(message) {
            MirrorEvent::RosterReplaced(members) => {
                self.update_peers(|broadcast| broadcast.set_peers(members.clone()));
                self.emit(ClientEvent::MembersChanged(members));
                if self.status == ClientStatus::Connecting {
                    self.set_status(ClientStatus::Connected);
                    self.info("Connected".to_string());
                }
            }
            MirrorEvent::MemberJoined(member) => {
                let name = member.screen_name().to_string();
                self.update_peers(|broadcast| broadcast.add_peer(member));
                self.info(format!("{} has entered the chat", name));
                self.emit_members();
            }
            MirrorEvent::MemberLeft(name) => {
                self.update_peers(|broadcast| broadcast.remove_peer(name.as_str()));
                self.info(format!("{} has left", name));
                self.emit_members();
            }
            MirrorEvent::ExitAcknowledged => {
                if self.awaiting_exit_ack {
                    debug!("EXIT acknowledged");
                    self.teardown().await;
                } else {
                    debug!("Unexpected EXIT for own screen name. Ignoring.");
                }
            }
            MirrorEvent::Rejected(name) => {
                warn!("Server rejected screen name {}", name);
                self.emit(ClientEvent::Error(format!(
                    "Screen name {} is already in use",
                    name
                )));
                self.teardown().await;
            }
            MirrorEvent::MessageReceived { screen_name, text } => {
                self.emit(ClientEvent::MessageReceived { screen_name, text });
            }
            MirrorEvent::Ignored => {}
        }
    }

    fn send_message(&mut self, text: String) {
        if self.status != ClientStatus::Connected {
            warn!("Not connected. Dropping message.");
            return;
        }
        if text.contains('\n') {
            warn!("Message contains a line break. Dropping message.");
            return;
        }
        let Some(mirror) = &self.mirror else {
            return;
        };

        let screen_name = mirror.screen_name().to_string();
        self.emit(ClientEvent::MessageReceived {
            screen_name: screen_name.clone(),
            text: text.clone(),
        });

        let message = Message::Mesg {
            screen_name: screen_name.clone(),
            text,
        };
        if let Err(e) = self.broadcast.fanout(message, Some(screen_name)) {
            error!("Failed to send message: {}", e);
        }
    }

    /// Sends EXIT when registered; otherwise tears down straight away
    async fn disconnect(&mut self) {
        match self.status {
            ClientStatus::Disconnected => debug!("Already disconnected"),
            ClientStatus::Connecting => self.teardown().await,
            ClientStatus::Connected => {
                if self.awaiting_exit_ack {
                    return;
                }
                let Some(control) = self.control.as_mut() else {
                    self.teardown().await;
                    return;
                };
                match control.send(&Message::Exit { screen_name: None }).await {
                    Ok(()) => {
                        self.awaiting_exit_ack = true;
                        self.info("Disconnecting".to_string());
                    }
                    Err(e) => {
                        warn!("Failed to send EXIT: {}", e);
                        self.teardown().await;
                    }
                }
            }
        }
    }

    async fn stop(&mut self) {
        self.stopping = true;
        self.disconnect().await;
    }

    /// Closes the control stream, then the broadcast endpoint, and clears the roster
    async fn teardown(&mut self) {
        self.awaiting_exit_ack = false;

        if let Some(control) = self.control.take() {
            control.disconnect().await;
        }
        if let Err(e) = self.broadcast.close().await {
            warn!("Failed to close broadcast endpoint: {}", e);
        }

        if self.mirror.take().is_some() {
            self.emit(ClientEvent::MembersChanged(Vec::new()));
        }
        if self.status != ClientStatus::Disconnected {
            self.set_status(ClientStatus::Disconnected);
            self.info("Disconnected".to_string());
        }
    }

    fn update_peers<F>(&self, request: F)
    where
        F: FnOnce(&BroadcastHandle) -> Result<(), shared::BroadcastError>,
    {
        if let Err(e) = request(&self.broadcast) {
            error!("Failed to update broadcast peers: {}", e);
        }
    }

    fn set_status(&mut self, status: ClientStatus) {
        if self.status != status {
            debug!("Status {:?} -> {:?}", self.status, status);
            self.status = status;
            self.emit(ClientEvent::StatusChanged(status));
        }
    }

    fn emit_members(&self) {
        if let Some(mirror) = &self.mirror {
            self.emit(ClientEvent::MembersChanged(mirror.members()));
        }
    }

    fn info(&self, text: String) {
        info!("{}", text);
        self.emit(ClientEvent::Info(text));
    }

    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

async fn next_command(
    commands: Option<&mut mpsc::UnboundedReceiver<ClientCommand>>,
) -> Option<ClientCommand> {
    match commands {
        Some(commands) => commands.recv().await,
        None => future::pending().await,
    }
}

async fn next_control(control: Option<&mut ControlConnection>) -> Option<Message> {
    match control {
        Some(control) => control.next_message().await,
        None => future::pending().await,
    }
}
