use clap::Parser;
use client::network::{Client, ClientCommand, ClientEvent, ConnectParams};
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Screen name to register with
    #[arg(short = 'n', long)]
    screen_name: String,

    /// Membership server address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Membership server port
    #[arg(short, long, default_value = "8080")]
    port: String,
}

fn print_event(event: ClientEvent) {
    match event {
        ClientEvent::MessageReceived { screen_name, text } => println!("{}: {}", screen_name, text),
        ClientEvent::Info(text) => println!("* {}", text),
        ClientEvent::Error(text) => eprintln!("! {}", text),
        ClientEvent::MembersChanged(members) => {
            let names: Vec<&str> = members.iter().map(|m| m.screen_name()).collect();
            println!("* Members: {}", names.join(", "));
        }
        ClientEvent::StatusChanged(status) => info!("Status: {:?}", status),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let params = ConnectParams::new(&args.screen_name, &args.host, &args.port)?;

    info!("Starting client...");
    println!("Type to chat. /disconnect, /connect and /quit control the session.");

    let (commands, commands_rx) = mpsc::unbounded_channel();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let client = Client::new(commands_rx, events_tx)?;
    let client_task = tokio::spawn(client.run());

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(event);
        }
    });

    commands.send(ClientCommand::Connect(params.clone()))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match line.trim() {
            "/quit" => break,
            "/disconnect" => ClientCommand::Disconnect,
            "/connect" => ClientCommand::Connect(params.clone()),
            "" => continue,
            _ => ClientCommand::SendMessage(line),
        };
        if commands.send(command).is_err() {
            break;
        }
    }

    let _ = commands.send(ClientCommand::Stop);
    client_task.await?;
    printer.await?;

    Ok(())
}
