use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use meshroom::config::{Cli, ClientConfig, Command, JoinArgs};
use meshroom::logging::init_logging;
use meshroom::media::{CaptureDevices, HeadlessDevices};
use meshroom::mesh::RtcNegotiator;
use meshroom::signaling::SignalingClient;
use meshroom::{server, ClientSession, Control, SessionEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Serve(args) => server::serve(args.into()).await,
        Command::Join(args) => join(args).await,
    }
}

async fn join(args: JoinArgs) -> anyhow::Result<()> {
    let config = ClientConfig::from(&args);
    let signaling = SignalingClient::connect(&config.signaling_url)
        .await
        .with_context(|| format!("connecting to {}", config.signaling_url))?;
    let (outbound, inbound) = signaling.into_parts();

    let negotiator = Arc::new(RtcNegotiator::new(config.ice_servers.clone(), outbound.clone())?);
    let (mesh_tx, mesh_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::channel(16);

    let mut session = ClientSession::new(&config, negotiator, mesh_tx, outbound, event_tx);
    session
        .join(capture_devices(&args))
        .await
        .context("joining the room")?;
    println!("joined {} as {}", config.room_id, config.peer_id);

    tokio::spawn(print_events(event_rx));
    tokio::spawn(read_commands(control_tx.clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = control_tx.send(Control::Leave).await;
        }
    });

    session.run(inbound, mesh_rx, control_rx).await?;
    Ok(())
}

fn capture_devices(args: &JoinArgs) -> Arc<dyn CaptureDevices> {
    #[cfg(feature = "native-audio")]
    {
        if args.native_audio {
            return Arc::new(meshroom::media::CpalDevices::new());
        }
    }
    Arc::new(HeadlessDevices::new(!args.no_audio, !args.no_video))
}

fn parse_command(line: &str) -> Option<Control> {
    match line.trim() {
        "" => None,
        "/mute" => Some(Control::ToggleMute),
        "/camera" => Some(Control::ToggleCamera),
        "/share" => Some(Control::ToggleScreenShare),
        "/leave" => Some(Control::Leave),
        text => Some(Control::Chat(text.to_string())),
    }
}

async fn read_commands(controls: mpsc::Sender<Control>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let control = match lines.next_line().await {
            Ok(Some(line)) => match parse_command(&line) {
                Some(control) => control,
                None => continue,
            },
            Ok(None) => Control::Leave,
            Err(err) => {
                tracing::warn!("stdin: {}", err);
                Control::Leave
            }
        };
        let leaving = control == Control::Leave;
        if controls.send(control).await.is_err() || leaving {
            return;
        }
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Joined { room_id } => println!("* in room {}", room_id),
            SessionEvent::PeerJoined { peer_id, name } => println!("* {} joined ({})", name, peer_id),
            SessionEvent::PeerLeft { peer_id } => println!("* {} left", peer_id),
            SessionEvent::Chat { name, text } => println!("{}: {}", name, text),
            SessionEvent::ConnectionState { peer_id, state } => println!("* {} is {}", peer_id, state),
            SessionEvent::AudioEnabled(on) => println!("* microphone {}", if on { "on" } else { "muted" }),
            SessionEvent::VideoEnabled(on) => println!("* camera {}", if on { "on" } else { "off" }),
            SessionEvent::ScreenShare(on) => {
                println!("* screen share {}", if on { "started" } else { "stopped" })
            }
            SessionEvent::Error(message) => eprintln!("! {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_commands() {
        assert_eq!(parse_command("/mute"), Some(Control::ToggleMute));
        assert_eq!(parse_command(" /share "), Some(Control::ToggleScreenShare));
        assert_eq!(parse_command("   "), None);
        assert_eq!(
            parse_command("hello there"),
            Some(Control::Chat("hello there".to_string()))
        );
    }
}
