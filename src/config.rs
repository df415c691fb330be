use crate::identity::DEFAULT_NAME;
use crate::types::{PeerId, RoomId};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Parser)]
#[command(name = "meshroom", about = "Multi-party rooms for audio, video and chat")]
pub struct Cli {
    #[arg(short = 'l', long = "log", help = "Log Level", default_value = "info", global = true)]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the room signaling server
    Serve(ServeArgs),
    /// Join a room as a headless participant, commands read from stdin
    Join(JoinArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, env = "MESHROOM_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,
    #[arg(long, help = "JSON file mapping identity tokens to display names")]
    pub directory: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_NAME)]
    pub default_name: String,
    #[arg(long, default_value_t = 500)]
    pub name_lookup_timeout_ms: u64,
}

#[derive(Debug, Args)]
pub struct JoinArgs {
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    pub url: String,
    #[arg(long)]
    pub room: String,
    #[arg(long)]
    pub peer_id: Option<String>,
    #[arg(long)]
    pub identity_token: Option<String>,
    #[arg(long)]
    pub no_audio: bool,
    #[arg(long)]
    pub no_video: bool,
    #[arg(long = "ice-server", default_value = DEFAULT_STUN_SERVER)]
    pub ice_servers: Vec<String>,
    #[cfg(feature = "native-audio")]
    #[arg(long, help = "Capture from the host's audio devices")]
    pub native_audio: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub directory_path: Option<PathBuf>,
    pub default_name: String,
    pub name_lookup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            directory_path: None,
            default_name: DEFAULT_NAME.to_string(),
            name_lookup_timeout: Duration::from_millis(500),
        }
    }
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            bind: args.bind,
            directory_path: args.directory,
            default_name: args.default_name,
            name_lookup_timeout: Duration::from_millis(args.name_lookup_timeout_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub signaling_url: String,
    pub room_id: RoomId,
    pub peer_id: PeerId,
    pub identity_token: Option<String>,
    pub ice_servers: Vec<String>,
}

impl From<&JoinArgs> for ClientConfig {
    fn from(args: &JoinArgs) -> Self {
        Self {
            signaling_url: args.url.clone(),
            room_id: RoomId::new(args.room.clone()),
            peer_id: args
                .peer_id
                .clone()
                .map(PeerId::new)
                .unwrap_or_else(PeerId::random),
            identity_token: args.identity_token.clone(),
            ice_servers: args.ice_servers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["meshroom", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = ServerConfig::from(args);
        assert_eq!(config.default_name, DEFAULT_NAME);
        assert_eq!(config.name_lookup_timeout, Duration::from_millis(500));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn join_generates_peer_id_when_absent() {
        let cli = Cli::try_parse_from(["meshroom", "--log", "debug", "join", "--room", "abc"]).unwrap();
        let Command::Join(args) = cli.command else {
            panic!("expected join");
        };
        let config = ClientConfig::from(&args);
        assert_eq!(config.room_id, RoomId::from("abc"));
        assert!(config.peer_id.as_str().starts_with("user-"));
        assert_eq!(config.ice_servers, vec![DEFAULT_STUN_SERVER.to_string()]);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn join_requires_room() {
        assert!(Cli::try_parse_from(["meshroom", "join"]).is_err());
    }
}
