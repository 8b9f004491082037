//! RoverLink client: entry point.
//!
//! Connects to a rover server, completes the hello → list → connect
//! handshake, opens the video stream for the bound rover, and then drives the
//! rover from console commands typed on stdin.
//!
//! # Usage
//!
//! ```text
//! rover-client [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>        Config file [default: platform config dir]
//!       --host <HOST>          Rover server host
//!       --control-port <PORT>  Control link port
//!       --stream-port <PORT>   Stream link port
//!       --subprotocol <NAME>   WebSocket sub-protocol offered on both links
//!       --rover <ID>           Rover id to bind instead of the first offered
//!       --no-auto-select       Wait for `select <n>` instead of binding
//!       --speed <0..1>         Initial wheel speed
//!       --repeat-ms <MS>       Refresh period for held movement
//!       --record <PATH>        Record the raw video stream to a file
//!       --log-level <LEVEL>    Log level when RUST_LOG is unset
//!       --save-config          Write the effective config to the config file and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable             | Description             |
//! |----------------------|-------------------------|
//! | `ROVER_HOST`         | Rover server host       |
//! | `ROVER_CONTROL_PORT` | Control link port       |
//! | `ROVER_STREAM_PORT`  | Stream link port        |
//! | `RUST_LOG`           | `tracing` filter        |
//!
//! Command-line values win over the environment, which wins over the config
//! file.
//!
//! # Runtime shape
//!
//! ```text
//!  control link events ─┐
//!  stdin console lines ─┤
//!  refresh ticker ──────┼──► main loop ──► RoverController
//!  stream requests ─────┤                     │ bound
//!  Ctrl+C ──────────────┘                     ▼
//!                                  spawned stream task ──► VideoSink
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use rover_client::application::bindings::KeyBindings;
use rover_client::application::controller::RoverController;
use rover_client::application::handshake::{
    CommandOutcome, HandshakeSession, HandshakeState, SessionEvent, SessionOptions,
};
use rover_client::application::stream_binder::VideoSink;
use rover_client::infrastructure::console::{ConsoleCommand, ConsoleReply};
use rover_client::infrastructure::link;
use rover_client::infrastructure::storage::{
    load_config, load_config_from, save_config, save_config_to, ClientConfig, ConfigError,
};
use rover_client::infrastructure::stream::{run_stream_binding, ChannelLauncher, StreamRequest};
use rover_client::infrastructure::video_sink::{DiscardSink, FileRecorderSink};
use rover_core::SessionIdentity;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// RoverLink remote-operation client.
///
/// Every option left unset keeps the value from the config file.
#[derive(Debug, Parser)]
#[command(
    name = "rover-client",
    about = "Remote-operation client for RoverLink rovers",
    version
)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Hostname or IP address of the rover server.
    #[arg(long, env = "ROVER_HOST")]
    host: Option<String>,

    /// WebSocket port of the control link.
    #[arg(long, env = "ROVER_CONTROL_PORT")]
    control_port: Option<u16>,

    /// WebSocket port of the stream link.
    #[arg(long, env = "ROVER_STREAM_PORT")]
    stream_port: Option<u16>,

    /// WebSocket sub-protocol offered on both links.
    #[arg(long)]
    subprotocol: Option<String>,

    /// Rover id to bind instead of the first rover offered.
    #[arg(long)]
    rover: Option<String>,

    /// Do not bind automatically; wait for `select <n>` on stdin.
    #[arg(long)]
    no_auto_select: bool,

    /// Wheel speed sent once bound, in `[0, 1]`.
    #[arg(long)]
    speed: Option<f64>,

    /// Refresh period for held movement in milliseconds.
    #[arg(long)]
    repeat_ms: Option<u64>,

    /// Record the raw video stream to this file instead of discarding it.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long)]
    log_level: Option<String>,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    /// Applies the command-line overrides on top of `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `--speed` is outside `[0, 1]` or `--host` is empty.
    fn into_client_config(self, mut base: ClientConfig) -> anyhow::Result<ClientConfig> {
        if let Some(host) = self.host {
            if host.trim().is_empty() {
                bail!("--host must not be empty");
            }
            base.server.host = host;
        }
        if let Some(port) = self.control_port {
            base.server.control_port = port;
        }
        if let Some(port) = self.stream_port {
            base.server.stream_port = port;
        }
        if self.subprotocol.is_some() {
            base.server.subprotocol = self.subprotocol;
        }
        if self.rover.is_some() {
            base.session.preferred_rover = self.rover;
        }
        if self.no_auto_select {
            base.session.auto_select = false;
        }
        if let Some(speed) = self.speed {
            if !(0.0..=1.0).contains(&speed) {
                bail!("--speed must be within [0, 1], got {speed}");
            }
            base.motion.initial_speed = speed;
        }
        if let Some(ms) = self.repeat_ms {
            base.motion.repeat_interval_ms = ms;
        }
        if let Some(level) = self.log_level {
            base.logging.log_level = level;
        }
        Ok(base)
    }
}

/// Loads the explicit config file, or the platform one when there is none.
fn load_base_config(explicit: Option<&Path>) -> anyhow::Result<ClientConfig> {
    match explicit {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => match load_config() {
            Err(ConfigError::NoPlatformConfigDir) => Ok(ClientConfig::default()),
            other => other.context("failed to load config"),
        },
    }
}

/// Writes `config` to the explicit file, or the platform one when there is none.
fn save_effective_config(config: &ClientConfig, explicit: Option<&Path>) -> anyhow::Result<()> {
    match explicit {
        Some(path) => save_config_to(config, path)
            .with_context(|| format!("failed to save config {}", path.display())),
        None => save_config(config).context("failed to save config"),
    }
}

fn key_bindings(config: &ClientConfig) -> anyhow::Result<KeyBindings> {
    let overrides = config
        .motion
        .keys
        .iter()
        .map(|(key, name)| (key.as_str(), name.as_str()));
    KeyBindings::with_overrides(overrides).context("invalid [motion.keys] table")
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let record = cli.record.clone();
    let explicit = cli.config.clone();
    let save = cli.save_config;
    let base = load_base_config(explicit.as_deref())?;
    let config = cli.into_client_config(base)?;
    let bindings = key_bindings(&config)?;

    if save {
        save_effective_config(&config, explicit.as_deref())?;
        println!("configuration saved");
        return Ok(());
    }

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    info!(
        "RoverLink client starting, control={}, stream={}",
        config.server.control_url(),
        config.server.stream_url()
    );

    run(config, bindings, record).await?;

    info!("RoverLink client stopped");
    Ok(())
}

/// Runs the controller until the control link closes, `quit`, or Ctrl+C.
async fn run(
    config: ClientConfig,
    bindings: KeyBindings,
    record: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (launcher, mut stream_requests) = ChannelLauncher::new();
    let options = SessionOptions {
        auto_select: config.session.auto_select,
        preferred_rover: config.session.preferred_rover.clone(),
    };
    let session = HandshakeSession::new(SessionIdentity::generate(), options, Box::new(launcher));
    let mut controller = RoverController::new(session, bindings, config.motion.initial_speed);

    let control_url = config.server.control_url();
    let subprotocol = config.server.subprotocol.clone();
    let (control_link, mut control_events) = link::connect(&control_url, subprotocol.as_deref())
        .await
        .with_context(|| format!("failed to open control link {control_url}"))?;
    info!(identity = %controller.session().identity(), "control link open");
    if let Err(e) = controller.start(Box::new(control_link)) {
        warn!("failed to start session: {e}");
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = interval(config.motion.repeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut stream_tasks = Vec::new();

    loop {
        tokio::select! {
            event = control_events.recv() => {
                let Some(event) = event else {
                    info!("control link event channel closed");
                    break;
                };
                match controller.on_link_event(event) {
                    Ok(Some(SessionEvent::Closed)) => {
                        info!("control link closed");
                        break;
                    }
                    Ok(Some(event)) => report_session_event(&controller, &event),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("{e}");
                        if controller.session().current_state() == HandshakeState::Closed {
                            break;
                        }
                    }
                }
            }

            Some(request) = stream_requests.recv() => {
                stream_tasks.push(spawn_stream(&config, record.as_deref(), request));
            }

            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if handle_console_line(&mut controller, &line) == ConsoleReply::Quit {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed; console disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("failed to read stdin: {e}");
                        stdin_open = false;
                    }
                }
            }

            _ = ticker.tick() => {
                if let Err(e) = controller.refresh() {
                    debug!("refresh failed: {e}");
                }
            }

            result = &mut shutdown => {
                match result {
                    Ok(()) => info!("received Ctrl+C, shutting down"),
                    Err(e) => warn!("failed to listen for Ctrl+C: {e}"),
                }
                break;
            }
        }
    }

    controller.close();
    for task in stream_tasks {
        task.abort();
    }
    Ok(())
}

fn spawn_stream(
    config: &ClientConfig,
    record: Option<&Path>,
    request: StreamRequest,
) -> tokio::task::JoinHandle<()> {
    let url = config.server.stream_url();
    let subprotocol = config.server.subprotocol.clone();
    let mut sink: Box<dyn VideoSink> = match record {
        Some(path) => Box::new(FileRecorderSink::new(path)),
        None => Box::new(DiscardSink::new()),
    };
    tokio::spawn(async move {
        let rover_id = request.rover.rover_id.clone();
        match run_stream_binding(&url, subprotocol.as_deref(), request, sink.as_mut()).await {
            Ok(bytes) => info!(bytes, "stream of rover '{rover_id}' ended"),
            Err(e) => warn!("stream of rover '{rover_id}' failed: {e:#}"),
        }
    })
}

/// Parses and applies one console line, printing replies and errors.
fn handle_console_line(controller: &mut RoverController, line: &str) -> ConsoleReply {
    let command = match ConsoleCommand::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return ConsoleReply::Continue(None),
        Err(e) => {
            println!("{e}");
            return ConsoleReply::Continue(None);
        }
    };
    match command.apply(controller) {
        Ok(ConsoleReply::Continue(Some(text))) => {
            println!("{text}");
            ConsoleReply::Continue(None)
        }
        Ok(reply) => reply,
        Err(e) => {
            println!("{e}");
            ConsoleReply::Continue(None)
        }
    }
}

fn report_session_event(controller: &RoverController, event: &SessionEvent) {
    match event {
        SessionEvent::Advanced(HandshakeState::AwaitingSelection) => {
            let count = controller.session().rovers().len();
            info!("{count} rover(s) offered; type `list` and `select <n>`");
        }
        SessionEvent::Advanced(state) => debug!("session advanced to {state}"),
        SessionEvent::Bound(rover) => info!("bound to rover '{}'", rover.display_name()),
        SessionEvent::Refused { command, reason } => {
            warn!("server refused '{command}': {reason}");
        }
        SessionEvent::CommandAnswer {
            id,
            command,
            outcome: CommandOutcome::Failed(reason),
        } => warn!(id, "'{command}' failed: {reason}"),
        SessionEvent::CommandAnswer { id, command, .. } => debug!(id, "'{command}' ok"),
        SessionEvent::Closed => info!("session closed"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_arguments_keeps_file_config() {
        // Arrange
        let cli = Cli::parse_from(["rover-client"]);
        let mut base = ClientConfig::default();
        base.server.host = "from-file".to_string();

        // Act
        let config = cli.into_client_config(base.clone()).unwrap();

        // Assert
        assert_eq!(config, base);
    }

    #[test]
    fn test_cli_host_and_ports_override() {
        let cli = Cli::parse_from([
            "rover-client",
            "--host",
            "rover.local",
            "--control-port",
            "9000",
            "--stream-port",
            "9001",
        ]);
        let config = cli.into_client_config(ClientConfig::default()).unwrap();
        assert_eq!(config.server.control_url(), "ws://rover.local:9000");
        assert_eq!(config.server.stream_url(), "ws://rover.local:9001");
    }

    #[test]
    fn test_cli_selection_overrides() {
        let cli = Cli::parse_from(["rover-client", "--rover", "B", "--no-auto-select"]);
        let config = cli.into_client_config(ClientConfig::default()).unwrap();
        assert_eq!(config.session.preferred_rover.as_deref(), Some("B"));
        assert!(!config.session.auto_select);
    }

    #[test]
    fn test_cli_motion_and_logging_overrides() {
        let cli = Cli::parse_from([
            "rover-client",
            "--speed",
            "0.25",
            "--repeat-ms",
            "200",
            "--log-level",
            "debug",
        ]);
        let config = cli.into_client_config(ClientConfig::default()).unwrap();
        assert_eq!(config.motion.initial_speed, 0.25);
        assert_eq!(config.motion.repeat_interval_ms, 200);
        assert_eq!(config.logging.log_level, "debug");
    }

    #[test]
    fn test_cli_speed_out_of_range_is_error() {
        let cli = Cli::parse_from(["rover-client", "--speed", "1.5"]);
        assert!(cli.into_client_config(ClientConfig::default()).is_err());
    }

    #[test]
    fn test_cli_empty_host_is_error() {
        let cli = Cli::parse_from(["rover-client", "--host", " "]);
        assert!(cli.into_client_config(ClientConfig::default()).is_err());
    }

    #[test]
    fn test_cli_record_and_config_paths() {
        let cli = Cli::parse_from(["rover-client", "-c", "/tmp/r.toml", "--record", "/tmp/v.bin"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.toml")));
        assert_eq!(cli.record, Some(PathBuf::from("/tmp/v.bin")));
    }

    #[test]
    fn test_load_base_config_missing_explicit_file_is_default() {
        let path = std::env::temp_dir().join(format!("rover-absent-{}.toml", uuid::Uuid::new_v4()));
        let config = load_base_config(Some(&path)).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_save_config_writes_effective_config() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("rover-save-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let cli = Cli::parse_from(["rover-client", "--host", "rover.local", "--save-config"]);
        assert!(cli.save_config);
        let config = cli.into_client_config(ClientConfig::default()).unwrap();

        // Act
        save_effective_config(&config, Some(&path)).unwrap();

        // Assert
        let restored = load_base_config(Some(&path)).unwrap();
        assert_eq!(restored.server.host, "rover.local");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_key_table_from_config() {
        let mut config = ClientConfig::default();
        config.motion.keys.insert("i".to_string(), "laser".to_string());
        assert!(key_bindings(&config).unwrap().resolve('i').is_some());

        config.motion.keys.insert("i".to_string(), "warp".to_string());
        assert!(key_bindings(&config).is_err());
    }

    #[test]
    fn test_console_quit_line() {
        let (launcher, _rx) = ChannelLauncher::new();
        let session = HandshakeSession::new(
            SessionIdentity::generate(),
            SessionOptions::default(),
            Box::new(launcher),
        );
        let mut controller = RoverController::new(session, KeyBindings::default(), 0.5);
        assert_eq!(handle_console_line(&mut controller, "quit"), ConsoleReply::Quit);
        assert_eq!(
            handle_console_line(&mut controller, "bogus"),
            ConsoleReply::Continue(None)
        );
    }
}
