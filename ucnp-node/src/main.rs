// UCNP reference node: two peers rendezvous over a shared mailbox
// directory, then exchange framed payloads.

mod config;
mod mailbox;

use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;
use ucnp_core::{Channel, LinkEvents, LinkState, PeerId, Session};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const STEP: Duration = Duration::from_millis(500);

enum Mode {
    Listen,
    Send(String),
}

struct LogEvents;

impl LinkEvents for LogEvents {
    fn on_connected(&mut self, peer: PeerId) {
        tracing::info!(peer = %peer, "connected");
    }
    fn on_data(&mut self, payload: &[u8]) {
        tracing::info!(
            bytes = payload.len(),
            text = %String::from_utf8_lossy(payload),
            "data received"
        );
    }
    fn on_disconnected(&mut self) {
        tracing::info!("peer disconnected");
    }
}

fn usage() -> ! {
    eprintln!("Usage: ucnp-node [listen | send <text>] [--timeout-ms N] [--version]");
    eprintln!("  listen       wait for a peer, print received payloads");
    eprintln!("  send <text>  find a peer and deliver one payload");
    std::process::exit(2);
}

fn parse_args() -> (Mode, Duration) {
    let mut mode = None;
    let mut timeout = Duration::from_secs(30);
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("ucnp-node {}", VERSION);
                std::process::exit(0);
            }
            "--timeout-ms" => {
                let Some(ms) = args.next().and_then(|s| s.parse::<u64>().ok()) else {
                    usage();
                };
                timeout = Duration::from_millis(ms);
            }
            "listen" if mode.is_none() => mode = Some(Mode::Listen),
            "send" if mode.is_none() => {
                let Some(text) = args.next() else { usage() };
                mode = Some(Mode::Send(text));
            }
            _ => usage(),
        }
    }
    match mode {
        Some(m) => (m, timeout),
        None => usage(),
    }
}

fn main() -> anyhow::Result<()> {
    let (mode, timeout) = parse_args();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = config::load();
    let channel = mailbox::FileMailbox::open(&cfg.mailbox_dir)?;
    let mut session = Session::with_config(channel, Box::new(LogEvents), cfg.session_config());
    tracing::info!(
        local = %session.local_id(),
        dir = %cfg.mailbox_dir.display(),
        "ucnp node starting"
    );

    session.listen()?;
    let deadline = Instant::now() + timeout;
    match mode {
        Mode::Listen => {
            let result = run_listen(&mut session, deadline);
            session.close()?;
            result
        }
        // Send mode exits without close(): the channel is single-slot,
        // so a DISCONNECT published here would overwrite the DATA frame
        // before the peer fetches it.
        Mode::Send(text) => run_send(&mut session, deadline, text.as_bytes()),
    }
}

/// Wait for a peer, then keep polling until the deadline; received
/// payloads are reported by the observer hooks.
fn run_listen<C: Channel>(session: &mut Session<C>, deadline: Instant) -> anyhow::Result<()> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(());
        }
        let n = session.poll(remaining.min(STEP))?;
        if session.state() == LinkState::Disconnected {
            // Peer tore the connection down; nothing left to wait for.
            return Ok(());
        }
        // Once connected, poll returns immediately even with no data;
        // pace the loop ourselves.
        if n == 0 && session.state() == LinkState::Connected {
            std::thread::sleep(Duration::from_millis(100));
        }
    }
}

/// Rendezvous, then deliver one payload. This is the complete send-mode
/// path; nothing is published after the DATA frame.
fn run_send<C: Channel>(
    session: &mut Session<C>,
    deadline: Instant,
    payload: &[u8],
) -> anyhow::Result<()> {
    while session.state() != LinkState::Connected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            anyhow::bail!("no peer found before timeout");
        }
        session.poll(remaining.min(STEP))?;
    }
    let n = session.send(payload)?;
    tracing::info!(bytes = n, "payload published");
    Ok(())
}
