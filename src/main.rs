use clap::{Parser, ValueEnum};
use pingpong_rtt::{
    CancelToken, ClientOptions, Reducer, ReducerMode, UdpTransport, run_client, run_server,
};
use spdlog::prelude::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::OnceLock;

#[derive(Parser)]
#[command(
    name = "pingpong-rtt",
    about = "Measure pingpong round-trip latency over UDP"
)]
struct Args {
    /// Run as the echo server; the default role is client
    #[arg(long)]
    server: bool,

    /// Server address, e.g. 10.0.0.2:5400 (client role)
    #[arg(long, required_unless_present = "server")]
    peer: Option<SocketAddr>,

    /// Local bind address
    #[arg(long, default_value = "0.0.0.0:5400")]
    bind: SocketAddr,

    /// Number of round trips
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    iters: u32,

    /// Gap between outbound packets in nanoseconds (client role)
    #[arg(long, default_value_t = 1_000_000, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Acceptable pacing error, percent of the interval
    #[arg(long, default_value_t = 5)]
    max_err: u64,

    /// How to reduce the timestamp stream
    #[arg(long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Output file; stdout when omitted
    #[arg(long)]
    out: Option<PathBuf>,

    /// Pin the poll loop and sender to separate cores
    #[arg(long)]
    pin_cores: bool,

    /// Rounds between progress log lines
    #[arg(long, default_value_t = 100_000, value_parser = clap::value_parser!(u64).range(1..))]
    report_interval: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// One raw line per round trip
    All,
    /// Min/max round-trip summary
    MinMax,
    /// Relative/absolute latency histograms
    Histogram,
}

static STOP: OnceLock<CancelToken> = OnceLock::new();

extern "C" fn on_sigint(_: libc::c_int) {
    // An atomic store is all that is allowed in here.
    if let Some(token) = STOP.get() {
        token.request_stop();
    }
}

fn install_sigint(cancel: &CancelToken) {
    STOP.set(cancel.clone()).ok();
    let handler = on_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as usize);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let cancel = CancelToken::new();
    install_sigint(&cancel);

    if args.server {
        info!("[Server] echoing {} rounds on {}", args.iters, args.bind);
        let (tx, rx) = UdpTransport::server(args.bind)?.into_split()?;
        let echoed = run_server(tx, rx, args.iters, args.pin_cores, &cancel)?;
        info!("[Server] echoed {echoed} rounds");
        return Ok(());
    }

    let peer = args.peer.expect("clap enforces --peer for the client role");
    let mode = match args.mode {
        Mode::All => ReducerMode::AllTimestamps,
        Mode::MinMax => ReducerMode::MinMax,
        Mode::Histogram => ReducerMode::Histogram {
            send_interval_ns: args.interval,
        },
    };

    info!(
        "[Client] {} rounds to {} every {}ns, {:?} output to {}",
        args.iters,
        peer,
        args.interval,
        args.mode,
        args.out
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".into()),
    );

    let (tx, rx) = UdpTransport::client(args.bind, peer)?.into_split()?;
    let reducer = Reducer::create(mode, args.out.as_deref())?;
    let options = ClientOptions {
        iters: args.iters,
        interval_ns: args.interval,
        max_err_pct: args.max_err,
        pin_cores: args.pin_cores,
        report_interval: args.report_interval,
    };

    let stats = run_client(tx, rx, reducer, &options, &cancel)?;
    info!(
        "[Client] sent {} recorded {} skipped {}",
        stats.sent, stats.recorded, stats.skipped
    );
    Ok(())
}
