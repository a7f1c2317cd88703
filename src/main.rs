//! Entry point for `gbn-over-udp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, report persistence).

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use gbn_over_udp::client::{Client, ClientConfig};
use gbn_over_udp::server::{Server, ServerConfig};
use gbn_over_udp::socket::Socket;

/// Go-Back-N reliable byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run as a server, accepting any number of concurrent peers.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Probability of silently dropping a DATA packet.
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        /// Probability of flipping one byte of an inbound datagram.
        #[arg(long, default_value_t = 0.0)]
        corruption: f64,
        /// RNG seed for reproducible fault injection.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run as a client, sending a budget of data packets to a server.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        server: String,
        /// Number of data packets to deliver.
        #[arg(short, long, default_value_t = 30)]
        packets: u32,
        /// Sliding-window size in bytes.
        #[arg(short, long, default_value_t = 400)]
        window: u32,
        /// Where to write the per-packet RTT report.
        #[arg(short, long, default_value = "rtt_stats.csv")]
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.mode {
        Mode::Server {
            bind,
            loss,
            corruption,
            seed,
        } => {
            for (name, rate) in [("loss", loss), ("corruption", corruption)] {
                if !(0.0..=1.0).contains(&rate) {
                    return Err(format!("{name} rate must be within [0.0, 1.0]").into());
                }
            }
            let config = ServerConfig {
                loss_rate: loss,
                corruption_rate: corruption,
                seed,
                ..ServerConfig::default()
            };
            let server = Server::bind(bind, config).await?;
            server.run().await?;
            Ok(())
        }
        Mode::Client {
            server,
            packets,
            window,
            report,
        } => {
            let server_addr = server
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| format!("cannot resolve server address {server:?}"))?;

            let config = ClientConfig {
                total_packets: packets,
                window_bytes: window,
                ..ClientConfig::default()
            };
            config.validate()?;
            let socket = Socket::bind("0.0.0.0:0".parse()?).await?;
            log::info!("client bound to {}, connecting to {server_addr}", socket.local_addr);

            let session = Client::connect(socket, server_addr, config).await?;
            let rtt_report = session.run().await?;

            rtt_report.write_csv(&report)?;
            println!("RTT report written to {}", report.display());
            Ok(())
        }
    }
}
