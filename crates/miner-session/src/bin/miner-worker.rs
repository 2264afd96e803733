use anyhow::Context;
use clap::{value_parser, Arg, Command};
use miner_session::logging::{self, LogFormat};
use miner_session::worker::run_stdio;
use tokio::io::{stdin, stdout, BufReader};
use tracing::{info, Instrument};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("miner-worker")
        .version(miner_session::VERSION)
        .about("Session worker: one dataset, JSON-lines requests on stdin, responses on stdout")
        .arg(
            Arg::new("session")
                .long("session")
                .default_value("0")
                .value_parser(value_parser!(u64))
                .help("Session id, used to tag log lines"),
        )
        .arg(
            Arg::new("log-filter")
                .long("log-filter")
                .help("Tracing filter directive (defaults to RUST_LOG, then info)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .default_value("text")
                .value_parser(value_parser!(LogFormat))
                .help("Log line format on stderr: text or json"),
        );

    let matches = cli.get_matches();
    let session = matches.get_one::<u64>("session").copied().unwrap_or_default();
    let format = matches
        .get_one::<LogFormat>("log-format")
        .copied()
        .unwrap_or_default();
    let filter = matches.get_one::<String>("log-filter").map(String::as_str);

    logging::init(filter, format).context("initializing logging")?;

    let span = tracing::info_span!("worker", session_id = session);
    async {
        info!(version = miner_session::VERSION, "worker started");
        run_stdio(BufReader::new(stdin()), stdout(), async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("worker loop failed")?;
        info!("worker exited");
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}
