//! Ping/pong demonstration driver.
//!
//! Supervisor mode spawns this same binary as the worker and runs five
//! send/receive rounds:
//!
//! ```text
//! chime-demo --worker target/debug/chime-demo --size 1024
//! ```
//!
//! When launched by the supervisor the binary receives `--capacity <n>` on
//! its command line (the launcher contract) and runs the worker branch:
//! `listen` on the main thread, replies from a second thread.

use std::sync::mpsc;

use anyhow::{Context, bail};
use tracing_subscriber::EnvFilter;

struct Args {
    worker_path: Option<String>,
    size: usize,
    rounds: usize,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        worker_path: None,
        size: 1024,
        rounds: 5,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--worker" => {
                args.worker_path = Some(iter.next().context("--worker requires a path")?);
            }
            "--size" => {
                args.size = iter
                    .next()
                    .context("--size requires a byte count")?
                    .parse()
                    .context("--size must be an integer")?;
            }
            "--rounds" => {
                args.rounds = iter
                    .next()
                    .context("--rounds requires a count")?
                    .parse()
                    .context("--rounds must be an integer")?;
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    // The capacity argument is only ever present when the launcher spawned
    // us, so it doubles as the mode switch.
    if let Some(capacity) = chime::capacity_from_args() {
        return run_worker(capacity);
    }

    let args = parse_args()?;
    run_supervisor(args)
}

fn run_supervisor(args: Args) -> anyhow::Result<()> {
    let worker = args
        .worker_path
        .context("--worker <path> is required in supervisor mode")?;

    let mut link = chime::establish(&worker, args.size)
        .with_context(|| format!("establishing link to {worker}"))?;
    tracing::info!(
        pid = link.worker_pid(),
        capacity = args.size,
        "worker link established"
    );

    for i in 0..args.rounds {
        let ping = format!("ping-{i}");
        link.send(ping.as_bytes()).context("send")?;
        let reply = link.receive().context("receive")?;
        tracing::info!(
            round = i,
            sent = %ping,
            received = %String::from_utf8_lossy(&reply),
            "round trip complete"
        );
    }

    let status = link.close().context("closing link")?;
    tracing::info!(%status, "worker closed");
    Ok(())
}

fn run_worker(capacity: usize) -> anyhow::Result<()> {
    let endpoint = chime::bind(capacity).context("binding to inherited descriptors")?;
    tracing::info!(capacity, "worker bound");

    let (mut inbound, mut outbound) = endpoint.split();

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    std::thread::spawn(move || {
        for frame in rx {
            let reply = String::from_utf8_lossy(&frame).replacen("ping", "pong", 1);
            if outbound.send(reply.as_bytes()).is_err() {
                break;
            }
        }
    });

    inbound
        .listen(move |bytes| {
            tracing::info!(received = %String::from_utf8_lossy(bytes), "frame");
            let _ = tx.send(bytes.to_vec());
        })
        .context("listen loop ended")
}
