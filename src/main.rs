use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use aes67_gen::cli::Cli;
use aes67_gen::engine::TransmitEngine;
use aes67_gen::sap::SapAnnouncer;
use aes67_gen::{build, Controller, RunOutcome};

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            2
        }
    };
    process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing();

    let params = cli.stream_parameters();
    params.validate().context("invalid stream parameters")?;

    let description = build(&params);
    println!("Starting transmit pipeline:");
    println!("{description}");

    // Ctrl+C lands on its own channel, outside the engine bus.
    let (interrupt_tx, interrupt_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })
    .context("failed to install interrupt handler")?;

    let announcer = if cli.sap_announce {
        match SapAnnouncer::start(&params) {
            Ok(announcer) => Some(announcer),
            Err(err) => {
                // Announcements are best-effort; the stream still runs.
                warn!("SAP announcement disabled: {err}");
                None
            }
        }
    } else {
        None
    };

    let mut controller = Controller::new(TransmitEngine::new(), interrupt_rx);
    let verdict = controller.run(&description);

    if let Some(announcer) = announcer {
        announcer.stop();
    }

    match verdict {
        Ok(RunOutcome::Completed) | Ok(RunOutcome::Interrupted) => Ok(0),
        Err(err) => {
            error!("{err}");
            Ok(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
