#![forbid(unsafe_code)]

//! `proc-warden-ctl`: Local companion CLI for `proc-warden`.
//!
//! Sends the terminate request to a single supervised worker instance, or
//! lists the identity tokens a running supervisor assigns to its workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use proc_warden::config::HostConfig;
use proc_warden::discovery;
use proc_warden::events::{EventSink, MemoryEventSink};
use proc_warden::ipc::terminate::send_terminate;
use proc_warden::models::work_item::WorkItem;

#[derive(Debug, Parser)]
#[command(
    name = "proc-warden-ctl",
    about = "Local CLI for proc-warden",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask one worker instance to exit.
    ///
    /// The supervisor treats the exit as a crash and restarts the worker
    /// after its crash backoff.
    Signal {
        /// Identity token of the worker (`<name>-<supervisor pid>`).
        signal_name: String,
    },

    /// Print the identity token of every work item a supervisor would run.
    Names {
        /// Path to the supervisor's TOML configuration file.
        #[arg(long)]
        config: PathBuf,
        /// Pid of the running supervisor.
        #[arg(long)]
        owner: u32,
    },
}

fn main() {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(async {
        match args.command {
            Command::Signal { signal_name } => match send_terminate(&signal_name).await {
                Ok(()) => {
                    println!("OK");
                    0
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    eprintln!("Is a worker listening on '{signal_name}'?");
                    1
                }
            },
            Command::Names { config, owner } => print_names(&config, owner),
        }
    });

    std::process::exit(code);
}

fn print_names(path: &Path, owner: u32) -> i32 {
    let config = match HostConfig::load_from_path(path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return 1;
        }
    };

    let sink = Arc::new(MemoryEventSink::new());
    let dyn_sink: Arc<dyn EventSink> = Arc::clone(&sink) as Arc<dyn EventSink>;
    let items = match discovery::discover(&config, &dyn_sink) {
        Ok(items) => items,
        Err(err) => {
            eprintln!("Error: {err}");
            return 1;
        }
    };

    for message in sink.messages() {
        eprintln!("warning: {message}");
    }
    for (_, path) in items {
        let item = WorkItem::with_owner(path, owner);
        println!("{}\t{}", item.name(), item.signal_name());
    }
    0
}
