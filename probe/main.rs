#![forbid(unsafe_code)]

//! `proc-warden-probe`: A cooperative demo worker.
//!
//! Accepts the default `proc-warden` argument template (work item path, then
//! signal name), echoes its lifecycle to stdout/stderr, and exits cleanly
//! when the supervisor sends the terminate request.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use proc_warden::ipc::terminate::TerminateListener;

#[derive(Debug, Parser)]
#[command(name = "proc-warden-probe", about = "Cooperative demo worker", version, long_about = None)]
struct Cli {
    /// Work item descriptor path.
    work_item: PathBuf,

    /// Identity token to listen on for the terminate request.
    signal_name: String,

    /// Keep running after a terminate request.
    #[arg(long)]
    ignore_signal: bool,

    /// Exit on its own after this many milliseconds.
    #[arg(long)]
    exit_after_ms: Option<u64>,

    /// Exit code used with `--exit-after-ms`.
    #[arg(long, default_value_t = 1)]
    exit_code: i32,
}

fn main() {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("probe: failed to start runtime: {err}");
            std::process::exit(2);
        }
    };

    let code = runtime.block_on(run(args));
    std::process::exit(code);
}

async fn run(args: Cli) -> i32 {
    println!(
        "probe started work_item={} signal={}",
        args.work_item.display(),
        args.signal_name
    );

    let listener = match TerminateListener::bind(&args.signal_name) {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("probe: {err}");
            return 2;
        }
    };
    println!("probe listening");

    let exit_after = async {
        match args.exit_after_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(exit_after);

    loop {
        tokio::select! {
            () = &mut exit_after => {
                eprintln!("probe exiting with code {}", args.exit_code);
                return args.exit_code;
            }
            received = listener.recv() => match received {
                Ok(()) if args.ignore_signal => {
                    println!("probe ignoring terminate");
                }
                Ok(()) => {
                    println!("probe terminate received");
                    return 0;
                }
                Err(err) => {
                    eprintln!("probe: {err}");
                    return 2;
                }
            },
        }
    }
}
