use clap::Parser;
use lnbind::cli::{run, Args};
use std::error::Error;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::parse();
    init_tracing(&args);
    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(args: &Args) {
    let default = if args.verbose {
        "lnbind=debug"
    } else if args.quiet {
        "lnbind=warn"
    } else {
        "lnbind=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
