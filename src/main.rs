use clap::Parser;

use scoped_translator::cli::{self, Args};

fn main() {
    let args = Args::parse();
    cli::init_tracing(args.json_logs);

    if let Err(e) = cli::run(args) {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
