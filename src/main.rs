use clap::Parser;
use meanrev::cli::{Cli, init_logging, run};

fn main() -> std::process::ExitCode {
    // database credentials may live in .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}
