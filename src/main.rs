use clap::Parser;
use env_logger::Env;
use fundsim::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    run(Cli::parse())
}
