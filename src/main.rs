use clap::Parser;
use strategist::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
