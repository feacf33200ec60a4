use std::process::ExitCode;

use process_compose::cli::{self, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    ExitCode::from(cli::run(cli) as u8)
}
