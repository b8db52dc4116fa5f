use std::process::ExitCode;

fn main() -> ExitCode {
    siteline_cli::run()
}
