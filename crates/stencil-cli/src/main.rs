use std::process::ExitCode;

fn main() -> ExitCode {
    stencil_cli::run()
}
