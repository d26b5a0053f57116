use std::process::ExitCode;

fn main() -> ExitCode {
    kbassist_cli::run()
}
