use std::process::ExitCode;

fn main() -> ExitCode {
    relist_cli::init_tracing();
    relist_cli::run()
}
