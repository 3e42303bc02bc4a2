use std::process::ExitCode;

fn main() -> ExitCode {
    match spindled::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "daemon failed");
            ExitCode::FAILURE
        }
    }
}
