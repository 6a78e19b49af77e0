//! EtnoApp sync proxy - binary entry point
//! Delegates to the library for all app logic.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match etnoapp_backend::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("etnoapp-backend: {}", e);
            ExitCode::FAILURE
        }
    }
}
