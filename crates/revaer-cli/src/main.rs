//! Binary entrypoint that delegates to the library's argument parsing and dispatch.

#[tokio::main]
async fn main() {
    std::process::exit(revaer_cli::run().await);
}
