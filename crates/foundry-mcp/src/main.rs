#[tokio::main]
async fn main() {
    if let Err(e) = foundry_mcp::run().await {
        eprintln!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}
