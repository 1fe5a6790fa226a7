#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = testdesk_client::run().await {
        eprintln!("testdesk-client fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
