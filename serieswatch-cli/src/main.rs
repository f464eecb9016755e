use anyhow::Result;
use serieswatch_cli::app;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
