//! nanobot CLI entry point. All command logic lives in the `cli` module.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nanobot::cli::run().await
}
