use clap::Parser;
use unhosted_storage::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    cli::run(Cli::parse()).await
}
