use clap::Parser;
use strcount_client::{repl, Cli, ClientHandle, Result};
use tokio::io::BufReader;

const CONSOLE_CLIENT_ID: u64 = 9999;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let (config, stress) = Cli::parse().into_configs()?;

    let mut console = ClientHandle::connect(CONSOLE_CLIENT_ID, &config).await?;

    let stdin = BufReader::new(tokio::io::stdin());
    let outcome = repl::run(stdin, tokio::io::stdout(), &console, &config, &stress).await;

    let closed = console.close().await;
    outcome?;
    closed
}
