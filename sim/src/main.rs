use std::error::Error;

use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let addr = std::env::var("ARM_SIM_ADDR").unwrap_or_else(|_| sim::DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    sim::serve(listener).await?;
    Ok(())
}
