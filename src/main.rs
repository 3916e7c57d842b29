use clap::Parser;
use std::sync::Arc;
use tonic::transport::Server;

use keyspace_server::{config::Config, db, grpc, storage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::parse();

    let pool = db::init_pool(&config.database_url).await?;
    let storage = Arc::new(storage::Storage::new(pool));
    let server = grpc::create_server(storage);

    tracing::info!(listen = %config.listen, database = %config.database_url, "serving keyspace");
    Server::builder().add_service(server).serve(config.listen).await?;

    Ok(())
}
