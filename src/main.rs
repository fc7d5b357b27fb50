//! HTTP server for the signed order exchange.
//!
//! Endpoints: health, submit signed trade, list order book. Configuration comes from the
//! environment, see [`signed_order_exchange::config`].

use signed_order_exchange::{
    api, Config, FilePersistence, FileRejectionLog, MemoryOrderRepository, OrderIntake,
    OrderRepository, RejectionLog, StdoutRejectionLog,
};
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = env_logger::try_init();
    let config = Config::from_env();

    let repo: Arc<dyn OrderRepository> = match &config.orders_path {
        Some(path) => Arc::new(MemoryOrderRepository::open(FilePersistence::new(path))?),
        None => {
            log::warn!("ORDERS_DB is empty, orders are kept in memory only");
            Arc::new(MemoryOrderRepository::new())
        }
    };
    let rejections: Arc<dyn RejectionLog> = match &config.rejection_log_path {
        Some(path) => {
            let log = FileRejectionLog::open(path)?;
            log::info!("rejections are appended to {}", log.path().display());
            Arc::new(log)
        }
        None => Arc::new(StdoutRejectionLog),
    };

    let intake = Arc::new(OrderIntake::new(repo, rejections, config.intake));
    let app = api::create_router(intake);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on http://{}", addr);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
