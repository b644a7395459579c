use actix_web::{middleware, web, App, HttpServer};
use order_service::config::Config;
use order_service::delivery_simulator::{DeliverySimulator, DeliverySimulatorConfig};
use order_service::handlers;
use order_service::inventory_client::{InventoryClient, SimulatedInventoryCollaborator};
use order_service::order_service::OrderService;
use order_service::outbox_publisher::OrderEventRouter;
use order_service::status_consumer::StatusConsumer;
use order_service::store::Store;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting order service");

    let config = Config::from_env().map_err(io::Error::other)?;

    let pool_config = config.database.to_pool_config("order-service");
    let pool = db_pool::create_pool(pool_config)
        .await
        .map_err(io::Error::other)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(io::Error::other)?;
    tracing::info!("database migrations applied");

    let store = Store::new(pool.clone());
    let bus = Arc::new(event_bus::InProcessBus::new());

    let collaborator = Arc::new(SimulatedInventoryCollaborator::new(
        config.inventory_mock.failure_rate_percent,
    ));
    let inventory_client = Arc::new(
        InventoryClient::new(
            collaborator,
            config.circuit_breaker.to_circuit_breaker_config(),
            config.circuit_breaker.to_timeout_config(),
        )
        .with_metrics("order-service"),
    );

    let order_service = Arc::new(OrderService::new(store.clone(), inventory_client));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let outbox_processor = Arc::new(
        transactional_outbox::OutboxProcessor::new(
            Arc::new(store.clone()),
            bus.clone(),
            Arc::new(OrderEventRouter),
            config.outbox.to_processor_config(),
        )
        .with_metrics(transactional_outbox::metrics::OutboxMetrics::new("order-service")),
    );
    let outbox_shutdown = shutdown_rx.clone();
    let outbox_processor_handle = outbox_processor.clone();
    tokio::spawn(async move {
        outbox_processor_handle.run(outbox_shutdown).await;
    });

    bus.subscribe(
        event_bus::topics::DELIVERY_EVENTS,
        Arc::new(StatusConsumer::new(order_service.clone())),
    );
    bus.subscribe(
        event_bus::topics::ORDER_EVENTS,
        Arc::new(DeliverySimulator::new(
            bus.clone() as Arc<dyn event_bus::EventBus>,
            DeliverySimulatorConfig::default(),
        )),
    );

    let http_port = config.app.http_port;
    let addr = format!("0.0.0.0:{http_port}");
    tracing::info!(addr = %addr, "starting HTTP server");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(order_service.clone()))
            .app_data(web::Data::new(pool.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::register_routes)
    })
    .bind(&addr)?
    .shutdown_timeout(10)
    .run();

    let server_handle = server.handle();

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining in-flight work");
        let _ = shutdown_tx.send(true);
        tokio::time::sleep(Duration::from_secs(10)).await;
        server_handle.stop(true).await;
    });

    server.await
}
