use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod state;

use api::configure_routes;
use config::Settings;
use state::AppState;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clonescan_web=debug,clonescan_core=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    // 初始化状态
    let state = AppState::new(&settings).await?;

    // 启动服务器
    let bind_address = settings.bind_address();
    tracing::info!("Server running on {}", bind_address);

    let server_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    // run() 在收到终止信号并处理完在途请求后返回
    tracing::info!("Shutting down, removing scratch root");
    state.orchestrator.scratch().remove_root().await;

    Ok(())
}
