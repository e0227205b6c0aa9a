use actix_web::{middleware, web, App, HttpServer};
use imgdesc::config::{token_from_env, Settings};
use imgdesc::inference::{ChatClient, Describer};
use imgdesc::server::routes::{self, AppState};
use imgdesc::util::init_tracing;
use std::sync::Arc;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log);

    let token = token_from_env().inspect_err(|e| error!("{e:#}"))?;
    let client: Arc<dyn Describer> = Arc::new(ChatClient::new(&settings, token)?);
    let state = web::Data::new(AppState::new(client, &settings));

    info!(
        "starting image description service on {}:{} with model {}",
        settings.host, settings.port, settings.model
    );

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((settings.host.as_str(), settings.port))?
    .run()
    .await?;

    Ok(())
}
