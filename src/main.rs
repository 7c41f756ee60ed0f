use shanks_backend::{
    app,
    config::{self, AppConfig},
    logging,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if !config::current_environment().is_production() {
        dotenvy::dotenv().ok();
    }

    let config = AppConfig::from_env()?;
    let _log_guards = logging::init(config.environment, &config.log_dir)?;

    let state = AppState::init(config).await?;
    let app = app::build_app(state.clone());
    app::serve(app, &state.config).await
}
