use anyhow::{Context, Result};
use coinrag::{
    api,
    cli::{commands, output::Output, Cli, Commands},
    utils::toml_config::{CoinragConfig, LogFormat},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(config: &CoinragConfig, verbose: bool) {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        config.server.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", default_level)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.server.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn serve(config: CoinragConfig, output: &Output) -> Result<()> {
    output.banner();

    for warning in config.validate_with_warnings()? {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
    }

    let addr = config.bind_address();
    let state = AppState::from_config(config)
        .await
        .context("Failed to initialize the pipeline")?;
    let app = api::build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("OpenAPI document: http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    if let Some(Commands::Config { validate }) = &cli.command {
        if let Err(e) = commands::config(&cli.config, *validate, &output) {
            output.error(&format!("{:#}", e));
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = match CoinragConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            output.error(&e.to_string());
            output.hint("Copy coinrag.example.toml to coinrag.toml and adjust it");
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Ask {
            query,
            no_rag,
            top_k,
            coin,
            facts,
        }) => {
            if cli.verbose {
                init_tracing(&config, true);
            }
            if let Err(e) =
                commands::ask(
                    config,
                    &query,
                    !no_rag,
                    top_k,
                    coin.as_deref(),
                    facts.as_deref(),
                    &output,
                )
                .await
            {
                output.error(&format!("{:#}", e));
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Serve) | None => {
            init_tracing(&config, cli.verbose);
            serve(config, &output).await
        }
        Some(Commands::Config { .. }) => Ok(()),
    }
}
