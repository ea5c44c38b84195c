use std::path::PathBuf;
use std::sync::Arc;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crudlify::cli_utils::{exit_with_error, exit_with_usage_error};
use crudlify::{
    ConfigFile, CrudConfig, CrudOptions, InMemoryDataStore, OperationDispatcher,
    create_crud_router, crudlify,
};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Args {
    #[arrrg(optional, "Path to a JSON or YAML config file with the schema map")]
    config: Option<String>,
    #[arrrg(flag, "Reject collections missing from the schema map")]
    strict: bool,
    #[arrrg(optional, "Host to bind the HTTP server")]
    host: Option<String>,
    #[arrrg(optional, "Port to bind the HTTP server")]
    port: Option<u16>,
    #[arrrg(optional, "Path prefix the CRUD routes are mounted under")]
    prefix: Option<String>,
    #[arrrg(flag, "Enable verbose logging")]
    verbose: bool,
}

const USAGE: &str = "USAGE: crudlifyd [OPTIONS]";

const HELP_TEXT: &str = r#"crudlifyd - schema-validated REST CRUD daemon

USAGE:
    crudlifyd [OPTIONS]

OPTIONS:
    --config <PATH>      JSON or YAML config file with the schema map [default: none, open mode]
    --strict             Reject collections missing from the schema map
    --host <HOST>        Host to bind the HTTP server [default: 127.0.0.1]
    --port <PORT>        Port to bind the HTTP server [default: 8080]
    --prefix <PREFIX>    Path prefix for the CRUD routes [default: /api]
    --verbose            Enable debug logging (RUST_LOG overrides)

CONFIG FILE:
    strict: false
    use_defaults: true
    schema:
      users:
        type: object
        required: [email]
      notes: null

DESCRIPTION:
    Serves the CRUD API over an in-memory store. Documents are lost on exit.

    SIGHUP reloads the config file; a reload that fails keeps the running
    configuration. The server shuts down gracefully on SIGTERM or Ctrl+C.

API ENDPOINTS:
    POST   {prefix}/{collection}             Create a document
    GET    {prefix}/{collection}?{query}     List documents matching the query
    GET    {prefix}/{collection}/{id}        Get a document
    PUT    {prefix}/{collection}/{id}        Replace a document
    PATCH  {prefix}/{collection}/{id}        Update a document
    DELETE {prefix}/{collection}/{id}        Delete a document
    PATCH  {prefix}/{collection}/_byquery    Update every matching document
    DELETE {prefix}/{collection}/_byquery    Delete every matching document"#;

#[tokio::main]
async fn main() {
    let (args, free) = Args::from_command_line(USAGE);

    if !free.is_empty() {
        if free[0] == "help" {
            println!("{}", HELP_TEXT);
            return;
        }
        exit_with_usage_error(format!("unexpected argument '{}'", free[0]), USAGE);
    }

    let config = ServerConfig::from_args(args);
    init_tracing(config.verbose);

    let crud_config = match load_config(config.config_path.as_ref(), config.strict) {
        Ok(crud_config) => crud_config,
        Err(message) => exit_with_error(message),
    };
    info!(
        collections = crud_config.registry.len(),
        strict = crud_config.options.strict,
        "schema map loaded"
    );

    let dispatcher = Arc::new(OperationDispatcher::with_config(
        Arc::new(InMemoryDataStore::new()),
        crud_config,
    ));

    #[cfg(unix)]
    if let Some(path) = config.config_path.clone() {
        tokio::spawn(reload_on_hangup(path, config.strict, Arc::clone(&dispatcher)));
    }

    let app = mount(&config.prefix, dispatcher);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => exit_with_error(format!("Failed to bind to {}: {}", addr, e)),
    };

    info!(address = %addr, prefix = %config.prefix, "crudlifyd listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        exit_with_error(format!("Server error: {}", e));
    }

    info!("crudlifyd stopped");
}

struct ServerConfig {
    config_path: Option<PathBuf>,
    strict: bool,
    host: String,
    port: u16,
    prefix: String,
    verbose: bool,
}

impl ServerConfig {
    fn from_args(args: Args) -> Self {
        Self {
            config_path: args.config.map(PathBuf::from),
            strict: args.strict,
            host: args.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: args.port.unwrap_or(8080),
            prefix: args.prefix.unwrap_or_else(|| "/api".to_string()),
            verbose: args.verbose,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Loads the config file, or an open-mode configuration when no file is given.
///
/// `--strict` on the command line wins over the file.
fn load_config(path: Option<&PathBuf>, force_strict: bool) -> Result<CrudConfig, String> {
    let Some(path) = path else {
        return Ok(CrudConfig::empty(CrudOptions {
            strict: force_strict,
            ..CrudOptions::default()
        }));
    };
    let mut file = ConfigFile::from_path(path)
        .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?;
    file.strict |= force_strict;
    file.compile()
        .map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

fn mount(prefix: &str, dispatcher: Arc<OperationDispatcher>) -> Router {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        crudlify(Router::new(), dispatcher)
    } else if prefix.starts_with('/') {
        Router::new().nest(prefix, create_crud_router(dispatcher))
    } else {
        Router::new().nest(&format!("/{}", prefix), create_crud_router(dispatcher))
    }
}

#[cfg(unix)]
async fn reload_on_hangup(path: PathBuf, force_strict: bool, dispatcher: Arc<OperationDispatcher>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!(error = %e, "SIGHUP handler unavailable; config reload disabled");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        match load_config(Some(&path), force_strict) {
            Ok(crud_config) => {
                info!(
                    path = %path.display(),
                    collections = crud_config.registry.len(),
                    "config reloaded"
                );
                dispatcher.reconfigure(crud_config);
            }
            Err(message) => error!(%message, "config reload failed; keeping current config"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, stopping server gracefully");
}
