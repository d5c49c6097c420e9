use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use nocache_server::config::{AppState, Config, Overrides};
use nocache_server::{logger, server, ServerError};

/// Serve a directory with client-side caching disabled
#[derive(Debug, Parser)]
#[command(name = "nocache-server", version, about)]
struct Cli {
    /// Port to listen on [default: 3000]
    port: Option<u16>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(short, long, value_name = "HOST")]
    bind: Option<String>,

    /// Directory to serve [default: current directory]
    #[arg(short, long, value_name = "DIR")]
    directory: Option<String>,

    /// Configuration file [default: ./nocache.toml if present]
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,
}

impl From<Cli> for Overrides {
    fn from(cli: Cli) -> Self {
        Self {
            config_file: cli.config,
            host: cli.bind,
            port: cli.port,
            root: cli.directory,
        }
    }
}

fn main() -> ExitCode {
    let overrides = Overrides::from(Cli::parse());

    match start(&overrides) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            ExitCode::FAILURE
        }
    }
}

fn start(overrides: &Overrides) -> Result<(), ServerError> {
    let cfg = Config::load(overrides)?;
    logger::init(&cfg).map_err(ServerError::Logger)?;

    // Worker thread count follows `server.workers`, CPU cores otherwise
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers.max(1));
    }
    let runtime = runtime_builder.build().map_err(ServerError::Runtime)?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), ServerError> {
    let addr = cfg.get_socket_addr().map_err(ServerError::InvalidAddress)?;
    let state = Arc::new(AppState::new(cfg)?);
    let listener = server::bind_listener(addr)?;

    // Report the bound address, which differs from `addr` when port 0 is used
    let local_addr = listener.local_addr().unwrap_or(addr);
    logger::log_server_start(&local_addr, &state.root, &state.config);

    server::run(listener, state, server::shutdown_signal()).await;
    Ok(())
}
