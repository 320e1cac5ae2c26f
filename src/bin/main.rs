use std::{
    error::Error,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use tracing::info;
use tracing_subscriber::EnvFilter;

use mediagrid::{
    cli::{Cli, Commands, parse_args},
    client::{HttpWorkerClient, WorkerClient},
    config::load_config,
    constants::WORKER_REQUEST_TIMEOUT,
    daemon::RegistryDaemon,
    directory::{Directory, StaticDirectory},
    runtime::{self, RuntimeMode},
    store::{MemoryStore, RegistryStore},
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();

    runtime::init(if args.sys {
        RuntimeMode::System
    } else {
        RuntimeMode::User
    });
    init_logging(&args);

    match args.command {
        Commands::Start { config } => start(&config),
        Commands::Validate { config, json } => validate(&config, json),
    }
}

fn start(config_path: &str) -> Result<(), Box<dyn Error>> {
    let config = load_config(Some(config_path))?;
    let settings = config.to_settings();
    info!("Starting mediagrid node at {}", settings.server_url);

    let store: Arc<dyn RegistryStore> = Arc::new(MemoryStore::new());
    let client: Arc<dyn WorkerClient> = Arc::new(HttpWorkerClient::new(WORKER_REQUEST_TIMEOUT)?);
    let directory: Arc<dyn Directory> =
        Arc::new(StaticDirectory::from_identity(&settings.identity));

    let daemon = RegistryDaemon::start(settings, store, client, directory)?;

    let stop_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop_requested);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))?;

    while !stop_requested.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }
    daemon.stop()?;
    Ok(())
}

fn validate(config_path: &str, json: bool) -> Result<(), Box<dyn Error>> {
    let config = load_config(Some(config_path))?;
    let settings = config.to_settings();
    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        println!(
            "Configuration OK: node {} publishing {} service(s)",
            settings.server_url,
            settings.services.len()
        );
    }
    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = match args.log_level {
        Some(level) => EnvFilter::new(level.as_directive()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
