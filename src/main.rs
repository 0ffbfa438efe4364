mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use darc_core::config::AppConfig;
use darc_fetch::{RequestFetcher, SeleniumFetcher};
use darc_proxy::ProxyRegistry;
use darc_scheduler::{ConcurrencyMode, HostRateLimiter, Scheduler, Stage};
use darc_store::{FilterLists, RedisStore, SqlStore, WorkStore};
use darc_submit::SubmitSink;
use tracing::{error, info, warn};

// glibc malloc doesn't release memory back to the OS under high worker
// concurrency; mimalloc does.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(32)
        .thread_stack_size(8 * 1024 * 1024)
        .max_blocking_threads(512)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to build tokio runtime: {e}");
            return ExitCode::from(2);
        }
    };
    runtime.block_on(async_main())
}

async fn async_main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };
    let stage: Stage = match cli.r#type.parse() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("invalid --type: {e}");
            return ExitCode::from(1);
        }
    };

    let config_path = PathBuf::from(&cli.config);
    let config = match AppConfig::load(&config_path, include_str!("../config/default.toml")) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            return ExitCode::from(1);
        }
    };

    match run(cli, stage, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal init failure");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: cli::Cli, stage: Stage, config: AppConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.general.path_data)?;
    std::fs::write(
        config.general.path_data.join("darc.pid"),
        std::process::id().to_string(),
    )?;

    let filters = Arc::new(FilterLists::from_config(&config.filters));

    let retry_forever = std::env::var("DARC_REDIS")
        .map(|v| v == "1")
        .unwrap_or(false);
    let store: Arc<dyn WorkStore> = connect_store(&config, filters.clone(), retry_forever).await?;

    if config.general.reboot {
        info!("DARC_REBOOT=true: dropping all queue state");
        store.reboot().await?;
    }

    let registry = Arc::new(ProxyRegistry::new(&config));

    let mut seed_links = Vec::new();
    for path in &cli.file {
        let text = tokio::fs::read_to_string(path).await?;
        seed_links.extend(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string));
    }
    seed_links.extend(cli.links.iter().cloned());

    if !seed_links.is_empty() {
        let parsed: Vec<_> = seed_links
            .iter()
            .filter_map(|u| match darc_link::parse(u, None) {
                Ok(link) => Some(link),
                Err(e) => {
                    warn!(url = %u, error = %e, "skipping invalid seed link");
                    None
                }
            })
            .collect();
        store.save_requests(&parsed, 0.0, true).await?;
        info!(count = parsed.len(), "seeded requests queue");
    }

    let se_wait = config.general.se_wait_secs.and_then(darc_core::constants::duration_from_secs_f64);
    let darc_wait = config.general.darc_wait_secs.and_then(darc_core::constants::duration_from_secs_f64);

    let submit: Option<Arc<SubmitSink>> = match &config.store.db_url {
        Some(url) => {
            let sink = SubmitSink::connect(url, &config.general.path_data).await?;
            sink.run_migrations().await?;
            Some(Arc::new(sink))
        }
        None => None,
    };

    let request_fetcher = Some(Arc::new(RequestFetcher::new(
        store.clone(),
        registry.clone(),
        filters.clone(),
        submit.clone(),
        config.general.path_data.clone(),
        config.general.force,
        config.filters.mime_fallback,
    )));
    let selenium_fetcher = Some(Arc::new(SeleniumFetcher::new(
        store.clone(),
        registry.clone(),
        filters.clone(),
        submit.clone(),
        config.general.path_data.clone(),
        se_wait,
        darc_wait,
        darc_core::constants::DEFAULT_BROWSER_RECYCLE_AFTER,
    )));

    let mode = ConcurrencyMode::from_flags(config.general.multiprocessing, config.general.multithreading);
    let rate_limiter = Arc::new(HostRateLimiter::new(std::time::Duration::from_secs_f64(
        darc_core::constants::DEFAULT_HOST_RATE_SECS,
    )));

    let scheduler = Scheduler::new(
        stage,
        mode,
        config.general.cpu,
        store,
        registry,
        request_fetcher,
        selenium_fetcher,
        rate_limiter,
    );

    scheduler.run().await?;
    info!("shutdown complete");
    Ok(())
}

async fn connect_store(
    config: &AppConfig,
    filters: Arc<FilterLists>,
    retry_forever: bool,
) -> anyhow::Result<Arc<dyn WorkStore>> {
    if let Some(url) = &config.store.redis_url {
        let time_cache = config
            .general
            .time_cache_secs
            .and_then(darc_core::constants::duration_from_secs_f64);
        let store = RedisStore::new(url, time_cache, (*filters).clone())?;
        return Ok(Arc::new(store));
    }

    let Some(url) = &config.store.db_url else {
        anyhow::bail!("neither REDIS_URL nor DB_URL is configured");
    };

    let time_cache = config
        .general
        .time_cache_secs
        .and_then(darc_core::constants::duration_from_secs_f64);
    let mut backoff = std::time::Duration::from_millis(200);
    loop {
        match SqlStore::connect(url, (*filters).clone(), time_cache).await {
            Ok(store) => {
                store.run_migrations().await?;
                return Ok(Arc::new(store));
            }
            Err(e) if retry_forever => {
                warn!(error = %e, backoff_ms = backoff.as_millis(), "work store unreachable, retrying (DARC_REDIS=1)");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(std::time::Duration::from_secs(60));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
