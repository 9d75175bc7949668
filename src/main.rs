use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use pawmatch_swipe::config::{LoggingSettings, Settings};
use pawmatch_swipe::core::{
    CompatibilityEngine, EntitlementResolver, SwipeProcessor, SystemClock, UsageCounterService,
};
use pawmatch_swipe::routes::{self, AppState};
use pawmatch_swipe::services::{
    AppwriteProfileStore, CacheManager, CachedProfileStore, DisabledScorer, HttpRemoteScorer,
    InMemoryProfiles, InMemoryStore, LogNotifier, MatchNotifier, PostgresStore, ProfileStore,
    RemoteScorer, SwipeStore, WebhookNotifier,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn startup_error(what: &str, e: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", what, e);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", what, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_tracing(&settings.logging);
    info!("Starting PawMatch swipe ledger service...");

    // Ledger store
    let database_url = settings.database.url.as_deref().filter(|url| !url.is_empty());
    let (store, postgres) = match database_url {
        Some(url) => {
            let pg = Arc::new(
                PostgresStore::from_settings(
                    url,
                    settings.database.max_connections,
                    settings.database.min_connections,
                    settings.database.acquire_timeout_secs,
                    settings.database.idle_timeout_secs,
                )
                .await
                .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?,
            );
            info!("PostgreSQL ledger initialized");
            (pg.clone() as Arc<dyn SwipeStore>, Some(pg))
        }
        None => {
            warn!("No database URL configured, keeping the ledger in memory");
            (Arc::new(InMemoryStore::new()) as Arc<dyn SwipeStore>, None)
        }
    };

    // Profile source behind the cache
    let cache = match CacheManager::new(
        settings.cache.redis_url.as_deref(),
        settings.cache.l1_cache_size,
        settings.cache.ttl_secs,
    )
    .await
    {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to connect to Redis ({}), using the in-process cache only", e);
            CacheManager::local_only(settings.cache.l1_cache_size, settings.cache.ttl_secs)
        }
    };
    info!(
        "Cache manager initialized (L1: {} entries, TTL: {}s, shared tier: {})",
        settings.cache.l1_cache_size,
        settings.cache.ttl_secs,
        cache.has_shared_tier()
    );

    let source: Arc<dyn ProfileStore> = match &settings.profiles.endpoint {
        Some(endpoint) => Arc::new(
            AppwriteProfileStore::new(
                endpoint.clone(),
                settings.profiles.api_key.clone(),
                settings.profiles.project_id.clone(),
                settings.profiles.database_id.clone(),
                settings.profiles.collection.clone(),
                Duration::from_secs(settings.profiles.timeout_secs),
            )
            .map_err(|e| startup_error("Failed to build Appwrite client", e))?,
        ),
        None => {
            warn!("No profile endpoint configured, serving an empty in-memory profile set");
            Arc::new(InMemoryProfiles::new())
        }
    };
    let profiles: Arc<dyn ProfileStore> =
        Arc::new(CachedProfileStore::new(source, Arc::new(cache)));

    // Remote scorer
    let scorer_endpoint = (&settings.compatibility.endpoint, settings.compatibility.enabled);
    let remote: Arc<dyn RemoteScorer> = match scorer_endpoint {
        (Some(endpoint), true) => Arc::new(
            HttpRemoteScorer::new(endpoint.clone(), settings.compatibility.api_key.clone())
                .map_err(|e| startup_error("Failed to build remote scorer", e))?,
        ),
        _ => {
            info!("Remote scorer disabled, compatibility uses the local fallback");
            Arc::new(DisabledScorer)
        }
    };
    let compatibility =
        CompatibilityEngine::new(profiles.clone(), remote, settings.compatibility.timeout_ms)
            .with_age_span(settings.compatibility.age_span_years);

    // Match notifier
    let notifier: Arc<dyn MatchNotifier> = match &settings.notifier.webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url.clone(), Duration::from_secs(settings.notifier.timeout_secs))
                .map_err(|e| startup_error("Failed to build webhook notifier", e))?,
        ),
        None => Arc::new(LogNotifier),
    };

    // Swipe processor
    let clock = Arc::new(SystemClock);
    let usage = UsageCounterService::new(store.clone(), clock.clone(), settings.usage.policy());
    let gate = Arc::new(EntitlementResolver::new(settings.entitlements.policy(), usage.clone()));
    let processor = SwipeProcessor::new(store, profiles, gate, usage, notifier, clock);

    info!(
        "Entitlements: premium {:?}, gold {:?}, period {} days",
        settings.entitlements.premium, settings.entitlements.gold, settings.usage.period_days
    );

    let app_state = AppState {
        processor: Arc::new(processor),
        compatibility: Arc::new(compatibility),
        postgres,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(routes::handle_json_payload_error))
            .app_data(web::PathConfig::default().error_handler(routes::handle_path_error))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
