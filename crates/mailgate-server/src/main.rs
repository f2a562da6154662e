//! Mailgate server - wires the gateway services and serves the HTTP surface

use anyhow::Context;
use axum::{routing::get, Json, Router};
use clap::Parser;
use mailgate_core::GatewaySettings;
use mailgate_database::establish_connection;
use mailgate_delivery::{
    handlers as delivery_handlers, handlers::DeliveryApiDoc, providers::HttpProviderCredentials,
    DeliveryQueue, DnsProvider, DomainService, EmailProvider, EmailProviderKind, HttpDnsProvider,
    HttpEmailProvider, MockDnsProvider, MockEmailProvider, QueueWorker, TemplateService,
};
use mailgate_inbound::{
    HttpTicketingClient, InboundRouter, MessageIdStore, TenantResolver, TicketMatcher,
    TicketingClient,
};
use mailgate_webhooks::{
    handlers as webhook_handlers, handlers::WebhooksApiDoc, EmailEventCorrelator,
    SubscriptionService, WebhookDispatcher,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Mailgate - multi-tenant transactional email gateway"
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MAILGATE_LOG_LEVEL")]
    log_level: String,

    /// Database connection URL
    #[arg(
        long,
        default_value = "sqlite://mailgate.db?mode=rwc",
        env = "DATABASE_URL"
    )]
    database_url: String,

    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0:8080", env = "MAILGATE_BIND")]
    bind: String,

    /// Email provider kind: http or mock
    #[arg(long, default_value = "mock", env = "MAILGATE_PROVIDER")]
    provider: String,

    /// Base URL of the http email provider
    #[arg(long, env = "MAILGATE_PROVIDER_URL")]
    provider_url: Option<String>,

    /// API key for the http email provider
    #[arg(long, env = "MAILGATE_PROVIDER_API_KEY")]
    provider_api_key: Option<String>,

    /// Base URL of the DNS provider API
    #[arg(long, env = "MAILGATE_DNS_URL")]
    dns_url: Option<String>,

    /// API token for the DNS provider
    #[arg(long, env = "MAILGATE_DNS_TOKEN")]
    dns_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins when set; otherwise fall back to the CLI log level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = GatewaySettings::from_env();

    let db = establish_connection(&cli.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    info!("Database ready at {}", cli.database_url);

    // Outbound side: provider, domains, templates, queue, worker
    let provider: Arc<dyn EmailProvider> = match EmailProviderKind::from_str(&cli.provider)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
    {
        EmailProviderKind::Http => {
            let base_url = cli
                .provider_url
                .clone()
                .context("--provider-url is required for the http provider")?;
            Arc::new(HttpEmailProvider::new(&HttpProviderCredentials {
                base_url,
                api_key: cli.provider_api_key.clone().unwrap_or_default(),
            }))
        }
        EmailProviderKind::Mock => {
            info!("Using the mock email provider (capture mode, nothing leaves the process)");
            Arc::new(MockEmailProvider::new())
        }
    };

    let dns: Arc<dyn DnsProvider> = match (&cli.dns_url, &cli.dns_token) {
        (Some(url), Some(token)) => Arc::new(HttpDnsProvider::new(url, token)),
        _ => {
            info!("No DNS provider configured, using the mock provider");
            Arc::new(MockDnsProvider::new())
        }
    };

    let templates = Arc::new(TemplateService::new(db.clone()));
    let domains = Arc::new(DomainService::new(db.clone(), provider.clone(), dns));
    let dispatcher = Arc::new(WebhookDispatcher::new(db.clone(), settings.webhooks.clone()));

    let queue = Arc::new(
        DeliveryQueue::new(
            db.clone(),
            templates,
            provider,
            domains.clone(),
            settings.clone(),
        )
        .with_event_sink(dispatcher.clone()),
    );

    let worker = QueueWorker::new(queue.clone());
    worker
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start queue worker: {}", e))?;

    // Inbound side: ticketing, matcher, router, correlator
    let ticketing: Arc<dyn TicketingClient> =
        Arc::new(HttpTicketingClient::new(&settings.ticketing));
    let store = Arc::new(MessageIdStore::new(db.clone()));
    let resolver = Arc::new(TenantResolver::new(
        db.clone(),
        &settings.base_domain,
        &settings.inbound.support_local,
    ));
    let matcher = Arc::new(TicketMatcher::new(store.clone(), ticketing.clone()));
    let inbound_router = Arc::new(InboundRouter::new(resolver, matcher, store, ticketing));
    let correlator = Arc::new(EmailEventCorrelator::new(db.clone(), dispatcher));
    let subscriptions = Arc::new(SubscriptionService::new(db.clone()));

    let delivery_state = Arc::new(delivery_handlers::AppState {
        queue,
        domains,
    });
    let webhook_state = Arc::new(webhook_handlers::AppState {
        router: inbound_router,
        correlator: correlator.clone(),
        subscriptions,
        signing_secret: settings.inbound.signing_secret.clone(),
    });

    let mut openapi = DeliveryApiDoc::openapi();
    openapi.merge(WebhooksApiDoc::openapi());

    let api = delivery_handlers::routes()
        .with_state(delivery_state)
        .merge(webhook_handlers::routes().with_state(webhook_state));

    let app = Router::new()
        .nest("/api", api)
        .route(
            "/api-docs/openapi.json",
            get(move || {
                let doc = openapi.clone();
                async move { Json(doc) }
            }),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    info!("Mailgate listening on {}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain the in-flight tick and pending webhook fan-outs before exiting
    worker.stop().await;
    correlator.drain().await;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
    info!("Shutdown signal received");
}
