use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xdsgate::api::handlers::pnr::PnrState;
use xdsgate::api::{health_routes, pnr_routes};
use xdsgate::audit::AuditEmitter;
use xdsgate::config::{Config, ResolverBackend};
use xdsgate::dsub::{DsubBroadcaster, DsubNotifier};
use xdsgate::middleware::{CorrelationIdLayer, LoggingLayer};
use xdsgate::orchestration::Orchestrator;
use xdsgate::resolve::{FhirClient, IdentifierResolver, IdentityFeed, InternalResolver, PixClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xdsgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!("Starting XDS mediator on {}", config.server_addr());

    let audit = AuditEmitter::spawn();

    // Patient resolution and identity feed share a backend; provider and
    // facility lookups are table-driven.
    let (patient_resolver, identity_feed): (Arc<dyn IdentifierResolver>, Arc<dyn IdentityFeed>) =
        match config.patient_resolver {
            ResolverBackend::Pix => {
                let client = Arc::new(PixClient::new(config.pix.clone(), audit.clone()));
                (client.clone(), client)
            }
            ResolverBackend::Fhir => {
                let client = Arc::new(FhirClient::new(config.fhir.clone(), audit.clone()));
                (client.clone(), client)
            }
            ResolverBackend::Internal => {
                let resolver = Arc::new(InternalResolver::passthrough());
                let client = Arc::new(FhirClient::new(config.fhir.clone(), audit.clone()));
                (resolver, client)
            }
        };
    let provider_resolver = Arc::new(InternalResolver::passthrough());
    let facility_resolver = Arc::new(InternalResolver::passthrough());

    let dsub = DsubBroadcaster::new();
    DsubNotifier::spawn(&dsub, config.dsub_consumer_urls.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        patient_resolver,
        provider_resolver,
        facility_resolver,
        identity_feed,
        audit,
        dsub,
    ));

    let pnr_state = Arc::new(PnrState {
        orchestrator,
        config: config.clone(),
    });

    // Build application routes
    let app = Router::new()
        .merge(pnr_routes(pnr_state))
        .merge(health_routes())
        .layer(LoggingLayer)
        .layer(CorrelationIdLayer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server_addr()).await?;
    tracing::info!("Listening on {}", config.server_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
