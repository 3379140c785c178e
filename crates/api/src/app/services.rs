//! Engine wiring: stores, collaborators and background workers from [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use einvoice_infra::authority::{SoapClient, TaxAuthorityClient};
use einvoice_infra::config::AppConfig;
use einvoice_infra::mail::{DisabledMailer, HttpMailer, Mailer};
use einvoice_infra::render::{ReceiptRenderer, TextRideRenderer};
use einvoice_infra::repo::{InMemoryStore, PostgresStore};
use einvoice_infra::signer::{CommandSigner, DocumentSigner};
use einvoice_issuance::{
    Finalizer, FinalizerHandle, FinalizerPool, FinalizerPoolConfig, IssuanceConfig,
    IssuanceService, Reconciler, ReconcilerConfig, ReconcilerHandle, Repositories,
};

/// What the HTTP handlers share.
#[derive(Clone)]
pub struct AppServices {
    pub issuance: IssuanceService,
}

impl AppServices {
    pub fn new(issuance: IssuanceService) -> Self {
        Self { issuance }
    }
}

/// Workers that outlive a single request.
pub struct Background {
    finalizer: FinalizerHandle,
    reconciler: Option<ReconcilerHandle>,
}

impl Background {
    /// Stops the reconciler first so it cannot schedule more finalizer work,
    /// then drains the finalizer queue.
    pub async fn shutdown(self) {
        if let Some(reconciler) = self.reconciler {
            reconciler.shutdown().await;
        }
        let stats = self.finalizer.shutdown().await;
        tracing::info!(
            jobs_succeeded = stats.jobs_succeeded,
            jobs_failed = stats.jobs_failed,
            emails_sent = stats.emails_sent,
            "background workers stopped"
        );
    }
}

async fn build_repositories(config: &AppConfig) -> anyhow::Result<Repositories> {
    match &config.database.url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database.max_connections)
                .await
                .context("failed to connect to postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to apply database schema")?;
            tracing::info!(max_connections = config.database.max_connections, "using postgres store");
            Ok(Repositories::from_store(Arc::new(store)))
        }
        None => {
            tracing::warn!("no database configured; using an empty in-memory store");
            Ok(Repositories::from_store(InMemoryStore::arc()))
        }
    }
}

fn build_mailer(config: &AppConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match &config.mail.api_key {
        Some(key) => {
            let mailer = HttpMailer::new(
                &config.mail.endpoint,
                key,
                &config.mail.sender,
                Duration::from_secs(config.mail.timeout_secs),
            )
            .context("failed to build mail client")?;
            Ok(Arc::new(mailer))
        }
        None => {
            tracing::warn!("mail.api_key not set; receipts will not be emailed");
            Ok(Arc::new(DisabledMailer))
        }
    }
}

/// Builds the engine and starts its background workers on the current runtime.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<(AppServices, Background)> {
    let repos = build_repositories(config).await?;

    let signer: Arc<dyn DocumentSigner> = Arc::new(CommandSigner::new(
        config.signer.program.clone(),
        config.signer.args.clone(),
    ));
    let authority: Arc<dyn TaxAuthorityClient> = Arc::new(
        SoapClient::new(config.authority.endpoints(), config.authority.request_timeout())
            .context("failed to build authority client")?,
    );
    let renderer: Arc<dyn ReceiptRenderer> =
        Arc::new(TextRideRenderer::new(config.finalizer.output_dir.clone()));
    let mailer = build_mailer(config)?;

    let finalizer = Arc::new(Finalizer::new(
        repos.receipts.clone(),
        repos.issuers.clone(),
        repos.taxpayers.clone(),
        renderer.clone(),
        mailer,
        config.finalizer.output_dir.join("outbox"),
    ));
    let finalizer = FinalizerPool::spawn(
        finalizer,
        FinalizerPoolConfig::default()
            .with_workers(config.finalizer.workers)
            .with_queue_capacity(config.finalizer.queue_capacity),
    );

    let issuance = IssuanceService::new(
        repos,
        signer,
        authority,
        renderer,
        IssuanceConfig::from(&config.issuance),
    )
    .with_finalizer(finalizer.queue());

    let reconciler = if config.reconciler.enabled {
        let mut reconciler_config = ReconcilerConfig::default()
            .with_interval(Duration::from_secs(config.reconciler.interval_secs.max(1)));
        if let Some(hours) = config.reconciler.window_hours {
            reconciler_config = reconciler_config.with_window(chrono::Duration::hours(hours));
        }
        Some(Reconciler::spawn(Arc::new(issuance.clone()), reconciler_config))
    } else {
        tracing::info!("reconciler disabled");
        None
    };

    Ok((
        AppServices::new(issuance),
        Background {
            finalizer,
            reconciler,
        },
    ))
}
