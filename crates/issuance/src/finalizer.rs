//! Post-authorization work: RIDE rendering and email delivery.
//!
//! Jobs run on a bounded pool of tokio workers, off the issuance call path.
//! Failures are logged and counted, never propagated back to the issuer of
//! the document, and never touch the receipt's authorized status.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use einvoice_fiscal::{AccessKey, FiscalDocument, ReceiptStatus};
use einvoice_infra::mail::{MailError, Mailer};
use einvoice_infra::render::{ReceiptRenderer, RideMetadata};
use einvoice_infra::repo::{IssuerRepository, ReceiptRepository, TaxPayerRepository};

use crate::error::{IssuanceError, IssuanceResult};

/// Work item: finalize the receipt with this access key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeJob {
    pub access_key: AccessKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub ride: PathBuf,
    pub emailed: bool,
}

/// Does the actual finalization of one receipt.
pub struct Finalizer {
    receipts: Arc<dyn ReceiptRepository>,
    issuers: Arc<dyn IssuerRepository>,
    taxpayers: Arc<dyn TaxPayerRepository>,
    renderer: Arc<dyn ReceiptRenderer>,
    mailer: Arc<dyn Mailer>,
    scratch_dir: PathBuf,
}

impl Finalizer {
    pub fn new(
        receipts: Arc<dyn ReceiptRepository>,
        issuers: Arc<dyn IssuerRepository>,
        taxpayers: Arc<dyn TaxPayerRepository>,
        renderer: Arc<dyn ReceiptRenderer>,
        mailer: Arc<dyn Mailer>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            receipts,
            issuers,
            taxpayers,
            renderer,
            mailer,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub async fn finalize(&self, access_key: &AccessKey) -> IssuanceResult<FinalizeOutcome> {
        let receipt = self
            .receipts
            .get_by_access_key(access_key)
            .await?
            .ok_or_else(|| IssuanceError::NotFound(format!("receipt {access_key}")))?;
        if receipt.status != ReceiptStatus::Autorizado {
            return Err(IssuanceError::Validation(format!(
                "receipt {access_key} is {}, only authorized receipts are finalized",
                receipt.status
            )));
        }

        let issuer = self
            .issuers
            .get_active()
            .await?
            .ok_or_else(|| IssuanceError::Configuration("no active issuer".into()))?;
        let buyer = self.taxpayers.get_by_id(receipt.taxpayer_id).await?;
        let email = buyer
            .as_ref()
            .and_then(|b| b.contact_email())
            .map(str::to_string);

        let document = FiscalDocument::parse(receipt.document_type, &receipt.xml_content)?;
        let metadata = RideMetadata {
            status: receipt.status,
            authorization_number: Some(receipt.access_key.to_string()),
            authorization_date: receipt.authorization_date,
            buyer_email: email.clone(),
        };
        let ride = self.renderer.render(&document, &metadata).await?;

        let Some(recipient) = email else {
            debug!(access_key = %access_key, "buyer has no email, skipping delivery");
            return Ok(FinalizeOutcome {
                ride,
                emailed: false,
            });
        };

        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let xml_path = self.scratch_dir.join(format!("{access_key}.xml"));
        tokio::fs::write(&xml_path, receipt.xml_content.as_bytes()).await?;

        let sent = self
            .mailer
            .send(
                &issuer,
                &recipient,
                receipt.document_type,
                &[xml_path.clone(), ride.clone()],
            )
            .await;
        if let Err(e) = tokio::fs::remove_file(&xml_path).await {
            debug!(path = %xml_path.display(), error = %e, "could not remove staged xml");
        }

        let emailed = match sent {
            Ok(()) => true,
            Err(MailError::Disabled) => {
                debug!(access_key = %access_key, "mail disabled, receipt not sent");
                false
            }
            Err(e) => {
                warn!(access_key = %access_key, recipient = %recipient, error = %e, "email delivery failed");
                false
            }
        };
        self.receipts.update_email_sent(access_key, emailed).await?;

        Ok(FinalizeOutcome { ride, emailed })
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct FinalizerPoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Name for logging
    pub name: String,
}

impl Default for FinalizerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            name: "finalizer".to_string(),
        }
    }
}

impl FinalizerPoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinalizerStats {
    pub jobs_queued: u64,
    pub jobs_rejected: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub emails_sent: u64,
    pub current_running: usize,
}

#[derive(Debug, Default)]
struct StatsCell {
    queued: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    emailed: AtomicU64,
    running: AtomicUsize,
}

impl StatsCell {
    fn snapshot(&self) -> FinalizerStats {
        FinalizerStats {
            jobs_queued: self.queued.load(Ordering::Relaxed),
            jobs_rejected: self.rejected.load(Ordering::Relaxed),
            jobs_succeeded: self.succeeded.load(Ordering::Relaxed),
            jobs_failed: self.failed.load(Ordering::Relaxed),
            emails_sent: self.emailed.load(Ordering::Relaxed),
            current_running: self.running.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("finalizer queue is full")]
    Full,
    #[error("finalizer is shut down")]
    Closed,
}

/// Producer side of the pool. Cheap to clone; all clones close together.
#[derive(Debug, Clone)]
pub struct FinalizerQueue {
    tx: Arc<Mutex<Option<mpsc::Sender<FinalizeJob>>>>,
    stats: Arc<StatsCell>,
}

impl FinalizerQueue {
    /// Enqueues without waiting. A full queue is reported, not awaited.
    pub fn schedule(&self, job: FinalizeJob) -> Result<(), ScheduleError> {
        let guard = self.tx.lock().map_err(|_| ScheduleError::Closed)?;
        let tx = guard.as_ref().ok_or(ScheduleError::Closed)?;
        match tx.try_send(job) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Err(ScheduleError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ScheduleError::Closed),
        }
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}

/// Handle to drain and stop a running pool.
#[derive(Debug)]
pub struct FinalizerHandle {
    queue: FinalizerQueue,
    workers: Vec<JoinHandle<()>>,
    name: String,
}

impl FinalizerHandle {
    /// Stops accepting jobs, finishes everything already queued, then returns
    /// the final counters.
    pub async fn shutdown(self) -> FinalizerStats {
        self.queue.close();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(pool = %self.name, error = %e, "finalizer worker panicked");
            }
        }
        info!(pool = %self.name, "finalizer pool stopped");
        self.queue.stats.snapshot()
    }

    pub fn stats(&self) -> FinalizerStats {
        self.queue.stats.snapshot()
    }

    pub fn queue(&self) -> FinalizerQueue {
        self.queue.clone()
    }
}

pub struct FinalizerPool;

impl FinalizerPool {
    /// Spawns `config.workers` tasks on the current runtime.
    pub fn spawn(finalizer: Arc<Finalizer>, config: FinalizerPoolConfig) -> FinalizerHandle {
        let (tx, rx) = mpsc::channel::<FinalizeJob>(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let stats = Arc::new(StatsCell::default());

        let workers = (0..config.workers.max(1))
            .map(|index| {
                tokio::spawn(worker_loop(
                    config.name.clone(),
                    index,
                    Arc::clone(&rx),
                    Arc::clone(&finalizer),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        info!(pool = %config.name, workers = config.workers.max(1), "finalizer pool started");

        FinalizerHandle {
            queue: FinalizerQueue {
                tx: Arc::new(Mutex::new(Some(tx))),
                stats,
            },
            workers,
            name: config.name,
        }
    }
}

async fn worker_loop(
    name: String,
    index: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<FinalizeJob>>>,
    finalizer: Arc<Finalizer>,
    stats: Arc<StatsCell>,
) {
    loop {
        // The lock is only held while waiting; jobs run concurrently.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else { break };

        stats.running.fetch_add(1, Ordering::Relaxed);
        match finalizer.finalize(&job.access_key).await {
            Ok(outcome) => {
                stats.succeeded.fetch_add(1, Ordering::Relaxed);
                if outcome.emailed {
                    stats.emailed.fetch_add(1, Ordering::Relaxed);
                }
                info!(
                    pool = %name,
                    worker = index,
                    access_key = %job.access_key,
                    ride = %outcome.ride.display(),
                    emailed = outcome.emailed,
                    "receipt finalized"
                );
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    pool = %name,
                    worker = index,
                    access_key = %job.access_key,
                    error = %e,
                    "finalization failed"
                );
            }
        }
        stats.running.fetch_sub(1, Ordering::Relaxed);
    }
    debug!(pool = %name, worker = index, "finalizer worker exiting");
}
