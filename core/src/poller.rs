//! Heartbeat and pending-request polling loops
//!
//! Two long-lived loops keep the client visible to the service and pull
//! new work. The heartbeat runs on its own thread with a dedicated
//! runtime so a stalled poll/dispatch cycle cannot starve it. Individual
//! iteration failures are logged and never terminate either loop; only
//! shutdown does.

use std::sync::Arc;

use tokio::time::sleep;
use uuid::Uuid;

use crate::assets::{localize_hosted_files, HttpAssetFetcher};
use crate::error::{Result, WavebindError};
use crate::protocol::{MessageStatus, PendingRecord, QueueRequest};
use crate::runner;
use crate::session::Session;
use crate::tracer::TraceStage;

pub struct PollingController {
    session: Arc<Session>,
}

impl PollingController {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Announces the registered method to the service, starts the
    /// heartbeat thread, and polls for pending requests until shutdown.
    pub async fn run(&self) -> Result<()> {
        self.announce().await?;
        self.spawn_heartbeat();
        self.poll_loop().await;
        Ok(())
    }

    /// Publishes the compute contract and connection mapping, then runs
    /// the setup hook bracketed by loaded-flag updates.
    pub async fn announce(&self) -> Result<()> {
        let session = &self.session;
        let identity = session.identity().ok_or(WavebindError::NoMethodRegistered)?;
        let master = session.master_token().ok_or(WavebindError::MasterTokenNotSet)?;
        let contract = session.contract().ok_or(WavebindError::NoMethodRegistered)?;
        let metadata = session.metadata();

        session
            .api()
            .create_compute_contract(identity, &contract)
            .await?;
        session
            .api()
            .add_connection_mapping(
                master,
                identity,
                &metadata.name,
                &metadata.description,
                &session.connection_type(),
            )
            .await?;

        self.run_setup_hook(identity).await;

        session
            .tracer()
            .event(Some(identity), TraceStage::Connection, "client announced to service");
        Ok(())
    }

    async fn run_setup_hook(&self, identity: Uuid) {
        let session = &self.session;
        if let Err(e) = session.api().update_connection_loaded(identity, false).await {
            tracing::warn!(error = %e, "failed to clear loaded flag");
        }
        if let Some(hook) = session.setup_hook() {
            if let Err(e) = hook().await {
                tracing::error!(error = %e, "setup hook failed");
            }
        }
        if let Err(e) = session.api().update_connection_loaded(identity, true).await {
            tracing::warn!(error = %e, "failed to set loaded flag");
        }
    }

    /// Heartbeat loop on a dedicated thread: a stalled poll or dispatch
    /// cycle must not delay liveness reporting.
    fn spawn_heartbeat(&self) {
        let session = self.session.clone();
        let interval = session.settings().heartbeat_interval;

        let spawned = std::thread::Builder::new()
            .name("wavebind-heartbeat".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to build heartbeat runtime");
                        return;
                    }
                };
                runtime.block_on(async move {
                    loop {
                        if session.is_shutdown() {
                            break;
                        }
                        if let Some(identity) = session.identity() {
                            match session.api().connection_heartbeat(identity).await {
                                Ok(()) => tracing::debug!("heartbeat ok"),
                                Err(e) => tracing::warn!(error = %e, "heartbeat failed"),
                            }
                        }
                        sleep(interval).await;
                    }
                });
            });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn heartbeat thread");
        }
    }

    async fn poll_loop(&self) {
        let interval = self.session.settings().poll_interval;
        loop {
            if self.session.is_shutdown() {
                break;
            }
            if let Err(e) = self.poll_once().await {
                tracing::warn!(error = %e, "poll iteration failed");
            }
            sleep(interval).await;
        }
    }

    /// One poll iteration: fetch pending records, process the ones
    /// addressed to this identity, mark failures errored on the service.
    pub async fn poll_once(&self) -> Result<()> {
        let session = &self.session;
        let Some(identity) = session.identity() else {
            return Ok(());
        };

        let records = session.api().fetch_pending_requests(identity).await?;
        for record in records {
            if record.token != identity {
                continue;
            }
            if let Err(e) = self.process_record(identity, &record).await {
                tracing::warn!(message_id = %record.id, error = %e, "failed to process pending request");
                if let Err(mark) = session
                    .api()
                    .update_message_status(identity, &record.id, MessageStatus::Error)
                    .await
                {
                    tracing::warn!(message_id = %record.id, error = %mark, "failed to mark request errored");
                }
            }
        }
        Ok(())
    }

    /// Marks the record processing, localizes hosted assets, and
    /// dispatches the invocation as a non-blocking task. Status moves to
    /// completed/error only through the aggregator's publish.
    async fn process_record(&self, identity: Uuid, record: &PendingRecord) -> Result<()> {
        let session = &self.session;
        session
            .api()
            .update_message_status(identity, &record.id, MessageStatus::Processing)
            .await?;

        let workspace = tempfile::tempdir()?;
        let mut request = record.request.clone();
        let fetcher = HttpAssetFetcher::new(
            session.api().http_client().clone(),
            workspace.path().to_path_buf(),
            session.input_targets(),
            session.tracer().clone(),
            Some(identity),
        );
        localize_hosted_files(
            &mut request,
            &session.settings().hosted_storage_prefix,
            &fetcher,
        )
        .await;

        match serde_json::from_value::<QueueRequest>(request)? {
            QueueRequest::RunMethod {
                data,
                bpm,
                sample_rate,
                ..
            } => {
                let Some(guard) = session.gate().try_begin() else {
                    session.tracer().event(
                        Some(identity),
                        TraceStage::RunMethod,
                        "invocation already in progress; rejecting request",
                    );
                    return Err(WavebindError::InvocationInProgress);
                };

                {
                    let results = session.results();
                    let mut results = results.lock().await;
                    results.clear();
                    results.set_message_id(record.id.clone());
                }
                session.set_clock(bpm, sample_rate);

                let args = data.arg_values();
                let task = runner::run(
                    session.clone(),
                    data.method_name,
                    args,
                    guard,
                    Some(workspace),
                );
                let _ = tokio::spawn(task);
            }
            QueueRequest::CloseConnection => {
                session.tracer().event(
                    Some(identity),
                    TraceStage::Connection,
                    "connection closed by service",
                );
                session.request_shutdown();
            }
        }
        Ok(())
    }
}
