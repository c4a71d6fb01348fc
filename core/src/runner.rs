//! Invocation execution and the single-invocation gate
//!
//! At most one invocation runs at a time, enforced by an atomic
//! check-and-set gate acquired at the dispatch site. The runner fills
//! contract defaults, captures process stdout/stderr for the duration of
//! the call, and funnels both success and failure into the aggregator's
//! publish.

use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Mutex;

use crate::contract::ArgMap;
use crate::error::Result;
use crate::results::ResultsAggregator;
use crate::session::Session;
use crate::tracer::TraceStage;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Atomic run-state gate. Finishing stores Stopped rather than Idle, so
/// observers only distinguish running from not-running.
#[derive(Clone)]
pub struct RunGate {
    state: Arc<AtomicU8>,
}

impl RunGate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(STATE_IDLE)),
        }
    }

    /// Atomically claims the gate; None when an invocation is active
    pub fn try_begin(&self) -> Option<RunGuard> {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current == STATE_RUNNING {
                return None;
            }
            if self
                .state
                .compare_exchange(current, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(RunGuard {
                    state: self.state.clone(),
                });
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_RUNNING
    }
}

impl Default for RunGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the gate on every exit path, panics included
pub struct RunGuard {
    state: Arc<AtomicU8>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.store(STATE_STOPPED, Ordering::Release);
    }
}

/// Everything a registered method sees for one invocation: its arguments,
/// the caller's session clock, and a handle for reporting outputs.
pub struct Invocation {
    args: ArgMap,
    bpm: f64,
    sample_rate: u32,
    results: Arc<Mutex<ResultsAggregator>>,
}

impl Invocation {
    pub fn new(
        args: ArgMap,
        bpm: f64,
        sample_rate: u32,
        results: Arc<Mutex<ResultsAggregator>>,
    ) -> Self {
        Self {
            args,
            bpm,
            sample_rate,
            results,
        }
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    pub fn arg_bool(&self, name: &str) -> Option<bool> {
        self.args.get(name).and_then(Value::as_bool)
    }

    pub fn arg_i64(&self, name: &str) -> Option<i64> {
        self.args.get(name).and_then(Value::as_i64)
    }

    pub fn arg_f64(&self, name: &str) -> Option<f64> {
        self.args.get(name).and_then(Value::as_f64)
    }

    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    /// Local path of a file-reference argument, if one was supplied
    pub fn arg_file(&self, name: &str) -> Option<&str> {
        self.arg_str(name)
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub async fn add_file(&self, path: &Path) -> bool {
        self.results.lock().await.add_file(path).await
    }

    pub async fn add_file_url(&self, url: &str, file_type: &str) -> bool {
        self.results.lock().await.add_file_url(url, file_type)
    }

    pub async fn add_message(&self, message: impl Into<String>) {
        self.results.lock().await.add_message(message);
    }

    pub async fn add_error(&self, error: impl Into<String>) {
        self.results.lock().await.add_error(error);
    }

    pub async fn add_log(&self, log: &str) {
        self.results.lock().await.add_log(log);
    }
}

/// Executes the registered method. The guard is claimed by the dispatch
/// site; `workspace` keeps downloaded request assets alive for the
/// duration of the call.
pub async fn run(
    session: Arc<Session>,
    name: String,
    mut args: ArgMap,
    guard: RunGuard,
    workspace: Option<TempDir>,
) -> Result<()> {
    let _guard = guard;
    let _workspace = workspace;

    let method = session.registered_method(&name)?;
    method.contract.fill_defaults(&mut args);

    let invocation = Invocation::new(
        args,
        session.bpm(),
        session.sample_rate(),
        session.results(),
    );

    // Redirect the process output streams for the duration of the call;
    // dropping the redirects restores them on every path.
    let stdout_capture = gag::BufferRedirect::stdout().ok();
    let stderr_capture = gag::BufferRedirect::stderr().ok();

    let outcome = (method.handler)(invocation).await;

    let mut captured = String::new();
    if let Some(mut redirect) = stdout_capture {
        let _ = redirect.read_to_string(&mut captured);
    }
    if let Some(mut redirect) = stderr_capture {
        let _ = redirect.read_to_string(&mut captured);
    }
    if !captured.is_empty() {
        session.results().lock().await.add_log(&captured);
    }

    let identity = Some(method.identity);
    match outcome {
        Ok(()) => {
            session.tracer().event(
                identity,
                TraceStage::RunMethod,
                &format!("ran method: {}", name),
            );
            let results = session.results();
            let locked = results.lock().await;
            if let Err(e) = locked.publish().await {
                session
                    .tracer()
                    .error(identity, TraceStage::SendResults, &e.to_string());
                return Err(e);
            }
        }
        Err(e) => {
            session.tracer().error(
                identity,
                TraceStage::RunMethod,
                &format!("error running method: {}", e),
            );
            let results = session.results();
            let mut locked = results.lock().await;
            locked.add_error(format!("ERROR: {}", e));
            if let Err(send_err) = locked.publish().await {
                session
                    .tracer()
                    .error(identity, TraceStage::SendResults, &send_err.to_string());
                return Err(send_err);
            }
        }
    }

    Ok(())
}
