//! Listener jobs: ID allocation, lifecycle, accept loops and connection tracking.
//!
//! Each running job owns one accept thread and one thread per agent
//! connection. The job keeps only a [`ShutdownHandle`] per connection, which
//! is how a stop unblocks handlers parked in a read or write.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use agentlink_frame::{FrameConfig, FrameError};
use agentlink_transport::{Connection, ShutdownHandle, TransportError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::handler::{serve_connection, ConnectionContext, EnvelopeHandler};
use crate::listener::{BoundListener, ListenerFactory, ListenerKind, ListenerParams};
use crate::profiles::{resolve_name, Profile, ProfileStore};

/// Identifier of a listener job. Allocated from 1 and never reused.
pub type JobId = u64;

/// How long an idle accept loop sleeps between polls.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Upper bound a stop waits for connection threads to exit.
pub const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Starting,
    Running,
    Stopped,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Stopped => "stopped",
            JobState::Failed => "failed",
        })
    }
}

/// Point-in-time copy of a job's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub kind: ListenerKind,
    /// Bound address; absent until the listener is bound.
    pub address: Option<String>,
    pub profile: String,
    pub owner: Option<String>,
    pub state: JobState,
    /// Seconds since the Unix epoch.
    pub started_at: u64,
    pub active_connections: usize,
    pub accepted_connections: u64,
    pub error: Option<String>,
}

struct JobStatus {
    state: JobState,
    address: Option<String>,
    error: Option<String>,
}

#[derive(Default)]
struct ConnectionSet {
    /// Set once the job stops; later connections are refused.
    closed: bool,
    next: u64,
    handles: HashMap<u64, ShutdownHandle>,
}

struct JobShared {
    id: JobId,
    kind: ListenerKind,
    profile: String,
    owner: Option<String>,
    started_at: u64,
    status: Mutex<JobStatus>,
    stop: AtomicBool,
    connections: Mutex<ConnectionSet>,
    drained: Condvar,
    accepted: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobShared {
    fn new(id: JobId, params: &ListenerParams) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            id,
            kind: params.kind,
            profile: resolve_name(&params.profile).to_string(),
            owner: params.owner.clone(),
            started_at,
            status: Mutex::new(JobStatus {
                state: JobState::Starting,
                address: None,
                error: None,
            }),
            stop: AtomicBool::new(false),
            connections: Mutex::new(ConnectionSet::default()),
            drained: Condvar::new(),
            accepted: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        let (state, address, error) = {
            let status = lock(&self.status);
            (status.state, status.address.clone(), status.error.clone())
        };
        JobSnapshot {
            id: self.id,
            kind: self.kind,
            address,
            profile: self.profile.clone(),
            owner: self.owner.clone(),
            state,
            started_at: self.started_at,
            active_connections: lock(&self.connections).handles.len(),
            accepted_connections: self.accepted.load(Ordering::Relaxed),
            error,
        }
    }

    fn set_address(&self, address: String) {
        lock(&self.status).address = Some(address);
    }

    fn mark_running(&self) {
        let mut status = lock(&self.status);
        if status.state == JobState::Starting {
            status.state = JobState::Running;
        }
    }

    fn mark_failed(&self, error: String) {
        let mut status = lock(&self.status);
        if status.state != JobState::Stopped {
            status.state = JobState::Failed;
            status.error = Some(error);
        }
    }

    fn mark_stopped(&self) {
        lock(&self.status).state = JobState::Stopped;
    }

    /// Refuse new connections and shut down every tracked one.
    fn close_connections(&self) {
        let mut set = lock(&self.connections);
        set.closed = true;
        for handle in set.handles.values() {
            if let Err(err) = handle.shutdown() {
                debug!(job_id = self.id, peer = handle.remote_addr(), error = %err, "connection shutdown failed");
            }
        }
    }

    /// Wait until every connection thread has exited or `timeout` passes.
    /// Returns the number still running.
    fn wait_drained(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut set = lock(&self.connections);
        while !set.handles.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            set = self
                .drained
                .wait_timeout(set, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        set.handles.len()
    }

    fn release(&self, connection_id: u64) {
        let mut set = lock(&self.connections);
        set.handles.remove(&connection_id);
        if set.handles.is_empty() {
            self.drained.notify_all();
        }
    }

    /// Register an accepted connection, or refuse it.
    fn admit(&self, conn: &Connection, max_connections: Option<usize>) -> Option<u64> {
        let handle = match conn.shutdown_handle() {
            Ok(handle) => handle,
            Err(err) => {
                warn!(job_id = self.id, peer = conn.remote_addr(), error = %err, "cannot track connection");
                return None;
            }
        };

        let mut set = lock(&self.connections);
        if set.closed {
            return None;
        }
        if let Some(max) = max_connections {
            if set.handles.len() >= max {
                warn!(
                    job_id = self.id,
                    peer = conn.remote_addr(),
                    max,
                    "connection limit reached, closing"
                );
                return None;
            }
        }
        set.next += 1;
        let connection_id = set.next;
        set.handles.insert(connection_id, handle);
        Some(connection_id)
    }
}

/// Removes a connection from its job when the connection thread exits.
struct ConnectionGuard {
    shared: Arc<JobShared>,
    connection_id: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.shared.release(self.connection_id);
    }
}

struct JobEntry {
    shared: Arc<JobShared>,
    accept: Option<JoinHandle<()>>,
}

/// Table of listener jobs.
pub struct JobRegistry {
    next_id: AtomicU64,
    jobs: Mutex<BTreeMap<JobId, JobEntry>>,
    profiles: Arc<ProfileStore>,
    handler: Arc<dyn EnvelopeHandler>,
    factory: ListenerFactory,
}

impl JobRegistry {
    pub fn new(profiles: Arc<ProfileStore>, handler: Arc<dyn EnvelopeHandler>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: Mutex::new(BTreeMap::new()),
            profiles,
            handler,
            factory: ListenerFactory,
        }
    }

    /// Allocate an ID, bind the listener and start its accept loop.
    ///
    /// The entry is recorded before binding. If anything after that fails the
    /// entry stays in the table as `Failed` until it is stopped.
    pub fn start(&self, params: ListenerParams) -> Result<JobSnapshot, JobError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(JobShared::new(id, &params));
        lock(&self.jobs).insert(
            id,
            JobEntry {
                shared: Arc::clone(&shared),
                accept: None,
            },
        );
        debug!(job_id = id, kind = %params.kind, profile = %shared.profile, "job starting");

        let fail = |err: JobError| {
            warn!(job_id = id, error = %err, "job failed to start");
            shared.mark_failed(error_text(&err));
            err
        };

        params
            .validate()
            .map_err(|reason| fail(JobError::InvalidParams { id, reason }))?;
        let profile = self
            .profiles
            .get(&params.profile)
            .map_err(|source| fail(JobError::Profile { id, source }))?;
        let listener = self
            .factory
            .bind(&params, &profile)
            .map_err(|source| fail(JobError::Bind { id, source }))?;
        shared.set_address(listener.address());

        let accept = {
            let shared = Arc::clone(&shared);
            let handler = Arc::clone(&self.handler);
            thread::Builder::new()
                .name(format!("job-{id}-accept"))
                .spawn(move || accept_loop(shared, listener, handler, profile))
                .map_err(|source| fail(JobError::Spawn { id, source }))?
        };

        let orphaned = {
            let mut jobs = lock(&self.jobs);
            match jobs.get_mut(&id) {
                Some(entry) => {
                    entry.accept = Some(accept);
                    None
                }
                None => Some(accept),
            }
        };
        // Stopped while binding; the stop flag is already set.
        if let Some(accept) = orphaned {
            join_accept(id, accept);
        } else {
            shared.mark_running();
        }

        let snapshot = shared.snapshot();
        info!(
            job_id = id,
            kind = %snapshot.kind,
            address = snapshot.address.as_deref().unwrap_or_default(),
            profile = %snapshot.profile,
            "job started"
        );
        Ok(snapshot)
    }

    /// Stop a job and remove it from the table.
    ///
    /// Returns the final snapshot, in state `Stopped`.
    pub fn stop(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        let entry = lock(&self.jobs).remove(&id).ok_or(JobError::NotFound(id))?;
        entry.shared.stop.store(true, Ordering::Release);
        entry.shared.close_connections();
        Ok(finish(entry))
    }

    /// Snapshots of every job, ordered by ID.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let shared: Vec<Arc<JobShared>> = lock(&self.jobs)
            .values()
            .map(|entry| Arc::clone(&entry.shared))
            .collect();
        shared.iter().map(|job| job.snapshot()).collect()
    }

    pub fn get(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        let shared = lock(&self.jobs)
            .get(&id)
            .map(|entry| Arc::clone(&entry.shared))
            .ok_or(JobError::NotFound(id))?;
        Ok(shared.snapshot())
    }

    /// Stop every job. Returns the final snapshots.
    pub fn shutdown(&self) -> Vec<JobSnapshot> {
        let entries = std::mem::take(&mut *lock(&self.jobs));
        if entries.is_empty() {
            return Vec::new();
        }
        // Signal all jobs before waiting on any of them.
        for entry in entries.values() {
            entry.shared.stop.store(true, Ordering::Release);
            entry.shared.close_connections();
        }
        let stopped: Vec<_> = entries.into_values().map(finish).collect();
        info!(count = stopped.len(), "all jobs stopped");
        stopped
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("jobs", &lock(&self.jobs).keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Join an accept thread, logging a panic instead of propagating it.
/// Returns whether the thread exited cleanly.
fn join_accept(job_id: JobId, accept: JoinHandle<()>) -> bool {
    let clean = accept.join().is_ok();
    if !clean {
        warn!(job_id, "accept loop panicked");
    }
    clean
}

/// Join the accept loop and wait for connection threads of a signalled job.
fn finish(entry: JobEntry) -> JobSnapshot {
    let shared = entry.shared;
    if let Some(accept) = entry.accept {
        join_accept(shared.id, accept);
    }
    let remaining = shared.wait_drained(CONNECTION_DRAIN_TIMEOUT);
    if remaining > 0 {
        warn!(job_id = shared.id, remaining, "connections still open after stop");
    }
    shared.mark_stopped();
    info!(job_id = shared.id, "job stopped");
    shared.snapshot()
}

fn error_text(err: &JobError) -> String {
    match err {
        JobError::Profile { source, .. } => source.to_string(),
        JobError::Bind { source, .. } => source.to_string(),
        JobError::InvalidParams { reason, .. } => reason.clone(),
        JobError::Spawn { source, .. } => source.to_string(),
        JobError::NotFound(_) => err.to_string(),
    }
}

fn is_transient(err: &TransportError) -> bool {
    use std::io::ErrorKind;
    match err {
        TransportError::Accept(io) | TransportError::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionAborted
                | ErrorKind::ConnectionReset
                | ErrorKind::Interrupted
                | ErrorKind::TimedOut
        ),
        _ => false,
    }
}

fn accept_loop(
    shared: Arc<JobShared>,
    listener: BoundListener,
    handler: Arc<dyn EnvelopeHandler>,
    profile: Arc<Profile>,
) {
    let frame_config = profile.config.frame_config();
    let max_connections = profile.config.max_connections;

    while !shared.stop.load(Ordering::Acquire) {
        match listener.accept_nonblocking() {
            Ok(Some(conn)) => {
                spawn_connection(&shared, conn, &handler, &frame_config, max_connections)
            }
            Ok(None) => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(err) if is_transient(&err) => {
                debug!(job_id = shared.id, error = %err, "transient accept error");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                warn!(job_id = shared.id, error = %err, "accept loop failed");
                shared.mark_failed(err.to_string());
                break;
            }
        }
    }
    debug!(job_id = shared.id, address = %listener.address(), "accept loop exiting");
}

fn spawn_connection(
    shared: &Arc<JobShared>,
    conn: Connection,
    handler: &Arc<dyn EnvelopeHandler>,
    config: &FrameConfig,
    max_connections: Option<usize>,
) {
    let Some(connection_id) = shared.admit(&conn, max_connections) else {
        let _ = conn.shutdown();
        return;
    };
    shared.accepted.fetch_add(1, Ordering::Relaxed);

    let ctx = ConnectionContext {
        job_id: shared.id,
        connection_id,
        remote: conn.remote_addr().to_string(),
        transport: conn.transport_name(),
        peer_credentials: conn.peer_credentials(),
    };
    debug!(job_id = ctx.job_id, connection_id, peer = %ctx.remote, "agent connected");

    let guard = ConnectionGuard {
        shared: Arc::clone(shared),
        connection_id,
    };
    let handler = Arc::clone(handler);
    let config = config.clone();
    let spawned = thread::Builder::new()
        .name(format!("job-{}-conn-{connection_id}", shared.id))
        .spawn(move || {
            let guard = guard;
            let result = serve_connection(conn, &ctx, handler.as_ref(), &config);
            log_connection_end(&guard.shared, &ctx, result);
        });
    // On spawn failure the closure, and with it the guard and the
    // connection, has already been dropped.
    if let Err(err) = spawned {
        warn!(job_id = shared.id, connection_id, error = %err, "failed to spawn connection thread");
    }
}

fn log_connection_end(shared: &JobShared, ctx: &ConnectionContext, result: Result<(), FrameError>) {
    match result {
        Ok(()) => debug!(job_id = ctx.job_id, peer = %ctx.remote, "agent disconnected"),
        Err(err) if shared.stop.load(Ordering::Acquire) => {
            debug!(job_id = ctx.job_id, peer = %ctx.remote, error = %err, "connection closed by stop")
        }
        Err(err) if err.is_transport() => {
            debug!(job_id = ctx.job_id, peer = %ctx.remote, error = %err, "connection lost")
        }
        Err(err) => {
            warn!(job_id = ctx.job_id, peer = %ctx.remote, error = %err, "connection ended with error")
        }
    }
}
