//! # Tunnel supervisor: the exclusive owner of both stage processes.
//!
//! [`TunnelSupervisor`] drives the two-stage start sequence, owns teardown,
//! and publishes every observable change on the event bus:
//!
//! ```text
//! apply(profile)
//!   ├─ no-op check (same profile, transport alive)
//!   ├─ CleaningUp: cancel watchers, kill owned handles, sweep strays
//!   ├─ StartingTunnel: provision ──► launch ──► marker wait ──► drainer
//!   ├─ StartingForwarder: secure key ──► provision ──► launch ──► settle
//!   └─ Running: spawn health monitor
//! ```
//!
//! ## Rules
//! - One `tokio::sync::Mutex` serializes `apply`, `stop`, and every
//!   monitor-triggered restart; `status()` reads a lock-free cache instead.
//! - Every `apply` ends in a published terminal status (`Running`, `Failed`,
//!   or `Idle` after a concurrent stop); callers never hang on silence.
//! - A failed forwarder start also kills the transport: a half-open chain
//!   is never left as a running state.
//! - The watcher token tree (drainers + monitor) is regenerated on every
//!   start and cancelled on every teardown, so watchers of a previous
//!   generation can never act on the current one.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{SupervisorConfig, TunnelConfig};
use crate::error::TunnelError;
use crate::events::{Bus, Event, StageStatus, StatusSnapshot};
use crate::process::{kill_stray, launch, OutputLines, ProcessHandle, Provisioner};
use crate::readiness::{await_ready, ReadinessResult};
use crate::stages::{Stage, StageSpec};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::supervisor::monitor;
use crate::supervisor::state::SupervisorState;

/// Mutable state behind the exclusive lock.
pub(super) struct TunnelState {
    /// Profile currently in effect; `None` when stopped or failed.
    pub(super) applied: Option<TunnelConfig>,
    pub(super) tunnel: Option<ProcessHandle>,
    pub(super) forwarder: Option<ProcessHandle>,
    /// Root token of the current watcher generation (drainers + monitor).
    pub(super) watchers: CancellationToken,
    /// Consecutive monitor-observed failures; reset on a healthy tick or a
    /// fresh external `apply`.
    pub(super) consecutive_failures: u32,
}

/// Lock-free view served by `status()` / `state()`.
struct Observed {
    state: SupervisorState,
    status: StatusSnapshot,
}

pub(super) struct Inner {
    pub(super) cfg: SupervisorConfig,
    pub(super) bus: Bus,
    pub(super) state: Mutex<TunnelState>,
    observed: RwLock<Observed>,
}

/// Supervises the two-stage tunnel chain. Cheap to clone.
#[derive(Clone)]
pub struct TunnelSupervisor {
    inner: Arc<Inner>,
}

impl TunnelSupervisor {
    /// Creates a supervisor in `Idle` and wires `subscribers` to the bus.
    ///
    /// Each subscriber gets its own bounded queue and worker; the fan-out
    /// listener shuts the workers down once the supervisor (and with it the
    /// bus sender) is dropped.
    pub fn new(cfg: SupervisorConfig, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let set = SubscriberSet::new(subscribers, bus.clone());
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            use tokio::sync::broadcast::error::RecvError;
            loop {
                match rx.recv().await {
                    Ok(ev) => set.deliver(Arc::new(ev)),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            set.shutdown().await;
        });

        Self {
            inner: Arc::new(Inner {
                cfg,
                bus,
                state: Mutex::new(TunnelState {
                    applied: None,
                    tunnel: None,
                    forwarder: None,
                    watchers: CancellationToken::new(),
                    consecutive_failures: 0,
                }),
                observed: RwLock::new(Observed {
                    state: SupervisorState::Idle,
                    status: StatusSnapshot::stopped(),
                }),
            }),
        }
    }

    /// Applies a tunnel profile: tears down whatever runs and starts the
    /// two-stage chain for `profile`.
    ///
    /// Blocks while another `apply`/`stop` (or monitor restart) is in
    /// flight. Returns once the chain is `Running` or the attempt failed.
    pub async fn apply(&self, profile: TunnelConfig) -> Result<(), TunnelError> {
        profile.validate()?;
        let mut st = self.inner.state.lock().await;
        // An operator-driven apply starts a fresh failure budget.
        st.consecutive_failures = 0;
        self.apply_locked(&mut st, profile).await
    }

    /// Stops both stages and returns to `Idle`. Safe to call in any state.
    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        self.transition(SupervisorState::Stopping, StatusSnapshot::stopping());
        Self::reset_watchers(&mut st);
        self.teardown(&mut st).await;
        st.applied = None;
        st.consecutive_failures = 0;
        self.transition(SupervisorState::Idle, StatusSnapshot::stopped());
    }

    /// Current combined stage status; never blocks on the supervisor lock.
    pub fn status(&self) -> StatusSnapshot {
        self.observed().status.clone()
    }

    /// Current lifecycle state; never blocks on the supervisor lock.
    pub fn state(&self) -> SupervisorState {
        self.observed().state
    }

    /// Subscribes to the live event stream (status, log lines, overflow).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// Runtime configuration this supervisor was built with.
    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.cfg
    }

    /// Process ids of the (tunnel, forwarder) stages, if owned and spawned.
    pub async fn pids(&self) -> (Option<u32>, Option<u32>) {
        let st = self.inner.state.lock().await;
        (
            st.tunnel.as_ref().and_then(ProcessHandle::pid),
            st.forwarder.as_ref().and_then(ProcessHandle::pid),
        )
    }

    /// Restart path used by the health monitor: same serialized sequence as
    /// `apply`, but keeps the failure counter and aborts silently when
    /// `token` was cancelled by a newer `apply`/`stop` while waiting for the
    /// lock.
    ///
    /// Returns a boxed future: the monitor awaits this while `apply_locked`
    /// spawns the monitor, and boxing breaks that recursive future cycle.
    pub(super) fn reapply(
        &self,
        profile: TunnelConfig,
        token: &CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), TunnelError>> + Send>> {
        let sup = self.clone();
        let token = token.clone();
        Box::pin(async move {
            let mut st = sup.inner.state.lock().await;
            if token.is_cancelled() {
                return Ok(());
            }
            sup.apply_locked(&mut st, profile).await
        })
    }

    async fn apply_locked(
        &self,
        st: &mut TunnelState,
        profile: TunnelConfig,
    ) -> Result<(), TunnelError> {
        // Duplicate apply with a live transport is a no-op.
        if st.applied.as_ref() == Some(&profile)
            && st.tunnel.as_mut().is_some_and(ProcessHandle::is_alive)
        {
            return Ok(());
        }

        let cfg = self.inner.cfg.clone();

        // Fresh watcher generation, then clean slate: owned handles first,
        // then a best-effort sweep for transport orphans of a previous
        // incarnation. The forwarder binary is never swept by name: it is
        // typically a shared system client (`ssh`), and a name sweep would
        // kill unrelated sessions.
        self.transition(SupervisorState::CleaningUp, StatusSnapshot::stopping());
        Self::reset_watchers(st);
        self.teardown(st).await;
        kill_stray(&[cfg.stage1_binary.clone()]).await;

        // Stage 1: transport.
        self.transition(
            SupervisorState::StartingTunnel,
            StatusSnapshot {
                tunnel: StageStatus::Starting("starting transport".into()),
                forwarder: StageStatus::Stopped,
            },
        );
        let provisioner = Provisioner::new(cfg.provision.clone());
        let spec = StageSpec::tunnel(&profile, &cfg);
        let program = match provisioner.ensure(&spec.binary).await {
            Ok(path) => path,
            Err(e) => return self.fail(st, Stage::Tunnel, e).await,
        };
        let mut handle = match launch(Stage::Tunnel, &spec.launch_spec(program)) {
            Ok(h) => h,
            Err(e) => return self.fail(st, Stage::Tunnel, e).await,
        };
        match await_ready(&mut handle, &spec.ready).await {
            ReadinessResult::Confirmed { output } => self.forward_output(Stage::Tunnel, &output),
            ReadinessResult::TimedOut { output } => {
                st.tunnel = Some(handle);
                let err = TunnelError::ReadinessTimeout {
                    stage: Stage::Tunnel,
                    timeout: cfg.stage1_ready_timeout,
                    output,
                };
                return self.fail(st, Stage::Tunnel, err).await;
            }
            ReadinessResult::ProcessExited { code, output } => {
                st.tunnel = Some(handle);
                let err = TunnelError::ProcessCrashed {
                    stage: Stage::Tunnel,
                    code,
                    output,
                };
                return self.fail(st, Stage::Tunnel, err).await;
            }
        }
        if let Some(lines) = handle.take_output() {
            self.spawn_drainer(Stage::Tunnel, lines, st.watchers.child_token());
        }
        st.tunnel = Some(handle);
        self.transition(
            SupervisorState::StartingForwarder,
            StatusSnapshot {
                tunnel: StageStatus::Running,
                forwarder: StageStatus::Starting("starting forwarder".into()),
            },
        );

        // Stage 2: forwarder. Any failure from here also kills the
        // transport; a half-open chain is not a valid running state.
        if let Some(key) = &profile.key_path {
            if let Err(e) = provisioner.secure_key(key).await {
                return self.fail(st, Stage::Forwarder, e).await;
            }
        }
        let spec = StageSpec::forwarder(&profile, &cfg);
        let program = match provisioner.ensure(&spec.binary).await {
            Ok(path) => path,
            Err(e) => return self.fail(st, Stage::Forwarder, e).await,
        };
        let mut handle = match launch(Stage::Forwarder, &spec.launch_spec(program)) {
            Ok(h) => h,
            Err(e) => return self.fail(st, Stage::Forwarder, e).await,
        };
        match await_ready(&mut handle, &spec.ready).await {
            ReadinessResult::Confirmed { output } => {
                self.forward_output(Stage::Forwarder, &output)
            }
            ReadinessResult::TimedOut { output } => {
                st.forwarder = Some(handle);
                let err = TunnelError::ReadinessTimeout {
                    stage: Stage::Forwarder,
                    timeout: cfg.stage2_settle,
                    output,
                };
                return self.fail(st, Stage::Forwarder, err).await;
            }
            ReadinessResult::ProcessExited { code, output } => {
                st.forwarder = Some(handle);
                let err = TunnelError::ProcessCrashed {
                    stage: Stage::Forwarder,
                    code,
                    output,
                };
                return self.fail(st, Stage::Forwarder, err).await;
            }
        }
        if let Some(lines) = handle.take_output() {
            self.spawn_drainer(Stage::Forwarder, lines, st.watchers.child_token());
        }
        st.forwarder = Some(handle);
        st.applied = Some(profile);

        self.transition(SupervisorState::Running, StatusSnapshot::running());
        tokio::spawn(monitor::run(self.clone(), st.watchers.child_token()));
        Ok(())
    }

    /// Terminal failure path: tears everything down, publishes `Failed`
    /// with the stage that caused it, and surfaces the error to the caller.
    pub(super) async fn fail(
        &self,
        st: &mut TunnelState,
        stage: Stage,
        err: TunnelError,
    ) -> Result<(), TunnelError> {
        Self::reset_watchers(st);
        self.teardown(st).await;
        st.applied = None;
        let reason = err.to_string();
        let snap = match stage {
            Stage::Tunnel => StatusSnapshot {
                tunnel: StageStatus::Failed(reason),
                forwarder: StageStatus::Stopped,
            },
            Stage::Forwarder => StatusSnapshot {
                tunnel: StageStatus::Stopped,
                forwarder: StageStatus::Failed(reason),
            },
        };
        self.transition(SupervisorState::Failed, snap);
        Err(err)
    }

    /// Kills owned handles, forwarder first (reverse of start order).
    pub(super) async fn teardown(&self, st: &mut TunnelState) {
        let grace = self.inner.cfg.kill_grace;
        if let Some(mut h) = st.forwarder.take() {
            h.kill(grace).await;
        }
        if let Some(mut h) = st.tunnel.take() {
            h.kill(grace).await;
        }
    }

    /// Cancels the current watcher generation and installs a fresh root.
    pub(super) fn reset_watchers(st: &mut TunnelState) {
        st.watchers.cancel();
        st.watchers = CancellationToken::new();
    }

    /// Updates the lock-free cache and publishes the snapshot on the bus.
    pub(super) fn transition(&self, state: SupervisorState, snap: StatusSnapshot) {
        {
            let mut observed = match self.inner.observed.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            observed.state = state;
            observed.status = snap.clone();
        }
        self.inner.bus.publish(Event::status(snap));
    }

    /// Re-publishes captured readiness output as log events.
    fn forward_output(&self, stage: Stage, output: &str) {
        for line in output.lines() {
            self.inner.bus.publish(Event::log(stage, line));
        }
    }

    /// Forwards a stage's remaining output to the bus until EOF or the
    /// watcher generation is cancelled.
    fn spawn_drainer(&self, stage: Stage, mut lines: OutputLines, token: CancellationToken) {
        let bus = self.inner.bus.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    line = lines.next_line() => match line {
                        Some(l) => bus.publish(Event::log(stage, l)),
                        None => break,
                    },
                }
            }
        });
    }

    pub(super) fn state_lock(&self) -> &Mutex<TunnelState> {
        &self.inner.state
    }

    fn observed(&self) -> std::sync::RwLockReadGuard<'_, Observed> {
        match self.inner.observed.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
