//! Lifecycle executor: walks the plan's waves and drives VMs through their
//! state machine with bounded concurrency and health gating.
//!
//! Waves execute strictly in sequence with a full barrier between them;
//! members of one wave run concurrently up to `max_workers`. A VM failure is
//! caught at the task boundary and recorded, never propagated to siblings.

use crate::audit::{AuditEvent, AuditSink};
use crate::driver::VmDriver;
use crate::error::{MimicError, Result};
use crate::health::{HealthGate, HealthStatus};
use crate::planner::OrchestrationPlan;
use crate::types::{OrchestrationResult, VmRuntimeState, VmSpec, VmState, VmStatusInfo};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Default cap on concurrent VM tasks per invocation.
pub const DEFAULT_MAX_WORKERS: usize = 4;

type StateMap = Arc<Mutex<HashMap<String, VmRuntimeState>>>;

/// What a wave task should do to its VM.
#[derive(Debug, Clone, Copy)]
enum WaveAction {
    Start,
    Stop { force: bool },
}

/// Orchestrates a fleet of VMs according to an [`OrchestrationPlan`].
///
/// Runtime state is created `Pending` per VM at construction and survives
/// repeated `up`/`down` calls for the executor's lifetime.
pub struct LifecycleExecutor {
    plan: OrchestrationPlan,
    driver: Arc<dyn VmDriver>,
    audit: Arc<dyn AuditSink>,
    states: StateMap,
    max_workers: usize,
}

impl LifecycleExecutor {
    pub fn new(
        plan: OrchestrationPlan,
        driver: Arc<dyn VmDriver>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let states = plan
            .vms
            .keys()
            .map(|name| (name.clone(), VmRuntimeState::default()))
            .collect();

        Self {
            plan,
            driver,
            audit,
            states: Arc::new(Mutex::new(states)),
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Override the concurrent task cap.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// The plan this executor was built from.
    pub fn plan(&self) -> &OrchestrationPlan {
        &self.plan
    }

    /// Bring VMs up in dependency order.
    ///
    /// `selection` is expanded with the transitive closure of its
    /// dependencies; empty means every VM in the plan. Per-VM failures are
    /// collected into the result, not raised; only selection validation
    /// errors return `Err`.
    #[instrument(skip(self, selection), fields(selected = selection.len()))]
    pub async fn up(&self, selection: &[String], parallel: bool) -> Result<OrchestrationResult> {
        let started = Instant::now();
        let working_set = self.resolve_selection(selection)?;
        info!(vms = working_set.len(), "starting fleet");

        let mut errors = HashMap::new();
        for wave in &self.plan.start_waves {
            let members: Vec<String> =
                wave.iter().filter(|name| working_set.contains(*name)).cloned().collect();
            if members.is_empty() {
                continue;
            }
            debug!(?members, "running start wave");
            // A dependency that failed in an earlier wave does not exclude
            // its dependents: they are attempted regardless, and their own
            // outcome is what gets recorded.
            let wave_errors = self.run_wave(&members, parallel, WaveAction::Start).await;
            errors.extend(wave_errors);
        }

        let result = self.finish(&working_set, errors, started).await;
        self.record_audit("fleet_up", selection, &result).await;
        Ok(result)
    }

    /// Take VMs down in reverse dependency order.
    ///
    /// `force` is forwarded to the driver as a hard-kill request.
    #[instrument(skip(self, selection), fields(selected = selection.len()))]
    pub async fn down(&self, selection: &[String], force: bool) -> Result<OrchestrationResult> {
        let started = Instant::now();
        let working_set = self.resolve_selection(selection)?;
        info!(vms = working_set.len(), "stopping fleet");

        let mut errors = HashMap::new();
        for wave in &self.plan.stop_waves {
            let members: Vec<String> =
                wave.iter().filter(|name| working_set.contains(*name)).cloned().collect();
            if members.is_empty() {
                continue;
            }
            debug!(?members, "running stop wave");
            let wave_errors = self.run_wave(&members, true, WaveAction::Stop { force }).await;
            errors.extend(wave_errors);
        }

        let result = self.finish(&working_set, errors, started).await;
        self.record_audit("fleet_down", selection, &result).await;
        Ok(result)
    }

    /// Stop then start. The `up` phase only runs if `down` succeeded;
    /// otherwise the `down` result is returned unchanged.
    #[instrument(skip(self, selection))]
    pub async fn restart(
        &self,
        selection: &[String],
        parallel: bool,
    ) -> Result<OrchestrationResult> {
        let down = self.down(selection, false).await?;
        if !down.success {
            warn!(errors = down.errors.len(), "restart aborted: stop phase failed");
            return Ok(down);
        }
        self.up(selection, parallel).await
    }

    /// Combined in-memory and live-driver status for every VM in the plan.
    ///
    /// Driver query failures degrade `actual_state` to "unknown" instead of
    /// failing the call.
    pub async fn status(&self) -> HashMap<String, VmStatusInfo> {
        let snapshot: Vec<(String, VmRuntimeState)> = {
            let states = self.states.lock().await;
            states.iter().map(|(name, state)| (name.clone(), state.clone())).collect()
        };

        let mut out = HashMap::with_capacity(snapshot.len());
        for (name, runtime) in snapshot {
            let (actual_state, ip) = match self.driver.get_info(&name).await {
                Ok(info) => (info.state, info.ip),
                Err(e) => {
                    debug!(vm = %name, error = %e, "driver info query failed");
                    ("unknown".to_string(), None)
                }
            };
            out.insert(
                name,
                VmStatusInfo {
                    state: runtime.state,
                    actual_state,
                    ip,
                    error: runtime.error,
                    health_passed: runtime.health_passed,
                },
            );
        }
        out
    }

    /// Expand a selection to its transitive dependency closure.
    fn resolve_selection(&self, selection: &[String]) -> Result<HashSet<String>> {
        if selection.is_empty() {
            return Ok(self.plan.vms.keys().cloned().collect());
        }

        let mut pending: Vec<&str> = Vec::with_capacity(selection.len());
        for name in selection {
            if !self.plan.vms.contains_key(name) {
                return Err(MimicError::VmNotFound { vm: name.clone() });
            }
            pending.push(name.as_str());
        }

        let mut working_set = HashSet::new();
        while let Some(name) = pending.pop() {
            if working_set.insert(name.to_string()) {
                if let Some(spec) = self.plan.vms.get(name) {
                    pending.extend(spec.depends_on.iter().map(String::as_str));
                }
            }
        }
        Ok(working_set)
    }

    /// Run one wave to completion and return its per-VM errors.
    ///
    /// Every task is joined before returning (the inter-wave barrier). A
    /// panicking task is converted into an error entry for its VM so one
    /// VM's bug cannot crash the wave.
    async fn run_wave(
        &self,
        members: &[String],
        parallel: bool,
        action: WaveAction,
    ) -> HashMap<String, String> {
        let mut errors = HashMap::new();

        if !parallel || members.len() == 1 {
            for name in members {
                let Some(spec) = self.plan.vms.get(name) else { continue };
                if let Err(e) = run_vm_action(
                    Arc::clone(&self.driver),
                    Arc::clone(&self.states),
                    spec.clone(),
                    action,
                )
                .await
                {
                    errors.insert(name.clone(), e.to_string());
                }
            }
            return errors;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        let mut names_by_task = HashMap::new();

        for name in members {
            let Some(spec) = self.plan.vms.get(name) else { continue };
            let spec = spec.clone();
            let driver = Arc::clone(&self.driver);
            let states = Arc::clone(&self.states);
            let semaphore = Arc::clone(&semaphore);

            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_vm_action(driver, states, spec, action).await
            });
            names_by_task.insert(handle.id(), name.clone());
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((id, Err(e))) => {
                    if let Some(name) = names_by_task.get(&id) {
                        errors.insert(name.clone(), e.to_string());
                    }
                }
                Err(join_err) => {
                    // Task panicked; contain it to this VM.
                    let name = names_by_task
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_else(|| "<unknown>".to_string());
                    warn!(vm = %name, error = %join_err, "wave task panicked");
                    let reason = format!("task panicked: {}", join_err);
                    mark_failed(&self.states, &name, &reason).await;
                    errors.insert(name, reason);
                }
            }
        }

        errors
    }

    /// Snapshot final states for the working set and assemble the result.
    async fn finish(
        &self,
        working_set: &HashSet<String>,
        errors: HashMap<String, String>,
        started: Instant,
    ) -> OrchestrationResult {
        let states = {
            let guard = self.states.lock().await;
            working_set
                .iter()
                .filter_map(|name| guard.get(name).map(|s| (name.clone(), s.state)))
                .collect()
        };

        OrchestrationResult {
            success: errors.is_empty(),
            states,
            errors,
            duration: started.elapsed(),
        }
    }

    /// One audit record per invocation, not per VM.
    async fn record_audit(
        &self,
        operation: &str,
        selection: &[String],
        result: &OrchestrationResult,
    ) {
        let target =
            if selection.is_empty() { "all".to_string() } else { selection.join(",") };
        let mut details = HashMap::new();
        details.insert("vms".to_string(), result.states.len().to_string());
        details.insert("errors".to_string(), result.errors.len().to_string());
        details.insert("duration_ms".to_string(), result.duration.as_millis().to_string());

        self.audit
            .record(AuditEvent {
                operation: operation.to_string(),
                target,
                success: result.success,
                details,
            })
            .await;
    }
}

async fn run_vm_action(
    driver: Arc<dyn VmDriver>,
    states: StateMap,
    spec: VmSpec,
    action: WaveAction,
) -> Result<()> {
    match action {
        WaveAction::Start => start_vm(driver, states, spec).await,
        WaveAction::Stop { force } => stop_vm(driver, states, spec, force).await,
    }
}

/// Drive one VM through `Creating → Starting → Running`, then classify its
/// health. Every failure lands in the runtime state and the returned error.
async fn start_vm(driver: Arc<dyn VmDriver>, states: StateMap, spec: VmSpec) -> Result<()> {
    set_state(&states, &spec.name, VmState::Creating).await;
    set_state(&states, &spec.name, VmState::Starting).await;

    let id = match driver.create_and_start(&spec).await {
        Ok(id) => id,
        Err(e) => {
            let reason = e.to_string();
            mark_failed(&states, &spec.name, &reason).await;
            return Err(MimicError::VmStartFailed { vm: spec.name.clone(), reason });
        }
    };
    debug!(vm = %spec.name, id = %id, "driver reported VM started");

    {
        let mut guard = states.lock().await;
        if let Some(state) = guard.get_mut(&spec.name) {
            state.state = VmState::Running;
            state.started_at = Some(SystemTime::now());
            state.error = None;
        }
    }

    // Health classification only ever happens after Running is entered.
    if let Some(check) = &spec.health_check {
        let result = HealthGate::check(check).await;
        if result.status == HealthStatus::Healthy {
            let mut guard = states.lock().await;
            if let Some(state) = guard.get_mut(&spec.name) {
                state.state = VmState::Healthy;
                state.health_passed = true;
            }
            info!(vm = %spec.name, "VM healthy");
        } else {
            set_state(&states, &spec.name, VmState::Unhealthy).await;
            warn!(
                vm = %spec.name,
                status = ?result.status,
                message = result.message.as_deref().unwrap_or(""),
                "VM health check did not pass"
            );
        }
    }

    Ok(())
}

async fn stop_vm(
    driver: Arc<dyn VmDriver>,
    states: StateMap,
    spec: VmSpec,
    force: bool,
) -> Result<()> {
    set_state(&states, &spec.name, VmState::Stopping).await;

    if let Err(e) = driver.stop(&spec.name, force).await {
        let reason = e.to_string();
        mark_failed(&states, &spec.name, &reason).await;
        return Err(MimicError::VmStopFailed { vm: spec.name.clone(), reason });
    }

    set_state(&states, &spec.name, VmState::Stopped).await;
    Ok(())
}

async fn set_state(states: &StateMap, name: &str, state: VmState) {
    let mut guard = states.lock().await;
    if let Some(runtime) = guard.get_mut(name) {
        runtime.state = state;
    }
}

async fn mark_failed(states: &StateMap, name: &str, reason: &str) {
    let mut guard = states.lock().await;
    if let Some(runtime) = guard.get_mut(name) {
        runtime.state = VmState::Failed;
        runtime.error = Some(reason.to_string());
    }
}
