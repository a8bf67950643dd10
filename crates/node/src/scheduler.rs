//! Periodic maintenance: self-update, weight assignment, roster refresh.
//!
//! Every call to [`MaintenanceScheduler::tick`] decides which of the three
//! actions are due and runs them in that order. Each action reports its own
//! [`ActionOutcome`]; a failing action never stops the others.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zkminer_chain::ChainState;
use zkminer_core::{Identity, MAX_WEIGHT};

use crate::cache::NetworkStateCache;
use crate::updater::Updater;

/// Result of one maintenance action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran and succeeded.
    Completed,
    /// The action was due but deliberately did nothing.
    Skipped(String),
    /// The action failed; it will be retried at its next cadence.
    Transient(String),
    /// The action failed in a way retrying cannot fix.
    Fatal(String),
    /// An update was applied; the process should restart.
    RestartRequested,
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Transient(err) => write!(f, "transient failure: {}", err),
            Self::Fatal(err) => write!(f, "fatal failure: {}", err),
            Self::RestartRequested => write!(f, "restart requested"),
        }
    }
}

/// What happened during one tick. `None` means the action was not due.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick counter value this report belongs to.
    pub step: u64,
    /// Self-update check.
    pub update: Option<ActionOutcome>,
    /// Weight assignment.
    pub weights: Option<ActionOutcome>,
    /// Roster refresh and status log.
    pub refresh: Option<ActionOutcome>,
}

impl TickReport {
    /// Outcomes of the actions that ran, labelled.
    pub fn outcomes(&self) -> impl Iterator<Item = (&'static str, &ActionOutcome)> {
        [
            ("update", self.update.as_ref()),
            ("weights", self.weights.as_ref()),
            ("refresh", self.refresh.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, outcome)| outcome.map(|o| (name, o)))
    }

    /// First fatal failure, if any.
    pub fn fatal(&self) -> Option<(&'static str, &str)> {
        self.outcomes().find_map(|(name, outcome)| match outcome {
            ActionOutcome::Fatal(err) => Some((name, err.as_str())),
            _ => None,
        })
    }

    /// Whether an applied update asks for a restart.
    pub fn restart_requested(&self) -> bool {
        self.outcomes()
            .any(|(_, outcome)| *outcome == ActionOutcome::RestartRequested)
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Subnet weights are set on.
    pub netuid: u16,
    /// Self-update cadence, in ticks.
    pub update_every_ticks: u64,
    /// Roster refresh cadence, in ticks.
    pub refresh_every_ticks: u64,
    /// Minimum block distance between weight assignments.
    pub weights_interval_blocks: u64,
    /// Upper bound for each chain call or update check.
    pub action_timeout: Duration,
    /// Run the self-update check at all.
    pub auto_update: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            netuid: 0,
            update_every_ticks: 10,
            refresh_every_ticks: 5,
            weights_interval_blocks: 100,
            action_timeout: Duration::from_secs(60),
            auto_update: false,
        }
    }
}

struct SchedulerState {
    step: u64,
    /// `None` until the first assignment: the next check is due immediately.
    last_weights_block: Option<u64>,
}

/// Drives the maintenance actions for one session.
pub struct MaintenanceScheduler {
    config: SchedulerConfig,
    identity: Identity,
    cache: NetworkStateCache,
    chain: Arc<dyn ChainState>,
    updater: Option<Arc<dyn Updater>>,
    state: Mutex<SchedulerState>,
}

impl MaintenanceScheduler {
    /// Create a scheduler.
    ///
    /// The weight marker starts one interval before `startup_block`, so the
    /// first tick assigns weights.
    pub fn new(
        config: SchedulerConfig,
        identity: Identity,
        cache: NetworkStateCache,
        chain: Arc<dyn ChainState>,
        updater: Option<Arc<dyn Updater>>,
        startup_block: u64,
    ) -> Self {
        let last_weights_block = startup_block.checked_sub(config.weights_interval_blocks);
        Self {
            config,
            identity,
            cache,
            chain,
            updater,
            state: Mutex::new(SchedulerState {
                step: 0,
                last_weights_block,
            }),
        }
    }

    /// Block of the last weight assignment (or skip), if any.
    pub async fn last_weights_block(&self) -> Option<u64> {
        self.state.lock().await.last_weights_block
    }

    /// Run every action that is due at the current step and advance the step.
    pub async fn tick(&self) -> TickReport {
        let mut state = self.state.lock().await;
        let step = state.step;
        state.step += 1;

        let mut report = TickReport {
            step,
            ..Default::default()
        };

        if self.config.auto_update && step % self.config.update_every_ticks == 0 {
            report.update = Some(self.check_update().await);
        }

        report.weights = self.assign_weights(&mut state).await;

        if step % self.config.refresh_every_ticks == 0 {
            report.refresh = Some(self.refresh_and_log(step).await);
        }

        for (action, outcome) in report.outcomes() {
            match outcome {
                ActionOutcome::Transient(_) | ActionOutcome::Fatal(_) => {
                    warn!("Step {} {} action: {}", step, action, outcome)
                }
                _ => debug!("Step {} {} action: {}", step, action, outcome),
            }
        }

        report
    }

    async fn check_update(&self) -> ActionOutcome {
        let Some(updater) = &self.updater else {
            return ActionOutcome::Skipped("no updater configured".to_string());
        };

        match tokio::time::timeout(self.config.action_timeout, updater.check_and_apply()).await {
            Ok(Ok(true)) => {
                info!("Update applied, restart required");
                ActionOutcome::RestartRequested
            }
            Ok(Ok(false)) => ActionOutcome::Completed,
            Ok(Err(e)) => ActionOutcome::Transient(e.to_string()),
            Err(_) => ActionOutcome::Transient(format!(
                "update check timed out after {}s",
                self.config.action_timeout.as_secs()
            )),
        }
    }

    /// Returns `None` when the weight interval has not elapsed yet.
    async fn assign_weights(&self, state: &mut SchedulerState) -> Option<ActionOutcome> {
        let block = match tokio::time::timeout(self.config.action_timeout, self.chain.current_block()).await {
            Ok(Ok(block)) => block,
            Ok(Err(e)) => {
                return Some(ActionOutcome::Transient(format!(
                    "failed to read block height: {:#}",
                    e
                )))
            }
            Err(_) => {
                return Some(ActionOutcome::Transient(
                    "timed out reading block height".to_string(),
                ))
            }
        };

        if let Some(last) = state.last_weights_block {
            if block.saturating_sub(last) < self.config.weights_interval_blocks {
                return None;
            }
        }

        let snapshot = self.cache.current().await;
        let Some(uid) = snapshot.uid_of(&self.identity.address()) else {
            warn!(
                "Hotkey {} not found in roster at block {}, skipping weight assignment",
                self.identity.address(),
                snapshot.block
            );
            state.last_weights_block = Some(block);
            return Some(ActionOutcome::Skipped(
                "hotkey not in current roster".to_string(),
            ));
        };

        debug!("Setting weight for uid {} at block {}", uid, block);
        let weights = [(uid, MAX_WEIGHT)];
        let call = self.chain.set_weights(self.config.netuid, &weights);
        match tokio::time::timeout(self.config.action_timeout, call).await {
            Ok(Ok(tx_hash)) => {
                info!("Weights set for uid {} at block {} (tx {})", uid, block, tx_hash);
                state.last_weights_block = Some(block);
                Some(ActionOutcome::Completed)
            }
            Ok(Err(e)) => Some(ActionOutcome::Transient(format!(
                "failed to set weights: {:#}",
                e
            ))),
            Err(_) => Some(ActionOutcome::Transient(
                "timed out setting weights".to_string(),
            )),
        }
    }

    async fn refresh_and_log(&self, step: u64) -> ActionOutcome {
        let snapshot = match tokio::time::timeout(self.config.action_timeout, self.cache.refresh()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => return ActionOutcome::Transient(format!("roster refresh failed: {:#}", e)),
            Err(_) => return ActionOutcome::Transient("roster refresh timed out".to_string()),
        };

        let uid = self.identity.uid();
        match snapshot.member(uid) {
            Ok(member) => info!(
                step,
                block = snapshot.block,
                uid,
                stake = member.stake,
                rank = member.rank,
                trust = member.trust,
                consensus = member.consensus,
                incentive = member.incentive,
                emission = member.emission,
                "Miner status"
            ),
            Err(e) => warn!(step, block = snapshot.block, "Miner status unavailable: {}", e),
        }

        if snapshot.uid_of(&self.identity.address()) != Some(uid) {
            warn!(
                "Roster at block {} no longer lists {} at uid {}",
                snapshot.block,
                self.identity.address(),
                uid
            );
        }

        ActionOutcome::Completed
    }
}
