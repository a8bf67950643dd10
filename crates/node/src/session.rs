//! Session lifecycle: `Starting -> Serving -> (ShuttingDown | Crashed)`.
//!
//! [`MinerSession::start`] is the `Starting` phase: it loads the roster,
//! resolves the identity and binds the listener, and any failure there is
//! fatal. [`MinerSession::run`] serves requests and ticks the scheduler until
//! the shutdown future resolves, a maintenance action reports a fatal error,
//! or an applied update asks for a restart.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use zkminer_chain::ChainState;
use zkminer_core::{resolve_identity, Identity};
use zkminer_prover::ProofBackend;

use crate::cache::NetworkStateCache;
use crate::config::Config;
use crate::handler::{FallbackPolicy, HandlerConfig, ProofRequestHandler};
use crate::scheduler::{MaintenanceScheduler, SchedulerConfig};
use crate::server::{self, AppState};
use crate::updater::Updater;

/// Exit code asking the supervisor to restart the process (`EX_TEMPFAIL`).
pub const EXIT_RESTART: i32 = 75;

/// Runtime settings of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Subnet served.
    pub netuid: u16,
    /// Listener address. Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// Delay between maintenance ticks.
    pub tick_interval: Duration,
    /// How long shutdown waits for in-flight requests.
    pub drain_timeout: Duration,
    /// Request handler settings.
    pub handler: HandlerConfig,
    /// Missing-input policy.
    pub fallback: FallbackPolicy,
    /// Maintenance settings.
    pub scheduler: SchedulerConfig,
}

impl SessionSettings {
    /// Derive the session settings from a validated configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            netuid: config.network.netuid,
            bind_addr: config.bind_addr()?,
            tick_interval: Duration::from_millis(config.maintenance.tick_interval_ms),
            drain_timeout: Duration::from_secs(config.maintenance.drain_timeout_secs),
            handler: config.handler_config(),
            fallback: config.fallback_policy()?,
            scheduler: config.scheduler_config(),
        })
    }
}

/// Constructor-injected collaborators of a session.
pub struct Collaborators {
    /// Roster reads and weight assignment.
    pub chain: Arc<dyn ChainState>,
    /// Proof generation.
    pub backend: Arc<dyn ProofBackend>,
    /// Self-update mechanism, if any.
    pub updater: Option<Arc<dyn Updater>>,
    /// This process's hotkey address.
    pub address: Address,
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionExit {
    /// Operator interrupt; orderly shutdown.
    Interrupted,
    /// An update was applied.
    RestartRequested,
    /// Unrecoverable failure while serving.
    Fatal(anyhow::Error),
}

impl SessionExit {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 0,
            Self::RestartRequested => EXIT_RESTART,
            Self::Fatal(_) => 1,
        }
    }
}

/// A started miner session.
pub struct MinerSession {
    identity: Identity,
    cache: NetworkStateCache,
    scheduler: Arc<MaintenanceScheduler>,
    listener: TcpListener,
    local_addr: SocketAddr,
    app: axum::Router,
    tick_interval: Duration,
    drain_timeout: Duration,
}

impl MinerSession {
    /// Load the roster, resolve the identity and bind the listener.
    pub async fn start(settings: SessionSettings, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            chain,
            backend,
            updater,
            address,
        } = collaborators;

        let cache = NetworkStateCache::new(Arc::clone(&chain), settings.netuid);
        let snapshot = cache
            .refresh()
            .await
            .with_context(|| format!("Failed to fetch initial roster for netuid {}", settings.netuid))?;

        let identity = resolve_identity(&snapshot, address)?;
        info!(
            "Running miner on uid {} of netuid {} (block {}, {} members)",
            identity.uid(),
            settings.netuid,
            snapshot.block,
            snapshot.len()
        );

        let listener = TcpListener::bind(settings.bind_addr)
            .await
            .with_context(|| format!("Failed to bind axon to {}", settings.bind_addr))?;
        let local_addr = listener.local_addr()?;

        let handler = Arc::new(ProofRequestHandler::new(
            backend,
            settings.handler,
            settings.fallback,
        ));
        let app = server::router(AppState::new(handler, cache.clone(), identity));

        let scheduler = Arc::new(MaintenanceScheduler::new(
            settings.scheduler,
            identity,
            cache.clone(),
            chain,
            updater,
            snapshot.block,
        ));

        Ok(Self {
            identity,
            cache,
            scheduler,
            listener,
            local_addr,
            app,
            tick_interval: settings.tick_interval,
            drain_timeout: settings.drain_timeout,
        })
    }

    /// Identity resolved at startup.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared roster cache.
    pub fn cache(&self) -> &NetworkStateCache {
        &self.cache
    }

    /// Serve and tick until `shutdown` resolves or the session must end.
    pub async fn run<F>(self, shutdown: F) -> SessionExit
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut server = tokio::spawn(server::serve(self.listener, self.app, shutdown_rx));
        let mut server_finished = false;

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Miner is running on {}. Press Ctrl+C to stop.", self.local_addr);

        let exit = loop {
            tokio::select! {
                _ = &mut shutdown => break SessionExit::Interrupted,
                result = &mut server => {
                    server_finished = true;
                    let err = match result {
                        Ok(Ok(())) => anyhow::anyhow!("Axon stopped unexpectedly"),
                        Ok(Err(e)) => e.context("Axon failed"),
                        Err(e) => anyhow::anyhow!("Axon task panicked: {}", e),
                    };
                    break SessionExit::Fatal(err);
                }
                _ = ticker.tick() => {}
            }

            // Own task so a panic inside an action is contained to this tick.
            let scheduler = Arc::clone(&self.scheduler);
            let mut tick = tokio::spawn(async move { scheduler.tick().await });

            let joined = tokio::select! {
                _ = &mut shutdown => {
                    tick.abort();
                    break SessionExit::Interrupted;
                }
                joined = &mut tick => joined,
            };

            match joined {
                Ok(report) => {
                    if let Some((action, err)) = report.fatal() {
                        break SessionExit::Fatal(anyhow::anyhow!(
                            "{} action failed at step {}: {}",
                            action,
                            report.step,
                            err
                        ));
                    }
                    if report.restart_requested() {
                        break SessionExit::RestartRequested;
                    }
                }
                Err(e) if e.is_panic() => {
                    error!("Maintenance tick panicked, continuing with next tick: {}", e)
                }
                Err(e) => warn!("Maintenance tick did not complete: {}", e),
            }
        };

        match &exit {
            SessionExit::Interrupted => info!("Shutdown signal received, stopping miner"),
            SessionExit::RestartRequested => info!("Stopping miner to restart with the applied update"),
            SessionExit::Fatal(e) => error!("Stopping miner: {:#}", e),
        }

        let _ = shutdown_tx.send(true);
        if !server_finished {
            match tokio::time::timeout(self.drain_timeout, &mut server).await {
                Ok(Ok(Ok(()))) => info!("All in-flight requests drained"),
                Ok(Ok(Err(e))) => warn!("Axon failed during shutdown: {:#}", e),
                Ok(Err(e)) => warn!("Axon task failed during shutdown: {}", e),
                Err(_) => {
                    warn!(
                        "In-flight requests still running after {}s, aborting",
                        self.drain_timeout.as_secs()
                    );
                    server.abort();
                }
            }
        }

        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::FakeChain;
    use crate::handler::tests::{FakeBackend, Mode};
    use crate::updater::{GitUpdater, UpdateError};
    use async_trait::async_trait;

    fn settings() -> SessionSettings {
        SessionSettings {
            netuid: 2,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            tick_interval: Duration::from_millis(10),
            drain_timeout: Duration::from_secs(2),
            handler: HandlerConfig::default(),
            fallback: FallbackPolicy::Reject,
            scheduler: SchedulerConfig {
                netuid: 2,
                auto_update: true,
                ..Default::default()
            },
        }
    }

    fn collaborators(chain: Arc<FakeChain>, me: Address, updater: Option<Arc<dyn Updater>>) -> Collaborators {
        Collaborators {
            chain,
            backend: Arc::new(FakeBackend::new(Mode::Echo)),
            updater,
            address: me,
        }
    }

    #[tokio::test]
    async fn test_start_resolves_identity() {
        let me = Address::repeat_byte(0xb);
        let chain = Arc::new(FakeChain::new(
            10,
            vec![Address::repeat_byte(0xa), me, Address::repeat_byte(0xc)],
        ));

        let session = MinerSession::start(settings(), collaborators(chain, me, None))
            .await
            .unwrap();

        assert_eq!(session.identity().uid(), 1);
        assert_ne!(session.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_start_fails_when_not_registered() {
        let chain = Arc::new(FakeChain::new(10, vec![Address::repeat_byte(0xa)]));

        let err = MinerSession::start(
            settings(),
            collaborators(chain, Address::repeat_byte(0xb), None),
        )
        .await
        .err()
        .unwrap();

        assert!(err.to_string().contains("not registered on netuid 2"));
    }

    #[tokio::test]
    async fn test_start_fails_without_roster() {
        let chain = Arc::new(FakeChain::new(10, vec![Address::repeat_byte(0xa)]));
        chain
            .fail_reads
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = MinerSession::start(
            settings(),
            collaborators(chain, Address::repeat_byte(0xa), None),
        )
        .await
        .err()
        .unwrap();

        assert!(format!("{:#}", err).contains("initial roster"));
    }

    #[tokio::test]
    async fn test_interrupt_exits_cleanly() {
        let me = Address::repeat_byte(0xa);
        let chain = Arc::new(FakeChain::new(10, vec![me]));
        let session = MinerSession::start(settings(), collaborators(chain.clone(), me, None))
            .await
            .unwrap();

        let exit = session
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await;

        assert!(matches!(exit, SessionExit::Interrupted));
        assert_eq!(exit.exit_code(), 0);
        assert_eq!(chain.weight_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_applied_update_ends_with_restart_code() {
        struct Applying;

        #[async_trait]
        impl Updater for Applying {
            async fn check_and_apply(&self) -> Result<bool, UpdateError> {
                Ok(true)
            }
        }

        let me = Address::repeat_byte(0xa);
        let chain = Arc::new(FakeChain::new(10, vec![me]));
        let session = MinerSession::start(
            settings(),
            collaborators(chain, me, Some(Arc::new(Applying))),
        )
        .await
        .unwrap();

        let exit = session.run(std::future::pending()).await;
        assert!(matches!(exit, SessionExit::RestartRequested));
        assert_eq!(exit.exit_code(), EXIT_RESTART);
    }

    #[tokio::test]
    async fn test_update_outside_checkout_keeps_serving() {
        let not_a_repo = tempfile::tempdir().unwrap();
        let me = Address::repeat_byte(0xa);
        let chain = Arc::new(FakeChain::new(10, vec![me]));
        let mut settings = settings();
        settings.scheduler.update_every_ticks = 1;

        let session = MinerSession::start(
            settings,
            collaborators(
                chain.clone(),
                me,
                Some(Arc::new(GitUpdater::new(not_a_repo.path()))),
            ),
        )
        .await
        .unwrap();

        let exit = session
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await;

        assert!(matches!(exit, SessionExit::Interrupted));
        assert_eq!(exit.exit_code(), 0);
        assert_eq!(chain.weight_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_tick_does_not_stop_loop() {
        struct Panicking {
            calls: std::sync::atomic::AtomicUsize,
        }

        #[async_trait]
        impl Updater for Panicking {
            async fn check_and_apply(&self) -> Result<bool, UpdateError> {
                let n = self
                    .calls
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n == 0 {
                    panic!("updater exploded");
                }
                Ok(true)
            }
        }

        let me = Address::repeat_byte(0xa);
        let chain = Arc::new(FakeChain::new(10, vec![me]));
        let mut settings = settings();
        settings.scheduler.update_every_ticks = 1;

        let session = MinerSession::start(
            settings,
            collaborators(
                chain,
                me,
                Some(Arc::new(Panicking {
                    calls: std::sync::atomic::AtomicUsize::new(0),
                })),
            ),
        )
        .await
        .unwrap();

        // First tick panics, the second one applies the update.
        let exit = tokio::time::timeout(Duration::from_secs(5), session.run(std::future::pending()))
            .await
            .unwrap();
        assert!(matches!(exit, SessionExit::RestartRequested));
    }
}
