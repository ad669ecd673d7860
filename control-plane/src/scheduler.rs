//! Background maintenance tasks: SYN cookie seed rotation, reputation
//! decay, ACL expiry, and event log draining. Each runs on its own
//! interval and stops when `shutdown` fires, mirroring the periodic-task
//! pattern the rest of the fleet uses for its background jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::control::ControlPlane;

const SEED_ROTATION_INTERVAL: Duration = Duration::from_secs(60);
const REPUTATION_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const ACL_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_DRAIN_INTERVAL: Duration = Duration::from_millis(500);

const REPUTATION_DECAY_PER_SEC: u32 = 1;

pub struct Scheduler {
    control: Arc<Mutex<ControlPlane>>,
}

impl Scheduler {
    pub fn new(control: Arc<Mutex<ControlPlane>>) -> Self {
        Self { control }
    }

    /// Spawns every background task, each watching its own clone of
    /// `shutdown`. Returns the join handles so the caller can await a
    /// clean stop.
    pub fn spawn(&self, shutdown: broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_seed_rotation(shutdown.subscribe()),
            self.spawn_reputation_sweep(shutdown.subscribe()),
            self.spawn_acl_cleanup(shutdown.subscribe()),
            self.spawn_event_drain(shutdown.subscribe()),
        ]
    }

    fn spawn_seed_rotation(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let control = self.control.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SEED_ROTATION_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now_ns = now_ns();
                        let new_seed = rand::random::<u32>();
                        let mut cp = control.lock().await;
                        if let Err(e) = cp.rotate_syn_cookie_seed(new_seed, now_ns) {
                            error!(error = %e, "syn cookie seed rotation failed");
                        } else {
                            info!("rotated syn cookie seed");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    fn spawn_reputation_sweep(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let control = self.control.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REPUTATION_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now_ns = now_ns();
                        let mut cp = control.lock().await;
                        let threshold = cp.config().reputation_score_threshold;
                        match cp.sweep_reputation(now_ns, REPUTATION_DECAY_PER_SEC, threshold) {
                            Ok(n) if n > 0 => info!(unblocked = n, "reputation sweep unblocked sources"),
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "reputation sweep failed"),
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    fn spawn_acl_cleanup(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let control = self.control.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ACL_CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = now_secs();
                        let mut cp = control.lock().await;
                        match cp.cleanup_expired_acl_entries(now) {
                            Ok(n) if n > 0 => info!(expired = n, "cleaned up expired acl entries"),
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "acl cleanup failed"),
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    fn spawn_event_drain(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let control = self.control.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVENT_DRAIN_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut cp = control.lock().await;
                        match cp.drain_events() {
                            Ok(events) => {
                                for ev in events {
                                    info!(
                                        src_ip = %ev.src_ip,
                                        dst_ip = %ev.dst_ip,
                                        attack_type = ev.attack_type,
                                        drop_reason = ev.drop_reason,
                                        action = ev.action,
                                        "scrub event"
                                    );
                                }
                            }
                            Err(e) => warn!(error = %e, "event drain failed"),
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}

fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
