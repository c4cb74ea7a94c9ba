//! Background tasks owned by a connected peer: presence, controller election,
//! and the controller's periodic fuse tick.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::election::{ensure_controller, register_host};
use crate::session::SessionPeer;
use crate::types::Role;

/// Periodic tick driving countdown expiry, answer arbitration and explosions.
/// Only runs while its peer holds the controller role.
pub struct ControllerLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ControllerLoop {
    pub fn spawn(peer: Arc<SessionPeer>) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let period = peer.config().tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("Controller loop started for {}", peer.id());

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        if let Err(e) = peer.tick().await {
                            tracing::warn!("Controller tick failed: {}", e);
                        }
                    }
                }
            }
            tracing::info!("Controller loop stopped for {}", peer.id());
        });

        Self { shutdown, handle }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Everything one connected peer runs in the background.
///
/// Marks the peer present in the store, keeps the controller elected (hosts
/// only) and owns the controller loop while this peer is the controller.
pub struct PeerRuntime {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeerRuntime {
    pub fn spawn(peer: Arc<SessionPeer>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(peer, shutdown_rx));
        Self { shutdown, handle }
    }

    /// Stop background work and mark the peer disconnected
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

async fn run(peer: Arc<SessionPeer>, mut shutdown_rx: watch::Receiver<bool>) {
    let store = peer.store().clone();
    let mut changes = store.subscribe();
    store.connect(peer.id()).await;

    let mut registered = false;
    let mut controller_loop: Option<ControllerLoop> = None;

    loop {
        if *peer.role() == Role::Host {
            on_change(&peer, &mut registered, &mut controller_loop).await;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            change = changes.recv() => match change {
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("{} skipped {} session updates", peer.id(), skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    if let Some(controller_loop) = controller_loop.take() {
        controller_loop.stop().await;
    }
    peer.abort_preparation();
    store.disconnect(peer.id()).await;
}

async fn on_change(
    peer: &Arc<SessionPeer>,
    registered: &mut bool,
    controller_loop: &mut Option<ControllerLoop>,
) {
    let store = peer.store();

    if !*registered {
        match register_host(store.as_ref(), peer.id()).await {
            Ok(_) => *registered = true,
            Err(e) => tracing::warn!("Host registration failed for {}: {}", peer.id(), e),
        }
    }

    let controller = match ensure_controller(store.as_ref()).await {
        Ok(controller) => controller,
        Err(e) => {
            tracing::warn!("Controller election failed: {}", e);
            return;
        }
    };
    let is_controller = controller.as_deref() == Some(peer.id());

    match (is_controller, controller_loop.is_some()) {
        (true, false) => *controller_loop = Some(ControllerLoop::spawn(peer.clone())),
        (false, true) => {
            if let Some(running) = controller_loop.take() {
                running.stop().await;
            }
            peer.abort_preparation();
        }
        _ => {}
    }

    // Arbitrate right away instead of waiting for the next tick
    if is_controller && store.snapshot().await.pending_answer.is_some() {
        if let Err(e) = peer.handle_pending_answer().await {
            tracing::warn!("Answer arbitration failed: {}", e);
        }
    }
}
