//! Controller election among host peers
//!
//! Election is a pure function of the connected set, so any number of hosts may
//! run it concurrently and still converge on the same controller.

use std::collections::HashSet;

use crate::store::{transact, SessionStore, StoreResult};
use crate::types::ClientId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Election {
    /// Recorded controller is still connected
    Keep,
    /// Write this host as the new controller
    Elect(ClientId),
    /// No host connected; leave the controller unset
    Vacant,
}

/// Decide who should control the session.
///
/// Picks the lexicographically smallest connected host unless the recorded
/// controller is itself a connected host.
pub fn elect(
    connected: &HashSet<ClientId>,
    host_ids: &[ClientId],
    recorded: Option<&str>,
) -> Election {
    let mut online: Vec<&ClientId> = host_ids.iter().filter(|id| connected.contains(*id)).collect();

    if let Some(current) = recorded {
        if online.iter().any(|id| id.as_str() == current) {
            return Election::Keep;
        }
    }

    online.sort();
    match online.first() {
        Some(id) => Election::Elect((*id).clone()),
        None => Election::Vacant,
    }
}

/// Re-run election against the store and write the result if it changed.
///
/// Offline hosts are pruned from the host list in the same transaction.
/// Returns the controller recorded after the call.
pub async fn ensure_controller(store: &dyn SessionStore) -> StoreResult<Option<ClientId>> {
    let connected = store.connected_clients().await;
    let snapshot = store.snapshot().await;

    match elect(&connected, &snapshot.host_ids, snapshot.controller_id.as_deref()) {
        Election::Keep => Ok(snapshot.controller_id),
        Election::Vacant if snapshot.controller_id.is_none() => Ok(None),
        _ => {
            let controller = transact(store, move |session| {
                let decision = elect(&connected, &session.host_ids, session.controller_id.as_deref());
                session.host_ids.retain(|id| connected.contains(id));
                session.host_ids.sort();
                match decision {
                    Election::Keep => {}
                    Election::Elect(id) => session.controller_id = Some(id),
                    Election::Vacant => session.controller_id = None,
                }
                session.controller_id.clone()
            })
            .await?;

            match &controller {
                Some(id) => tracing::info!("Controller elected: {}", id),
                None => tracing::warn!("No host connected; controller unset"),
            }
            Ok(controller)
        }
    }
}

/// Add `host_id` to the host list unless it is already there.
/// Returns true if this call added it.
pub async fn register_host(store: &dyn SessionStore, host_id: &str) -> StoreResult<bool> {
    let host_id = host_id.to_string();
    let added = transact(store, move |session| {
        if session.host_ids.contains(&host_id) {
            false
        } else {
            session.host_ids.push(host_id.clone());
            true
        }
    })
    .await?;
    Ok(added)
}
