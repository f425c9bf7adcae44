use std::collections::{HashMap, HashSet};

use crate::models::{ClientRecord, StoredClient};

/// An existing row whose attributes changed or that is coming out of retirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientUpdate {
    pub record: ClientRecord,
    pub changed: Vec<&'static str>,
    pub reactivated: bool,
}

/// A row absent from this pass that stays inside the retirement grace period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedClient {
    pub mac: String,
    pub missed_passes: u32,
}

/// The writes one pass applies to the inventory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub inserts: Vec<ClientRecord>,
    pub updates: Vec<ClientUpdate>,
    /// Unchanged rows that only get `last_seen_at` refreshed
    pub refreshes: Vec<String>,
    pub missed: Vec<MissedClient>,
    pub retirements: Vec<String>,
}

impl ChangeSet {
    pub fn reactivated(&self) -> usize {
        self.updates.iter().filter(|u| u.reactivated).count()
    }
}

/// Compute the change set that brings `current` in line with `resolved`.
/// A missing MAC is retired once it has been absent for `retire_after_misses`
/// consecutive passes; retired rows are never deleted.
pub fn compute_change_set(
    resolved: &[ClientRecord],
    current: &[StoredClient],
    retire_after_misses: u32,
) -> ChangeSet {
    let stored: HashMap<&str, &StoredClient> = current
        .iter()
        .map(|c| (c.record.mac.as_str(), c))
        .collect();
    let seen: HashSet<&str> = resolved.iter().map(|r| r.mac.as_str()).collect();

    let mut changes = ChangeSet::default();

    for record in resolved {
        match stored.get(record.mac.as_str()) {
            None => changes.inserts.push(record.clone()),
            Some(existing) if existing.retired => changes.updates.push(ClientUpdate {
                record: record.clone(),
                changed: existing.record.changed_fields(record),
                reactivated: true,
            }),
            Some(existing) => {
                let changed = existing.record.changed_fields(record);
                if changed.is_empty() {
                    changes.refreshes.push(record.mac.clone());
                } else {
                    changes.updates.push(ClientUpdate {
                        record: record.clone(),
                        changed,
                        reactivated: false,
                    });
                }
            }
        }
    }

    for client in current {
        if client.retired || seen.contains(client.record.mac.as_str()) {
            continue;
        }
        let missed_passes = client.missed_passes.saturating_add(1);
        if missed_passes >= retire_after_misses.max(1) {
            changes.retirements.push(client.record.mac.clone());
        } else {
            changes.missed.push(MissedClient {
                mac: client.record.mac.clone(),
                missed_passes,
            });
        }
    }

    changes
}
