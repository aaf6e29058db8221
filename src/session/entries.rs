//! The ordered multiset of requested cities.
//!
//! Insertion order is display order and decides which duplicate a by-name
//! removal takes. The grouped view is derived on every call and never
//! stored.

use crate::geo::Coordinate;
use crate::location::cache::forward_key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of one entry, stable for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Resolved {
        coordinate: Coordinate,
        display_label: String,
    },
    Failed {
        reason: String,
    },
}

/// One occurrence of a requested city. `name` is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    #[serde(flatten)]
    pub state: EntryState,
}

impl Entry {
    pub fn is_pending(&self) -> bool {
        matches!(self.state, EntryState::Pending)
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        match self.state {
            EntryState::Resolved { coordinate, .. } => Some(coordinate),
            _ => None,
        }
    }

    fn matches(&self, key: &str) -> bool {
        forward_key(&self.name) == key
    }
}

/// One row of the grouped view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityGroup {
    /// Lowercased, trimmed name shared by the group.
    pub key: String,
    /// Verbatim name of the first occurrence.
    pub name: String,
    pub count: usize,
    pub representative: Entry,
}

#[derive(Debug, Default)]
pub struct LocationSet {
    entries: Vec<Entry>,
    next_id: u64,
    resolved_revision: u64,
}

impl LocationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending entry.
    pub fn add(&mut self, name: &str) -> EntryId {
        self.push(name.to_string(), EntryState::Pending)
    }

    /// Append an already-resolved entry (snapshot restore).
    pub fn add_resolved(&mut self, name: &str, coordinate: Coordinate, display_label: String) -> EntryId {
        self.resolved_revision += 1;
        self.push(
            name.to_string(),
            EntryState::Resolved {
                coordinate,
                display_label,
            },
        )
    }

    fn push(&mut self, name: String, state: EntryState) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, name, state });
        id
    }

    /// Pending → Resolved. No-op (false) if the entry is gone or not pending.
    pub fn mark_resolved(&mut self, id: EntryId, coordinate: Coordinate, display_label: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if entry.is_pending() => {
                entry.state = EntryState::Resolved {
                    coordinate,
                    display_label: display_label.to_string(),
                };
                self.resolved_revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Remove a pending entry after a failed lookup. The removed entry is
    /// returned in its `Failed` state.
    pub fn mark_failed(&mut self, id: EntryId, reason: &str) -> Option<Entry> {
        let idx = self.entries.iter().position(|e| e.id == id && e.is_pending())?;
        let mut entry = self.entries.remove(idx);
        entry.state = EntryState::Failed {
            reason: reason.to_string(),
        };
        Some(entry)
    }

    /// Remove every pending entry with this name (case-insensitive).
    pub fn drop_all_pending_named(&mut self, name: &str, reason: &str) -> Vec<Entry> {
        let ids: Vec<EntryId> = self.pending_named(name);
        ids.into_iter()
            .filter_map(|id| self.mark_failed(id, reason))
            .collect()
    }

    /// Ids of pending entries with this name, in insertion order.
    pub fn pending_named(&self, name: &str) -> Vec<EntryId> {
        let key = forward_key(name);
        self.entries
            .iter()
            .filter(|e| e.is_pending() && e.matches(&key))
            .map(|e| e.id)
            .collect()
    }

    /// Remove the first entry (by insertion order) with this name.
    pub fn remove_first_by_name(&mut self, name: &str) -> Option<Entry> {
        let key = forward_key(name);
        let idx = self.entries.iter().position(|e| e.matches(&key))?;
        let entry = self.entries.remove(idx);
        if entry.coordinate().is_some() {
            self.resolved_revision += 1;
        }
        Some(entry)
    }

    pub fn clear(&mut self) {
        if self.entries.iter().any(|e| e.coordinate().is_some()) {
            self.resolved_revision += 1;
        }
        self.entries.clear();
    }

    /// Resolved entries only, in insertion order.
    pub fn resolved(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.entries.iter().filter(|e| e.coordinate().is_some())
    }

    pub fn resolved_coordinates(&self) -> Vec<Coordinate> {
        self.resolved().filter_map(Entry::coordinate).collect()
    }

    /// Changes whenever the resolved subset changes.
    pub fn resolved_revision(&self) -> u64 {
        self.resolved_revision
    }

    /// Name → {representative, count}, ordered by first occurrence.
    pub fn grouped(&self) -> Vec<CityGroup> {
        let mut groups: Vec<CityGroup> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for entry in &self.entries {
            let key = forward_key(&entry.name);
            match index.get(&key) {
                Some(&i) => {
                    let group = &mut groups[i];
                    group.count += 1;
                    // Prefer a resolved representative so the row can be placed.
                    if group.representative.is_pending() && entry.coordinate().is_some() {
                        group.representative = entry.clone();
                    }
                }
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(CityGroup {
                        key,
                        name: entry.name.clone(),
                        count: 1,
                        representative: entry.clone(),
                    });
                }
            }
        }
        groups
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
