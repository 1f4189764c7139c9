//! Health state lattice and application status
//!
//! States are totally ordered from worst to best:
//! `Missing < Unavailable < Degraded < Updating < Ready`.
//! [`min_state`] picks the worst reading, [`max_state`] the best.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of one observed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Missing,
    Unavailable,
    Degraded,
    Updating,
    Ready,
}

impl State {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Missing => "Missing",
            Self::Unavailable => "Unavailable",
            Self::Degraded => "Degraded",
            Self::Updating => "Updating",
            Self::Ready => "Ready",
        };
        f.write_str(s)
    }
}

/// Worst of the inputs; `Missing` when there are none
pub fn min_state(states: impl IntoIterator<Item = State>) -> State {
    states.into_iter().min().unwrap_or(State::Missing)
}

/// Best of the inputs; `Missing` when there are none
pub fn max_state(states: impl IntoIterator<Item = State>) -> State {
    states.into_iter().max().unwrap_or(State::Missing)
}

/// Identity of an observed object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

/// One health reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub state: State,
}

impl ResourceState {
    pub fn new(key: &ResourceKey, state: State) -> Self {
        Self {
            kind: key.kind.clone(),
            name: key.name.clone(),
            namespace: key.namespace.clone(),
            state,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.namespace, &self.kind, &self.name)
    }
}

/// Aggregate status of one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    pub app_id: String,
    /// One entry per observed object, sorted by key
    pub resource_states: Vec<ResourceState>,
    pub updated_at: DateTime<Utc>,
    pub sequence: i64,
}

impl AppStatus {
    /// Status with every declared object `Missing`
    pub fn all_missing<'k>(
        app_id: impl Into<String>,
        sequence: i64,
        keys: impl IntoIterator<Item = &'k ResourceKey>,
    ) -> Self {
        let states: BTreeMap<ResourceKey, State> =
            keys.into_iter().map(|k| (k.clone(), State::Missing)).collect();
        Self::from_states(app_id, sequence, &states)
    }

    /// Build from a keyed state map (ordering follows the keys)
    pub fn from_states(
        app_id: impl Into<String>,
        sequence: i64,
        states: &BTreeMap<ResourceKey, State>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            resource_states: states
                .iter()
                .map(|(key, state)| ResourceState::new(key, *state))
                .collect(),
            updated_at: Utc::now(),
            sequence,
        }
    }

    /// Overall application state: the worst of its resources
    pub fn state(&self) -> State {
        min_state(self.resource_states.iter().map(|r| r.state))
    }
}

/// Current state per object, reduced with [`max_state`]
///
/// Every reading is merged with the value already held for its object, so
/// the best state seen wins. Readings that arrive out of order from
/// different watches (e.g. an Ingress served under two API groups) never
/// regress an object. A board lives for one informer list of one sequence;
/// a new list starts a fresh board.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    states: BTreeMap<ResourceKey, State>,
}

impl StatusBoard {
    /// Board with every declared object `Missing`
    pub fn new<'k>(keys: impl IntoIterator<Item = &'k ResourceKey>) -> Self {
        Self {
            states: keys.into_iter().map(|k| (k.clone(), State::Missing)).collect(),
        }
    }

    /// Merge a reading; returns whether the state for its key changed
    pub fn merge(&mut self, reading: &ResourceState) -> bool {
        let current = self.states.entry(reading.key()).or_insert(State::Missing);
        let merged = max_state([*current, reading.state]);
        let changed = merged != *current;
        *current = merged;
        changed
    }

    /// State of one object
    pub fn state_of(&self, key: &ResourceKey) -> State {
        self.states.get(key).copied().unwrap_or(State::Missing)
    }

    /// Aggregate state for every object
    pub fn states(&self) -> &BTreeMap<ResourceKey, State> {
        &self.states
    }

    pub fn to_status(&self, app_id: impl Into<String>, sequence: i64) -> AppStatus {
        AppStatus::from_states(app_id, sequence, &self.states)
    }
}
