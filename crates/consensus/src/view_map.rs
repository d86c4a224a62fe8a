use std::collections::{btree_map, hash_map, BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};

use babel_primitives::ReplicaId;

use crate::types::View;

/// Values keyed by height, then round.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ViewMap<T>(BTreeMap<u64, BTreeMap<u32, T>>);

impl<T> ViewMap<T> {
    pub(crate) fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Drops every entry for heights strictly below `height`.
    pub(crate) fn prune(&mut self, height: u64) {
        self.0 = self.0.split_off(&height);
    }

    pub(crate) fn view_entry(&mut self, view: View) -> btree_map::Entry<'_, u32, T> {
        self.0.entry(view.height).or_default().entry(view.round)
    }

    pub(crate) fn get_by_view(&self, view: View) -> Option<&T> {
        self.0
            .get(&view.height)
            .and_then(|rounds| rounds.get(&view.round))
    }

    pub(crate) fn remove_view(&mut self, view: View) -> Option<T> {
        let rounds = self.0.get_mut(&view.height)?;
        let removed = rounds.remove(&view.round);
        if rounds.is_empty() {
            self.0.remove(&view.height);
        }
        removed
    }

    /// Rounds recorded for `height`, in ascending order.
    pub(crate) fn rounds(&self, height: u64) -> impl Iterator<Item = (u32, &T)> {
        self.0
            .get(&height)
            .into_iter()
            .flat_map(|rounds| rounds.iter().map(|(round, value)| (*round, value)))
    }

    pub(crate) fn contains_height(&self, height: u64) -> bool {
        self.0.contains_key(&height)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.0.values().flat_map(|rounds| rounds.values())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for ViewMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Values keyed by view, then by the replica that sent them.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ViewSenderMap<T>(ViewMap<HashMap<ReplicaId, T>>);

impl<T> Deref for ViewSenderMap<T> {
    type Target = ViewMap<HashMap<ReplicaId, T>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for ViewSenderMap<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> ViewSenderMap<T> {
    pub(crate) fn new() -> Self {
        Self(ViewMap::new())
    }

    pub(crate) fn senders(&mut self, view: View) -> &mut HashMap<ReplicaId, T> {
        self.view_entry(view).or_default()
    }

    pub(crate) fn sender_entry(
        &mut self,
        view: View,
        sender: ReplicaId,
    ) -> hash_map::Entry<'_, ReplicaId, T> {
        self.senders(view).entry(sender)
    }
}
