//! Ordered children per parent as an intrusive doubly linked list.
//!
//! ```text
//!   ends[parent] = { first: a, last: c }
//!
//!   a <-> b <-> c          each entry: { parent, preceding, succeeding, value }
//! ```
//!
//! Entries live in one id-keyed arena. Every mutation relinks both neighbours
//! and the parent's end pointers in the same call, so the list is never
//! observable half-linked.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<K, V> {
    pub parent: Option<K>,
    pub preceding: Option<K>,
    pub succeeding: Option<K>,
    pub value: V,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Ends<K> {
    first: K,
    last: K,
}

/// A forest of ordered sibling chains. Roots share the `None` parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingList<K: Ord + Clone, V> {
    entries: BTreeMap<K, Entry<K, V>>,
    ends: BTreeMap<Option<K>, Ends<K>>,
}

impl<K: Ord + Clone, V> Default for SiblingList<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            ends: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V> SiblingList<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&Entry<K, V>> {
        self.entries.get(key)
    }

    pub fn value(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn value_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key).map(|e| &mut e.value)
    }

    pub fn parent(&self, key: &K) -> Option<&K> {
        self.entries.get(key).and_then(|e| e.parent.as_ref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Entry<K, V>)> {
        self.entries.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut().map(|e| &mut e.value)
    }

    /// Children of `parent` in sibling order.
    pub fn children(&self, parent: Option<&K>) -> Vec<&K> {
        let mut children = Vec::new();
        let Some(ends) = self.ends.get(&parent.cloned()) else {
            return children;
        };
        let mut cursor = Some(&ends.first);
        while let Some(key) = cursor {
            children.push(key);
            cursor = self.entries.get(key).and_then(|e| e.succeeding.as_ref());
        }
        children
    }

    /// Insert `key` under `parent`, before `succeeding` or last.
    ///
    /// A `succeeding` that is not a child of `parent` is ignored. An existing
    /// entry for `key` is unlinked first and its value replaced.
    pub fn insert(&mut self, key: K, parent: Option<K>, succeeding: Option<&K>, value: V) {
        if self.entries.contains_key(&key) {
            self.unlink(&key);
        }
        self.entries.insert(
            key.clone(),
            Entry {
                parent: None,
                preceding: None,
                succeeding: None,
                value,
            },
        );
        self.link(&key, parent, succeeding);
    }

    /// Move an existing entry, keeping its value. Returns `false` if absent.
    pub fn relocate(&mut self, key: &K, parent: Option<K>, succeeding: Option<&K>) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }
        self.unlink(key);
        self.link(key, parent, succeeding);
        true
    }

    /// Remove a single entry. Its children keep pointing at it.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.unlink(key);
        self.entries.remove(key).map(|e| e.value)
    }

    /// Remove an entry and everything below it, returning the removed keys.
    pub fn remove_subtree(&mut self, key: &K) -> Vec<K> {
        let removed = self.subtree(key);
        for k in removed.iter().rev() {
            self.remove(k);
        }
        removed
    }

    /// `key` and all its descendants, depth first, parents before children.
    pub fn subtree(&self, key: &K) -> Vec<K> {
        let mut out = Vec::new();
        if !self.entries.contains_key(key) {
            return out;
        }
        let mut stack = vec![key.clone()];
        while let Some(current) = stack.pop() {
            let children = self.children(Some(&current));
            stack.extend(children.into_iter().rev().cloned());
            out.push(current);
        }
        out
    }

    /// Ancestors of `key`, nearest first.
    pub fn ancestors(&self, key: &K) -> Vec<&K> {
        let mut out = Vec::new();
        let mut cursor = self.parent(key);
        while let Some(parent) = cursor {
            // Guards against a corrupted cycle.
            if out.len() > self.entries.len() {
                break;
            }
            out.push(parent);
            cursor = self.parent(parent);
        }
        out
    }

    pub fn is_ancestor_or_self(&self, ancestor: &K, key: &K) -> bool {
        ancestor == key || self.ancestors(key).contains(&ancestor)
    }

    fn unlink(&mut self, key: &K) {
        let Some(entry) = self.entries.get(key) else {
            return;
        };
        let parent = entry.parent.clone();
        let preceding = entry.preceding.clone();
        let succeeding = entry.succeeding.clone();

        match &preceding {
            Some(p) => {
                if let Some(e) = self.entries.get_mut(p) {
                    e.succeeding = succeeding.clone();
                }
            }
            None => match &succeeding {
                Some(s) => {
                    if let Some(ends) = self.ends.get_mut(&parent) {
                        ends.first = s.clone();
                    }
                }
                None => {
                    self.ends.remove(&parent);
                }
            },
        }
        match &succeeding {
            Some(s) => {
                if let Some(e) = self.entries.get_mut(s) {
                    e.preceding = preceding.clone();
                }
            }
            None => {
                if let (Some(p), Some(ends)) = (&preceding, self.ends.get_mut(&parent)) {
                    ends.last = p.clone();
                }
            }
        }

        if let Some(e) = self.entries.get_mut(key) {
            e.parent = None;
            e.preceding = None;
            e.succeeding = None;
        }
    }

    fn link(&mut self, key: &K, parent: Option<K>, succeeding: Option<&K>) {
        let succeeding = succeeding
            .filter(|s| *s != key)
            .filter(|s| self.entries.get(*s).is_some_and(|e| e.parent == parent))
            .cloned();

        let preceding = match &succeeding {
            Some(s) => self.entries.get(s).and_then(|e| e.preceding.clone()),
            None => self.ends.get(&parent).map(|ends| ends.last.clone()),
        };

        match &preceding {
            Some(p) => {
                if let Some(e) = self.entries.get_mut(p) {
                    e.succeeding = Some(key.clone());
                }
            }
            None => match self.ends.get_mut(&parent) {
                Some(ends) => ends.first = key.clone(),
                None => {
                    self.ends.insert(
                        parent.clone(),
                        Ends {
                            first: key.clone(),
                            last: key.clone(),
                        },
                    );
                }
            },
        }
        match &succeeding {
            Some(s) => {
                if let Some(e) = self.entries.get_mut(s) {
                    e.preceding = Some(key.clone());
                }
            }
            None => {
                if let Some(ends) = self.ends.get_mut(&parent) {
                    ends.last = key.clone();
                }
            }
        }

        if let Some(e) = self.entries.get_mut(key) {
            e.parent = parent;
            e.preceding = preceding;
            e.succeeding = succeeding;
        }
    }
}
