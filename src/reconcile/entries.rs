//! Child-entry partitioning shared by every differ

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

/// A child entry with a natural key (firewall permission, mail rule, ...)
pub trait Entry: Clone {
    type Key: Eq + Hash + Clone + Debug;

    fn key(&self) -> Self::Key;
}

/// Per-kind comparison rules
pub struct DiffPolicy<E> {
    /// Equality of the non-key fields
    pub equal: fn(&E, &E) -> bool,
    /// The provider can update an entry in place; otherwise changed
    /// entries become remove + add
    pub in_place_update: bool,
    /// Relative order of entries is meaningful to the provider
    pub order_sensitive: bool,
}

#[derive(Debug, Clone)]
pub struct EntryDiff<E: Entry> {
    pub added: Vec<E>,
    pub removed: Vec<E>,
    /// `(current, desired)` pairs updated in place
    pub changed: Vec<(E, E)>,
    /// Desired order of the unchanged keys, when it differs from current
    pub reorder: Option<Vec<E::Key>>,
}

impl<E: Entry> EntryDiff<E> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty() && self.reorder.is_none()
    }
}

/// Keep the first entry for every key
fn first_by_key<E: Entry>(entries: &[E]) -> Vec<&E> {
    let mut seen = HashSet::new();
    entries.iter().filter(|e| seen.insert(e.key())).collect()
}

/// Partition `current` and `desired` by natural key
pub fn diff_entries<E: Entry>(current: &[E], desired: &[E], policy: &DiffPolicy<E>) -> EntryDiff<E> {
    let current = first_by_key(current);
    let desired = first_by_key(desired);

    let current_by_key: HashMap<E::Key, &E> = current.iter().map(|e| (e.key(), *e)).collect();
    let desired_keys: HashSet<E::Key> = desired.iter().map(|e| e.key()).collect();

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();
    let mut unchanged = HashSet::new();

    for want in &desired {
        let key = want.key();
        match current_by_key.get(&key) {
            None => added.push((*want).clone()),
            Some(have) if (policy.equal)(have, want) => {
                unchanged.insert(key);
            }
            Some(have) if policy.in_place_update => changed.push(((*have).clone(), (*want).clone())),
            Some(have) => {
                removed.push((*have).clone());
                added.push((*want).clone());
            }
        }
    }

    for have in &current {
        if !desired_keys.contains(&have.key()) {
            removed.push((*have).clone());
        }
    }

    let reorder = if policy.order_sensitive {
        let current_order: Vec<E::Key> = current
            .iter()
            .map(|e| e.key())
            .filter(|k| unchanged.contains(k))
            .collect();
        let desired_order: Vec<E::Key> = desired
            .iter()
            .map(|e| e.key())
            .filter(|k| unchanged.contains(k))
            .collect();
        (current_order != desired_order).then_some(desired_order)
    } else {
        None
    };

    EntryDiff {
        added,
        removed,
        changed,
        reorder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Rule {
        name: &'static str,
        body: u32,
    }

    impl Entry for Rule {
        type Key = &'static str;

        fn key(&self) -> Self::Key {
            self.name
        }
    }

    fn rule(name: &'static str, body: u32) -> Rule {
        Rule { name, body }
    }

    const ORDERED: DiffPolicy<Rule> = DiffPolicy {
        equal: |a, b| a == b,
        in_place_update: true,
        order_sensitive: true,
    };

    const REPLACE: DiffPolicy<Rule> = DiffPolicy {
        equal: |a, b| a == b,
        in_place_update: false,
        order_sensitive: false,
    };

    #[test]
    fn pure_reorder_yields_only_reorder() {
        let current = [rule("A", 1), rule("B", 1), rule("C", 1)];
        let desired = [rule("C", 1), rule("A", 1), rule("B", 1)];

        let diff = diff_entries(&current, &desired, &ORDERED);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.changed.is_empty());
        assert_eq!(diff.reorder, Some(vec!["C", "A", "B"]));
    }

    #[test]
    fn changed_entries_are_left_out_of_reorder() {
        let current = [rule("A", 1), rule("B", 1), rule("C", 1)];
        let desired = [rule("B", 2), rule("A", 1), rule("C", 1)];

        let diff = diff_entries(&current, &desired, &ORDERED);
        assert_eq!(diff.changed, vec![(rule("B", 1), rule("B", 2))]);
        assert!(diff.reorder.is_none());
    }

    #[test]
    fn without_in_place_update_changes_become_remove_and_add() {
        let current = [rule("A", 1), rule("B", 1)];
        let desired = [rule("A", 2), rule("C", 1)];

        let diff = diff_entries(&current, &desired, &REPLACE);
        assert_eq!(diff.added, vec![rule("A", 2), rule("C", 1)]);
        assert_eq!(diff.removed, vec![rule("A", 1), rule("B", 1)]);
        assert!(diff.changed.is_empty());
        assert!(diff.reorder.is_none());
    }

    #[test]
    fn duplicate_keys_collapse_to_first() {
        let current = [rule("A", 1)];
        let desired = [rule("A", 1), rule("A", 9)];

        let diff = diff_entries(&current, &desired, &REPLACE);
        assert!(diff.is_empty());
    }
}
