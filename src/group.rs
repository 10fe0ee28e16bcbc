//! Catalog groups form a forest through parent pointers. The resolvers here work on a
//! snapshot of `(id, parent)` links and terminate even if the links contain a cycle.
use super::types::{GroupId, TimeStamp};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Group {
    #[n(0)]
    pub id: GroupId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub parent: Option<GroupId>,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
}

impl Group {
    pub fn new(name: &str, parent: Option<GroupId>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.trim().to_string(),
            parent,
            created_at: TimeStamp::new(),
        }
    }
}

/// Parent-pointer view over every stored group.
#[derive(Debug, Default, Clone)]
pub struct GroupTree {
    parents: BTreeMap<GroupId, Option<GroupId>>,
    children: BTreeMap<GroupId, Vec<GroupId>>,
}

impl GroupTree {
    pub fn from_links<I>(links: I) -> Self
    where
        I: IntoIterator<Item = (GroupId, Option<GroupId>)>,
    {
        let mut tree = GroupTree::default();
        for (id, parent) in links {
            if let Some(parent) = &parent {
                tree.children
                    .entry(parent.clone())
                    .or_default()
                    .push(id.clone());
            }
            tree.parents.insert(id, parent);
        }
        tree
    }

    pub fn contains(&self, id: &GroupId) -> bool {
        self.parents.contains_key(id)
    }

    /// The group itself plus everything nested under it, breadth first.
    /// Unknown ids resolve to the empty set.
    pub fn descendants_and_self(&self, root: &GroupId) -> BTreeSet<GroupId> {
        let mut result = BTreeSet::new();
        if !self.contains(root) {
            return result;
        }

        let mut queue = VecDeque::from([root.clone()]);
        while let Some(current) = queue.pop_front() {
            if !result.insert(current.clone()) {
                continue;
            }
            if let Some(children) = self.children.get(&current) {
                queue.extend(children.iter().filter(|c| !result.contains(*c)).cloned());
            }
        }
        result
    }
}

/// Match keys for a resolved id set. Identifiers have a single canonical string form,
/// so this is the sorted list of those strings.
pub fn build_filter_values(ids: &BTreeSet<GroupId>) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (GroupId, GroupId, GroupId, GroupTree) {
        let a = GroupId::new();
        let b = GroupId::new();
        let c = GroupId::new();
        let tree = GroupTree::from_links([
            (a.clone(), None),
            (b.clone(), Some(a.clone())),
            (c.clone(), Some(b.clone())),
        ]);
        (a, b, c, tree)
    }

    #[test]
    fn resolves_whole_subtree() {
        let (a, b, c, tree) = chain();
        let all = tree.descendants_and_self(&a);
        assert_eq!(all, BTreeSet::from([a.clone(), b.clone(), c.clone()]));
        assert_eq!(tree.descendants_and_self(&c), BTreeSet::from([c]));
    }

    #[test]
    fn unknown_group_is_empty() {
        let (_, _, _, tree) = chain();
        assert!(tree.descendants_and_self(&GroupId::new()).is_empty());
    }

    #[test]
    fn terminates_on_cycles() {
        let x = GroupId::new();
        let y = GroupId::new();
        let tree = GroupTree::from_links([(x.clone(), Some(y.clone())), (y.clone(), Some(x.clone()))]);
        assert_eq!(tree.descendants_and_self(&x), BTreeSet::from([x, y]));
    }

    #[test]
    fn filter_values_are_canonical_strings() {
        let (a, _, _, tree) = chain();
        let values = build_filter_values(&tree.descendants_and_self(&a));
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|v| v.starts_with("grp1")));
    }
}
