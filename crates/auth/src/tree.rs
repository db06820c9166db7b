//! Flat permission catalog → forest.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use cockpit_core::{DomainError, PermissionId};

use crate::{AuthError, Permission};

/// One permission plus its ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionNode {
    #[serde(flatten)]
    pub permission: Permission,
    pub children: Vec<PermissionNode>,
}

impl Drop for PermissionNode {
    // Unlink descendants onto a heap stack so dropping a deep chain does not
    // recurse once per level.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Build the permission forest.
///
/// Every input permission appears exactly once in the output. A permission
/// whose `parent_id` is `None` or names an id absent from the input is a
/// root. Siblings (and roots) are ordered by `(sort_order, id)`.
///
/// Fails with `CyclicPermissionGraph` if any parent chain loops, including
/// loops that no root can reach.
pub fn build_tree(permissions: Vec<Permission>) -> Result<Vec<PermissionNode>, AuthError> {
    let total = permissions.len();
    let mut by_id: HashMap<PermissionId, Permission> = HashMap::with_capacity(total);
    for p in permissions {
        if let Some(dup) = by_id.insert(p.id, p) {
            return Err(DomainError::invariant(format!("duplicate permission id {}", dup.id)).into());
        }
    }

    let mut roots: Vec<PermissionId> = Vec::new();
    let mut children: HashMap<PermissionId, Vec<PermissionId>> = HashMap::new();
    for p in by_id.values() {
        match p.parent_id {
            Some(parent) if by_id.contains_key(&parent) => {
                children.entry(parent).or_default().push(p.id)
            }
            _ => roots.push(p.id),
        }
    }

    let order = |a: &PermissionId, b: &PermissionId| {
        let (pa, pb) = (&by_id[a], &by_id[b]);
        (pa.sort_order, pa.id).cmp(&(pb.sort_order, pb.id))
    };
    roots.sort_by(order);
    for list in children.values_mut() {
        list.sort_by(order);
    }

    let mut visited: HashSet<PermissionId> = HashSet::with_capacity(total);
    let mut forest = Vec::with_capacity(roots.len());
    for root in &roots {
        forest.push(assemble(*root, &by_id, &children, &mut visited)?);
    }

    if visited.len() != total {
        // Whatever was not reached hangs off a parent loop.
        let start = by_id
            .keys()
            .filter(|id| !visited.contains(id))
            .min()
            .copied()
            .ok_or_else(|| AuthError::Internal("tree bookkeeping mismatch".to_string()))?;
        return Err(AuthError::CyclicPermissionGraph {
            permission_id: cycle_member(start, &by_id),
        });
    }

    Ok(forest)
}

/// A node whose children are still being assembled.
struct Frame {
    permission: Permission,
    children: Vec<PermissionNode>,
    next: usize,
}

/// Build the subtree under `root` with an explicit stack, so catalog depth
/// is bounded by memory rather than by the thread stack.
fn assemble(
    root: PermissionId,
    by_id: &HashMap<PermissionId, Permission>,
    children: &HashMap<PermissionId, Vec<PermissionId>>,
    visited: &mut HashSet<PermissionId>,
) -> Result<PermissionNode, AuthError> {
    let open = |id: PermissionId, visited: &mut HashSet<PermissionId>| -> Result<Frame, AuthError> {
        if !visited.insert(id) {
            return Err(AuthError::CyclicPermissionGraph { permission_id: id });
        }
        let permission = by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| AuthError::Internal(format!("permission {id} vanished during assembly")))?;
        Ok(Frame {
            permission,
            children: Vec::new(),
            next: 0,
        })
    };

    let mut stack = vec![open(root, visited)?];
    loop {
        let Some(top) = stack.last_mut() else {
            return Err(AuthError::Internal("tree assembly stack emptied early".to_string()));
        };
        let next_child = children
            .get(&top.permission.id)
            .and_then(|ids| ids.get(top.next))
            .copied();

        match next_child {
            Some(child) => {
                top.next += 1;
                let frame = open(child, visited)?;
                stack.push(frame);
            }
            None => {
                let Some(done) = stack.pop() else {
                    return Err(AuthError::Internal("tree assembly stack emptied early".to_string()));
                };
                let node = PermissionNode {
                    permission: done.permission,
                    children: done.children,
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
        }
    }
}

/// Follow parent links from `start` until an id repeats; that id is on the loop.
fn cycle_member(start: PermissionId, by_id: &HashMap<PermissionId, Permission>) -> PermissionId {
    let mut seen = HashSet::new();
    let mut cur = start;
    while seen.insert(cur) {
        match by_id.get(&cur).and_then(|p| p.parent_id) {
            Some(parent) if by_id.contains_key(&parent) => cur = parent,
            _ => return start,
        }
    }
    cur
}

/// Pre-order walk of a forest.
pub fn flatten(forest: &[PermissionNode]) -> Vec<&Permission> {
    let mut out = Vec::new();
    let mut stack: Vec<&PermissionNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(&node.permission);
        stack.extend(node.children.iter().rev());
    }
    out
}

/// Parent of every node as recorded by its position in the forest.
pub fn parent_map(forest: &[PermissionNode]) -> HashMap<PermissionId, Option<PermissionId>> {
    let mut out = HashMap::new();
    let mut stack: Vec<(&PermissionNode, Option<PermissionId>)> = forest.iter().map(|root| (root, None)).collect();
    while let Some((node, parent)) = stack.pop() {
        out.insert(node.permission.id, parent);
        stack.extend(node.children.iter().map(|child| (child, Some(node.permission.id))));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PermissionKind;

    fn perm(id: i64, parent: Option<i64>) -> Permission {
        let p = Permission::new(
            PermissionId::new(id),
            format!("p:{id}"),
            format!("P{id}"),
            PermissionKind::Menu,
        );
        match parent {
            Some(parent) => p.with_parent(PermissionId::new(parent)),
            None => p,
        }
    }

    #[test]
    fn chain_builds_single_path() {
        let forest = build_tree(vec![perm(3, Some(2)), perm(1, None), perm(2, Some(1))]).unwrap();

        assert_eq!(forest.len(), 1);
        let root = &forest[0];
        assert_eq!(root.permission.id, PermissionId::new(1));
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].permission.id, PermissionId::new(2));
        assert_eq!(root.children[0].children[0].permission.id, PermissionId::new(3));
        assert!(root.children[0].children[0].children.is_empty());
    }

    #[test]
    fn siblings_sort_by_order_then_id() {
        let forest = build_tree(vec![
            perm(1, None),
            perm(4, Some(1)).with_sort_order(1),
            perm(3, Some(1)).with_sort_order(2),
            perm(2, Some(1)).with_sort_order(1),
        ])
        .unwrap();

        let ids: Vec<i64> = forest[0].children.iter().map(|c| c.permission.id.get()).collect();
        assert_eq!(ids, vec![2, 4, 3]);
    }

    #[test]
    fn missing_parent_becomes_root() {
        let forest = build_tree(vec![perm(1, None), perm(5, Some(99))]).unwrap();
        let roots: Vec<i64> = forest.iter().map(|n| n.permission.id.get()).collect();
        assert_eq!(roots, vec![1, 5]);
    }

    #[test]
    fn unreachable_cycle_is_detected() {
        let err = build_tree(vec![perm(1, None), perm(2, Some(3)), perm(3, Some(2))]).unwrap_err();
        match err {
            AuthError::CyclicPermissionGraph { permission_id } => {
                assert!([2, 3].contains(&permission_id.get()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn self_parent_is_a_cycle() {
        assert!(matches!(
            build_tree(vec![perm(7, Some(7))]),
            Err(AuthError::CyclicPermissionGraph { permission_id }) if permission_id.get() == 7
        ));
    }

    #[test]
    fn very_deep_chain_builds_walks_and_drops() {
        const DEPTH: i64 = 100_000;
        let catalog: Vec<Permission> = (1..=DEPTH)
            .map(|id| perm(id, (id > 1).then(|| id - 1)))
            .collect();

        let forest = build_tree(catalog).unwrap();
        assert_eq!(forest.len(), 1);

        let mut node = &forest[0];
        let mut depth = 1;
        while let Some(child) = node.children.first() {
            assert_eq!(child.permission.parent_id, Some(node.permission.id));
            node = child;
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
        assert_eq!(node.permission.id, PermissionId::new(DEPTH));

        assert_eq!(flatten(&forest).len(), DEPTH as usize);
        let parents = parent_map(&forest);
        assert_eq!(parents[&PermissionId::new(DEPTH)], Some(PermissionId::new(DEPTH - 1)));
        drop(forest);
    }

    #[test]
    fn deep_chain_closing_on_itself_is_a_cycle() {
        let mut catalog: Vec<Permission> = (2..=50_000).map(|id| perm(id, Some(id - 1))).collect();
        catalog.push(perm(1, Some(50_000)));
        assert!(matches!(
            build_tree(catalog),
            Err(AuthError::CyclicPermissionGraph { .. })
        ));
    }

    #[test]
    fn empty_catalog_is_empty_forest() {
        assert!(build_tree(Vec::new()).unwrap().is_empty());
    }

    mod proptest_tests {
        use std::collections::BTreeSet;

        use proptest::prelude::*;

        use super::*;

        /// Catalogs whose parents always point at a smaller id (so acyclic).
        fn catalog() -> impl Strategy<Value = Vec<Permission>> {
            prop::collection::vec((any::<prop::sample::Index>(), any::<bool>(), -3i32..3), 0..40).prop_map(
                |entries| {
                    entries.into_iter()
                        .enumerate()
                        .map(|(i, (pick, is_root, order))| {
                            let id = i as i64 + 1;
                            let parent = if i == 0 || is_root {
                                None
                            } else {
                                Some(pick.index(i) as i64 + 1)
                            };
                            perm(id, parent).with_sort_order(order)
                        })
                        .collect()
                },
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 128, ..ProptestConfig::default() })]

            #[test]
            fn flatten_is_a_bijection(mut input in catalog()) {
                input.reverse();
                let forest = build_tree(input.clone()).unwrap();
                let flat = flatten(&forest);

                prop_assert_eq!(flat.len(), input.len());
                let got: BTreeSet<PermissionId> = flat.iter().map(|p| p.id).collect();
                let want: BTreeSet<PermissionId> = input.iter().map(|p| p.id).collect();
                prop_assert_eq!(got, want);
            }

            #[test]
            fn parent_map_is_reproduced(input in catalog()) {
                let forest = build_tree(input.clone()).unwrap();
                let parents = parent_map(&forest);
                for p in &input {
                    prop_assert_eq!(parents.get(&p.id).copied(), Some(p.parent_id));
                }
            }
        }
    }
}
