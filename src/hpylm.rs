// Hierarchical Pitman-Yor language model

use crate::prelude::*;
use crate::pyp::{sample_tied_hyperparameters, HyperPrior, PitmanYor};
use crate::tables::SparseIndex;

use rand::Rng;
use std::collections::BTreeMap;

/// Handle of a context node. Valid only while the node holds customers or
/// children; handles are reused after a node is reclaimed.
pub type NodeId = usize;

/// The empty context.
pub const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
struct Node {
    outcome: Option<usize>,
    parent: Option<NodeId>,
    depth: usize,
    children: BTreeMap<usize, NodeId>,
    dist: PitmanYor<SparseIndex>,
}

impl Node {
    fn is_garbage(&self) -> bool {
        self.dist.is_empty() && self.children.is_empty()
    }
}

/// A suffix tree of Pitman-Yor restaurants. The child of a context keyed by
/// `w` is the context extended one symbol further into the past with `w`,
/// and every restaurant backs off to its parent.
#[derive(Debug, Clone)]
pub struct HierarchicalLm {
    order: usize,
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    strengths: Vec<Strength>,
    discounts: Vec<Discount>,
}

impl HierarchicalLm {
    /// Creates a model of the given n-gram `order` whose restaurants all start
    /// from the same hyperparameters.
    pub fn new(order: usize, strength: Strength, discount: Discount) -> Self {
        assert!(order >= 1, "The order of the language model must be at least one.");
        let root = Node {
            outcome: None,
            parent: None,
            depth: 0,
            children: BTreeMap::new(),
            dist: PitmanYor::new(strength, discount),
        };
        Self {
            order,
            nodes: vec![Some(root)],
            free: Vec::new(),
            strengths: vec![strength; order],
            discounts: vec![discount; order],
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of live nodes, the root included.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Size of the node arena, live or free.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn level_size(&self, depth: usize) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|node| node.depth == depth)
            .count()
    }

    pub fn strength(&self, depth: usize) -> Strength {
        self.strengths[depth]
    }

    pub fn discount(&self, depth: usize) -> Discount {
        self.discounts[depth]
    }

    pub fn is_empty(&self) -> bool {
        self.n_nodes() == 1 && self.node(ROOT).dist.is_empty()
    }

    pub fn depth(&self, node: NodeId) -> usize {
        self.node(node).depth
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    pub fn dist(&self, node: NodeId) -> &PitmanYor<SparseIndex> {
        &self.node(node).dist
    }

    /// Customers of `outcome` seated in the restaurant of `node`.
    pub fn customers(&self, node: NodeId, outcome: usize) -> usize {
        self.node(node).dist.total(outcome)
    }

    pub fn child(&self, node: NodeId, outcome: usize) -> Option<NodeId> {
        self.node(node).children.get(&outcome).copied()
    }

    /// Returns the child of `node` keyed by `outcome`, creating it if needed.
    pub fn child_or_insert(&mut self, node: NodeId, outcome: usize) -> NodeId {
        if let Some(child) = self.child(node, outcome) {
            return child;
        }
        let depth = self.node(node).depth + 1;
        assert!(
            depth < self.order,
            "Context node {} cannot be extended beyond order {}.",
            node,
            self.order
        );
        let child = Node {
            outcome: Some(outcome),
            parent: Some(node),
            depth,
            children: BTreeMap::new(),
            dist: PitmanYor::new(self.strengths[depth], self.discounts[depth]),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(child);
                id
            }
            None => {
                self.nodes.push(Some(child));
                self.nodes.len() - 1
            }
        };
        self.node_mut(node).children.insert(outcome, id);
        id
    }

    /// The deepest existing context reached after observing `outcome` in
    /// context `node`, keeping at most `order - 1` symbols.
    pub fn next(&self, node: NodeId, outcome: usize) -> NodeId {
        let mut current = ROOT;
        for symbol in self.extended_context(node, outcome) {
            match self.child(current, symbol) {
                Some(child) => current = child,
                None => return current,
            }
        }
        current
    }

    /// Like [`HierarchicalLm::next`] but creates the missing contexts.
    pub fn next_or_insert(&mut self, node: NodeId, outcome: usize) -> NodeId {
        let mut current = ROOT;
        for symbol in self.extended_context(node, outcome) {
            current = self.child_or_insert(current, symbol);
        }
        current
    }

    /// Predictive probability of `outcome` at `node`, backing off to the
    /// parent's prediction all the way to `base` at the root.
    pub fn prob(&self, node: NodeId, outcome: usize, base: f64) -> f64 {
        let current = self.node(node);
        let base = match current.parent {
            Some(parent) => self.prob(parent, outcome, base),
            None => base,
        };
        current.dist.prob(outcome, base)
    }

    /// Predictive probability at `node` of an outcome seated nowhere.
    pub fn unseen_prob(&self, node: NodeId, base: f64) -> f64 {
        let current = self.node(node);
        let base = match current.parent {
            Some(parent) => self.unseen_prob(parent, base),
            None => base,
        };
        current.dist.unseen_prob(base)
    }

    /// Seats `outcome` at `node`; a newly opened table sends one customer to
    /// the parent restaurant.
    pub fn add_customer<R: Rng + ?Sized>(
        &mut self,
        node: NodeId,
        outcome: usize,
        base: f64,
        rng: &mut R,
    ) -> f64 {
        match self.node(node).parent {
            None => self.node_mut(node).dist.add_customer(outcome, base, rng),
            Some(parent) => {
                let parent_prob = self.prob(parent, outcome, base);
                let dist = &mut self.node_mut(node).dist;
                let prob = dist.add_customer(outcome, parent_prob, rng);
                if dist.table_added() {
                    self.add_customer(parent, outcome, base, rng);
                }
                prob
            }
        }
    }

    /// Unseats `outcome` from `node`; a closed table removes one customer from
    /// the parent restaurant. Contexts left without customers or children
    /// are reclaimed.
    pub fn remove_customer<R: Rng + ?Sized>(
        &mut self,
        node: NodeId,
        outcome: usize,
        base: f64,
        rng: &mut R,
    ) -> f64 {
        match self.node(node).parent {
            None => self.node_mut(node).dist.remove_customer(outcome, base, rng),
            Some(parent) => {
                let parent_prob = self.prob(parent, outcome, base);
                let mut prob = self
                    .node_mut(node)
                    .dist
                    .remove_customer(outcome, parent_prob, rng);
                if self.node(node).dist.table_removed() {
                    let parent_prob = self.remove_customer(parent, outcome, base, rng);
                    prob = self.node(node).dist.prob(outcome, parent_prob);
                }
                self.reclaim(node);
                prob
            }
        }
    }

    /// Resamples one `(strength, discount)` pair per depth, shared by every
    /// context at that depth.
    pub fn sample_hyperparameters<R: Rng + ?Sized>(
        &mut self,
        prior: &HyperPrior,
        rng: &mut R,
    ) -> Vec<(Strength, Discount)> {
        let mut levels: Vec<Vec<&mut PitmanYor<SparseIndex>>> =
            (0..self.order).map(|_| Vec::new()).collect();
        for node in self.nodes.iter_mut().flatten() {
            levels[node.depth].push(&mut node.dist);
        }
        let mut result = Vec::with_capacity(self.order);
        for (depth, level) in levels.iter_mut().enumerate() {
            let (strength, discount) = sample_tied_hyperparameters(level, prior, rng);
            self.strengths[depth] = strength;
            self.discounts[depth] = discount;
            result.push((strength, discount));
        }
        result
    }

    // Symbols from the root downward: `outcome` first, then the symbols of
    // `node` from most to least recent, truncated to `order - 1`.
    fn extended_context(&self, node: NodeId, outcome: usize) -> Vec<usize> {
        let mut context = Vec::with_capacity(self.order);
        let mut current = node;
        while let Some(symbol) = self.node(current).outcome {
            context.push(symbol);
            current = self.node(current).parent.unwrap_or(ROOT);
        }
        context.push(outcome);
        context.reverse();
        context.truncate(self.order - 1);
        context
    }

    fn reclaim(&mut self, node: NodeId) {
        let mut current = node;
        while current != ROOT && self.node(current).is_garbage() {
            let (parent, outcome) = {
                let n = self.node(current);
                (n.parent.unwrap_or(ROOT), n.outcome)
            };
            if let Some(outcome) = outcome {
                self.node_mut(parent).children.remove(&outcome);
            }
            self.nodes[current] = None;
            self.free.push(current);
            current = parent;
        }
    }

    fn node(&self, node: NodeId) -> &Node {
        match self.nodes.get(node) {
            Some(Some(n)) => n,
            _ => panic!("Using context node {} which does not exist.", node),
        }
    }

    fn node_mut(&mut self, node: NodeId) -> &mut Node {
        match self.nodes.get_mut(node) {
            Some(Some(n)) => n,
            _ => panic!("Using context node {} which does not exist.", node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    fn lm(order: usize) -> HierarchicalLm {
        HierarchicalLm::new(order, Strength::new(1.0), Discount::new(0.2))
    }

    #[test]
    fn test_new_outcome_opens_table_at_every_ancestor() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        let mut lm = lm(3);
        let a = lm.child_or_insert(ROOT, 10);
        let ab = lm.child_or_insert(a, 11);
        assert_eq!(lm.depth(ab), 2);
        assert_eq!(lm.parent(ab), Some(a));
        assert_eq!(lm.n_nodes(), 3);
        let p = lm.add_customer(ab, 5, 0.01, &mut rng);
        assert!((p - 0.01).abs() < 1e-12);
        for node in [ab, a, ROOT] {
            assert_eq!(lm.dist(node).tables(), 1);
            assert_eq!(lm.customers(node, 5), 1);
        }
        lm.remove_customer(ab, 5, 0.01, &mut rng);
        assert!(lm.is_empty());
        assert_eq!(lm.n_nodes(), 1);
        assert_eq!(lm.capacity(), 3);
        assert!(lm.child(ROOT, 10).is_none());
    }

    #[test]
    fn test_prob_backs_off_to_parent() {
        let mut rng = Pcg64Mcg::seed_from_u64(2);
        let mut lm = lm(2);
        let a = lm.child_or_insert(ROOT, 1);
        for _ in 0..5 {
            lm.add_customer(a, 7, 0.1, &mut rng);
        }
        lm.add_customer(ROOT, 8, 0.1, &mut rng);
        let parent_prob = lm.dist(ROOT).prob(8, 0.1);
        let expected = lm.dist(a).prob(8, parent_prob);
        assert!((lm.prob(a, 8, 0.1) - expected).abs() < 1e-12);
        let unseen = lm.dist(a).unseen_prob(lm.dist(ROOT).unseen_prob(0.1));
        assert!((lm.unseen_prob(a, 0.1) - unseen).abs() < 1e-12);
        assert!((lm.prob(a, 99, 0.1) - unseen).abs() < 1e-12);
    }

    #[test]
    fn test_next_truncates_context() {
        let mut lm = lm(2);
        let a = lm.next_or_insert(ROOT, 1);
        let b = lm.next_or_insert(a, 2);
        assert_eq!(lm.depth(b), 1);
        assert_eq!(lm.child(ROOT, 2), Some(b));
        assert_eq!(lm.next(b, 1), a);
        assert_eq!(lm.next(b, 3), ROOT);

        let mut lm3 = self::lm(3);
        let x = lm3.next_or_insert(ROOT, 1);
        let xy = lm3.next_or_insert(x, 2);
        // context after observing 1 then 2 is [2, 1] from the root downward
        assert_eq!(lm3.child(ROOT, 2).and_then(|n| lm3.child(n, 1)), Some(xy));
        let z = lm3.next(xy, 3);
        assert_eq!(z, ROOT);
        let z = lm3.next_or_insert(xy, 3);
        assert_eq!(lm3.depth(z), 2);
        assert_eq!(lm3.next(z, 2), lm3.child(ROOT, 2).unwrap());
    }

    #[test]
    fn test_reclaimed_ids_are_reused() {
        let mut rng = Pcg64Mcg::seed_from_u64(3);
        let mut lm = lm(2);
        let a = lm.child_or_insert(ROOT, 1);
        lm.add_customer(a, 4, 0.5, &mut rng);
        lm.remove_customer(a, 4, 0.5, &mut rng);
        assert_eq!(lm.n_nodes(), 1);
        let b = lm.child_or_insert(ROOT, 2);
        assert_eq!(a, b);
        assert_eq!(lm.capacity(), 2);
    }

    #[test]
    fn test_random_operations_keep_tree_consistent() {
        let mut rng = Pcg64Mcg::seed_from_u64(4);
        let mut lm = lm(3);
        let mut seated = Vec::new();
        for step in 0..3000 {
            if seated.is_empty() || rng.random_bool(0.55) {
                let prev = rng.random_range(0..4_usize);
                let prev2 = rng.random_range(0..4_usize);
                let outcome = rng.random_range(0..6_usize);
                let node = lm.child_or_insert(ROOT, prev);
                let node = lm.child_or_insert(node, prev2);
                lm.add_customer(node, outcome, 1.0 / 6.0, &mut rng);
                seated.push((prev2, prev, outcome));
            } else {
                let i = rng.random_range(0..seated.len());
                let (prev2, prev, outcome) = seated.swap_remove(i);
                let node = lm.child(ROOT, prev).and_then(|n| lm.child(n, prev2)).unwrap();
                assert_eq!(lm.depth(node), 2);
                lm.remove_customer(node, outcome, 1.0 / 6.0, &mut rng);
            }
            for node in lm.nodes.iter().flatten() {
                if node.parent.is_some() {
                    assert!(!node.is_garbage());
                }
                if node.children.is_empty() {
                    continue;
                }
                // customers reach an inner context only through tables of its children
                for outcome in 0..6 {
                    let child_tables: usize = node
                        .children
                        .values()
                        .filter_map(|c| lm.node(*c).dist.table_set(outcome))
                        .map(|set| set.n_tables())
                        .sum();
                    assert_eq!(node.dist.total(outcome), child_tables);
                }
            }
            if step % 250 == 0 {
                for id in (0..lm.capacity()).filter(|id| lm.nodes[*id].is_some()) {
                    let sum: f64 = (0..6).map(|w| lm.prob(id, w, 1.0 / 6.0)).sum();
                    assert!((sum - 1.0).abs() < 1e-9, "node {} sums to {}", id, sum);
                }
            }
        }
        for (prev2, prev, outcome) in seated {
            let node = lm.child(ROOT, prev).and_then(|n| lm.child(n, prev2)).unwrap();
            lm.remove_customer(node, outcome, 1.0 / 6.0, &mut rng);
        }
        assert!(lm.is_empty());
    }

    #[test]
    fn test_hyperparameters_are_tied_by_depth() {
        let mut rng = Pcg64Mcg::seed_from_u64(5);
        let mut lm = lm(2);
        for context in 0..5 {
            let node = lm.child_or_insert(ROOT, context);
            for outcome in 0..20 {
                lm.add_customer(node, outcome % (context + 2), 0.05, &mut rng);
            }
        }
        let sampled = lm.sample_hyperparameters(&HyperPrior::default(), &mut rng);
        assert_eq!(sampled.len(), 2);
        for context in 0..5 {
            let node = lm.child(ROOT, context).unwrap();
            assert_eq!(lm.dist(node).strength(), sampled[1].0);
            assert_eq!(lm.dist(node).discount(), sampled[1].1);
        }
        assert_eq!(lm.dist(ROOT).strength(), sampled[0].0);
        assert_eq!(lm.strength(1), sampled[1].0);
        assert_eq!(lm.level_size(1), 5);
    }
}
