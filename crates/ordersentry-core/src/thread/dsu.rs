//! Disjoint-set arena for resolving bucket merge chains.

/// A union-find structure over `0..n` bucket indices.
///
/// Merge edges discovered during thread grouping can chain (A merges into
/// B, B merges into C); following parent pointers with path compression
/// resolves every chain to a single root in near-constant time.
#[derive(Debug)]
pub struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    /// Creates `n` singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    /// Returns the root of `x`, compressing the path along the way.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merges the set containing `from` into the set containing `into`.
    ///
    /// The root of `into` survives, which keeps merge direction (and thus
    /// the final grouping) deterministic.
    pub fn union(&mut self, from: usize, into: usize) {
        let from_root = self.find(from);
        let into_root = self.find(into);
        if from_root != into_root {
            self.parent[from_root] = into_root;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons_are_their_own_roots() {
        let mut dsu = DisjointSet::new(3);
        assert_eq!(dsu.find(0), 0);
        assert_eq!(dsu.find(2), 2);
    }

    #[test]
    fn test_chain_resolves_to_single_root() {
        let mut dsu = DisjointSet::new(4);
        dsu.union(0, 1);
        dsu.union(1, 2);
        dsu.union(2, 3);
        assert_eq!(dsu.find(0), 3);
        assert_eq!(dsu.find(1), 3);
        assert_eq!(dsu.find(2), 3);
    }

    #[test]
    fn test_union_is_idempotent() {
        let mut dsu = DisjointSet::new(2);
        dsu.union(0, 1);
        dsu.union(0, 1);
        dsu.union(1, 0);
        assert_eq!(dsu.find(0), dsu.find(1));
    }
}
