use rand::prelude::*;

/// The order in which sentences are visited.
#[derive(Debug, Clone)]
pub struct Permutation {
    x: Vec<usize>,
}

impl Permutation {
    pub fn natural(n_items: usize) -> Self {
        Self {
            x: (0..n_items).collect(),
        }
    }

    pub fn shuffle<T: Rng + ?Sized>(&mut self, rng: &mut T) {
        self.x.shuffle(rng)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.x[..]
    }

    /// Splits the permutation into `n_blocks` contiguous runs whose sizes
    /// differ by at most one; block `i` starts at `i * n_items / n_blocks`.
    pub fn blocks(&self, n_blocks: usize) -> Vec<&[usize]> {
        assert!(n_blocks > 0, "Number of blocks must be positive.");
        let n = self.x.len();
        (0..n_blocks)
            .map(|i| &self.x[(i * n / n_blocks)..((i + 1) * n / n_blocks)])
            .collect()
    }

    /// Consecutive runs of at most `size` items.
    pub fn chunks(&self, size: usize) -> std::slice::Chunks<'_, usize> {
        self.x.chunks(size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use crate::perm::Permutation;
    use rand::{rng, Rng};

    #[test]
    fn shuffle() {
        let rng = &mut rng();
        for _ in 0..500 {
            let n_items = rng.random_range(0..100_usize);
            let mut perm = Permutation::natural(n_items);
            perm.shuffle(rng);
            let mut sorted = perm.as_slice().to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..n_items).collect::<Vec<_>>());
        }
    }

    #[test]
    fn blocks_cover_everything() {
        let rng = &mut rng();
        for _ in 0..500 {
            let n_items = rng.random_range(0..50_usize);
            let n_blocks = rng.random_range(1..8_usize);
            let mut perm = Permutation::natural(n_items);
            perm.shuffle(rng);
            let blocks = perm.blocks(n_blocks);
            assert_eq!(blocks.len(), n_blocks);
            let joined: Vec<usize> = blocks.concat();
            assert_eq!(&joined[..], perm.as_slice());
            let min = blocks.iter().map(|b| b.len()).min().unwrap();
            let max = blocks.iter().map(|b| b.len()).max().unwrap();
            assert!(max - min <= 1);
        }
    }

    #[test]
    fn chunks() {
        let perm = Permutation::natural(5);
        let sizes: Vec<usize> = perm.chunks(2).map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }
}
