use rand::{CryptoRng, Rng};

/// Random permutation applied to the outgoing batch before downstream
/// dispatch. `unshuffle` is the exact inverse, restoring reply order.
pub struct Shuffler {
    // Swap targets: position i swaps with perm[i] >= i.
    perm: Vec<usize>,
}

impl Shuffler {
    pub fn new<R: Rng + CryptoRng>(rng: &mut R, n: usize) -> Self {
        let mut perm = Vec::with_capacity(n);
        for i in 0..n {
            perm.push(i + rng.gen_range(0..n - i));
        }
        Self { perm }
    }

    pub fn len(&self) -> usize {
        self.perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    pub fn shuffle<T>(&self, items: &mut [T]) {
        assert_eq!(items.len(), self.perm.len(), "shuffle length mismatch");
        for i in 0..items.len() {
            items.swap(i, self.perm[i]);
        }
    }

    pub fn unshuffle<T>(&self, items: &mut [T]) {
        assert_eq!(items.len(), self.perm.len(), "unshuffle length mismatch");
        for i in (0..items.len()).rev() {
            items.swap(i, self.perm[i]);
        }
    }
}
