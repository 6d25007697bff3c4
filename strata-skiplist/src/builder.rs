use std::sync::Arc;

use strata_pool::{LevelAlloc, PoolConfig, PoolManager};

use crate::base::SkipList;
use crate::comparator::BasicComparator;
use crate::error::Error;
use crate::level::DEFAULT_SEED;
use crate::node::node_layout;

/// Configures a [`SkipList`] before it is built.
///
/// ```
/// use strata_skiplist::pool::{LeakPolicy, PoolConfig};
/// use strata_skiplist::Builder;
///
/// let config = PoolConfig::default()
///     .with_initial_batch(64)
///     .with_leak_policy(LeakPolicy::Panic);
/// let list = Builder::new().seed(7).pool_config(config).build::<u64, &str>();
///
/// list.insert(1, "one");
/// assert_eq!(list.allocator().stats(list.front().unwrap().level()).capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    seed: u64,
    pool: PoolConfig,
}

impl Builder {
    /// Returns a builder with the default seed and pool configuration.
    pub fn new() -> Builder {
        Builder {
            seed: DEFAULT_SEED,
            pool: PoolConfig::default(),
        }
    }

    /// Sets the seed of the list's level generator.
    pub fn seed(mut self, seed: u64) -> Builder {
        self.seed = seed;
        self
    }

    /// Sets the configuration of the list's own pool.
    pub fn pool_config(mut self, config: PoolConfig) -> Builder {
        self.pool = config;
        self
    }

    /// Builds a list ordered by `Ord`.
    pub fn build<K, V>(self) -> SkipList<K, V> {
        self.build_with(BasicComparator)
    }

    /// Builds a list ordered by `comparator`.
    pub fn build_with<K, V, C>(self, comparator: C) -> SkipList<K, V, C> {
        let pool = PoolManager::with_config(self.pool, node_layout::<K, V>);
        SkipList::from_parts(comparator, Arc::new(pool), self.seed)
    }

    /// Builds a list drawing its nodes from a shared allocator.
    ///
    /// The pool configuration is not used, since the allocator already exists.
    pub fn build_shared<K, V, C, A: LevelAlloc>(
        self,
        comparator: C,
        alloc: Arc<A>,
    ) -> Result<SkipList<K, V, C, A>, Error> {
        SkipList::with_allocator_and_seed(comparator, alloc, self.seed)
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_pool::{Heap, PoolConfig};

    use super::Builder;
    use crate::comparator::BasicComparator;
    use crate::node::node_layout;

    #[test]
    fn same_seed_same_shape() {
        let a = Builder::new().seed(99).build::<u32, ()>();
        let b = Builder::new().seed(99).build::<u32, ()>();
        for i in 0..200 {
            assert_eq!(a.insert(i, ()).level(), b.insert(i, ()).level());
        }
    }

    #[test]
    fn pool_config_applies() {
        let s = Builder::new()
            .pool_config(PoolConfig::default().with_initial_batch(8))
            .build::<u32, u32>();
        let h = s.insert_at_level(1, 1, 0);
        assert_eq!(s.allocator().stats(0).capacity, 8);
        drop(h);
    }

    #[test]
    fn shared() {
        let heap = Arc::new(Heap::new(node_layout::<u32, u32>));
        let s = Builder::new()
            .seed(3)
            .build_shared::<u32, u32, _, _>(BasicComparator, heap)
            .unwrap();
        s.insert(1, 1);
        assert_eq!(s.len(), 1);
    }
}
