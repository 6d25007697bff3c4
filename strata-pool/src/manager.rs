use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use std::alloc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::block::{AllocError, BlockSource, SystemBlocks};
use crate::level::{LevelPool, LevelStats};
use crate::{MAX_LEVEL, NUM_LEVELS};

/// What a [`PoolManager`] does when it is dropped with slots still outstanding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LeakPolicy {
    /// Log every leaking level and carry on.
    #[default]
    Log,
    /// Log every leaking level, then panic.
    ///
    /// No panic is raised while the thread is already unwinding.
    Panic,
}

/// Slots at one level that were never returned before teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakReport {
    /// The leaking level.
    pub level: u8,
    /// How many slots were still allocated.
    pub outstanding: usize,
}

type LeakHook = Arc<dyn Fn(&LeakReport) + Send + Sync>;

/// Tuning and diagnostics for a [`PoolManager`].
#[derive(Clone)]
pub struct PoolConfig {
    /// Slots carved by each level's first replenishment. Later ones double it.
    pub initial_batch: usize,
    /// What teardown does about outstanding slots.
    pub leak_policy: LeakPolicy,
    leak_hook: Option<LeakHook>,
}

impl PoolConfig {
    /// Sets the size of the first replenishment.
    pub fn with_initial_batch(mut self, initial_batch: usize) -> PoolConfig {
        self.initial_batch = initial_batch;
        self
    }

    /// Sets the leak policy.
    pub fn with_leak_policy(mut self, leak_policy: LeakPolicy) -> PoolConfig {
        self.leak_policy = leak_policy;
        self
    }

    /// Registers a callback invoked once per leaking level at teardown.
    pub fn on_leak<F>(mut self, hook: F) -> PoolConfig
    where
        F: Fn(&LeakReport) + Send + Sync + 'static,
    {
        self.leak_hook = Some(Arc::new(hook));
        self
    }
}

impl Default for PoolConfig {
    fn default() -> PoolConfig {
        PoolConfig {
            initial_batch: 1,
            leak_policy: LeakPolicy::default(),
            leak_hook: None,
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("initial_batch", &self.initial_batch)
            .field("leak_policy", &self.leak_policy)
            .field("leak_hook", &self.leak_hook.is_some())
            .finish()
    }
}

struct Blocks<B> {
    source: B,
    live: Vec<(NonNull<u8>, Layout)>,
    bytes: usize,
}

// The block pointers are only used to return blocks to their source.
unsafe impl<B: Send> Send for Blocks<B> {}

impl<B: BlockSource> Blocks<B> {
    fn acquire(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let block = self.source.acquire(layout)?;
        self.live.push((block, layout));
        self.bytes += layout.size();
        Ok(block)
    }
}

/// One free list per level over a shared block source.
///
/// Allocation and deallocation only lock the pool of the requested level.
/// The block lock is taken on top of it while that pool replenishes, so
/// replenishments at different levels serialize, while plain pops and pushes
/// never touch it.
///
/// Memory is handed back to the block source only when the manager is
/// dropped.
pub struct PoolManager<B: BlockSource = SystemBlocks> {
    pools: Box<[LevelPool]>,
    blocks: Mutex<Blocks<B>>,
    config: PoolConfig,
}

impl PoolManager<SystemBlocks> {
    /// Creates a manager whose slots at each level fit `object_layout(level)`.
    pub fn new<F>(object_layout: F) -> PoolManager<SystemBlocks>
    where
        F: FnMut(u8) -> Layout,
    {
        PoolManager::with_config(PoolConfig::default(), object_layout)
    }

    /// Creates a manager with the given configuration.
    pub fn with_config<F>(config: PoolConfig, object_layout: F) -> PoolManager<SystemBlocks>
    where
        F: FnMut(u8) -> Layout,
    {
        PoolManager::with_source(SystemBlocks, config, object_layout)
    }
}

impl<B: BlockSource> PoolManager<B> {
    /// Creates a manager that replenishes its pools from `source`.
    pub fn with_source<F>(source: B, config: PoolConfig, mut object_layout: F) -> PoolManager<B>
    where
        F: FnMut(u8) -> Layout,
    {
        let pools = (0..=MAX_LEVEL)
            .map(|level| LevelPool::new(level, object_layout(level), config.initial_batch))
            .collect::<Box<[_]>>();
        debug_assert_eq!(pools.len(), NUM_LEVELS);

        PoolManager {
            pools,
            blocks: Mutex::new(Blocks {
                source,
                live: Vec::new(),
                bytes: 0,
            }),
            config,
        }
    }

    fn pool(&self, level: u8) -> &LevelPool {
        assert!(
            level <= MAX_LEVEL,
            "level {} out of range 0..={}",
            level,
            MAX_LEVEL
        );
        &self.pools[level as usize]
    }

    /// Returns the layout of a slot at `level`.
    pub fn slot_layout(&self, level: u8) -> Layout {
        self.pool(level).slot_layout()
    }

    /// Allocates a slot at `level`.
    ///
    /// Fails only if the pool is empty and the block source refuses to
    /// replenish it.
    ///
    /// # Panics
    ///
    /// Panics if `level` is greater than [`MAX_LEVEL`].
    pub fn try_allocate(&self, level: u8) -> Result<NonNull<u8>, AllocError> {
        self.pool(level).pop(|batch| self.blocks.lock().acquire(batch))
    }

    /// Allocates a slot at `level`.
    ///
    /// Running out of memory is fatal and goes through
    /// [`handle_alloc_error`](std::alloc::handle_alloc_error).
    ///
    /// # Panics
    ///
    /// Panics if `level` is greater than [`MAX_LEVEL`].
    pub fn allocate(&self, level: u8) -> NonNull<u8> {
        match self.try_allocate(level) {
            Ok(slot) => slot,
            Err(err) => alloc::handle_alloc_error(err.layout()),
        }
    }

    /// Returns a slot to the pool of `level`.
    ///
    /// # Safety
    ///
    /// `slot` must have been allocated by this manager at the same `level`,
    /// and must not be used afterwards.
    pub unsafe fn deallocate(&self, slot: NonNull<u8>, level: u8) {
        // SAFETY: forwarded from the caller.
        unsafe { self.pool(level).push(slot) }
    }

    /// Returns a snapshot of the pool at `level`.
    pub fn stats(&self, level: u8) -> LevelStats {
        self.pool(level).stats()
    }

    /// Returns the number of slots handed out across all levels.
    pub fn outstanding(&self) -> usize {
        self.pools.iter().map(|p| p.stats().outstanding).sum()
    }

    /// Returns the number of bytes drawn from the block source.
    pub fn block_bytes(&self) -> usize {
        self.blocks.lock().bytes
    }

    /// Returns the levels that currently have slots outstanding.
    pub fn leaks(&self) -> Vec<LeakReport> {
        self.pools
            .iter()
            .map(LevelPool::stats)
            .filter(|s| s.outstanding > 0)
            .map(|s| LeakReport {
                level: s.level,
                outstanding: s.outstanding,
            })
            .collect()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<B: BlockSource> Drop for PoolManager<B> {
    fn drop(&mut self) {
        let leaks = self.leaks();
        for report in &leaks {
            tracing::error!(
                level = report.level,
                outstanding = report.outstanding,
                "pool dropped with outstanding slots"
            );
            if let Some(hook) = &self.config.leak_hook {
                hook(report);
            }
        }

        let blocks = self.blocks.get_mut();
        for (block, layout) in blocks.live.drain(..) {
            // SAFETY: every live block came from this source with this layout.
            unsafe { blocks.source.release(block, layout) };
        }
        blocks.bytes = 0;

        if !leaks.is_empty() && self.config.leak_policy == LeakPolicy::Panic && !thread::panicking()
        {
            let total: usize = leaks.iter().map(|r| r.outstanding).sum();
            panic!(
                "pool dropped with {} outstanding slot(s) across {} level(s)",
                total,
                leaks.len()
            );
        }
    }
}

impl<B: BlockSource> fmt::Debug for PoolManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("outstanding", &self.outstanding())
            .field("block_bytes", &self.block_bytes())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use core::alloc::Layout;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{LeakPolicy, PoolConfig, PoolManager};
    use crate::block::Bounded;

    fn layout(level: u8) -> Layout {
        Layout::array::<usize>(2 + level as usize).unwrap()
    }

    #[test]
    fn levels_are_segregated() {
        let pool = PoolManager::new(layout);
        let a = pool.allocate(0);
        let b = pool.allocate(4);

        assert_eq!(pool.stats(0).outstanding, 1);
        assert_eq!(pool.stats(4).outstanding, 1);
        assert_eq!(pool.stats(1).capacity, 0);
        assert!(pool.slot_layout(4).size() > pool.slot_layout(0).size());

        unsafe {
            pool.deallocate(a, 0);
            pool.deallocate(b, 4);
        }
        assert_eq!(pool.outstanding(), 0);
        assert!(pool.leaks().is_empty());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn level_out_of_range() {
        let pool = PoolManager::new(layout);
        pool.allocate(32);
    }

    #[test]
    fn initial_batch() {
        let pool = PoolManager::with_config(PoolConfig::default().with_initial_batch(16), layout);
        let a = pool.allocate(1);
        let stats = pool.stats(1);
        assert_eq!(stats.capacity, 16);
        assert_eq!(stats.next_batch, 32);
        assert_eq!(pool.block_bytes(), 16 * pool.slot_layout(1).size());
        unsafe { pool.deallocate(a, 1) };
    }

    #[test]
    fn exhausted_source() {
        let slot = layout(0).pad_to_align().size();
        let pool = PoolManager::with_source(Bounded::new(3 * slot), PoolConfig::default(), layout);

        // Batches of 1 and 2 fit, the next batch of 4 does not.
        let taken = (0..3).map(|_| pool.try_allocate(0).unwrap()).collect::<Vec<_>>();
        let err = pool.try_allocate(0).unwrap_err();
        assert_eq!(err.layout().size(), 4 * slot);

        // A returned slot is reusable without touching the source.
        unsafe { pool.deallocate(taken[0], 0) };
        let again = pool.try_allocate(0).unwrap();
        assert_eq!(again, taken[0]);

        unsafe {
            pool.deallocate(again, 0);
            pool.deallocate(taken[1], 0);
            pool.deallocate(taken[2], 0);
        }
    }

    #[test]
    fn leak_hook() {
        let reports = Arc::new(AtomicUsize::new(0));
        let outstanding = Arc::new(AtomicUsize::new(0));

        let config = PoolConfig::default().on_leak({
            let reports = reports.clone();
            let outstanding = outstanding.clone();
            move |r| {
                assert_eq!(r.level, 2);
                reports.fetch_add(1, Ordering::SeqCst);
                outstanding.fetch_add(r.outstanding, Ordering::SeqCst);
            }
        });
        let pool = PoolManager::with_config(config, layout);
        let _leaked = pool.allocate(2);
        drop(pool);

        assert_eq!(reports.load(Ordering::SeqCst), 1);
        assert_eq!(outstanding.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "1 outstanding slot(s) across 1 level(s)")]
    fn leak_panics() {
        let config = PoolConfig::default().with_leak_policy(LeakPolicy::Panic);
        let pool = PoolManager::with_config(config, layout);
        let _leaked = pool.allocate(0);
        drop(pool);
    }

    #[test]
    fn config_debug() {
        let config = PoolConfig::default().on_leak(|_| {});
        assert_eq!(
            format!("{:?}", config),
            "PoolConfig { initial_batch: 1, leak_policy: Log, leak_hook: true }"
        );
    }
}
