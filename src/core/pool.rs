//! Lock-free pool of request contexts.

use crossbeam_queue::ArrayQueue;

use super::context::Context;

/// Default number of idle contexts kept around.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Bounded pool of reusable [`Context`] values.
///
/// `acquire` and `release` are safe to call from any number of request
/// tasks at once. When the pool is empty a fresh context is allocated; when
/// it is full the released context is dropped.
pub struct ContextPool {
    idle: ArrayQueue<Box<Context>>,
}

impl ContextPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Take an idle context or allocate one.
    pub fn acquire(&self) -> Box<Context> {
        self.idle.pop().unwrap_or_default()
    }

    /// Return a context once its request is completely done.
    pub fn release(&self, mut ctx: Box<Context>) {
        ctx.recycle();
        // Full pool: let it drop.
        let _ = self.idle.push(ctx);
    }

    /// Number of idle contexts.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use http::Method;

    #[test]
    fn test_acquire_allocates_when_empty() {
        let pool = ContextPool::new(2);
        let ctx = pool.acquire();
        assert_eq!(ctx.remaining(), 0);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_release_reuses_and_resets() {
        let pool = ContextPool::new(2);
        let mut ctx = pool.acquire();
        ctx.set("leftover", 1u32);
        ctx.set_panic("boom");
        pool.release(ctx);
        assert_eq!(pool.idle(), 1);

        let ctx = pool.acquire();
        assert!(ctx.get::<u32>("leftover").is_none());
        assert!(ctx.panic().is_none());
        assert_eq!(ctx.method(), Method::GET);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_release_beyond_capacity_drops() {
        let pool = ContextPool::new(1);
        pool.release(Box::default());
        pool.release(Box::default());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let pool = Arc::new(ContextPool::new(8));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let ctx = pool.acquire();
                        pool.release(ctx);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(pool.idle() <= 8);
    }
}
