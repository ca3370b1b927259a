use lru::LruCache;
use std::{hash::Hash, num::NonZeroUsize, sync::Mutex};

/// 各多样性等级下的缓存容量。
#[derive(Clone, Debug)]
pub struct CacheSize {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl Default for CacheSize {
    fn default() -> Self {
        Self {
            low: 4,
            medium: 16,
            high: 64,
        }
    }
}

/// 被缓存对象的预期多样性。
#[derive(Clone, Copy, Debug)]
pub enum Diversity {
    Low,
    Medium,
    High,
}

impl CacheSize {
    pub fn new_cache<K: Hash + Eq, V>(&self, level: Diversity) -> Mutex<LruCache<K, V>> {
        let size = match level {
            Diversity::Low => self.low,
            Diversity::Medium => self.medium,
            Diversity::High => self.high,
        };
        Mutex::new(LruCache::new(
            NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN),
        ))
    }
}

/// 运行时配置。
#[derive(Clone, Debug)]
pub struct Config {
    /// 每个上下文创建的流数量。
    pub streams: usize,
    /// 上下文程序缓存的容量。
    pub program_cache: CacheSize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            streams: 1,
            program_cache: CacheSize::default(),
        }
    }
}

#[test]
fn test_zero_capacity() {
    let size = CacheSize {
        low: 0,
        medium: 1,
        high: 2,
    };
    let cache = size.new_cache::<u32, u32>(Diversity::Low);
    assert_eq!(cache.lock().unwrap().cap().get(), 1);
    let cache = size.new_cache::<u32, u32>(Diversity::High);
    assert_eq!(cache.lock().unwrap().cap().get(), 2);
}
