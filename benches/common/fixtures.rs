use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Test data structure for benchmarks
#[derive(Clone, Debug, PartialEq)]
pub struct BenchUser {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub score: u32,
}

impl BenchUser {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            name: format!("User {}", id),
            email: format!("user{}@example.com", id),
            score: (id % 1000) as u32,
        }
    }
}

/// Error returned by the fake database for unknown keys
#[derive(Clone, Debug, PartialEq)]
pub struct BenchError(pub String);

/// Simulated database with configurable latency
#[derive(Clone)]
pub struct FakeDatabase {
    data: Arc<HashMap<String, BenchUser>>,
    latency_ms: u64,
    query_count: Arc<AtomicUsize>,
}

impl FakeDatabase {
    pub fn new(num_users: usize, latency_ms: u64) -> Self {
        let mut data = HashMap::new();
        for i in 0..num_users {
            let user = BenchUser::new(i as u64);
            data.insert(format!("user:{}", i), user);
        }

        Self {
            data: Arc::new(data),
            latency_ms,
            query_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<BenchUser, BenchError> {
        self.query_count.fetch_add(1, Ordering::Relaxed);

        // Simulate database latency
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        self.data
            .get(key)
            .cloned()
            .ok_or_else(|| BenchError(format!("{} not found", key)))
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }
}

/// Generate test keys for different workload patterns
pub struct KeyGenerator {
    num_keys: usize,
}

impl KeyGenerator {
    pub fn new(num_keys: usize) -> Self {
        Self { num_keys }
    }

    /// Generate sequential keys (for pre-populating and hot cache tests)
    pub fn sequential(&self) -> Vec<String> {
        (0..self.num_keys).map(|i| format!("user:{}", i)).collect()
    }

    /// Generate keys with Zipf distribution (realistic - few hot keys)
    pub fn zipf_random(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let mut keys = Vec::with_capacity(count);

        for _ in 0..count {
            // Simplified Zipf: 80% of requests go to 20% of keys
            let key_id = if rng.gen_bool(0.8) {
                // Hot keys (first 20%)
                rng.gen_range(0..(self.num_keys / 5))
            } else {
                // Cold keys (remaining 80%)
                rng.gen_range((self.num_keys / 5)..self.num_keys)
            };
            keys.push(format!("user:{}", key_id));
        }

        keys
    }
}
