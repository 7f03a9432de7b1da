//! Per-client request limiter for the status-polling endpoints.
//!
//! A sliding window over recent request timestamps, keyed by client IP.
//! The table is capacity-bounded; when full, the client idle the longest
//! is evicted so a scan of addresses cannot grow memory without limit.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    capacity: usize,
    clients: DashMap<IpAddr, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, capacity: usize) -> Self {
        Self {
            max_requests,
            window,
            capacity,
            clients: DashMap::new(),
        }
    }

    /// Record a request from `addr` and decide whether it may proceed.
    pub fn allow(&self, addr: IpAddr) -> bool {
        let now = Instant::now();

        if !self.clients.contains_key(&addr) && self.clients.len() >= self.capacity {
            self.evict_stalest();
        }

        let mut hits = self.clients.entry(addr).or_default();
        hits.retain(|t| now.duration_since(*t) < self.window);
        if hits.len() >= self.max_requests {
            return false;
        }
        hits.push(now);
        true
    }

    fn evict_stalest(&self) {
        let stalest = self
            .clients
            .iter()
            .min_by_key(|entry| entry.value().last().copied().unwrap_or(Instant::now()))
            .map(|entry| *entry.key());
        if let Some(addr) = stalest {
            self.clients.remove(&addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_limits_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), 100);
        assert!(limiter.allow(ip(1)));
        assert!(limiter.allow(ip(1)));
        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));
        // Another client is unaffected.
        assert!(limiter.allow(ip(2)));
    }

    #[test]
    fn test_window_expiry_readmits() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10), 100);
        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.allow(ip(1)));
    }

    #[test]
    fn test_capacity_evicts_stalest_client() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60), 2);
        assert!(limiter.allow(ip(1)));
        std::thread::sleep(Duration::from_millis(2));
        assert!(limiter.allow(ip(2)));
        // Table is full; the third client pushes out the stalest entry.
        assert!(limiter.allow(ip(3)));
        assert!(limiter.clients.len() <= 2);
        assert!(!limiter.clients.contains_key(&ip(1)));
    }
}
