use std::net::SocketAddr;

use anyhow::ensure;
use parking_lot::Mutex;

/// Picks the upstream for the next forwarded query.
pub trait UpstreamChooser: Send + Sync {
    fn next_upstream(&self) -> SocketAddr;
}

/// Hands out items in order, wrapping around at the end.
#[derive(Debug)]
pub struct RoundRobin<T> {
    items: Box<[T]>,
    cursor: Mutex<usize>,
}

impl<T: Clone> RoundRobin<T> {
    /// Copy `items` into a new selector. Fails if `items` is empty.
    pub fn new(items: &[T]) -> anyhow::Result<Self> {
        ensure!(!items.is_empty(), "round robin needs at least one item");
        Ok(Self {
            items: items.into(),
            cursor: Mutex::new(0),
        })
    }

    /// The item under the cursor; advances the cursor.
    pub fn next(&self) -> T {
        let mut cursor = self.cursor.lock();
        let item = self.items[*cursor].clone();
        *cursor = (*cursor + 1) % self.items.len();
        item
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl UpstreamChooser for RoundRobin<SocketAddr> {
    fn next_upstream(&self) -> SocketAddr {
        self.next()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_empty_rejected() {
        assert!(RoundRobin::<u8>::new(&[]).is_err());
    }

    #[test]
    fn test_cycles_in_order() {
        let rr = RoundRobin::new(&["a", "b", "c"]).unwrap();
        let picked: Vec<_> = (0..7).map(|_| rr.next()).collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_source_is_copied() {
        let mut source = vec![1, 2];
        let rr = RoundRobin::new(&source).unwrap();
        source[0] = 99;
        source.push(3);

        assert_eq!(rr.as_slice(), &[1, 2]);
        assert_eq!(rr.next(), 1);
    }

    #[test]
    fn test_concurrent_callers_share_evenly() {
        const THREADS: usize = 8;
        const CALLS: usize = 300;

        let rr = RoundRobin::new(&['a', 'b', 'c']).unwrap();

        let counts = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| s.spawn(|| (0..CALLS).map(|_| rr.next()).collect::<Vec<_>>()))
                .collect();

            let mut counts: HashMap<char, usize> = HashMap::new();
            for handle in handles {
                for item in handle.join().unwrap() {
                    *counts.entry(item).or_default() += 1;
                }
            }
            counts
        });

        let per_item = THREADS * CALLS / 3;
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n == per_item));
        // every full cycle was handed out, so the cursor is back at the start
        assert_eq!(rr.next(), 'a');
    }

    #[test]
    fn test_upstream_chooser() {
        let a: SocketAddr = "192.0.2.1:53".parse().unwrap();
        let b: SocketAddr = "[2001:db8::1]:53".parse().unwrap();
        let rr = RoundRobin::new(&[a, b]).unwrap();

        assert_eq!(rr.next_upstream(), a);
        assert_eq!(rr.next_upstream(), b);
        assert_eq!(rr.next_upstream(), a);
    }
}
