//! Single-writer, many-reader handoff of the latest cycle output.
//!
//! The detection loop swaps in a fresh `Arc<FrameCycleOutput>` each cycle.
//! Readers clone the `Arc` under a read lock held only for the clone, so
//! encoding and socket I/O always run on a private snapshot.

use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
};

use crate::data::FrameCycleOutput;

#[derive(Debug, Default)]
pub struct StatePublisher {
    current: RwLock<Option<Arc<FrameCycleOutput>>>,
    generation: AtomicU64,
}

impl StatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current output; returns the new publish generation.
    pub fn publish(&self, output: FrameCycleOutput) -> u64 {
        let next = Arc::new(output);
        let previous = {
            let mut slot = self
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            slot.replace(next)
        };
        // The old snapshot may be the last reference; free it outside the lock.
        drop(previous);
        self.generation.fetch_add(1, Ordering::Release) + 1
    }

    /// Latest published output, or `None` before the first publish.
    pub fn current(&self) -> Option<Arc<FrameCycleOutput>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of outputs published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::data::fixtures;

    #[test]
    fn empty_until_first_publish() {
        let publisher = StatePublisher::new();
        assert!(publisher.current().is_none());
        assert_eq!(publisher.publish(fixtures::output(1, &[])), 1);
        assert_eq!(publisher.current().unwrap().status().frame_count, 1);
    }

    #[test]
    fn readers_keep_their_snapshot_after_replace() {
        let publisher = StatePublisher::new();
        publisher.publish(fixtures::output(1, &["first"]));
        let held = publisher.current().unwrap();
        publisher.publish(fixtures::output(2, &["second"]));

        assert_eq!(held.status().frame_count, 1);
        assert_eq!(held.messages(), vec!["first"]);
        assert_eq!(publisher.current().unwrap().status().frame_count, 2);
    }

    #[test]
    fn concurrent_readers_never_see_torn_output() {
        let publisher = Arc::new(StatePublisher::new());
        let writer = {
            let publisher = publisher.clone();
            thread::spawn(move || {
                for n in 1..=500u64 {
                    let label = n.to_string();
                    publisher.publish(fixtures::output(n, &[label.as_str()]));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let publisher = publisher.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    while last < 500 {
                        if let Some(output) = publisher.current() {
                            let n = output.status().frame_count;
                            assert_eq!(output.messages(), vec![n.to_string().as_str()]);
                            assert!(n >= last, "snapshots went backwards");
                            last = n;
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(publisher.generation(), 500);
    }
}
