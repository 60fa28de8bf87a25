//! In-memory contact source.
//!
//! Scan workers running in the same process can hand contacts over a bounded
//! channel instead of writing chunk files. The receiving side is an iterator
//! with the same item type as [`ChunkMerger`](super::ChunkMerger), so the
//! normalizer and writer do not care which one feeds them.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, SendError, Sender};

use crate::error::Result;

use super::RawContact;

/// Producer handle; clone one per worker thread.
#[derive(Debug, Clone)]
pub struct ContactSender {
    region: Arc<str>,
    tx: Sender<RawContact>,
}

impl ContactSender {
    /// Send a contact between region-local bins of the sender's region.
    ///
    /// Fails only if the receiving side was dropped.
    pub fn send(
        &self,
        row: u64,
        col: u64,
        count: u64,
    ) -> std::result::Result<(), SendError<RawContact>> {
        self.tx
            .send(RawContact::new(Arc::clone(&self.region), row, col, count))
    }
}

/// Consumer side: yields contacts until every sender is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<RawContact>,
}

impl ChannelSource {
    /// Create a bounded channel for one region.
    pub fn bounded(region: &str, capacity: usize) -> (ContactSender, ChannelSource) {
        let (tx, rx) = bounded(capacity);
        (
            ContactSender {
                region: Arc::from(region),
                tx,
            },
            ChannelSource { rx },
        )
    }
}

impl Iterator for ChannelSource {
    type Item = Result<RawContact>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_channel_collects_from_workers() {
        let (tx, source) = ChannelSource::bounded("chr1", 4);

        let handles: Vec<_> = (0..3u64)
            .map(|worker| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..10u64 {
                        tx.send(worker, worker + i, 1).unwrap();
                    }
                })
            })
            .collect();
        drop(tx);

        let contacts: Vec<_> = source.collect::<Result<_>>().unwrap();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(contacts.len(), 30);
        assert!(contacts.iter().all(|c| &*c.chrom == "chr1"));
    }

    #[test]
    fn test_send_fails_after_consumer_drop() {
        let (tx, source) = ChannelSource::bounded("chr1", 1);
        drop(source);
        assert!(tx.send(0, 0, 1).is_err());
    }
}
