//! Reader stand-in for running the toy without NFC hardware.

use super::ReaderBackend;
use crate::tag::TagId;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::thread;
use std::time::Duration;

/// Sees a random registered tag on roughly `hit_rate` of all reads.
#[derive(Debug)]
pub struct SimulatedReader {
    tags: Vec<TagId>,
    hit_rate: f64,
    rng: StdRng,
}

impl SimulatedReader {
    pub fn new(tags: Vec<TagId>, hit_rate: f64) -> Self {
        Self::with_rng(tags, hit_rate, StdRng::from_entropy())
    }

    pub fn with_rng(tags: Vec<TagId>, hit_rate: f64, rng: StdRng) -> Self {
        Self {
            tags,
            hit_rate: hit_rate.clamp(0.0, 1.0),
            rng,
        }
    }
}

impl ReaderBackend for SimulatedReader {
    type Handle = ();

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self, _handle: ()) {}

    fn read_once(&mut self, _handle: &mut (), timeout: Duration) -> Result<Option<Vec<u8>>> {
        if !self.rng.gen_bool(self.hit_rate) {
            // A real reader would block for the whole timeout with nothing in the field.
            thread::sleep(timeout.min(Duration::from_millis(50)));
            return Ok(None);
        }
        Ok(self.tags.choose(&mut self.rng).map(TagId::to_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> Vec<TagId> {
        vec![TagId::parse("04:D8:97").unwrap(), TagId::parse("1D:DA:AF").unwrap()]
    }

    #[test]
    fn test_always_hits_registered_tags() {
        let mut reader = SimulatedReader::with_rng(tags(), 1.0, StdRng::seed_from_u64(7));
        for _ in 0..20 {
            let raw = reader.read_once(&mut (), Duration::ZERO).unwrap().expect("hit rate is 1");
            assert!(tags().contains(&TagId::from_bytes(&raw)));
        }
    }

    #[test]
    fn test_never_hits_at_zero_rate() {
        let mut reader = SimulatedReader::with_rng(tags(), 0.0, StdRng::seed_from_u64(7));
        for _ in 0..20 {
            assert_eq!(reader.read_once(&mut (), Duration::ZERO).unwrap(), None);
        }
    }

    #[test]
    fn test_no_registered_tags_reads_nothing() {
        let mut reader = SimulatedReader::with_rng(Vec::new(), 1.0, StdRng::seed_from_u64(7));
        assert_eq!(reader.read_once(&mut (), Duration::ZERO).unwrap(), None);
    }
}
