//! Persisted form of a cycle.
//!
//! Records are encoded with postcard. Timing fields are deliberately absent:
//! the window start is recomputed from the calendar when a cycle is loaded.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::cycle::CycleKey;
use crate::error::Result;
use crate::fuzzy::FuzzyAllowance;
use crate::reading::Reading;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub reading: Reading,
    pub start_offset_nanos: i64,
    pub duration_nanos: i64,
    pub probability: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CycleRecord {
    pub key: CycleKey,
    pub allowance: FuzzyAllowance,
    pub nodes: Vec<NodeRecord>,
}

impl CycleRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CycleKind;
    use crate::reading::SensorId;

    #[test]
    fn test_truncated_bytes_are_a_codec_error() {
        let sensor = SensorId::new(6, 2).unwrap();
        let record = CycleRecord {
            key: CycleKey::new(sensor, CycleKind::Monthly),
            allowance: FuzzyAllowance::default(),
            nodes: alloc::vec![NodeRecord {
                reading: Reading::new(sensor, &[1.0, 2.0], 10, 20).unwrap(),
                start_offset_nanos: 10,
                duration_nanos: 20,
                probability: 1.0,
            }],
        };

        let bytes = record.to_bytes().unwrap();
        assert_eq!(CycleRecord::from_bytes(&bytes).unwrap(), record);
        assert!(matches!(
            CycleRecord::from_bytes(&bytes[..bytes.len() / 2]),
            Err(crate::error::Error::Codec(_))
        ));
    }
}
