use sweep_frame::Sample;

use crate::error::{DeviceError, Result};

/// One complete revolution.
///
/// Always starts with a sync-flagged sample and contains no other.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scan {
    samples: Vec<Sample>,
}

impl Scan {
    pub(crate) fn from_samples(samples: Vec<Sample>) -> Self {
        debug_assert!(samples.first().is_some_and(|s| s.sync));
        debug_assert!(samples.iter().skip(1).all(|s| !s.sync));
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// The sample at `index`, or `IndexOutOfRange`.
    pub fn sample(&self, index: usize) -> Result<&Sample> {
        self.samples.get(index).ok_or(DeviceError::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })
    }

    /// Angle in milli-degrees.
    pub fn angle(&self, index: usize) -> Result<i32> {
        self.sample(index).map(|s| s.angle)
    }

    /// Distance in centimetres.
    pub fn distance(&self, index: usize) -> Result<i32> {
        self.sample(index).map(|s| s.distance)
    }

    pub fn signal_strength(&self, index: usize) -> Result<u8> {
        self.sample(index).map(|s| s.signal_strength)
    }
}

impl<'a> IntoIterator for &'a Scan {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample(angle: i32, sync: bool) -> Sample {
        Sample {
            angle,
            distance: 200,
            signal_strength: 42,
            sync,
        }
    }

    #[test]
    fn accessors_are_checked() {
        let scan = Scan::from_samples(vec![sample(0, true), sample(90_000, false)]);
        assert_eq!(scan.len(), 2);
        assert_eq!(scan.angle(1).unwrap(), 90_000);
        assert_eq!(scan.distance(0).unwrap(), 200);
        assert_eq!(scan.signal_strength(0).unwrap(), 42);

        let err = scan.angle(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        assert!(matches!(err, DeviceError::IndexOutOfRange { index: 2, len: 2 }));
    }

    #[test]
    fn iterates_in_order() {
        let scan = Scan::from_samples(vec![sample(0, true), sample(10, false), sample(20, false)]);
        let angles: Vec<i32> = scan.iter().map(|s| s.angle).collect();
        assert_eq!(angles, vec![0, 10, 20]);
        assert_eq!((&scan).into_iter().count(), 3);
    }

    #[test]
    #[cfg(feature = "serde")]
    fn serializes_samples() {
        let scan = Scan::from_samples(vec![sample(0, true)]);
        let json = serde_json::to_value(&scan).unwrap();
        assert_eq!(json["samples"][0]["distance"], 200);
        assert_eq!(json["samples"][0]["sync"], true);
    }
}
