//! Derived transfer progress.

use serde::{Deserialize, Serialize};

/// Snapshot of how far a transfer has come. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub total_records: i64,
    pub transferred_records: i64,
    pub percentage: u8,
}

impl TransferProgress {
    /// Build a snapshot, clamping `transferred` into `0..=total` when a total is known.
    pub fn new(total_records: i64, transferred_records: i64) -> Self {
        let total_records = total_records.max(0);
        let mut transferred_records = transferred_records.max(0);
        if total_records > 0 {
            transferred_records = transferred_records.min(total_records);
        }
        Self {
            total_records,
            transferred_records,
            percentage: divide_to_percent(transferred_records, total_records),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_records > 0 && self.transferred_records == self.total_records
    }
}

/// `part` as a floored percentage of `total`; 0 when `total` is 0.
pub fn divide_to_percent(part: i64, total: i64) -> u8 {
    if total <= 0 {
        return 0;
    }
    let pct = (part.max(0) as i128 * 100) / total as i128;
    pct.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divide_to_percent() {
        assert_eq!(divide_to_percent(10, 20), 50);
        assert_eq!(divide_to_percent(1, 3), 33);
        assert_eq!(divide_to_percent(5, 0), 0);
        assert_eq!(divide_to_percent(30, 20), 100);
    }

    #[test]
    fn test_progress_clamps_to_total() {
        let p = TransferProgress::new(10, 14);
        assert_eq!(p.transferred_records, 10);
        assert_eq!(p.percentage, 100);
        assert!(p.is_complete());
    }

    #[test]
    fn test_unknown_total() {
        let p = TransferProgress::new(0, 3);
        assert_eq!(p.transferred_records, 3);
        assert_eq!(p.percentage, 0);
        assert!(!p.is_complete());
    }
}
