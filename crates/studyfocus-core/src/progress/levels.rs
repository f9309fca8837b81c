/// XP needed to reach level `index + 1`. Sorted, starts at 0.
pub const LEVEL_THRESHOLDS: [u64; 10] = [
    0, 500, 1_500, 3_000, 5_000, 8_000, 12_000, 17_500, 25_000, 35_000,
];

pub const MAX_LEVEL: u32 = LEVEL_THRESHOLDS.len() as u32;

/// Highest level whose threshold is <= `xp`.
pub fn level_for_xp(xp: u64) -> u32 {
    LEVEL_THRESHOLDS.partition_point(|&threshold| threshold <= xp) as u32
}

pub fn xp_for_level(level: u32) -> Option<u64> {
    let index = usize::try_from(level.checked_sub(1)?).ok()?;
    LEVEL_THRESHOLDS.get(index).copied()
}

/// XP still missing for the next level, `None` at the top.
pub fn xp_to_next_level(xp: u64) -> Option<u64> {
    xp_for_level(level_for_xp(xp) + 1).map(|next| next - xp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_sorted() {
        assert!(LEVEL_THRESHOLDS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn level_boundaries() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(499), 1);
        assert_eq!(level_for_xp(500), 2);
        assert_eq!(level_for_xp(1_499), 2);
        assert_eq!(level_for_xp(34_999), 9);
        assert_eq!(level_for_xp(35_000), MAX_LEVEL);
        assert_eq!(level_for_xp(u64::MAX), MAX_LEVEL);
    }

    #[test]
    fn monotonic() {
        let mut last = 0;
        for xp in (0..40_000).step_by(250) {
            let level = level_for_xp(xp);
            assert!(level >= last);
            last = level;
        }
    }

    #[test]
    fn next_level_distance() {
        assert_eq!(xp_to_next_level(0), Some(500));
        assert_eq!(xp_to_next_level(600), Some(900));
        assert_eq!(xp_to_next_level(40_000), None);
        assert_eq!(xp_for_level(0), None);
    }
}
