// POWERCAP FREQUENCY TABLE
// P-STATE INDEX -> CPU FREQUENCY (KHZ). INDEX 0 IS THE FASTEST ENTRY
// (BOOST/TURBO WHERE PRESENT), INDEX max_pstate THE SLOWEST.

use crate::error::ConfigError;

// FIXED STEP BETWEEN GENERATED P-STATES (INTEL_PSTATE PASSIVE MODE)
pub const RANGE_STEP_KHZ: u32 = 100_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrequencyTable {
    khz: Vec<u32>,
}

impl FrequencyTable {
    // PARSE scaling_available_frequencies: "3600000 3400000 ... 1200000\n"
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut khz = Vec::new();
        for token in text.split_whitespace() {
            let f: u32 = token
                .parse()
                .map_err(|_| ConfigError::BadFrequency(token.to_string()))?;
            if f == 0 {
                return Err(ConfigError::BadFrequency(token.to_string()));
            }
            khz.push(f);
        }
        Self::from_khz(khz)
    }

    pub fn from_khz(khz: Vec<u32>) -> Result<Self, ConfigError> {
        if khz.is_empty() {
            return Err(ConfigError::EmptyFrequencies);
        }
        for pair in khz.windows(2) {
            if pair[1] >= pair[0] {
                return Err(ConfigError::NonMonotonic { prev: pair[0], next: pair[1] });
            }
        }
        Ok(Self { khz })
    }

    // BUILD THE TABLE FROM A MIN/MAX RANGE IN 100MHZ STEPS.
    // SLOT 0 IS BOOST: max_khz WHEN BOOST IS ON, ONE STEP BELOW WHEN OFF.
    // SLOTS 1..=max_pstate WALK DOWN FROM ONE STEP BELOW max_khz TO min_khz.
    pub fn from_range(min_khz: u32, max_khz: u32, boost_disabled: bool) -> Result<Self, ConfigError> {
        if min_khz == 0 || max_khz <= min_khz || (max_khz - min_khz) % RANGE_STEP_KHZ != 0 {
            return Err(ConfigError::BadRange { min_khz, max_khz });
        }

        let steps = (max_khz - min_khz) / RANGE_STEP_KHZ;
        let mut khz = Vec::with_capacity(steps as usize + 1);
        khz.push(if boost_disabled { max_khz - RANGE_STEP_KHZ } else { max_khz });
        for i in 1..=steps {
            khz.push(max_khz - i * RANGE_STEP_KHZ);
        }

        // WITH BOOST OFF SLOTS 0 AND 1 COLLAPSE TO THE SAME FREQUENCY.
        // KEEP THE DUPLICATE: THE INDEX SPACE MUST MATCH THE BOOST-ON LAYOUT.
        if !boost_disabled {
            return Self::from_khz(khz);
        }
        if khz.len() > 2 {
            for pair in khz[1..].windows(2) {
                if pair[1] >= pair[0] {
                    return Err(ConfigError::NonMonotonic { prev: pair[0], next: pair[1] });
                }
            }
        }
        Ok(Self { khz })
    }

    pub fn max_pstate(&self) -> usize {
        self.khz.len() - 1
    }

    pub fn len(&self) -> usize {
        self.khz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.khz.is_empty()
    }

    pub fn khz(&self, pstate: usize) -> Option<u32> {
        self.khz.get(pstate).copied()
    }

    // MHZ AS f64: THE UNIT THE POWER MODEL IS FIT IN
    pub fn mhz(&self, pstate: usize) -> Option<f64> {
        self.khz(pstate).map(|f| f as f64 / 1000.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.khz.iter().copied().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sysfs_line() {
        let t = FrequencyTable::parse("3601000 3600000 3000000 2000000 1200000 \n").unwrap();
        assert_eq!(t.max_pstate(), 4);
        assert_eq!(t.khz(0), Some(3_601_000));
        assert_eq!(t.khz(4), Some(1_200_000));
        assert_eq!(t.khz(5), None);
        assert_eq!(t.mhz(3), Some(2000.0));
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(FrequencyTable::parse("  \n"), Err(ConfigError::EmptyFrequencies));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            FrequencyTable::parse("3600000 fast 1200000"),
            Err(ConfigError::BadFrequency(_))
        ));
        assert!(matches!(FrequencyTable::parse("0"), Err(ConfigError::BadFrequency(_))));
    }

    #[test]
    fn parse_rejects_increasing() {
        assert_eq!(
            FrequencyTable::parse("1200000 3600000"),
            Err(ConfigError::NonMonotonic { prev: 1_200_000, next: 3_600_000 })
        );
    }

    #[test]
    fn range_with_boost() {
        let t = FrequencyTable::from_range(1_000_000, 1_500_000, false).unwrap();
        let khz: Vec<u32> = t.iter().map(|(_, f)| f).collect();
        assert_eq!(khz, vec![1_500_000, 1_400_000, 1_300_000, 1_200_000, 1_100_000, 1_000_000]);
        assert_eq!(t.max_pstate(), 5);
    }

    #[test]
    fn range_without_boost_drops_top_step() {
        let t = FrequencyTable::from_range(1_000_000, 1_300_000, true).unwrap();
        assert_eq!(t.khz(0), Some(1_200_000));
        assert_eq!(t.khz(1), Some(1_200_000));
        assert_eq!(t.khz(3), Some(1_000_000));
    }

    #[test]
    fn range_rejects_bad_bounds() {
        assert!(FrequencyTable::from_range(2_000_000, 1_000_000, false).is_err());
        assert!(FrequencyTable::from_range(1_000_000, 1_050_000, false).is_err());
    }
}
