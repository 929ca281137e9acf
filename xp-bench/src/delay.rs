// Copyright (c) Facebook, Inc. and its affiliates.
//! Inter-region latency matrices fed to the impairment script generator.
use anyhow::{anyhow, Result};
use rand::Rng;
use std::path::Path;

use xp_bench_intf::XpError;

/// Round trip latencies in msecs between the eight test bed regions,
/// indexed by region id. The diagonal stands for negligible self latency.
pub const BASE_DELAY_MS: [[f64; 8]; 8] = [
    [0.1, 6.0, 33.0, 38.0, 74.0, 87.0, 106.0, 99.0],
    [6.0, 0.1, 38.0, 43.0, 66.0, 80.0, 99.0, 94.0],
    [33.0, 38.0, 0.1, 6.0, 101.0, 114.0, 92.0, 127.0],
    [38.0, 43.0, 6.0, 0.1, 105.0, 118.0, 86.0, 132.0],
    [74.0, 66.0, 101.0, 105.0, 0.1, 16.0, 36.0, 64.0],
    [87.0, 80.0, 114.0, 118.0, 16.0, 0.1, 36.0, 74.0],
    [106.0, 99.0, 92.0, 86.0, 36.0, 36.0, 0.1, 46.0],
    [99.0, 94.0, 127.0, 132.0, 64.0, 74.0, 46.0, 0.1],
];

#[derive(Debug, Clone, PartialEq)]
pub struct DelayMatrix {
    rows: Vec<Vec<f64>>,
}

impl DelayMatrix {
    pub fn base() -> Self {
        Self {
            rows: BASE_DELAY_MS.iter().map(|row| row.to_vec()).collect(),
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = rows.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(XpError::config(format!(
                    "delay matrix row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    n
                ))
                .into());
            }
            if let Some(v) = row.iter().find(|v| v.is_nan() || **v < 0.0) {
                return Err(
                    XpError::config(format!("delay matrix row {} has invalid entry {}", i, v))
                        .into(),
                );
            }
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i][j]
    }

    /// Split each pair's combined latency `ratio : 100 - ratio` between
    /// the two directions, then flip a fair coin per pair to pick which
    /// direction gets which share.
    pub fn with_asymmetry<R: Rng + ?Sized>(&self, ratio: f64, rng: &mut R) -> Result<Self> {
        if !(0.0..=100.0).contains(&ratio) {
            return Err(XpError::config(format!(
                "asymmetry ratio {} is outside [0, 100]",
                ratio
            ))
            .into());
        }

        let mut rows = self.rows.clone();
        let n = rows.len();
        for i in 0..n {
            for j in i + 1..n {
                let total = self.rows[i][j] + self.rows[j][i];
                let mut fwd = total * ratio / 100.0;
                let mut bwd = total * (100.0 - ratio) / 100.0;
                if rng.gen_bool(0.5) {
                    std::mem::swap(&mut fwd, &mut bwd);
                }
                rows[i][j] = fwd;
                rows[j][i] = bwd;
            }
        }
        Ok(Self { rows })
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(vec![]);
        for row in self.rows.iter() {
            wtr.write_record(row.iter().map(|v| v.to_string()))?;
        }
        let buf = wtr
            .into_inner()
            .map_err(|e| anyhow!("Flushing delay matrix ({})", e.error()))?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let csv = self.to_csv()?;
        std::fs::write(path, csv).map_err(|e| XpError::io(path, e))?;
        Ok(())
    }
}

/// The impairment scripts apply jitter as +/- half of the declared
/// peak-to-peak value.
pub fn jitter_amplitude(jitter: f64) -> f64 {
    jitter / 2.0
}

#[cfg(test)]
mod tests {
    use super::{jitter_amplitude, DelayMatrix};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_asymmetry_preserves_pair_totals() {
        let _ = ::env_logger::try_init();
        let base = DelayMatrix::base();
        let mut rng = StdRng::seed_from_u64(1234);

        for ratio in 0..=100 {
            let ratio = ratio as f64;
            let asym = base.with_asymmetry(ratio, &mut rng).unwrap();
            assert_eq!(asym.len(), base.len());
            for i in 0..base.len() {
                assert_eq!(asym.get(i, i), base.get(i, i));
                for j in i + 1..base.len() {
                    let total = base.get(i, j) + base.get(j, i);
                    let new = asym.get(i, j) + asym.get(j, i);
                    assert!((total - new).abs() < 1e-9, "r={} ({},{})", ratio, i, j);

                    let lo = asym.get(i, j).min(asym.get(j, i));
                    let share = ratio.min(100.0 - ratio);
                    assert!((lo - total * share / 100.0).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_asymmetry_is_seedable_and_flips_both_ways() {
        let base = DelayMatrix::base();
        let a = base
            .with_asymmetry(20.0, &mut StdRng::seed_from_u64(7))
            .unwrap();
        let b = base
            .with_asymmetry(20.0, &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert_eq!(a, b);

        // 28 pairs, the coin should land both ways
        let mut upper_small = 0;
        let mut upper_large = 0;
        for i in 0..a.len() {
            for j in i + 1..a.len() {
                if a.get(i, j) < a.get(j, i) {
                    upper_small += 1;
                } else {
                    upper_large += 1;
                }
            }
        }
        assert!(upper_small > 0 && upper_large > 0);

        assert!(base.with_asymmetry(100.5, &mut StdRng::seed_from_u64(7)).is_err());
        assert!(base.with_asymmetry(-1.0, &mut StdRng::seed_from_u64(7)).is_err());
    }

    #[test]
    fn test_csv() {
        let m = DelayMatrix::from_rows(vec![vec![0.1, 6.0], vec![6.0, 0.1]]).unwrap();
        assert_eq!(m.to_csv().unwrap(), "0.1,6\n6,0.1\n");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delay.csv");
        DelayMatrix::base().save_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 8);
        assert_eq!(text.lines().next().unwrap(), "0.1,6,33,38,74,87,106,99");

        assert!(DelayMatrix::from_rows(vec![vec![0.1, 6.0]]).is_err());
        assert!(DelayMatrix::from_rows(vec![vec![-1.0]]).is_err());
    }

    #[test]
    fn test_jitter_amplitude() {
        for j in &[0.0, 1.0, 5.0, 17.5, 100.0] {
            assert_eq!(jitter_amplitude(*j) * 2.0, *j);
        }
        assert_eq!(jitter_amplitude(10.0), 5.0);
    }
}
