//! Re-referencing.
//!
//! Matches `raw.set_eeg_reference(ref_channels, projection=False)`:
//!
//! `data`: [C, T]  →  `data[c, t] -= mean(data[refs, t])`
//!
//! The reference channels are re-referenced too, so a linked-mastoid pair
//! ends up as `±(a − b)/2`.
use anyhow::{bail, Result};
use ndarray::{Array1, Array2};

/// Mastoid electrodes used as the linked reference.
pub const MASTOID_CHANNELS: [&str; 2] = ["mr", "ml"];

/// Subtract the mean of the `refs` rows from every row.
pub fn reference_inplace(data: &mut Array2<f64>, refs: &[usize]) -> Result<()> {
    if refs.is_empty() {
        bail!("no reference channels given");
    }
    if let Some(&bad) = refs.iter().find(|&&r| r >= data.nrows()) {
        bail!("reference channel index {bad} out of range ({} channels)", data.nrows());
    }
    let mut mean = Array1::<f64>::zeros(data.ncols());
    for &r in refs {
        mean += &data.row(r);
    }
    mean /= refs.len() as f64;
    for mut row in data.rows_mut() {
        row -= &mean;
    }
    Ok(())
}

/// Reference to the channels named in `ref_names`.
pub fn reference_by_name(data: &mut Array2<f64>, ch_names: &[String], ref_names: &[&str]) -> Result<()> {
    let refs = ref_names
        .iter()
        .map(|name| {
            ch_names
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
                .ok_or_else(|| anyhow::anyhow!("reference channel '{name}' not found in {ch_names:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    reference_inplace(data, &refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mastoid_reference() {
        // rows: cz, mr, ml
        let mut data = Array2::from_shape_fn((3, 10), |(c, _)| [10.0, 2.0, 4.0][c]);
        reference_by_name(&mut data, &names(&["cz", "mr", "ml"]), &MASTOID_CHANNELS).unwrap();
        for t in 0..10 {
            approx::assert_abs_diff_eq!(data[[0, t]], 7.0);
            approx::assert_abs_diff_eq!(data[[1, t]], -1.0);
            approx::assert_abs_diff_eq!(data[[2, t]], 1.0);
        }
    }

    #[test]
    fn missing_reference_channel() {
        let mut data = Array2::zeros((2, 4));
        assert!(reference_by_name(&mut data, &names(&["cz", "fz"]), &MASTOID_CHANNELS).is_err());
        assert!(reference_inplace(&mut data, &[5]).is_err());
        assert!(reference_inplace(&mut data, &[]).is_err());
    }
}
