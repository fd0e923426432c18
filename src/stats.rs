//! Group statistics on evoked responses.
//!
//! * [`simpson`]: composite Simpson integration on a sampled curve, as
//!   `scipy.integrate.simps(y, x)` (averaging both end treatments when the
//!   sample count is even).
//! * [`peak_finder`]: `mne.preprocessing.peak_finder`.
//! * [`ttest_ind`]: two-sample Student t-test (pooled variance).
//! * [`ttest_welch_weighted`]: Welch t-test on frequency-weighted samples,
//!   as `statsmodels.stats.weightstats.ttest_ind(usevar='unequal')`.
use std::f64::consts::PI;

use anyhow::{ensure, Result};

// ── Integration ──────────────────────────────────────────────────────────────

/// Integral of `y` over the sample points `x`.
pub fn simpson(y: &[f64], x: &[f64]) -> f64 {
    let n = y.len().min(x.len());
    match n {
        0 | 1 => 0.0,
        2 => trapezoid(y[0], y[1], x[1] - x[0]),
        _ if n % 2 == 1 => simpson_odd(&y[..n], &x[..n]),
        _ => {
            let head = simpson_odd(&y[..n - 1], &x[..n - 1]) + trapezoid(y[n - 2], y[n - 1], x[n - 1] - x[n - 2]);
            let tail = trapezoid(y[0], y[1], x[1] - x[0]) + simpson_odd(&y[1..n], &x[1..n]);
            (head + tail) / 2.0
        }
    }
}

fn trapezoid(a: f64, b: f64, h: f64) -> f64 {
    h * (a + b) / 2.0
}

/// Simpson over an odd number of possibly uneven samples.
fn simpson_odd(y: &[f64], x: &[f64]) -> f64 {
    (0..y.len().saturating_sub(2))
        .step_by(2)
        .map(|i| {
            let h0 = x[i + 1] - x[i];
            let h1 = x[i + 2] - x[i + 1];
            let hsum = h0 + h1;
            let ratio = h0 / h1;
            hsum / 6.0
                * (y[i] * (2.0 - 1.0 / ratio) + y[i + 1] * hsum * hsum / (h0 * h1) + y[i + 2] * (2.0 - ratio))
        })
        .sum()
}

// ── Peaks ────────────────────────────────────────────────────────────────────

/// Peak polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extrema {
    Maxima,
    Minima,
}

/// Local extrema that stand out by at least `thresh` from their
/// surroundings.  Returns `(index, value)` pairs in signal order.
///
/// `thresh` defaults to `(max − min) / 4`.  An empty signal has no peaks.
pub fn peak_finder(x0: &[f64], thresh: Option<f64>, extrema: Extrema) -> Vec<(usize, f64)> {
    if x0.is_empty() {
        return Vec::new();
    }
    let sign = match extrema {
        Extrema::Maxima => 1.0,
        Extrema::Minima => -1.0,
    };
    let thresh = thresh.unwrap_or_else(|| (max(x0) - min(x0)) / 4.0);
    let s: Vec<f64> = x0.iter().map(|v| sign * v).collect();
    let n = s.len();

    // Sign changes of the derivative; flat runs count as descending so the
    // first of repeated values is taken.
    let dx: Vec<f64> = s.windows(2).map(|w| if w[1] == w[0] { -f64::EPSILON } else { w[1] - w[0] }).collect();
    let mut ind: Vec<usize> = vec![0];
    ind.extend((1..dx.len()).filter(|&i| dx[i - 1] * dx[i] < 0.0));
    if n > 1 {
        ind.push(n - 1);
    }
    let mut x: Vec<f64> = ind.iter().map(|&i| s[i]).collect();
    let min_mag = min(&x);

    let found: Vec<(usize, f64)> = if x.len() > 2 {
        let sd0 = (x[1] - x[0]).signum();
        let sd1 = (x[2] - x[1]).signum();
        let mut ii: isize;
        if x[1] - x[0] <= 0.0 {
            ii = -1;
            if sd0 == sd1 {
                x.remove(1);
                ind.remove(1);
            }
        } else {
            ii = 0;
            if sd0 == sd1 {
                x.remove(0);
                ind.remove(0);
            }
        }
        let len = x.len() as isize;

        let mut peaks: Vec<(usize, f64)> = Vec::new();
        let mut temp_mag = min_mag;
        let mut temp_loc = 0usize;
        let mut found_peak = false;
        let mut left_min = min_mag;

        while ii < len - 1 {
            ii += 1;
            let last_peak = peaks.last().map(|p| p.1);
            if found_peak {
                if let Some(lp) = last_peak {
                    if x[ii as usize] > lp || left_min < lp - thresh {
                        temp_mag = min_mag;
                        found_peak = false;
                    }
                }
            }
            if ii == len - 1 {
                break;
            }
            let xi = x[ii as usize];
            if xi > temp_mag && xi > left_min + thresh {
                temp_loc = ii as usize;
                temp_mag = xi;
            }
            ii += 1;
            let xv = x[ii as usize];
            if !found_peak && temp_mag > thresh + xv {
                found_peak = true;
                left_min = xv;
                peaks.push((temp_loc, temp_mag));
            } else if xv < left_min {
                left_min = xv;
            }
        }

        let last = x[x.len() - 1];
        if last > temp_mag && last > left_min + thresh {
            peaks.push((x.len() - 1, last));
        } else if !found_peak && temp_mag > min_mag {
            peaks.push((temp_loc, temp_mag));
        }
        peaks.into_iter().map(|(loc, mag)| (ind[loc], mag)).collect()
    } else {
        // Monotone: only an endpoint can be a peak.
        let (loc, mag) = x
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
        if mag > min_mag + thresh { vec![(ind[loc], mag)] } else { Vec::new() }
    };

    found.into_iter().map(|(i, m)| (i, sign * m)).collect()
}

fn max(x: &[f64]) -> f64 {
    x.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min(x: &[f64]) -> f64 {
    x.iter().copied().fold(f64::INFINITY, f64::min)
}

/// ABR peak-to-peak amplitude: largest maximum in `max_window` minus the
/// smallest minimum in `min_window`, with one threshold `(max − min) / 4`
/// over both windows.  A window without peaks contributes 0.
pub fn peak_to_peak(min_window: &[f64], max_window: &[f64]) -> f64 {
    let both: Vec<f64> = min_window.iter().chain(max_window).copied().collect();
    if both.is_empty() {
        return 0.0;
    }
    let thresh = (max(&both) - min(&both)) / 4.0;
    let lows = peak_finder(min_window, Some(thresh), Extrema::Minima);
    let highs = peak_finder(max_window, Some(thresh), Extrema::Maxima);
    let minimum = if lows.is_empty() { 0.0 } else { lows.iter().map(|p| p.1).fold(f64::INFINITY, f64::min) };
    let maximum = if highs.is_empty() { 0.0 } else { highs.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max) };
    maximum - minimum
}

// ── t-tests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    pub statistic: f64,
    /// Two-sided.
    pub pvalue: f64,
    pub df: f64,
}

impl std::fmt::Display for TTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t = {:.4}, p = {:.4}, df = {:.2}", self.statistic, self.pvalue, self.df)
    }
}

fn mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

/// Two-sample t-test with pooled variance (`scipy.stats.ttest_ind`).
pub fn ttest_ind(a: &[f64], b: &[f64]) -> Result<TTest> {
    ensure!(a.len() >= 2 && b.len() >= 2, "t-test needs at least two samples per group");
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (ma, mb) = (mean(a), mean(b));
    let ssa: f64 = a.iter().map(|v| (v - ma).powi(2)).sum();
    let ssb: f64 = b.iter().map(|v| (v - mb).powi(2)).sum();
    let df = na + nb - 2.0;
    let pooled = (ssa + ssb) / df;
    let statistic = (ma - mb) / (pooled * (1.0 / na + 1.0 / nb)).sqrt();
    Ok(TTest { statistic, pvalue: two_sided_p(statistic, df), df })
}

/// Welch t-test on weighted samples.
///
/// Weights act as frequency weights: each group's effective size is the sum
/// of its weights.  Means and variances are weighted; the degrees of freedom
/// follow Welch–Satterthwaite.
pub fn ttest_welch_weighted(a: &[f64], wa: &[f64], b: &[f64], wb: &[f64]) -> Result<TTest> {
    ensure!(a.len() == wa.len() && b.len() == wb.len(), "one weight per sample required");
    let describe = |x: &[f64], w: &[f64]| -> Result<(f64, f64, f64)> {
        let sw: f64 = w.iter().sum();
        ensure!(sw > 1.0, "sum of weights must exceed 1, got {sw}");
        let m = x.iter().zip(w).map(|(v, w)| v * w).sum::<f64>() / sw;
        let var = x.iter().zip(w).map(|(v, w)| w * (v - m).powi(2)).sum::<f64>() / sw;
        Ok((m, var, sw))
    };
    let (ma, va, na) = describe(a, wa)?;
    let (mb, vb, nb) = describe(b, wb)?;

    let sem_a = va / (na - 1.0);
    let sem_b = vb / (nb - 1.0);
    let sem = sem_a + sem_b;
    let statistic = (ma - mb) / sem.sqrt();
    let df = 1.0 / ((sem_a / sem).powi(2) / (na - 1.0) + (sem_b / sem).powi(2) / (nb - 1.0));
    Ok(TTest { statistic, pvalue: two_sided_p(statistic, df), df })
}

/// `P(|T| > |t|)` for Student's t with `df` degrees of freedom.
pub fn two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    reg_incomplete_beta(df / 2.0, 0.5, df / (df + t * t)).clamp(0.0, 1.0)
}

/// Regularized incomplete beta `I_x(a, b)` (continued fraction, Lentz).
pub fn reg_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    if x < (a + 1.0) / (a + b + 2.0) {
        ln_front.exp() * beta_cf(a, b, x) / a
    } else {
        1.0 - ln_front.exp() * beta_cf(b, a, 1.0 - x) / b
    }
}

fn beta_cf(a: f64, b: f64, x: f64) -> f64 {
    const TINY: f64 = 1e-300;
    const EPS: f64 = 1e-15;
    let mut c = 1.0;
    let mut d = 1.0 - (a + b) * x / (a + 1.0);
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;
    for m in 1..500 {
        let m = m as f64;
        let m2 = 2.0 * m;
        for aa in [
            m * (b - m) * x / ((a + m2 - 1.0) * (a + m2)),
            -(a + m) * (a + b + m) * x / ((a + m2) * (a + m2 + 1.0)),
        ] {
            d = 1.0 + aa * d;
            if d.abs() < TINY {
                d = TINY;
            }
            c = 1.0 + aa / c;
            if c.abs() < TINY {
                c = TINY;
            }
            d = 1.0 / d;
            h *= d * c;
        }
        if (d * c - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// `ln Γ(x)` for `x > 0` (Lanczos, g = 7).
pub fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + G + 0.5;
    let series = COEF[1..]
        .iter()
        .enumerate()
        .fold(COEF[0], |acc, (i, c)| acc + c / (x + i as f64 + 1.0));
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn simpson_exact_for_cubics() {
        let x: Vec<f64> = (0..=10).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|t| t * t * t).collect();
        assert_abs_diff_eq!(simpson(&y, &x), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn simpson_even_count_averages() {
        // (13/3 + 6 + 3/2 + 26/3) / 2
        assert_abs_diff_eq!(simpson(&[1.0, 2.0, 4.0, 8.0], &[0.0, 1.0, 2.0, 3.0]), 10.25, epsilon = 1e-12);
        assert_abs_diff_eq!(simpson(&[1.0, 3.0], &[0.0, 2.0]), 4.0);
        assert_eq!(simpson(&[5.0], &[0.0]), 0.0);
    }

    #[test]
    fn finds_single_maximum_and_minimum() {
        let x: Vec<f64> = (0..100).map(|i| (i as f64 / 99.0 * PI).sin()).collect();
        let peaks = peak_finder(&x, None, Extrema::Maxima);
        assert_eq!(peaks.len(), 1);
        assert!((48..=51).contains(&peaks[0].0));
        let neg: Vec<f64> = x.iter().map(|v| -v).collect();
        let troughs = peak_finder(&neg, None, Extrema::Minima);
        assert_eq!(troughs.len(), 1);
        assert!(troughs[0].1 < -0.99);
    }

    #[test]
    fn small_ripples_below_threshold_ignored() {
        let x = [0.0, 1.0, 0.9, 1.0, 0.0, 0.0, 3.0, 0.0];
        let peaks = peak_finder(&x, Some(0.5), Extrema::Maxima);
        let mags: Vec<f64> = peaks.iter().map(|p| p.1).collect();
        assert_eq!(mags, vec![1.0, 3.0]);
    }

    #[test]
    fn peak_to_peak_amplitude() {
        let trough = [0.0, -1.0, -3.0, -1.0, 0.0];
        let crest = [0.0, 2.0, 5.0, 2.0, 0.0];
        assert_abs_diff_eq!(peak_to_peak(&trough, &crest), 8.0);
        assert_eq!(peak_to_peak(&[], &[]), 0.0);
    }

    #[test]
    fn student_t_matches_scipy() {
        // scipy.stats.ttest_ind([1,2,3,4,5], [2,4,6,8,10]) → t=-1.8974, p=0.09435
        let r = ttest_ind(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 6.0, 8.0, 10.0]).unwrap();
        assert_abs_diff_eq!(r.statistic, -1.897_366_596, epsilon = 1e-8);
        assert_abs_diff_eq!(r.pvalue, 0.094_349_77, epsilon = 1e-6);
        assert_eq!(r.df, 8.0);
    }

    #[test]
    fn unit_weights_give_plain_welch() {
        // scipy.stats.ttest_ind(a, b, equal_var=False) → t=-1.8974, df=5.882
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let r = ttest_welch_weighted(&a, &[1.0; 5], &b, &[1.0; 5]).unwrap();
        assert_abs_diff_eq!(r.statistic, -1.897_366_596, epsilon = 1e-8);
        assert_abs_diff_eq!(r.df, 5.882_352_94, epsilon = 1e-6);
    }

    #[test]
    fn t_distribution_tails() {
        assert_abs_diff_eq!(two_sided_p(0.0, 10.0), 1.0, epsilon = 1e-12);
        // t = 2.228 is the 97.5 % quantile at df = 10.
        assert_abs_diff_eq!(two_sided_p(2.228_138_85, 10.0), 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(ln_gamma(5.0), 24.0_f64.ln(), epsilon = 1e-12);
    }
}
