//! Column-wise array kernels.
//!
//! Forecast aggregation stores simulated counts in flat buffers where each
//! column — the innermost axis — occupies a contiguous run of `col_len`
//! elements. The kernels here operate on such buffers: prefix sums, per
//! column sorting and indexing, rank searches, and Poisson injection. None
//! of them allocate beyond their documented result container.

use std::ops::Add;

use etas_system_random::RandomGenerator;

/// Converts an array to cumulative values in place.
///
/// With `up` true the values accumulate toward increasing indices; with
/// `up` false they accumulate toward decreasing indices.
pub fn cumulate<T>(x: &mut [T], up: bool)
where
    T: Copy + Add<Output = T>,
{
    if x.len() < 2 {
        return;
    }
    if up {
        for n in 1..x.len() {
            x[n] = x[n - 1] + x[n];
        }
    } else {
        for n in (0..x.len() - 1).rev() {
            x[n] = x[n + 1] + x[n];
        }
    }
}

/// Converts a flat row-major matrix to cumulative values along both axes.
///
/// The buffer holds `x.len() / row_len` rows of `row_len` elements each.
/// `up_rows` and `up_cols` choose the accumulation direction along the
/// outer and inner axis respectively, as in [`cumulate`].
pub fn cumulate_2d<T>(x: &mut [T], row_len: usize, up_rows: bool, up_cols: bool)
where
    T: Copy + Add<Output = T>,
{
    debug_assert!(row_len > 0 && x.len() % row_len == 0, "ragged matrix");
    for row in x.chunks_mut(row_len) {
        cumulate(row, up_cols);
    }
    let rows = x.len() / row_len;
    if rows < 2 {
        return;
    }
    if up_rows {
        for m in 1..rows {
            for n in 0..row_len {
                x[m * row_len + n] = x[(m - 1) * row_len + n] + x[m * row_len + n];
            }
        }
    } else {
        for m in (0..rows - 1).rev() {
            for n in 0..row_len {
                x[m * row_len + n] = x[(m + 1) * row_len + n] + x[m * row_len + n];
            }
        }
    }
}

/// Sorts elements `lo..hi` of every column into ascending order.
pub fn sort_each_column<T: PartialOrd>(x: &mut [T], col_len: usize, lo: usize, hi: usize) {
    debug_assert!(col_len > 0 && x.len() % col_len == 0, "ragged columns");
    debug_assert!(lo <= hi && hi <= col_len, "sort window out of bounds");
    if hi - lo < 2 {
        return;
    }
    for column in x.chunks_mut(col_len) {
        column[lo..hi]
            .sort_unstable_by(|a, b| a.partial_cmp(b).expect("column elements must be ordered"));
    }
}

/// Copies the element at `index` of every column into `out`.
pub fn get_each_column<T: Copy>(x: &[T], col_len: usize, index: usize, out: &mut [T]) {
    debug_assert!(col_len > 0 && x.len() % col_len == 0, "ragged columns");
    debug_assert!(index < col_len, "column index out of bounds");
    debug_assert_eq!(out.len(), x.len() / col_len, "output length mismatch");
    for (slot, column) in out.iter_mut().zip(x.chunks(col_len)) {
        *slot = column[index];
    }
}

/// Stores `value` at `index` of every column.
pub fn set_each_column<T: Copy>(x: &mut [T], col_len: usize, index: usize, value: T) {
    debug_assert!(col_len > 0 && x.len() % col_len == 0, "ragged columns");
    debug_assert!(index < col_len, "column index out of bounds");
    for column in x.chunks_mut(col_len) {
        column[index] = value;
    }
}

/// Resets elements `lo..hi` of every column to the default value.
pub fn zero_each_column<T: Copy + Default>(x: &mut [T], col_len: usize, lo: usize, hi: usize) {
    debug_assert!(col_len > 0 && x.len() % col_len == 0, "ragged columns");
    debug_assert!(lo <= hi && hi <= col_len, "zero window out of bounds");
    for column in x.chunks_mut(col_len) {
        column[lo..hi].fill(T::default());
    }
}

/// Rebuilds a column buffer with a new column length.
///
/// Each column keeps the prefix that fits; grown columns are padded with
/// the default value. This is the one kernel that allocates, returning the
/// resized buffer.
#[must_use]
pub fn resize_each_column<T: Copy + Default>(x: &[T], old_len: usize, new_len: usize) -> Vec<T> {
    debug_assert!(old_len > 0 && x.len() % old_len == 0, "ragged columns");
    debug_assert!(new_len > 0, "empty target columns");
    let columns = x.len() / old_len;
    let mut result = vec![T::default(); columns * new_len];
    let keep = old_len.min(new_len);
    for (src, dst) in x.chunks(old_len).zip(result.chunks_mut(new_len)) {
        dst[..keep].copy_from_slice(&src[..keep]);
    }
    result
}

/// First index `n` in `(lo..hi]` with `x[n] > v`, over a sorted window.
///
/// The virtual sentinels `x[lo - 1] = -inf` and `x[hi] = +inf` make the
/// result well-defined at both ends: `lo` when every element exceeds `v`,
/// `hi` when none does.
#[must_use]
pub fn bsearch<T: PartialOrd + Copy>(x: &[T], v: T, lo: usize, hi: usize) -> usize {
    debug_assert!(lo <= hi && hi <= x.len(), "search window out of bounds");
    lo + x[lo..hi].partition_point(|&e| e <= v)
}

/// Fraction of the sorted window `lo..hi` strictly above `v`.
#[must_use]
pub fn probex<T: PartialOrd + Copy>(x: &[T], v: T, lo: usize, hi: usize) -> f64 {
    debug_assert!(lo < hi, "probability window is empty");
    (hi - bsearch(x, v, lo, hi)) as f64 / (hi - lo) as f64
}

/// Computes [`probex`] against each column with a per-column threshold.
pub fn probex_each_column<T: PartialOrd + Copy>(
    x: &[T],
    col_len: usize,
    lo: usize,
    hi: usize,
    values: &[T],
    out: &mut [f64],
) {
    debug_assert!(col_len > 0 && x.len() % col_len == 0, "ragged columns");
    debug_assert_eq!(values.len(), x.len() / col_len, "threshold length mismatch");
    debug_assert_eq!(out.len(), x.len() / col_len, "output length mismatch");
    for ((slot, column), &v) in out.iter_mut().zip(x.chunks(col_len)).zip(values) {
        *slot = probex(column, v, lo, hi);
    }
}

/// Element of the sorted window `lo..hi` at fractile `q`.
///
/// The rank is `round(q * (window - 1))`, so `q = 0.5` selects the median
/// of an odd-length window exactly.
#[must_use]
pub fn fractile<T: Copy>(x: &[T], lo: usize, hi: usize, q: f64) -> T {
    debug_assert!(lo < hi && hi <= x.len(), "fractile window is empty");
    debug_assert!((0.0..=1.0).contains(&q), "fractile out of range");
    let offset = (q * (hi - lo - 1) as f64).round() as usize;
    x[lo + offset.min(hi - lo - 1)]
}

/// Arithmetic mean of the array.
#[must_use]
pub fn array_average<T: Copy + Into<f64>>(x: &[T]) -> f64 {
    debug_assert!(!x.is_empty(), "average of empty array");
    let total: f64 = x.iter().map(|&e| e.into()).sum();
    total / x.len() as f64
}

/// Adds an independent Poisson variate to each element in place.
///
/// Element `i` receives `Poisson(means[i])`; means below the small-count
/// threshold contribute nothing (see
/// [`RandomGenerator::poisson_sample`]).
pub fn add_poisson_array(rangen: &mut RandomGenerator, means: &[f64], x: &mut [u32]) {
    debug_assert_eq!(means.len(), x.len(), "mean length mismatch");
    for (slot, &mean) in x.iter_mut().zip(means) {
        let draw = rangen.poisson_sample(mean);
        *slot = slot.saturating_add(u32::try_from(draw).unwrap_or(u32::MAX));
    }
}
