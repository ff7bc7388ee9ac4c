//! Point insertion along a one-dimensional parameterization, such as
//! normalized distance along a shape.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpolationError {
    #[error("at least two values are required, got {0}")]
    TooFewValues(usize),
    #[error("value at index {0} is not finite")]
    NonFinite(usize),
    #[error("values must be strictly increasing (index {0})")]
    NotIncreasing(usize),
}

fn validate(xs: &[f64]) -> Result<(), InterpolationError> {
    if let Some(index) = xs.iter().position(|value| !value.is_finite()) {
        return Err(InterpolationError::NonFinite(index));
    }
    if let Some(index) = xs.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(InterpolationError::NotIncreasing(index + 1));
    }
    Ok(())
}

/// Inserts `n` values into the strictly increasing `xs`, spreading them out.
///
/// Each round splits the largest gap into the fewest equal parts that bring it
/// down to the size of the second largest gap, never placing more values than
/// are still owed. Ties go to the last of the equal gaps.
pub fn insert_by_count(xs: &[f64], n: usize) -> Result<Vec<f64>, InterpolationError> {
    if xs.len() < 2 {
        return Err(InterpolationError::TooFewValues(xs.len()));
    }
    validate(xs)?;

    let mut values = xs.to_vec();
    values.reserve(n);
    let mut remaining = n;
    while remaining > 0 {
        let (i, d_i, k) = if values.len() == 2 {
            (0, values[1] - values[0], remaining)
        } else {
            let (i, d_i, d_j) = two_largest_gaps(&values);
            let k = ((d_i / d_j - 1.0).ceil().max(1.0) as usize).min(remaining);
            (i, d_i, k)
        };

        let start = values[i];
        let step = d_i / (k + 1) as f64;
        let inserted: Vec<f64> = (1..=k).map(|s| start + s as f64 * step).collect();
        values.splice(i + 1..i + 1, inserted);
        remaining -= k;
    }
    Ok(values)
}

/// Index and size of the largest gap, and the size of the runner-up.
fn two_largest_gaps(values: &[f64]) -> (usize, f64, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    let mut second = f64::NEG_INFINITY;
    for (index, pair) in values.windows(2).enumerate() {
        let gap = pair[1] - pair[0];
        if gap >= best.1 {
            second = best.1;
            best = (index, gap);
        } else if gap > second {
            second = gap;
        }
    }
    (best.0, best.1, second)
}

/// Inserts values into the strictly increasing `xs` so that no two
/// consecutive values are more than `d` apart.
///
/// The span `[xs[0], xs[last]]` is cut into bins of width `d` (the last one
/// possibly shorter) and the left edge of every bin that holds no value of
/// `xs` is added. Bin edges alone can leave a gap wider than `d`, e.g. next
/// to a value sitting late in its bin, so a second pass splits every such gap
/// evenly. Every gap in the result is at most `d`.
/// `xs` is returned unchanged when it has fewer than two values, or when `d`
/// is not positive or not smaller than the span.
pub fn insert_by_max_gap(xs: &[f64], d: f64) -> Result<Vec<f64>, InterpolationError> {
    if xs.len() < 2 {
        return Ok(xs.to_vec());
    }
    validate(xs)?;
    let first = xs[0];
    let span = xs[xs.len() - 1] - first;
    if !(d > 0.0) || d >= span {
        return Ok(xs.to_vec());
    }

    let bin_count = (span / d).ceil() as usize;
    let mut edges = Vec::new();
    let mut cursor = 0;
    for bin in 0..bin_count {
        let left = first + bin as f64 * d;
        let right = if bin + 1 == bin_count {
            f64::INFINITY
        } else {
            first + (bin + 1) as f64 * d
        };
        let occupied = cursor < xs.len() && xs[cursor] < right;
        if !occupied {
            edges.push(left);
        }
        while cursor < xs.len() && xs[cursor] < right {
            cursor += 1;
        }
    }

    let mut merged = Vec::with_capacity(xs.len() + edges.len());
    let (mut a, mut b) = (0, 0);
    while a < xs.len() || b < edges.len() {
        if b >= edges.len() || (a < xs.len() && xs[a] < edges[b]) {
            merged.push(xs[a]);
            a += 1;
        } else {
            merged.push(edges[b]);
            b += 1;
        }
    }

    let mut values = Vec::with_capacity(merged.len());
    values.push(merged[0]);
    for pair in merged.windows(2) {
        let gap = pair[1] - pair[0];
        if gap > d {
            let parts = (gap / d).ceil() as usize;
            let step = gap / parts as f64;
            values.extend((1..parts).map(|s| pair[0] + s as f64 * step));
        }
        values.push(pair[1]);
    }
    Ok(values)
}
