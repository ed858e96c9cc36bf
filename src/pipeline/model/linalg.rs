//! Small dense linear-algebra helpers for regression fitting

use faer::Mat;

/// Relative tolerance below which a term is treated as a linear combination
/// of earlier terms.
pub const COLLINEARITY_TOLERANCE: f64 = 1e-7;

/// Build an `n × p` matrix from row-major data.
pub fn from_rows(rows: &[Vec<f64>], p: usize) -> Mat<f64> {
    let mut m = Mat::<f64>::zeros(rows.len(), p);
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            m[(i, j)] = v;
        }
    }
    m
}

/// Weighted cross-product `Xᵀ diag(w) X`; unit weights when `w` is `None`.
pub fn cross_product(x: &Mat<f64>, w: Option<&[f64]>) -> Mat<f64> {
    let (n, p) = (x.nrows(), x.ncols());
    let mut wx = Mat::<f64>::zeros(n, p);
    for i in 0..n {
        let wi = w.map_or(1.0, |w| w[i]);
        for j in 0..p {
            wx[(i, j)] = wi * x[(i, j)];
        }
    }
    x.transpose() * &wx
}

/// Weighted `Xᵀ diag(w) z`.
pub fn cross_vector(x: &Mat<f64>, w: Option<&[f64]>, z: &[f64]) -> Vec<f64> {
    let (n, p) = (x.nrows(), x.ncols());
    let mut out = vec![0.0; p];
    for i in 0..n {
        let wz = w.map_or(1.0, |w| w[i]) * z[i];
        for (j, o) in out.iter_mut().enumerate() {
            *o += x[(i, j)] * wz;
        }
    }
    out
}

/// `X β`.
pub fn multiply(x: &Mat<f64>, beta: &[f64]) -> Vec<f64> {
    (0..x.nrows())
        .map(|i| (0..x.ncols()).map(|j| x[(i, j)] * beta[j]).sum())
        .collect()
}

/// Square matrix times vector.
pub fn apply(a: &Mat<f64>, v: &[f64]) -> Vec<f64> {
    multiply(a, v)
}

/// Invert a square matrix with Gauss-Jordan elimination and partial pivoting.
///
/// Returns `None` when a pivot vanishes relative to the matrix scale.
pub fn invert(a: &Mat<f64>) -> Option<Mat<f64>> {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());

    let scale = (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .map(|(i, j)| a[(i, j)].abs())
        .fold(0.0_f64, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }

    let mut m = a.clone();
    let mut inv = Mat::<f64>::identity(n, n);

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&r1, &r2| {
            m[(r1, col)]
                .abs()
                .partial_cmp(&m[(r2, col)].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        let pivot = m[(pivot_row, col)];
        if pivot.abs() <= f64::EPSILON * scale * n as f64 {
            return None;
        }

        if pivot_row != col {
            for j in 0..n {
                let tmp = m[(col, j)];
                m[(col, j)] = m[(pivot_row, j)];
                m[(pivot_row, j)] = tmp;
                let tmp = inv[(col, j)];
                inv[(col, j)] = inv[(pivot_row, j)];
                inv[(pivot_row, j)] = tmp;
            }
        }

        for j in 0..n {
            m[(col, j)] /= pivot;
            inv[(col, j)] /= pivot;
        }

        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = m[(r, col)];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                m[(r, j)] -= factor * m[(col, j)];
                inv[(r, j)] -= factor * inv[(col, j)];
            }
        }
    }

    Some(inv)
}

/// Index of the first column of `x` that is (numerically) a linear combination
/// of the columns before it, found by modified Gram-Schmidt.
pub fn first_collinear_column(x: &Mat<f64>) -> Option<usize> {
    let (n, p) = (x.nrows(), x.ncols());
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(p);

    for j in 0..p {
        let mut v: Vec<f64> = (0..n).map(|i| x[(i, j)]).collect();
        let original = norm(&v);
        if original == 0.0 {
            return Some(j);
        }
        for q in &basis {
            let proj: f64 = q.iter().zip(&v).map(|(a, b)| a * b).sum();
            for (vi, qi) in v.iter_mut().zip(q) {
                *vi -= proj * qi;
            }
        }
        let residual = norm(&v);
        if residual <= COLLINEARITY_TOLERANCE * original {
            return Some(j);
        }
        basis.push(v.iter().map(|vi| vi / residual).collect());
    }
    None
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
