//! Matrix multiplication strategies.
//!
//! Every strategy computes `C := alpha*A*B + beta*C` for square row-major
//! matrices and times its kernel as exactly one timer cycle. Following the
//! BLAS convention, `beta == 0` overwrites `C` without reading it.

use crate::error::StrategyError;
use crate::registry::{StrategyHandle, StrategyRegistry};
use crate::timer::Timer;
use crate::Real;
#[cfg(not(feature = "f32"))]
use matrixmultiply::dgemm as gemm;
#[cfg(feature = "f32")]
use matrixmultiply::sgemm as gemm;
use rayon::prelude::*;

/// Edge length of the square tiles used by the blocked kernels.
pub const BLOCK_SIZE: usize = 64;

/// A matrix multiplication kernel.
pub trait MultiplyMethod: Send + Sync {
    /// Compute `C := alpha*A*B + beta*C`.
    ///
    /// `a`, `b` and `c` each hold `n * n` elements; callers going through
    /// [`MultiplyHandle::multiply`] get that checked.
    #[allow(clippy::too_many_arguments)]
    fn multiply(
        &self,
        timer: &mut Timer,
        nthreads: usize,
        n: usize,
        alpha: Real,
        a: &[Real],
        b: &[Real],
        beta: Real,
        c: &mut [Real],
    ) -> Result<(), StrategyError>;
}

pub type MultiplyRegistry = StrategyRegistry<dyn MultiplyMethod>;
pub type MultiplyHandle = StrategyHandle<dyn MultiplyMethod>;

type MultiplyFactory = fn(&str) -> Result<Box<dyn MultiplyMethod>, StrategyError>;

/// Built-ins in enumeration order.
const BUILTINS: [(&str, MultiplyFactory); 6] = [
    ("basic", builtin::<Basic>),
    ("smart", builtin::<Smart>),
    ("opt", builtin::<Blocked>),
    ("parallel", builtin::<Parallel>),
    ("parallel-opt", builtin::<ParallelBlocked>),
    ("blas", builtin::<Gemm>),
];

/// Multiply registry with the built-in strategies installed on first use.
pub fn multiply_registry() -> MultiplyRegistry {
    StrategyRegistry::with_installer("multiply", install_builtins)
}

fn install_builtins(registry: &MultiplyRegistry) {
    // Reverse so the most-recent-first listing reads in natural order.
    for (name, factory) in BUILTINS.iter().rev() {
        if let Err(err) = registry.register_builtin(name, None, *factory) {
            log::warn!("skipping built-in multiply strategy '{name}': {err}");
        }
    }
}

fn builtin<M>(_args: &str) -> Result<Box<dyn MultiplyMethod>, StrategyError>
where
    M: MultiplyMethod + Default + 'static,
{
    Ok(Box::new(M::default()))
}

impl StrategyHandle<dyn MultiplyMethod> {
    /// Run the bound strategy after checking the matrix sizes.
    #[allow(clippy::too_many_arguments)]
    pub fn multiply(
        &self,
        timer: &mut Timer,
        nthreads: usize,
        n: usize,
        alpha: Real,
        a: &[Real],
        b: &[Real],
        beta: Real,
        c: &mut [Real],
    ) -> Result<(), StrategyError> {
        for len in [a.len(), b.len(), c.len()] {
            check_dimension(n, len)?;
        }
        self.instance()
            .multiply(timer, nthreads, n, alpha, a, b, beta, c)
    }
}

pub(crate) fn check_dimension(n: usize, actual: usize) -> Result<(), StrategyError> {
    if n == 0 || n.checked_mul(n) != Some(actual) {
        return Err(StrategyError::Dimension { n, actual });
    }
    Ok(())
}

/// Worker pool for the parallel strategies; zero threads picks rayon's default.
pub(crate) fn thread_pool(nthreads: usize) -> Result<rayon::ThreadPool, StrategyError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(nthreads)
        .build()
        .map_err(|e| StrategyError::ThreadPool(e.to_string()))
}

fn scale(row: &mut [Real], beta: Real) {
    if beta == 0.0 {
        row.fill(0.0);
    } else if beta != 1.0 {
        row.iter_mut().for_each(|x| *x *= beta);
    }
}

/// Textbook i-j-k loop: one dot product per element of `C`.
#[derive(Debug, Default)]
pub struct Basic;

impl MultiplyMethod for Basic {
    fn multiply(
        &self,
        timer: &mut Timer,
        _nthreads: usize,
        n: usize,
        alpha: Real,
        a: &[Real],
        b: &[Real],
        beta: Real,
        c: &mut [Real],
    ) -> Result<(), StrategyError> {
        timer.start();
        for i in 0..n {
            for j in 0..n {
                let mut s = 0.0;
                for k in 0..n {
                    s += a[i * n + k] * b[k * n + j];
                }
                let prior = if beta == 0.0 { 0.0 } else { beta * c[i * n + j] };
                c[i * n + j] = alpha * s + prior;
            }
        }
        timer.stop();
        Ok(())
    }
}

/// i-k-j loop order: the inner loop streams rows of `B` and `C`.
#[derive(Debug, Default)]
pub struct Smart;

fn smart_row(n: usize, alpha: Real, a_row: &[Real], b: &[Real], beta: Real, c_row: &mut [Real]) {
    scale(c_row, beta);
    for (k, &a_ik) in a_row.iter().enumerate() {
        let a_ik = alpha * a_ik;
        let b_row = &b[k * n..(k + 1) * n];
        for (c_ij, &b_kj) in c_row.iter_mut().zip(b_row) {
            *c_ij += a_ik * b_kj;
        }
    }
}

impl MultiplyMethod for Smart {
    fn multiply(
        &self,
        timer: &mut Timer,
        _nthreads: usize,
        n: usize,
        alpha: Real,
        a: &[Real],
        b: &[Real],
        beta: Real,
        c: &mut [Real],
    ) -> Result<(), StrategyError> {
        timer.start();
        for (a_row, c_row) in a.chunks_exact(n).zip(c.chunks_exact_mut(n)) {
            smart_row(n, alpha, a_row, b, beta, c_row);
        }
        timer.stop();
        Ok(())
    }
}

/// Multiply a band of rows of `C` starting at `first_row`, tiled in
/// `BLOCK_SIZE` squares.
fn blocked_rows(
    n: usize,
    first_row: usize,
    alpha: Real,
    a: &[Real],
    b: &[Real],
    beta: Real,
    c_rows: &mut [Real],
) {
    scale(c_rows, beta);
    let rows = c_rows.len() / n;
    for ii in (0..rows).step_by(BLOCK_SIZE) {
        let i_end = (ii + BLOCK_SIZE).min(rows);
        for kk in (0..n).step_by(BLOCK_SIZE) {
            let k_end = (kk + BLOCK_SIZE).min(n);
            for jj in (0..n).step_by(BLOCK_SIZE) {
                let j_end = (jj + BLOCK_SIZE).min(n);
                for i in ii..i_end {
                    let a_row = &a[(first_row + i) * n..(first_row + i + 1) * n];
                    let c_row = &mut c_rows[i * n + jj..i * n + j_end];
                    for k in kk..k_end {
                        let a_ik = alpha * a_row[k];
                        let b_row = &b[k * n + jj..k * n + j_end];
                        for (c_ij, &b_kj) in c_row.iter_mut().zip(b_row) {
                            *c_ij += a_ik * b_kj;
                        }
                    }
                }
            }
        }
    }
}

/// Cache-blocked i-k-j multiply.
#[derive(Debug, Default)]
pub struct Blocked;

impl MultiplyMethod for Blocked {
    fn multiply(
        &self,
        timer: &mut Timer,
        _nthreads: usize,
        n: usize,
        alpha: Real,
        a: &[Real],
        b: &[Real],
        beta: Real,
        c: &mut [Real],
    ) -> Result<(), StrategyError> {
        timer.start();
        blocked_rows(n, 0, alpha, a, b, beta, c);
        timer.stop();
        Ok(())
    }
}

/// Rows of `C` distributed across a rayon pool.
#[derive(Debug, Default)]
pub struct Parallel;

impl MultiplyMethod for Parallel {
    fn multiply(
        &self,
        timer: &mut Timer,
        nthreads: usize,
        n: usize,
        alpha: Real,
        a: &[Real],
        b: &[Real],
        beta: Real,
        c: &mut [Real],
    ) -> Result<(), StrategyError> {
        let pool = thread_pool(nthreads)?;
        timer.start();
        pool.install(|| {
            c.par_chunks_mut(n)
                .zip(a.par_chunks(n))
                .for_each(|(c_row, a_row)| smart_row(n, alpha, a_row, b, beta, c_row));
        });
        timer.stop();
        Ok(())
    }
}

/// Bands of `BLOCK_SIZE` rows distributed across a rayon pool, each tiled.
#[derive(Debug, Default)]
pub struct ParallelBlocked;

impl MultiplyMethod for ParallelBlocked {
    fn multiply(
        &self,
        timer: &mut Timer,
        nthreads: usize,
        n: usize,
        alpha: Real,
        a: &[Real],
        b: &[Real],
        beta: Real,
        c: &mut [Real],
    ) -> Result<(), StrategyError> {
        let pool = thread_pool(nthreads)?;
        timer.start();
        pool.install(|| {
            c.par_chunks_mut(BLOCK_SIZE * n)
                .enumerate()
                .for_each(|(band, c_rows)| {
                    blocked_rows(n, band * BLOCK_SIZE, alpha, a, b, beta, c_rows)
                });
        });
        timer.stop();
        Ok(())
    }
}

/// Library GEMM kernel from `matrixmultiply`, run on the calling thread.
#[derive(Debug, Default)]
pub struct Gemm;

impl MultiplyMethod for Gemm {
    fn multiply(
        &self,
        timer: &mut Timer,
        _nthreads: usize,
        n: usize,
        alpha: Real,
        a: &[Real],
        b: &[Real],
        beta: Real,
        c: &mut [Real],
    ) -> Result<(), StrategyError> {
        // The kernel works on raw pointers, so sizes are checked here as well.
        for len in [a.len(), b.len(), c.len()] {
            check_dimension(n, len)?;
        }
        let stride = n as isize;
        timer.start();
        // SAFETY: a, b and c each hold n * n elements laid out row-major
        // (row stride n, column stride 1), and c is borrowed exclusively.
        unsafe {
            gemm(
                n,
                n,
                n,
                alpha,
                a.as_ptr(),
                stride,
                1,
                b.as_ptr(),
                stride,
                1,
                beta,
                c.as_mut_ptr(),
                stride,
                1,
            );
        }
        timer.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MmbenchError;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(n: usize, seed: u64) -> Vec<Real> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * n).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    fn reference(n: usize, alpha: Real, a: &[Real], b: &[Real], beta: Real, c: &[Real]) -> Vec<Real> {
        let mut out = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let dot: Real = (0..n).map(|k| a[i * n + k] * b[k * n + j]).sum();
                out[i * n + j] = alpha * dot + beta * c[i * n + j];
            }
        }
        out
    }

    #[test]
    fn should_list_builtins_in_natural_order() {
        let registry = multiply_registry();
        assert_eq!(
            registry.names(),
            ["basic", "smart", "opt", "parallel", "parallel-opt", "blas"]
        );
    }

    #[test]
    fn should_agree_with_reference_for_every_builtin() {
        let registry = multiply_registry();
        // Spans more than one tile so partial blocks are exercised.
        for n in [1, 7, BLOCK_SIZE + 5] {
            let a = random_matrix(n, 1);
            let b = random_matrix(n, 2);
            let c0 = random_matrix(n, 3);
            let expected = reference(n, 2.0, &a, &b, 0.5, &c0);

            for name in registry.registered_names() {
                let handle = registry.create(&name).unwrap();
                let mut timer = Timer::new();
                let mut c = c0.clone();
                handle.multiply(&mut timer, 2, n, 2.0, &a, &b, 0.5, &mut c).unwrap();

                assert_eq!(timer.cycle_count(), 1, "{name} must time one cycle");
                for (got, want) in c.iter().zip(&expected) {
                    assert_relative_eq!(*got, *want, epsilon = 1e-3);
                }
            }
        }
    }

    #[test]
    fn should_overwrite_c_when_beta_is_zero() {
        let registry = multiply_registry();
        let n = 3;
        let a = random_matrix(n, 4);
        let b = random_matrix(n, 5);
        let expected = reference(n, 1.0, &a, &b, 0.0, &vec![0.0; n * n]);

        for name in registry.registered_names() {
            let mut c = vec![Real::NAN; n * n];
            let handle = registry.create(&name).unwrap();
            handle.multiply(&mut Timer::new(), 0, n, 1.0, &a, &b, 0.0, &mut c).unwrap();
            for (got, want) in c.iter().zip(&expected) {
                assert_relative_eq!(*got, *want, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn should_check_sizes_when_gemm_is_called_directly() {
        let a = vec![1.0; 4];
        let mut c = vec![0.0; 2];
        let err = Gemm
            .multiply(&mut Timer::new(), 0, 2, 1.0, &a, &a, 0.0, &mut c)
            .unwrap_err();
        assert!(matches!(err, StrategyError::Dimension { n: 2, actual: 2 }));
    }

    #[test]
    fn should_reject_mismatched_dimensions() {
        let handle = multiply_registry().create("basic").unwrap();
        let a = vec![0.0; 4];
        let mut c = vec![0.0; 3];
        let err = handle
            .multiply(&mut Timer::new(), 0, 2, 1.0, &a, &a, 0.0, &mut c)
            .unwrap_err();
        assert!(matches!(err, StrategyError::Dimension { n: 2, actual: 3 }));
    }

    #[test]
    fn should_reject_unknown_strategy() {
        let err = multiply_registry().create("strassen").unwrap_err();
        assert!(matches!(err, MmbenchError::Registry(_)));
    }
}
