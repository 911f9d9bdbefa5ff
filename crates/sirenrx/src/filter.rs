//! FIR filtering primitives
//!
//! [`FirCoeff`] holds an impulse response and performs the
//! multiply-accumulate against a caller-supplied sample history.
//! [`SampleWindow`] is the matching fixed-length history: new samples are
//! pushed onto the end and old samples age off the front.
//!
//! The two are kept separate so that one set of coefficients can be
//! applied to several histories (and vice versa), which the demodulator
//! and decoder both rely on.

use std::collections::VecDeque;
use std::convert::AsRef;

use nalgebra::base::Scalar;
use nalgebra::DVector;
use num_traits::Zero;

/// FIR filter coefficients
///
/// Coefficients are stored reversed so that the multiply-accumulate
/// can run forward over the history slice.
#[derive(Debug, Clone, PartialEq)]
pub struct FirCoeff<T>(DVector<T>)
where
    T: Copy + Scalar + Zero;

impl<T> FirCoeff<T>
where
    T: Copy + Scalar + Zero,
{
    /// Create from an impulse response `h`, in natural (Octave) order
    pub fn from_slice<S>(h: S) -> Self
    where
        S: AsRef<[T]>,
    {
        let inp = h.as_ref();
        FirCoeff(DVector::from_iterator(
            inp.len(),
            inp.iter().rev().copied(),
        ))
    }

    /// Number of filter taps
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the filter has no taps
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Filter the given sample history
    ///
    /// `history[N-1]` must be the most recent sample and `history[0]`
    /// the oldest. If the history is shorter than the filter, the
    /// missing samples are treated as zeros; excess history is ignored.
    pub fn filter<I, In, Out>(&self, history: I) -> Out
    where
        I: AsRef<[In]>,
        In: Copy + Scalar + std::ops::Mul<T, Output = Out>,
        Out: Copy + Scalar + Zero + std::ops::AddAssign,
    {
        multiply_accumulate(history.as_ref(), self.0.as_slice())
    }
}

impl<T> AsRef<[T]> for FirCoeff<T>
where
    T: Copy + Scalar + Zero,
{
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.0.as_slice()
    }
}

/// Fixed-length sample history for FIR filtering
#[derive(Clone, Debug)]
pub struct SampleWindow<T>(VecDeque<T>)
where
    T: Copy + Zero;

impl<T> SampleWindow<T>
where
    T: Copy + Zero,
{
    /// Create a window of `len` zeros
    pub fn new(len: usize) -> Self {
        Self(std::iter::repeat(T::zero()).take(len).collect())
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        let len = self.0.len();
        self.0.clear();
        self.0.extend(std::iter::repeat(T::zero()).take(len));
    }

    /// Window length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the window holds no samples
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shift `input` onto the end of the window
    ///
    /// The last sample of `input` becomes the most recent sample. If
    /// `input` is longer than the window, only its tail is kept.
    pub fn push<S>(&mut self, input: S)
    where
        S: AsRef<[T]>,
    {
        let input = input.as_ref();
        let input = if input.len() > self.0.len() {
            &input[input.len() - self.0.len()..]
        } else {
            input
        };

        drop(self.0.drain(0..input.len()));
        self.0.extend(input.iter().copied());
    }

    /// Current window contents, oldest sample first
    ///
    /// The deque is kept contiguous by the push pattern, but we
    /// re-linearize defensively before handing out the slice.
    pub fn as_slice(&mut self) -> &[T] {
        self.0.make_contiguous();
        let (head, _) = self.0.as_slices();
        head
    }
}

// Core FIR operation: sum of history[i] * rev_coeff[i], with the most
// recent sample at history[N-1] and the coefficients reversed. Shorter
// histories are zero-extended on the left.
fn multiply_accumulate<In, Coeff, Out>(history: &[In], rev_coeff: &[Coeff]) -> Out
where
    In: Copy + std::ops::Mul<Coeff, Output = Out>,
    Coeff: Copy,
    Out: Copy + Zero + std::ops::AddAssign,
{
    let mul_len = usize::min(history.len(), rev_coeff.len());
    let history = &history[history.len() - mul_len..];
    let rev_coeff = &rev_coeff[rev_coeff.len() - mul_len..];

    let mut out = Out::zero();
    for (hi, co) in history.iter().zip(rev_coeff.iter()) {
        out += *hi * *co;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;
    use num_complex::Complex;

    #[test]
    fn test_multiply_accumulate() {
        let out: f32 = multiply_accumulate(&[0.0f32; 0], &[0.0f32; 0]);
        assert_eq!(0.0f32, out);

        // mismatched lengths clip to the end
        let out: f32 = multiply_accumulate(&[20.0f32, 1.0f32], &[1.0f32]);
        assert_eq!(1.0f32, out);
        let out: f32 = multiply_accumulate(&[1.0f32], &[20.0f32, 1.0f32]);
        assert_eq!(1.0f32, out);

        let out: f32 = multiply_accumulate(&[20.0f32, 20.0f32], &[-1.0f32, 1.0f32]);
        assert_approx_eq!(0.0f32, out);
    }

    #[test]
    fn test_filter_complex_taps() {
        let filter = FirCoeff::from_slice([
            Complex::new(2.0f32, 0.0),
            Complex::new(0.0f32, 0.0),
            Complex::new(0.0f32, 0.0),
        ]);

        let out: Complex<f32> = filter.filter([0.5f32]);
        assert_approx_eq!(out.re, 1.0f32);
        assert_approx_eq!(out.im, 0.0f32);
    }

    #[test]
    fn test_window_push_and_age_off() {
        let mut wind: SampleWindow<f32> = SampleWindow::new(4);
        assert_eq!(&[0.0f32, 0.0, 0.0, 0.0], wind.as_slice());

        wind.push([1.0f32]);
        wind.push([2.0f32]);
        assert_eq!(&[0.0f32, 0.0, 1.0, 2.0], wind.as_slice());

        // oversized push keeps the tail
        wind.push([-1.0f32, -2.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&[1.0f32, 2.0, 3.0, 4.0], wind.as_slice());

        wind.reset();
        assert_eq!(4, wind.len());
        assert_eq!(&[0.0f32, 0.0, 0.0, 0.0], wind.as_slice());
    }
}
