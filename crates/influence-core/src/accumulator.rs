//! One-pass moment accumulation for a single scalar field.
//!
//! Each snapshot is folded into running sums of `x`, `x²` and, per reference
//! location `k`, `x · x_ref_k`. Sums are normalized once at the end by
//! [`MomentAccumulator::finalize`]. Only the sums are kept, so memory is
//! `O(R·C·L)` no matter how many snapshots pass through.
//!
//! Sums are always held as `f64` regardless of the input element type.

use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};

use crate::error::{Error, Result};
use crate::grid::ReferenceLocations;

/// Running sums after at least one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentSums {
    sum_x: Array2<f64>,
    sum_xx: Array2<f64>,
    /// Shape `(R, C, L)`.
    sum_xy: Array3<f64>,
    count: usize,
    references: ReferenceLocations,
}

impl MomentSums {
    fn first(field: Array2<f64>, refs: &ReferenceLocations) -> Result<Self> {
        refs.validate(field.dim())?;
        let (rows, cols) = field.dim();
        let mut sum_xy = Array3::zeros((rows, cols, refs.len()));
        for (k, cell) in refs.iter().enumerate() {
            let reference = field[cell.ix()];
            sum_xy
                .index_axis_mut(Axis(2), k)
                .assign(&field.mapv(|v| v * reference));
        }
        let sum_xx = field.mapv(|v| v * v);
        Ok(Self {
            sum_x: field,
            sum_xx,
            sum_xy,
            count: 1,
            references: refs.clone(),
        })
    }

    fn fold(&mut self, field: Array2<f64>, refs: &ReferenceLocations) -> Result<()> {
        if field.dim() != self.sum_x.dim() {
            return Err(Error::shape(self.sum_x.shape(), field.shape()));
        }
        self.check_references(refs)?;

        self.sum_x += &field;
        Zip::from(&mut self.sum_xx)
            .and(&field)
            .for_each(|acc, &v| *acc += v * v);
        for (k, cell) in refs.iter().enumerate() {
            let reference = field[cell.ix()];
            self.sum_xy
                .index_axis_mut(Axis(2), k)
                .scaled_add(reference, &field);
        }
        self.count += 1;
        Ok(())
    }

    fn check_references(&self, refs: &ReferenceLocations) -> Result<()> {
        if *refs != self.references {
            return Err(Error::config(
                "reference locations changed between accumulator updates",
            ));
        }
        Ok(())
    }

    pub fn sum_x(&self) -> &Array2<f64> {
        &self.sum_x
    }

    pub fn sum_xx(&self) -> &Array2<f64> {
        &self.sum_xx
    }

    pub fn sum_xy(&self) -> &Array3<f64> {
        &self.sum_xy
    }

    /// Number of snapshots folded in.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn references(&self) -> &ReferenceLocations {
        &self.references
    }

    /// Grid shape established by the first snapshot.
    pub fn shape(&self) -> (usize, usize) {
        self.sum_x.dim()
    }
}

/// Accumulator state for one tracked component.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MomentAccumulator {
    /// No snapshot seen yet.
    #[default]
    Empty,
    Populated(MomentSums),
}

impl MomentAccumulator {
    pub fn new() -> Self {
        Self::Empty
    }

    /// Fold one `(R, C)` field into the running sums.
    ///
    /// The first call fixes the grid shape and the reference set; later calls
    /// with a different shape fail with [`Error::ShapeMismatch`] and leave the
    /// sums untouched.
    pub fn update<T>(&mut self, field: ArrayView2<'_, T>, refs: &ReferenceLocations) -> Result<()>
    where
        T: Copy + Into<f64>,
    {
        let field: Array2<f64> = field.mapv(Into::into);
        match self {
            Self::Populated(sums) => sums.fold(field, refs),
            Self::Empty => {
                *self = Self::Populated(MomentSums::first(field, refs)?);
                Ok(())
            }
        }
    }

    /// Combine two partial accumulators built over disjoint snapshot sets.
    ///
    /// Sums are associative, so partial ensembles can be accumulated
    /// independently and merged in any order.
    pub fn merge(self, other: Self) -> Result<Self> {
        match (self, other) {
            (Self::Empty, other) => Ok(other),
            (this, Self::Empty) => Ok(this),
            (Self::Populated(mut a), Self::Populated(b)) => {
                if a.shape() != b.shape() {
                    return Err(Error::shape(a.sum_x.shape(), b.sum_x.shape()));
                }
                a.check_references(&b.references)?;
                a.sum_x += &b.sum_x;
                a.sum_xx += &b.sum_xx;
                a.sum_xy += &b.sum_xy;
                a.count += b.count;
                Ok(Self::Populated(a))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn sums(&self) -> Option<&MomentSums> {
        match self {
            Self::Empty => None,
            Self::Populated(sums) => Some(sums),
        }
    }

    /// Snapshots folded so far (0 when empty).
    pub fn count(&self) -> usize {
        self.sums().map_or(0, MomentSums::count)
    }

    /// Normalize the sums by `n`, producing sample moments.
    ///
    /// Does not consume or modify the accumulator.
    pub fn finalize(&self, n: usize) -> Result<Moments> {
        let sums = self
            .sums()
            .ok_or_else(|| Error::config("no snapshots were accumulated"))?;
        if n == 0 {
            return Err(Error::config("cannot normalize moments by a snapshot count of 0"));
        }
        let n_f = n as f64;
        Ok(Moments {
            mean: &sums.sum_x / n_f,
            mean_sq: &sums.sum_xx / n_f,
            cross: &sums.sum_xy / n_f,
            count: n,
        })
    }

    /// [`finalize`](Self::finalize) by the number of snapshots actually folded in.
    pub fn finalize_observed(&self) -> Result<Moments> {
        self.finalize(self.count())
    }
}

/// Sample moments of one component over the ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    /// `E[X]`, shape `(R, C)`.
    pub mean: Array2<f64>,
    /// `E[X²]`, shape `(R, C)`.
    pub mean_sq: Array2<f64>,
    /// `E[X · X_ref_k]`, shape `(R, C, L)`.
    pub cross: Array3<f64>,
    /// Ensemble size the sums were divided by.
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn refs(cells: &[(usize, usize)]) -> ReferenceLocations {
        ReferenceLocations::try_from(cells.to_vec()).unwrap()
    }

    #[test]
    fn test_first_update_initializes_sums() {
        let field = array![[1.0, 2.0], [3.0, 4.0]];
        let mut acc = MomentAccumulator::new();
        acc.update(field.view(), &refs(&[(0, 1)])).unwrap();

        let sums = acc.sums().unwrap();
        assert_eq!(sums.sum_x(), &field);
        assert_eq!(sums.sum_xx(), &array![[1.0, 4.0], [9.0, 16.0]]);
        assert_eq!(
            sums.sum_xy().index_axis(Axis(2), 0),
            array![[2.0, 4.0], [6.0, 8.0]]
        );
        assert_eq!(sums.count(), 1);
    }

    #[test]
    fn test_update_adds_to_existing_sums() {
        let r = refs(&[(0, 0), (1, 1)]);
        let mut acc = MomentAccumulator::new();
        acc.update(array![[1.0, 2.0], [3.0, 4.0]].view(), &r).unwrap();
        acc.update(array![[3.0, 4.0], [5.0, 6.0]].view(), &r).unwrap();

        let sums = acc.sums().unwrap();
        assert_eq!(sums.sum_x(), &array![[4.0, 6.0], [8.0, 10.0]]);
        assert_eq!(sums.sum_xx(), &array![[10.0, 20.0], [34.0, 52.0]]);
        // k = 0: 1*[[1,2],[3,4]] + 3*[[3,4],[5,6]]
        assert_eq!(
            sums.sum_xy().index_axis(Axis(2), 0),
            array![[10.0, 14.0], [18.0, 22.0]]
        );
        // k = 1: 4*[[1,2],[3,4]] + 6*[[3,4],[5,6]]
        assert_eq!(
            sums.sum_xy().index_axis(Axis(2), 1),
            array![[22.0, 32.0], [42.0, 52.0]]
        );
        assert_eq!(acc.count(), 2);
    }

    #[test]
    fn test_f32_input_is_accumulated_as_f64() {
        let big: f32 = 3.0e30;
        let field = Array2::from_elem((1, 2), big);
        let mut acc = MomentAccumulator::new();
        acc.update(field.view(), &refs(&[(0, 0)])).unwrap();
        // 9e60 overflows f32 but not f64.
        let sq = acc.sums().unwrap().sum_xx()[(0, 0)];
        assert!(sq.is_finite());
        assert!((sq / 9.0e60 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_shape_mismatch_fails_and_keeps_state() {
        let r = refs(&[(0, 0)]);
        let mut acc = MomentAccumulator::new();
        acc.update(Array2::<f64>::ones((2, 2)).view(), &r).unwrap();
        let before = acc.clone();

        let err = acc.update(Array2::<f64>::ones((3, 3)).view(), &r).unwrap_err();
        match err {
            Error::ShapeMismatch { expected, found } => {
                assert_eq!(expected, vec![2, 2]);
                assert_eq!(found, vec![3, 3]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(acc, before);
    }

    #[test]
    fn test_out_of_bounds_reference_rejected_on_first_update() {
        let mut acc = MomentAccumulator::new();
        let err = acc
            .update(Array2::<f64>::ones((2, 2)).view(), &refs(&[(2, 0)]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(acc.is_empty());
    }

    #[test]
    fn test_changed_references_rejected() {
        let mut acc = MomentAccumulator::new();
        acc.update(Array2::<f64>::ones((2, 2)).view(), &refs(&[(0, 0)]))
            .unwrap();
        let err = acc
            .update(Array2::<f64>::ones((2, 2)).view(), &refs(&[(1, 1)]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_finalize_divides_by_n() {
        let r = refs(&[(0, 0)]);
        let mut acc = MomentAccumulator::new();
        acc.update(array![[1.0, 2.0], [3.0, 4.0]].view(), &r).unwrap();
        acc.update(array![[3.0, 4.0], [5.0, 6.0]].view(), &r).unwrap();

        let m = acc.finalize(2).unwrap();
        assert_eq!(m.mean, array![[2.0, 3.0], [4.0, 5.0]]);
        assert_eq!(m.mean_sq, array![[5.0, 10.0], [17.0, 26.0]]);
        assert_eq!(m.cross.index_axis(Axis(2), 0), array![[5.0, 7.0], [9.0, 11.0]]);
        assert_eq!(m.count, 2);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let r = refs(&[(0, 1)]);
        let mut acc = MomentAccumulator::new();
        acc.update(array![[0.5, 1.5], [2.5, -1.0]].view(), &r).unwrap();
        acc.update(array![[1.5, 0.5], [0.0, 2.0]].view(), &r).unwrap();
        let snapshot = acc.clone();

        let first = acc.finalize(2).unwrap();
        let second = acc.finalize(2).unwrap();
        assert_eq!(first, second);
        assert_eq!(acc, snapshot);
    }

    #[test]
    fn test_finalize_rejects_zero_and_empty() {
        let empty = MomentAccumulator::new();
        assert!(matches!(empty.finalize(1), Err(Error::Configuration(_))));
        assert!(matches!(empty.finalize_observed(), Err(Error::Configuration(_))));

        let mut acc = MomentAccumulator::new();
        acc.update(Array2::<f64>::ones((1, 1)).view(), &refs(&[(0, 0)]))
            .unwrap();
        assert!(matches!(acc.finalize(0), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let mut acc = MomentAccumulator::new();
        acc.update(array![[1.0, 2.0]].view(), &refs(&[(0, 0)])).unwrap();
        let merged = acc.clone().merge(MomentAccumulator::Empty).unwrap();
        assert_eq!(merged, acc);
        let merged = MomentAccumulator::Empty.merge(acc.clone()).unwrap();
        assert_eq!(merged, acc);
    }

    #[test]
    fn test_merge_matches_sequential_accumulation() {
        let r = refs(&[(0, 0), (1, 2)]);
        let fields: Vec<Array2<f64>> = (0..6)
            .map(|i| Array2::from_shape_fn((2, 3), |(a, b)| (i * 7 + a * 3 + b) as f64 * 0.25))
            .collect();

        let mut sequential = MomentAccumulator::new();
        for f in &fields {
            sequential.update(f.view(), &r).unwrap();
        }

        let mut left = MomentAccumulator::new();
        let mut right = MomentAccumulator::new();
        for f in &fields[..2] {
            left.update(f.view(), &r).unwrap();
        }
        for f in &fields[2..] {
            right.update(f.view(), &r).unwrap();
        }
        let merged = right.merge(left).unwrap();

        assert_eq!(merged.count(), 6);
        let (a, b) = (merged.sums().unwrap(), sequential.sums().unwrap());
        for (x, y) in a.sum_xy().iter().zip(b.sum_xy().iter()) {
            assert!((x - y).abs() < 1e-9);
        }
        for (x, y) in a.sum_xx().iter().zip(b.sum_xx().iter()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_merge_rejects_mismatched_shapes() {
        let r = refs(&[(0, 0)]);
        let mut a = MomentAccumulator::new();
        a.update(Array2::<f64>::ones((2, 2)).view(), &r).unwrap();
        let mut b = MomentAccumulator::new();
        b.update(Array2::<f64>::ones((2, 3)).view(), &r).unwrap();
        assert!(matches!(a.merge(b), Err(Error::ShapeMismatch { .. })));
    }
}
