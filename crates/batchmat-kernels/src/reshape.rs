//! Shape validation and the canonical `[batch, rows, cols]` view.

use batchmat_core::{BatchMatError, Result, Shape};

/// Geometry of one batched matmul call, derived from the operand shapes and
/// adjoint flags.
///
/// `lhs_rows`/`lhs_cols` and `rhs_rows`/`rhs_cols` are the operands' stored
/// trailing dims; `m`, `k`, `n` are the effective dims after the adjoints,
/// so each output matrix is `[m, n]` and `k` is summed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatMulShapes {
    pub lhs: Shape,
    pub rhs: Shape,
    pub adj_x: bool,
    pub adj_y: bool,
    /// Number of matrix products (1 for rank-2 operands).
    pub batch: usize,
    pub lhs_rows: usize,
    pub lhs_cols: usize,
    pub rhs_rows: usize,
    pub rhs_cols: usize,
    pub m: usize,
    pub k: usize,
    pub n: usize,
    /// Full output shape: batch dims followed by `[m, n]`.
    pub out: Shape,
}

impl MatMulShapes {
    /// Validate two operand shapes and derive the call geometry.
    pub fn plan(lhs: &Shape, rhs: &Shape, adj_x: bool, adj_y: bool) -> Result<Self> {
        if lhs.ndim() != rhs.ndim() {
            return Err(BatchMatError::RankMismatch {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            });
        }
        let ndims = lhs.ndim();
        let (Some((d0, d1)), Some((d2, d3))) = (lhs.matrix_dims(), rhs.matrix_dims()) else {
            return Err(BatchMatError::RankTooSmall { ndims });
        };

        let batch_dims = lhs.batch_dims();
        for (axis, (&a, &b)) in batch_dims.iter().zip(rhs.batch_dims()).enumerate() {
            if a != b {
                return Err(BatchMatError::BatchDimMismatch {
                    axis,
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                });
            }
        }

        let (m, k) = if adj_x { (d1, d0) } else { (d0, d1) };
        let (k2, n) = if adj_y { (d3, d2) } else { (d2, d3) };
        if k != k2 {
            return Err(BatchMatError::ContractionMismatch {
                lhs_dim: k,
                rhs_dim: k2,
                lhs: lhs.clone(),
                rhs: rhs.clone(),
                adj_x,
                adj_y,
            });
        }

        Ok(Self {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            adj_x,
            adj_y,
            batch: lhs.batch_size(),
            lhs_rows: d0,
            lhs_cols: d1,
            rhs_rows: d2,
            rhs_cols: d3,
            m,
            k,
            n,
            out: Shape::new(batch_dims).with_trailing(&[m, n]),
        })
    }

    /// Elements per left operand matrix.
    pub fn lhs_matrix_len(&self) -> usize {
        self.lhs_rows * self.lhs_cols
    }

    /// Elements per right operand matrix.
    pub fn rhs_matrix_len(&self) -> usize {
        self.rhs_rows * self.rhs_cols
    }

    /// Elements per output matrix.
    pub fn out_matrix_len(&self) -> usize {
        self.m * self.n
    }

    /// Multiply-add count proxy for one product, as the CPU scheduler sees it.
    pub fn cost_per_unit(&self) -> u64 {
        self.lhs_rows as u64 * self.lhs_cols as u64 * self.n as u64
    }

    /// `[batch, rows, cols]` views of both operands and the output.
    pub fn canonical(&self) -> Result<[Shape; 3]> {
        let collapse = |s: &Shape| {
            s.collapse_batch()
                .ok_or(BatchMatError::RankTooSmall { ndims: s.ndim() })
        };
        Ok([collapse(&self.lhs)?, collapse(&self.rhs)?, collapse(&self.out)?])
    }

    /// Nothing to compute: the output holds no elements.
    pub fn is_empty_output(&self) -> bool {
        self.out.numel() == 0
    }

    /// The output is non-empty but an operand is empty, i.e. the contraction
    /// dimension is zero and every output element is an empty sum.
    pub fn is_empty_contraction(&self) -> bool {
        !self.is_empty_output() && (self.lhs.numel() == 0 || self.rhs.numel() == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(a: &[usize], b: &[usize], adj_x: bool, adj_y: bool) -> Result<MatMulShapes> {
        MatMulShapes::plan(&Shape::new(a), &Shape::new(b), adj_x, adj_y)
    }

    #[test]
    fn test_plain_batch() {
        let s = plan(&[4, 8, 16], &[4, 16, 32], false, false).unwrap();
        assert_eq!(s.out.dims(), &[4, 8, 32]);
        assert_eq!((s.batch, s.m, s.k, s.n), (4, 8, 16, 32));
        assert_eq!(s.cost_per_unit(), 8 * 16 * 32);
        let [x3, y3, z3] = s.canonical().unwrap();
        assert_eq!((x3.dims(), y3.dims(), z3.dims()), (&[4, 8, 16][..], &[4, 16, 32][..], &[4, 8, 32][..]));
    }

    #[test]
    fn test_rank_two_is_batch_of_one() {
        let s = plan(&[8, 16], &[32, 16], false, true).unwrap();
        assert_eq!(s.batch, 1);
        assert_eq!(s.out.dims(), &[8, 32]);
        assert_eq!((s.m, s.k, s.n), (8, 16, 32));
        let [x3, y3, z3] = s.canonical().unwrap();
        assert_eq!((x3.dims(), y3.dims(), z3.dims()), (&[1, 8, 16][..], &[1, 32, 16][..], &[1, 8, 32][..]));
    }

    #[test]
    fn test_adjoint_left() {
        let s = plan(&[2, 3, 5, 7], &[2, 3, 5, 4], true, false).unwrap();
        assert_eq!(s.out.dims(), &[2, 3, 7, 4]);
        assert_eq!(s.batch, 6);
        assert_eq!((s.m, s.k, s.n), (7, 5, 4));
        // Cost uses stored lhs dims and effective output cols.
        assert_eq!(s.cost_per_unit(), 5 * 7 * 4);
    }

    #[test]
    fn test_batch_mismatch_names_axis() {
        let err = plan(&[2, 3, 4, 5, 7, 7], &[2, 3, 4, 6, 7, 7], false, false).unwrap_err();
        match &err {
            BatchMatError::BatchDimMismatch { axis, .. } => assert_eq!(*axis, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("In[0].dim(3) and In[1].dim(3)"));
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_contraction_mismatch_names_shapes_and_flags() {
        let err = plan(&[4, 5], &[6, 7], false, false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("5 vs. 6"), "{msg}");
        assert!(msg.contains("[4,5] [6,7]"), "{msg}");
        assert!(msg.contains("adj_x=false adj_y=false"), "{msg}");
    }

    #[test]
    fn test_rank_errors() {
        assert!(matches!(
            plan(&[2, 4, 5], &[4, 5], false, false),
            Err(BatchMatError::RankMismatch { .. })
        ));
        assert!(matches!(
            plan(&[5], &[5], false, false),
            Err(BatchMatError::RankTooSmall { ndims: 1 })
        ));
    }

    #[test]
    fn test_degenerate_classification() {
        let s = plan(&[3, 0, 4], &[3, 4, 5], false, false).unwrap();
        assert!(s.is_empty_output());
        assert!(!s.is_empty_contraction());

        let s = plan(&[3, 2, 0], &[3, 0, 5], false, false).unwrap();
        assert!(!s.is_empty_output());
        assert!(s.is_empty_contraction());
        assert_eq!(s.out.dims(), &[3, 2, 5]);
    }
}
