use crate::{unrecognized_type, Error};
use std::{fmt, str::FromStr};

/// 封闭的操作形态集合。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum OperationTag {
    VectorAxpy,
    MatrixAxpy,
    Reduction,
    RowWiseReduction,
    ColWiseReduction,
    MatrixProductNN,
    MatrixProductTN,
    MatrixProductNT,
    MatrixProductTT,
}

impl OperationTag {
    pub const ALL: [Self; 9] = [
        Self::VectorAxpy,
        Self::MatrixAxpy,
        Self::Reduction,
        Self::RowWiseReduction,
        Self::ColWiseReduction,
        Self::MatrixProductNN,
        Self::MatrixProductTN,
        Self::MatrixProductNT,
        Self::MatrixProductTT,
    ];

    /// 矩阵乘的四种转置组合。
    #[inline]
    pub const fn matrix_product(a_trans: bool, b_trans: bool) -> Self {
        match (a_trans, b_trans) {
            (false, false) => Self::MatrixProductNN,
            (true, false) => Self::MatrixProductTN,
            (false, true) => Self::MatrixProductNT,
            (true, true) => Self::MatrixProductTT,
        }
    }

    /// 矩阵乘的转置组合，非矩阵乘返回 `None`。
    #[inline]
    pub const fn transposes(self) -> Option<(bool, bool)> {
        match self {
            Self::MatrixProductNN => Some((false, false)),
            Self::MatrixProductTN => Some((true, false)),
            Self::MatrixProductNT => Some((false, true)),
            Self::MatrixProductTT => Some((true, true)),
            _ => None,
        }
    }

    /// 面向绑定层的模板名。
    pub const fn name(self) -> &'static str {
        match self {
            Self::VectorAxpy => "vaxpy",
            Self::MatrixAxpy => "maxpy",
            Self::Reduction => "reduction",
            Self::RowWiseReduction => "mreduction_rows",
            Self::ColWiseReduction => "mreduction_cols",
            Self::MatrixProductNN => "mproduct_nn",
            Self::MatrixProductTN => "mproduct_tn",
            Self::MatrixProductNT => "mproduct_nt",
            Self::MatrixProductTT => "mproduct_tt",
        }
    }
}

impl FromStr for OperationTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| unrecognized_type(format!("template type \"{s}\" not understood")))
    }
}

impl fmt::Display for OperationTag {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[test]
fn test_names() {
    for op in OperationTag::ALL {
        assert_eq!(op.name().parse::<OperationTag>().unwrap(), op);
    }
    for (a, b) in [(false, false), (true, false), (false, true), (true, true)] {
        assert_eq!(OperationTag::matrix_product(a, b).transposes(), Some((a, b)));
    }
    assert_eq!(OperationTag::Reduction.transposes(), None);
    assert!("gemv".parse::<OperationTag>().is_err());
}
