use super::{check_group, check_positive, check_simd, problem_shape, Family, FetchingPolicy};
use crate::{
    invalid_parameters, CodeGen, Device, ElementType, Error, NdRange, OperationTag, Problem,
};

/// 全归约的参数。
///
/// 第一趟每个工作组产出一个部分结果，第二趟由一个工作组合并。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ReductionParameters {
    pub simd_width: usize,
    pub local_size_0: usize,
    pub num_groups: usize,
    pub fetching_policy: FetchingPolicy,
}

impl ReductionParameters {
    #[inline]
    pub const fn new(
        simd_width: usize,
        local_size_0: usize,
        num_groups: usize,
        fetching_policy: FetchingPolicy,
    ) -> Self {
        Self {
            simd_width,
            local_size_0,
            num_groups,
            fetching_policy,
        }
    }
}

const NAME: &str = "reduction";

impl Family for ReductionParameters {
    /// 组内树形归约的值缓冲和下标缓冲。
    #[inline]
    fn lmem_usage(&self, dtype: ElementType) -> usize {
        2usize
            .saturating_mul(self.local_size_0)
            .saturating_mul(dtype.size_of())
    }

    #[inline]
    fn registers_usage(&self, dtype: ElementType) -> usize {
        2usize
            .saturating_mul(self.simd_width)
            .saturating_mul(dtype.size_of())
    }

    fn check_structure(&self, device: &Device) -> Result<(), Error> {
        check_simd(NAME, self.simd_width)?;
        check_positive(
            NAME,
            &[
                ("local_size_0", self.local_size_0),
                ("num_groups", self.num_groups),
            ],
        )?;
        if !self.local_size_0.is_power_of_two() {
            return Err(invalid_parameters(format!(
                "{NAME}.local_size_0 = {} is not a power of two",
                self.local_size_0,
            )));
        }
        check_group(NAME, self.local_size(), device)
    }

    #[inline]
    fn local_size(&self) -> [usize; 2] {
        [self.local_size_0, 1]
    }

    fn range(&self, problem: &Problem) -> NdRange {
        let [d0, d1] = problem_shape(problem);
        let groups = (d0 * d1)
            .div_ceil(self.simd_width * self.local_size_0)
            .clamp(1, self.num_groups);
        NdRange {
            global: [self.local_size_0 * groups, 1],
            local: [self.local_size_0, 1],
        }
    }

    fn codegen(&self, _op: OperationTag) -> CodeGen {
        CodeGen::new(REDUCTION_CL)
            .define("SIMD_WIDTH", self.simd_width)
            .define("LOCAL_SIZE_0", self.local_size_0)
            .define("NUM_GROUPS", self.num_groups)
            .define("FETCH_POLICY", self.fetching_policy.code())
    }
}

const REDUCTION_CL: &str = concat!(include_str!("cl/eval.cl"), include_str!("cl/reduction.cl"));
