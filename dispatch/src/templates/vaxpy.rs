use super::{check_group, check_positive, check_simd, problem_shape, Family, FetchingPolicy};
use crate::{
    invalid_parameters, CodeGen, Device, ElementType, Error, NdRange, OperationTag, Problem,
};

/// 向量逐元素运算的参数。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct VectorAxpyParameters {
    pub simd_width: usize,
    pub local_size_0: usize,
    pub num_groups: usize,
    pub fetching_policy: FetchingPolicy,
}

impl VectorAxpyParameters {
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

const NAME: &str = "vaxpy";

impl Family for VectorAxpyParameters {
    #[inline]
    fn lmem_usage(&self, _dtype: ElementType) -> usize {
        0
    }

    #[inline]
    fn registers_usage(&self, dtype: ElementType) -> usize {
        // 一个读入向量加一个结果向量
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
        check_group(NAME, self.local_size(), device)?;
        if self.fetching_policy == FetchingPolicy::FetchFromLocal {
            return Err(invalid_parameters(format!(
                "{NAME}.fetching_policy = {:?} is not supported",
                self.fetching_policy,
            )));
        }
        Ok(())
    }

    #[inline]
    fn local_size(&self) -> [usize; 2] {
        [self.local_size_0, 1]
    }

    fn range(&self, problem: &Problem) -> NdRange {
        let [d0, d1] = problem_shape(problem);
        // 工作项数不超过向量化后的元素数
        let groups = (d0 * d1)
            .div_ceil(self.simd_width * self.local_size_0)
            .clamp(1, self.num_groups);
        NdRange {
            global: [self.local_size_0 * groups, 1],
            local: [self.local_size_0, 1],
        }
    }

    fn codegen(&self, _op: OperationTag) -> CodeGen {
        CodeGen::new(VAXPY_CL)
            .define("SIMD_WIDTH", self.simd_width)
            .define("LOCAL_SIZE_0", self.local_size_0)
            .define("FETCH_POLICY", self.fetching_policy.code())
    }
}

const VAXPY_CL: &str = concat!(include_str!("cl/eval.cl"), include_str!("cl/vaxpy.cl"));
