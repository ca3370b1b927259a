use super::{check_group, check_positive, check_simd, Family, FetchingPolicy};
use crate::{
    invalid_parameters, CodeGen, Device, ElementType, Error, NdRange, OperationTag, Problem,
};

/// 按行或按列归约的参数。
///
/// 每个工作组负责 `local_size_0` 个输出，每个输出由 `local_size_1` 个工作项协作归约。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MatrixReductionParameters {
    pub simd_width: usize,
    pub local_size_0: usize,
    pub local_size_1: usize,
    pub num_groups_0: usize,
    pub fetching_policy: FetchingPolicy,
}

impl MatrixReductionParameters {
    #[inline]
    pub const fn new(
        simd_width: usize,
        local_size_0: usize,
        local_size_1: usize,
        num_groups_0: usize,
        fetching_policy: FetchingPolicy,
    ) -> Self {
        Self {
            simd_width,
            local_size_0,
            local_size_1,
            num_groups_0,
            fetching_policy,
        }
    }
}

const NAME: &str = "mreduction";

impl Family for MatrixReductionParameters {
    #[inline]
    fn lmem_usage(&self, dtype: ElementType) -> usize {
        // 多一列错开存储体
        2usize
            .saturating_mul(self.local_size_0)
            .saturating_mul(self.local_size_1.saturating_add(1))
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
                ("local_size_1", self.local_size_1),
                ("num_groups_0", self.num_groups_0),
            ],
        )?;
        if !self.local_size_1.is_power_of_two() {
            return Err(invalid_parameters(format!(
                "{NAME}.local_size_1 = {} is not a power of two",
                self.local_size_1,
            )));
        }
        check_group(NAME, self.local_size(), device)
    }

    #[inline]
    fn local_size(&self) -> [usize; 2] {
        [self.local_size_0, self.local_size_1]
    }

    fn range(&self, problem: &Problem) -> NdRange {
        let outputs = match *problem {
            Problem::ReduceAxis {
                shape: [d0, _],
                axis: 1,
                ..
            } => d0,
            Problem::ReduceAxis {
                shape: [_, d1], ..
            } => d1,
            _ => 1,
        };
        let groups = outputs
            .div_ceil(self.local_size_0)
            .clamp(1, self.num_groups_0);
        NdRange {
            global: [self.local_size_0 * groups, self.local_size_1],
            local: self.local_size(),
        }
    }

    fn codegen(&self, _op: OperationTag) -> CodeGen {
        CodeGen::new(MREDUCTION_CL)
            .define("SIMD_WIDTH", self.simd_width)
            .define("LOCAL_SIZE_0", self.local_size_0)
            .define("LOCAL_SIZE_1", self.local_size_1)
            .define("NUM_GROUPS_0", self.num_groups_0)
            .define("FETCH_POLICY", self.fetching_policy.code())
    }
}

const MREDUCTION_CL: &str = concat!(
    include_str!("cl/eval.cl"),
    include_str!("cl/mreduction.cl"),
);

#[cfg(test)]
mod test {
    use super::{super::test::gpu, MatrixReductionParameters};
    use crate::{
        templates::{FetchingPolicy::*, Template},
        ElementType, Elementwise, ErrorKind, OperationTag, Problem, ReduceOp,
    };

    #[test]
    fn test_valid() {
        let p = MatrixReductionParameters::new(1, 8, 32, 64, FetchFromGlobalStrided);
        for op in [OperationTag::RowWiseReduction, OperationTag::ColWiseReduction] {
            let t = Template::new(op, p.clone(), &gpu()).unwrap();
            assert_eq!(t.lmem_usage(ElementType::F64), 2 * 8 * 33 * 8);
            assert_eq!(t.source(ElementType::F32).entry, op.name());
        }
    }

    #[test]
    fn test_invalid() {
        let device = gpu();
        for (p, field) in [
            (
                MatrixReductionParameters::new(1, 8, 24, 64, FetchFromGlobalStrided),
                "local_size_1",
            ),
            (
                MatrixReductionParameters::new(1, 64, 32, 64, FetchFromGlobalStrided),
                "max work-group size",
            ),
            (
                MatrixReductionParameters::new(1, 0, 32, 64, FetchFromGlobalStrided),
                "local_size_0",
            ),
        ] {
            let e = Template::new(OperationTag::RowWiseReduction, p, &device).unwrap_err();
            assert_eq!(e.kind, ErrorKind::InvalidParameters);
            assert!(e.info.contains(field), "{}", e.info);
        }
        // 2 * 32 * 33 * 8 = 16.5 KiB
        let mut small = gpu();
        small.local_mem_size = 16 << 10;
        let e = Template::new(
            OperationTag::ColWiseReduction,
            MatrixReductionParameters::new(1, 32, 32, 64, FetchFromLocal),
            &small,
        )
        .unwrap_err();
        assert!(e.info.contains("local memory"), "{}", e.info);
    }

    #[test]
    fn test_range() {
        let t = Template::new(
            OperationTag::RowWiseReduction,
            MatrixReductionParameters::new(1, 8, 32, 64, FetchFromGlobalStrided),
            &gpu(),
        )
        .unwrap();
        let f = Elementwise {
            code: Box::new([]),
            consts: Box::new([]),
            depth: 0,
        };
        let rows = t.range(&Problem::ReduceAxis {
            shape: [20, 1000],
            axis: 1,
            op: ReduceOp::Sum,
            f: f.clone(),
        });
        assert_eq!(rows.global, [24, 32]);
        let cols = t.range(&Problem::ReduceAxis {
            shape: [20, 1000],
            axis: 0,
            op: ReduceOp::Sum,
            f,
        });
        assert_eq!(cols.groups(), [64, 1]);
    }

    #[test]
    fn test_huge_local_size() {
        let e = Template::new(
            OperationTag::RowWiseReduction,
            MatrixReductionParameters::new(1, 1 << 40, 1 << 40, 1, FetchFromGlobalStrided),
            &gpu(),
        )
        .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidParameters);
        assert!(e.info.contains("overflows"), "{}", e.info);

        let mut device = gpu();
        device.max_work_group_size = usize::MAX;
        let e = Template::new(
            OperationTag::ColWiseReduction,
            MatrixReductionParameters::new(1, 1 << 40, 1 << 20, 1, FetchFromGlobalStrided),
            &device,
        )
        .unwrap_err();
        assert!(e.info.contains("local memory"), "{}", e.info);
    }
}
