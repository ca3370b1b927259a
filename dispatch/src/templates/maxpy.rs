use super::{check_group, check_positive, check_simd, problem_shape, Family, FetchingPolicy};
use crate::{
    invalid_parameters, CodeGen, Device, ElementType, Error, NdRange, OperationTag, Problem,
};

/// 矩阵逐元素运算的参数。
///
/// 第 0 维按行分组，第 1 维按 `simd_width` 向量化后分组。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MatrixAxpyParameters {
    pub simd_width: usize,
    pub local_size_0: usize,
    pub local_size_1: usize,
    pub num_groups_0: usize,
    pub num_groups_1: usize,
    pub fetching_policy: FetchingPolicy,
}

impl MatrixAxpyParameters {
    #[inline]
    pub const fn new(
        simd_width: usize,
        local_size_0: usize,
        local_size_1: usize,
        num_groups_0: usize,
        num_groups_1: usize,
        fetching_policy: FetchingPolicy,
    ) -> Self {
        Self {
            simd_width,
            local_size_0,
            local_size_1,
            num_groups_0,
            num_groups_1,
            fetching_policy,
        }
    }
}

const NAME: &str = "maxpy";

impl Family for MatrixAxpyParameters {
    #[inline]
    fn lmem_usage(&self, _dtype: ElementType) -> usize {
        0
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
                ("num_groups_1", self.num_groups_1),
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
        [self.local_size_0, self.local_size_1]
    }

    fn range(&self, problem: &Problem) -> NdRange {
        let [d0, d1] = problem_shape(problem);
        let g0 = d0.div_ceil(self.local_size_0).clamp(1, self.num_groups_0);
        let g1 = d1
            .div_ceil(self.simd_width * self.local_size_1)
            .clamp(1, self.num_groups_1);
        NdRange {
            global: [self.local_size_0 * g0, self.local_size_1 * g1],
            local: self.local_size(),
        }
    }

    fn codegen(&self, _op: OperationTag) -> CodeGen {
        CodeGen::new(MAXPY_CL)
            .define("SIMD_WIDTH", self.simd_width)
            .define("LOCAL_SIZE_0", self.local_size_0)
            .define("LOCAL_SIZE_1", self.local_size_1)
            .define("FETCH_POLICY", self.fetching_policy.code())
    }
}

const MAXPY_CL: &str = concat!(include_str!("cl/eval.cl"), include_str!("cl/maxpy.cl"));

#[cfg(test)]
mod test {
    use super::{super::test::gpu, MatrixAxpyParameters};
    use crate::{
        templates::{FetchingPolicy::*, Template},
        Elementwise, ElementType, ErrorKind, OperationTag, Problem,
    };

    #[test]
    fn test_valid() {
        let t = Template::new(
            OperationTag::MatrixAxpy,
            MatrixAxpyParameters::new(2, 16, 16, 32, 32, FetchFromGlobalStrided),
            &gpu(),
        )
        .unwrap();
        assert_eq!(t.local_size_0(), 16);
        assert_eq!(t.local_size_1(), 16);
        assert_eq!(t.registers_usage(ElementType::F64), 32);

        let src = t.source(ElementType::I16);
        assert_eq!(src.entry, "maxpy");
        assert_eq!(src.define("T"), Some("short"));
        assert_eq!(src.parse_define::<usize>("LOCAL_SIZE_1"), Some(16));
    }

    #[test]
    fn test_invalid() {
        let device = gpu();
        for (p, field) in [
            (
                MatrixAxpyParameters::new(4, 64, 32, 8, 8, FetchFromGlobalStrided),
                "max work-group size",
            ),
            (
                MatrixAxpyParameters::new(4, 8, 8, 0, 8, FetchFromGlobalStrided),
                "num_groups_0",
            ),
            (
                MatrixAxpyParameters::new(5, 8, 8, 8, 8, FetchFromGlobalStrided),
                "simd_width",
            ),
            (
                MatrixAxpyParameters::new(4, 8, 8, 8, 8, FetchFromLocal),
                "fetching_policy",
            ),
        ] {
            let e = Template::new(OperationTag::MatrixAxpy, p, &device).unwrap_err();
            assert_eq!(e.kind, ErrorKind::InvalidParameters);
            assert!(e.info.contains(field), "{}", e.info);
        }
    }

    #[test]
    fn test_range() {
        let t = Template::new(
            OperationTag::MatrixAxpy,
            MatrixAxpyParameters::new(4, 8, 8, 4, 4, FetchFromGlobalContiguous),
            &gpu(),
        )
        .unwrap();
        let f = Elementwise {
            code: Box::new([]),
            consts: Box::new([]),
            depth: 0,
        };
        let range = t.range(&Problem::Map {
            shape: [10, 40],
            f: f.clone(),
        });
        assert_eq!(range.global, [16, 16]);
        assert_eq!(range.groups(), [2, 2]);
        let range = t.range(&Problem::Map {
            shape: [1000, 1000],
            f,
        });
        assert_eq!(range.groups(), [4, 4]);
    }

    #[test]
    fn test_group_size_overflow() {
        let e = Template::new(
            OperationTag::MatrixAxpy,
            MatrixAxpyParameters::new(1, 1 << 40, 1 << 40, 1, 1, FetchFromGlobalStrided),
            &gpu(),
        )
        .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidParameters);
        assert!(e.info.contains("overflows"), "{}", e.info);
    }
}
