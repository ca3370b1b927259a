use super::{check_group, check_positive, check_simd, Family, FetchingPolicy};
use crate::{
    invalid_parameters, CodeGen, Device, ElementType, Error, NdRange, OperationTag, Problem,
};

/// 矩阵乘的分块参数。
///
/// 工作组计算 `ml x nl` 的输出块，其中 `ml = ms * local_size_0`，`nl = ns * local_size_1`；
/// 每个工作项计算 `ms x ns` 个输出，沿 k 方向每次推进 `kl`，其中每步展开 `ks`。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MatrixProductParameters {
    pub simd_width: usize,
    pub local_size_0: usize,
    pub kl: usize,
    pub local_size_1: usize,
    pub ms: usize,
    pub ks: usize,
    pub ns: usize,
    pub a_fetching_policy: FetchingPolicy,
    pub b_fetching_policy: FetchingPolicy,
    /// 搬运到局部存储时工作组的重排形状。
    pub local_fetch_0: usize,
    pub local_fetch_1: usize,
}

impl MatrixProductParameters {
    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub const fn new(
        simd_width: usize,
        local_size_0: usize,
        kl: usize,
        local_size_1: usize,
        ms: usize,
        ks: usize,
        ns: usize,
        a_fetching_policy: FetchingPolicy,
        b_fetching_policy: FetchingPolicy,
        local_fetch_0: usize,
        local_fetch_1: usize,
    ) -> Self {
        Self {
            simd_width,
            local_size_0,
            kl,
            local_size_1,
            ms,
            ks,
            ns,
            a_fetching_policy,
            b_fetching_policy,
            local_fetch_0,
            local_fetch_1,
        }
    }

    #[inline]
    pub const fn ml(&self) -> usize {
        self.ms.saturating_mul(self.local_size_0)
    }

    #[inline]
    pub const fn nl(&self) -> usize {
        self.ns.saturating_mul(self.local_size_1)
    }

    #[inline]
    const fn a_local(&self) -> bool {
        matches!(self.a_fetching_policy, FetchingPolicy::FetchFromLocal)
    }

    #[inline]
    const fn b_local(&self) -> bool {
        matches!(self.b_fetching_policy, FetchingPolicy::FetchFromLocal)
    }
}

const NAME: &str = "mproduct";

impl Family for MatrixProductParameters {
    fn lmem_usage(&self, dtype: ElementType) -> usize {
        let tile = |l: usize| self.kl.saturating_mul(l.saturating_add(1));
        let mut elements = 0usize;
        if self.a_local() {
            elements = elements.saturating_add(tile(self.ml()));
        }
        if self.b_local() {
            elements = elements.saturating_add(tile(self.nl()));
        }
        elements.saturating_mul(dtype.size_of())
    }

    #[inline]
    fn registers_usage(&self, dtype: ElementType) -> usize {
        [(self.ms, self.ns), (self.ms, self.ks), (self.ks, self.ns)]
            .into_iter()
            .fold(0usize, |acc, (a, b)| acc.saturating_add(a.saturating_mul(b)))
            .saturating_mul(dtype.size_of())
    }

    fn check_structure(&self, device: &Device) -> Result<(), Error> {
        check_simd(NAME, self.simd_width)?;
        check_positive(
            NAME,
            &[
                ("local_size_0", self.local_size_0),
                ("local_size_1", self.local_size_1),
                ("kl", self.kl),
                ("ms", self.ms),
                ("ks", self.ks),
                ("ns", self.ns),
            ],
        )?;
        check_group(NAME, self.local_size(), device)?;

        let divides = |name: &str, n: usize, what: &str, d: usize| {
            if n % d == 0 {
                Ok(())
            } else {
                Err(invalid_parameters(format!(
                    "{NAME}.{name} = {n} is not a multiple of {what} = {d}"
                )))
            }
        };
        divides("ms", self.ms, "simd_width", self.simd_width)?;
        divides("ns", self.ns, "simd_width", self.simd_width)?;
        divides("kl", self.kl, "ks", self.ks)?;

        if self.a_local() || self.b_local() {
            check_positive(
                NAME,
                &[
                    ("local_fetch_0", self.local_fetch_0),
                    ("local_fetch_1", self.local_fetch_1),
                ],
            )?;
            // 工作组大小已通过 check_group，乘积不会溢出
            let [l0, l1] = self.local_size();
            let group = l0 * l1;
            if self.local_fetch_0.checked_mul(self.local_fetch_1) != Some(group) {
                return Err(invalid_parameters(format!(
                    "{NAME}: local_fetch_0 * local_fetch_1 = {} does not match work-group size {group}",
                    self.local_fetch_0.saturating_mul(self.local_fetch_1),
                )));
            }
            divides("kl", self.kl, "local_fetch_0", self.local_fetch_0)?;
            if self.a_local() {
                divides("ml", self.ml(), "local_fetch_1", self.local_fetch_1)?;
            }
            if self.b_local() {
                divides("nl", self.nl(), "local_fetch_1", self.local_fetch_1)?;
            }
        }
        Ok(())
    }

    #[inline]
    fn local_size(&self) -> [usize; 2] {
        [self.local_size_0, self.local_size_1]
    }

    fn range(&self, problem: &Problem) -> NdRange {
        let [m, n] = match *problem {
            Problem::Product { m, n, .. } => [m, n],
            _ => [1, 1],
        };
        NdRange {
            global: [
                m.div_ceil(self.ml()) * self.local_size_0,
                n.div_ceil(self.nl()) * self.local_size_1,
            ],
            local: self.local_size(),
        }
    }

    fn codegen(&self, op: OperationTag) -> CodeGen {
        let (trans_a, trans_b) = op.transposes().unwrap_or((false, false));
        CodeGen::new(MPRODUCT_CL)
            .define("SIMD_WIDTH", self.simd_width)
            .define("LOCAL_SIZE_0", self.local_size_0)
            .define("LOCAL_SIZE_1", self.local_size_1)
            .define("KL", self.kl)
            .define("MS", self.ms)
            .define("KS", self.ks)
            .define("NS", self.ns)
            .define("ML", self.ml())
            .define("NL", self.nl())
            .define("A_FETCH_POLICY", self.a_fetching_policy.code())
            .define("B_FETCH_POLICY", self.b_fetching_policy.code())
            .define("LOCAL_FETCH_0", self.local_fetch_0)
            .define("LOCAL_FETCH_1", self.local_fetch_1)
            .define("TRANS_A", trans_a as u8)
            .define("TRANS_B", trans_b as u8)
    }
}

const MPRODUCT_CL: &str = include_str!("cl/mproduct.cl");
