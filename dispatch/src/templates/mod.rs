//! 参数化内核模板。
//!
//! 每个模板族提供一组可调参数，并能以闭式给出局部存储和寄存器用量。
//! 模板构造时按设备资源上限校验，不合法的配置不会进入模型表。

mod maxpy;
mod mproduct;
mod mreduction;
mod reduction;
mod vaxpy;

pub use maxpy::MatrixAxpyParameters;
pub use mproduct::MatrixProductParameters;
pub use mreduction::MatrixReductionParameters;
pub use reduction::ReductionParameters;
pub use vaxpy::VectorAxpyParameters;

use crate::{
    invalid_parameters, CodeGen, Device, ElementType, Error, KernelSource, NdRange,
    OperationTag, Problem,
};

/// 全局存储的取数方式。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FetchingPolicy {
    /// 先搬到局部存储再计算。
    FetchFromLocal,
    /// 直接从全局存储跨步读取。
    FetchFromGlobalStrided,
    /// 直接从全局存储连续读取。
    FetchFromGlobalContiguous,
}

impl FetchingPolicy {
    /// 内核源码中的宏值。
    #[inline]
    pub const fn code(self) -> u32 {
        match self {
            Self::FetchFromLocal => 0,
            Self::FetchFromGlobalStrided => 1,
            Self::FetchFromGlobalContiguous => 2,
        }
    }

    #[inline]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::FetchFromLocal),
            1 => Some(Self::FetchFromGlobalStrided),
            2 => Some(Self::FetchFromGlobalContiguous),
            _ => None,
        }
    }
}

/// 任一模板族的参数。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Parameters {
    VectorAxpy(VectorAxpyParameters),
    MatrixAxpy(MatrixAxpyParameters),
    Reduction(ReductionParameters),
    MatrixReduction(MatrixReductionParameters),
    MatrixProduct(MatrixProductParameters),
}

macro_rules! family {
    ($( $variant:ident($ty:ty) )+) => {
        $(
            impl From<$ty> for Parameters {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )+

        impl Parameters {
            #[inline]
            fn family(&self) -> &dyn Family {
                match self {
                    $( Self::$variant(p) => p, )+
                }
            }
        }
    };
}

family! {
    VectorAxpy(VectorAxpyParameters)
    MatrixAxpy(MatrixAxpyParameters)
    Reduction(ReductionParameters)
    MatrixReduction(MatrixReductionParameters)
    MatrixProduct(MatrixProductParameters)
}

impl Parameters {
    /// 参数族是否适用于操作类型。
    pub const fn fits(&self, op: OperationTag) -> bool {
        use OperationTag as Op;
        matches!(
            (self, op),
            (Self::VectorAxpy(_), Op::VectorAxpy)
                | (Self::MatrixAxpy(_), Op::MatrixAxpy)
                | (Self::Reduction(_), Op::Reduction)
                | (
                    Self::MatrixReduction(_),
                    Op::RowWiseReduction | Op::ColWiseReduction
                )
                | (
                    Self::MatrixProduct(_),
                    Op::MatrixProductNN
                        | Op::MatrixProductTN
                        | Op::MatrixProductNT
                        | Op::MatrixProductTT
                )
        )
    }
}

/// 模板族的公共行为。
trait Family {
    /// 每个工作组占用的局部存储字节数，饱和计算。
    fn lmem_usage(&self, dtype: ElementType) -> usize;
    /// 每个工作项占用的私有存储字节数，饱和计算。
    fn registers_usage(&self, dtype: ElementType) -> usize;
    /// 与资源用量无关的结构性检查。
    fn check_structure(&self, device: &Device) -> Result<(), Error>;
    fn local_size(&self) -> [usize; 2];
    fn range(&self, problem: &Problem) -> NdRange;
    fn codegen(&self, op: OperationTag) -> CodeGen;
}

/// 校验构造时假定的元素类型，覆盖所有元素宽度。
const WIDEST: ElementType = ElementType::F64;

/// 绑定到一个操作类型并通过校验的内核模板。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Template {
    op: OperationTag,
    parameters: Parameters,
}

impl Template {
    /// 构造模板，在 `device` 上校验参数。
    ///
    /// 校验按最宽的元素类型计算资源用量，通过校验的模板对任何元素类型都合法。
    /// 这是纯函数，不编译内核，也不访问设备。
    pub fn new(
        op: OperationTag,
        parameters: impl Into<Parameters>,
        device: &Device,
    ) -> Result<Self, Error> {
        let parameters = parameters.into();
        if !parameters.fits(op) {
            return Err(invalid_parameters(format!(
                "{parameters:?} cannot instantiate {op}"
            )));
        }
        let ans = Self { op, parameters };
        ans.check_invalid(device, WIDEST)?;
        Ok(ans)
    }

    #[inline]
    pub const fn op(&self) -> OperationTag {
        self.op
    }

    #[inline]
    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    #[inline]
    pub fn local_size_0(&self) -> usize {
        self.parameters.family().local_size()[0]
    }

    #[inline]
    pub fn local_size_1(&self) -> usize {
        self.parameters.family().local_size()[1]
    }

    /// 局部存储用量（字节），溢出时为 `usize::MAX`。
    #[inline]
    pub fn lmem_usage(&self, dtype: ElementType) -> usize {
        self.parameters.family().lmem_usage(dtype)
    }

    /// 寄存器用量（字节），溢出时为 `usize::MAX`。
    #[inline]
    pub fn registers_usage(&self, dtype: ElementType) -> usize {
        self.parameters.family().registers_usage(dtype)
    }

    /// 检查模板在 `device` 上对元素类型 `dtype` 是否合法。
    pub fn check_invalid(&self, device: &Device, dtype: ElementType) -> Result<(), Error> {
        let family = self.parameters.family();
        family.check_structure(device)?;

        let lmem = family.lmem_usage(dtype);
        if lmem > device.local_mem_size {
            return Err(invalid_parameters(format!(
                "{}: local memory usage {lmem} bytes exceeds device limit {} bytes",
                self.op, device.local_mem_size,
            )));
        }
        let registers = family.registers_usage(dtype);
        if registers > device.register_budget {
            return Err(invalid_parameters(format!(
                "{}: register usage {registers} bytes exceeds device budget {} bytes",
                self.op, device.register_budget,
            )));
        }
        Ok(())
    }

    /// 生成元素类型为 `dtype` 的内核源码。
    pub fn source(&self, dtype: ElementType) -> KernelSource {
        let acc = if dtype == ElementType::F32 {
            "float"
        } else {
            "double"
        };
        self.parameters
            .family()
            .codegen(self.op)
            .define("T", dtype.device_name())
            .define("ACC", acc)
            .define("IS_FLOAT", dtype.is_float() as u8)
            .define("MAX_DEPTH", crate::MAX_DEPTH)
            .define("MAX_OPERANDS", crate::MAX_OPERANDS)
            .finish(self.op.name())
    }

    /// 针对具体问题规模的发射几何。
    #[inline]
    pub fn range(&self, problem: &Problem) -> NdRange {
        self.parameters.family().range(problem)
    }
}

fn check_simd(name: &str, simd_width: usize) -> Result<(), Error> {
    if matches!(simd_width, 1 | 2 | 4 | 8 | 16) {
        Ok(())
    } else {
        Err(invalid_parameters(format!(
            "{name}.simd_width = {simd_width}, expected one of 1, 2, 4, 8, 16"
        )))
    }
}

fn check_positive(name: &str, fields: &[(&str, usize)]) -> Result<(), Error> {
    match fields.iter().find(|(_, v)| *v == 0) {
        Some((field, _)) => Err(invalid_parameters(format!("{name}.{field} must be positive"))),
        None => Ok(()),
    }
}

fn check_group(name: &str, local_size: [usize; 2], device: &Device) -> Result<(), Error> {
    let [l0, l1] = local_size;
    match l0.checked_mul(l1) {
        Some(size) if size <= device.max_work_group_size => Ok(()),
        Some(size) => Err(invalid_parameters(format!(
            "{name}: local_size_0 * local_size_1 = {size} exceeds max work-group size {}",
            device.max_work_group_size,
        ))),
        None => Err(invalid_parameters(format!(
            "{name}: local_size_0 * local_size_1 overflows, max work-group size is {}",
            device.max_work_group_size,
        ))),
    }
}

/// 问题的下标空间。
fn problem_shape(problem: &Problem) -> [usize; 2] {
    match *problem {
        Problem::Map { shape, .. }
        | Problem::Reduce { shape, .. }
        | Problem::ReduceAxis { shape, .. } => shape,
        Problem::Product { m, n, .. } => [m, n],
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// 资源上限接近常见独立显卡的设备。
    pub(crate) fn gpu() -> Device {
        Device {
            name: "test gpu".into(),
            vendor: "test".into(),
            compute_capability: (8, 6),
            compute_units: 32,
            local_mem_size: 48 << 10,
            max_work_group_size: 1024,
            register_budget: 1024,
        }
    }

    #[test]
    fn test_mismatched_family() {
        let p = VectorAxpyParameters::new(1, 128, 64, FetchingPolicy::FetchFromGlobalStrided);
        let e = Template::new(OperationTag::Reduction, p, &gpu()).unwrap_err();
        assert_eq!(e.kind, crate::ErrorKind::InvalidParameters);
        assert!(e.info.contains("reduction"));
    }

    #[test]
    fn test_fits() {
        let p: Parameters = MatrixReductionParameters::new(
            1,
            8,
            32,
            64,
            FetchingPolicy::FetchFromGlobalStrided,
        )
        .into();
        assert!(p.fits(OperationTag::RowWiseReduction));
        assert!(p.fits(OperationTag::ColWiseReduction));
        assert!(!p.fits(OperationTag::Reduction));
    }

    #[test]
    fn test_source() {
        let t = Template::new(
            OperationTag::VectorAxpy,
            VectorAxpyParameters::new(4, 128, 64, FetchingPolicy::FetchFromGlobalContiguous),
            &gpu(),
        )
        .unwrap();
        let src = t.source(ElementType::F32);
        assert_eq!(src.entry, "vaxpy");
        assert_eq!(src.define("T"), Some("float"));
        assert_eq!(src.define("ACC"), Some("float"));
        assert_eq!(src.parse_define::<usize>("SIMD_WIDTH"), Some(4));
        assert_eq!(src.parse_define::<u32>("FETCH_POLICY"), Some(2));
        assert!(src.text.contains("__kernel void vaxpy"));
        assert_ne!(src, t.source(ElementType::F64));
    }

    #[test]
    fn test_fetching_policy_code() {
        for p in [
            FetchingPolicy::FetchFromLocal,
            FetchingPolicy::FetchFromGlobalStrided,
            FetchingPolicy::FetchFromGlobalContiguous,
        ] {
            assert_eq!(FetchingPolicy::from_code(p.code()), Some(p));
        }
        assert_eq!(FetchingPolicy::from_code(3), None);
    }
}
