//! 主机后端。
//!
//! 存储是主机上的对齐内存，队列是按序执行命令的工作线程，
//! 内核按模板给出的发射几何划分工作项，由 rayon 并行执行。

mod element;
mod kernels;
mod mat_mul;
mod queue;

pub use queue::HostQueue;

use crate::{
    templates::FetchingPolicy, unrecognized_type, Blob, Device, ElementType, Error, Hardware,
    KernelSource, OperationTag,
};
use log::info;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 把主机当作加速器使用。
#[derive(Clone, Debug)]
pub struct Cpu {
    device: Device,
}

impl Cpu {
    #[inline]
    pub fn new(device: Device) -> Self {
        Self { device }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        let threads = std::thread::available_parallelism().map_or(1, usize::from);
        Self::new(Device {
            name: format!("host ({threads} threads)"),
            vendor: "host".into(),
            compute_capability: (1, 0),
            compute_units: threads,
            local_mem_size: 64 << 10,
            max_work_group_size: 1024,
            register_budget: 4 << 10,
        })
    }
}

/// 主机存储。
pub struct HostMemory {
    len: usize,
    blob: Mutex<Blob>,
}

impl HostMemory {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 失败的内核不影响存储本身，忽略锁中毒。
    #[inline]
    fn lock(&self) -> MutexGuard<Blob> {
        self.blob.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 由内核源码的入口和宏定义选出的原生内核。
#[derive(Clone, Debug)]
pub struct HostProgram {
    op: OperationTag,
    dtype: ElementType,
    simd_width: usize,
    fetch: FetchingPolicy,
    lanes: usize,
}

impl HostProgram {
    #[inline]
    pub const fn op(&self) -> OperationTag {
        self.op
    }

    #[inline]
    pub const fn dtype(&self) -> ElementType {
        self.dtype
    }
}

impl Hardware for Cpu {
    type Memory = HostMemory;
    type Program = HostProgram;
    type Queue = HostQueue;

    #[inline]
    fn device(&self) -> &Device {
        &self.device
    }

    #[inline]
    fn malloc(&self, size: usize) -> Self::Memory {
        HostMemory {
            len: size,
            blob: Mutex::new(Blob::new(size)),
        }
    }

    #[inline]
    fn queue(&self) -> Self::Queue {
        HostQueue::new()
    }

    fn build(&self, source: &KernelSource) -> Result<Self::Program, Error> {
        let op = source.entry.parse::<OperationTag>()?;
        let dtype = source
            .define("T")
            .and_then(|t| ElementType::ALL.into_iter().find(|ty| ty.device_name() == t))
            .ok_or_else(|| {
                unrecognized_type(format!("kernel {} has no valid element type", source.entry))
            })?;
        let program = HostProgram {
            op,
            dtype,
            simd_width: source.parse_define("SIMD_WIDTH").unwrap_or(1),
            fetch: source
                .parse_define("FETCH_POLICY")
                .and_then(FetchingPolicy::from_code)
                .unwrap_or(FetchingPolicy::FetchFromGlobalStrided),
            lanes: match op {
                OperationTag::RowWiseReduction | OperationTag::ColWiseReduction => {
                    source.parse_define("LOCAL_SIZE_1").unwrap_or(1)
                }
                _ => 1,
            },
        };
        info!("build host kernel {} for {dtype}", source.entry);
        Ok(program)
    }
}

#[cfg(test)]
mod test {
    use super::Cpu;
    use crate::{
        templates::{FetchingPolicy, MatrixReductionParameters, Template},
        CodeGen, ElementType, ErrorKind, Hardware, OperationTag,
    };

    #[test]
    fn test_default_device() {
        let cpu = Cpu::default();
        assert_eq!(cpu.device().vendor(), "host");
        assert!(cpu.device().compute_units > 0);
        let mem = cpu.malloc(12);
        assert_eq!(mem.len(), 12);
        assert!(mem.lock().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_build() {
        let cpu = Cpu::default();
        let t = Template::new(
            OperationTag::RowWiseReduction,
            MatrixReductionParameters::new(2, 4, 16, 8, FetchingPolicy::FetchFromGlobalStrided),
            cpu.device(),
        )
        .unwrap();
        let program = cpu.build(&t.source(ElementType::U16)).unwrap();
        assert_eq!(program.op(), OperationTag::RowWiseReduction);
        assert_eq!(program.dtype(), ElementType::U16);
        assert_eq!(program.simd_width, 2);
        assert_eq!(program.lanes, 16);
    }

    #[test]
    fn test_build_unknown() {
        let cpu = Cpu::default();
        let e = cpu
            .build(&CodeGen::new("").define("T", "float").finish("softmax"))
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::UnrecognizedType);
        let e = cpu.build(&CodeGen::new("").finish("vaxpy")).unwrap_err();
        assert_eq!(e.kind, ErrorKind::UnrecognizedType);
    }
}
