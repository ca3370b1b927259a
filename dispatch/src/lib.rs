//! 内核模板的选择、校验与派发。
//!
//! 调用者用数组构造符号表达式，派发时按 (操作类型, 元素类型) 在目标流的模型表中找到
//! 唯一的模型，由模型编译（仅一次）并发射对应的参数化内核。

mod common;
mod device;
mod dtype;
mod handle;
mod operation;
mod runtime;

pub mod array;
pub mod model;
pub mod templates;

pub use array::{Array, ArrayExpression};
pub use common::*;
pub use device::Device;
pub use dtype::{Element, ElementType, Scalar};
pub use model::{Model, ModelMap};
pub use operation::OperationTag;
pub use runtime::{Context, ContextId, Runtime, Stream, StreamId};

#[cfg(any(use_cpu, test))]
pub use handle::common_cpu;

use std::sync::Arc;

/// 算力硬件抽象。
///
/// 约定硬件如何存储、编译和运行。
/// 这个特质应该由管理硬件的基本单元的类型实现，通常是**设备上下文**。
pub trait Hardware: Sized + Send + Sync + 'static {
    /// 硬件的存储类型。
    type Memory: Send + Sync + 'static;
    /// 编译产物类型。
    type Program: Send + Sync + 'static;
    /// 硬件的任务队列类型。
    type Queue: Queue<Hardware = Self>;

    /// 设备描述。
    fn device(&self) -> &Device;
    /// 分配零初始化的设备存储。
    fn malloc(&self, size: usize) -> Self::Memory;
    /// 创建新的任务队列。
    fn queue(&self) -> Self::Queue;
    /// 编译内核源码。
    fn build(&self, source: &KernelSource) -> Result<Self::Program, Error>;
}

/// 任务队列。
///
/// 同一队列上的命令按提交顺序执行；不同队列之间没有顺序保证。
pub trait Queue: Send + Sync + 'static {
    type Hardware: Hardware;

    /// 发射内核，记录到队列即返回。
    fn launch(
        &self,
        program: Arc<ProgramOf<Self::Hardware>>,
        args: KernelArgs<Self::Hardware>,
        range: NdRange,
    ) -> Result<(), Error>;

    /// 按序将主机数据写入设备存储，记录到队列即返回。
    fn write(
        &self,
        dst: Arc<MemOf<Self::Hardware>>,
        offset: usize,
        data: Vec<u8>,
    ) -> Result<(), Error>;

    /// 按序读取设备存储，阻塞直到之前的命令和读取本身完成。
    fn read(
        &self,
        src: Arc<MemOf<Self::Hardware>>,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, Error>;

    /// 阻塞直到队列排空。
    fn finish(&self) -> Result<(), Error>;
}

pub type MemOf<H> = <H as Hardware>::Memory;
pub type ProgramOf<H> = <H as Hardware>::Program;
pub type QueueOf<H> = <H as Hardware>::Queue;
