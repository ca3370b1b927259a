//! 内核参数的绑定布局。
//!
//! 表达式在派发时被展开成这里的形式：缓冲区句柄、字节偏移、字节步长、嵌入的标量，
//! 以及逐元素部分的后缀指令序列。

use crate::{ElementType, Hardware, MemOf, Scalar};
use std::sync::Arc;

/// 逐元素程序的最大栈深。
pub const MAX_DEPTH: usize = 16;
/// 一次发射最多绑定的输入缓冲区数。
pub const MAX_OPERANDS: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UnaryOp {
    Neg,
    Abs,
    Acos,
    Asin,
    Atan,
    Ceil,
    Cos,
    Cosh,
    Exp,
    Floor,
    Log,
    Log10,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Max,
    Min,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
    ArgMax,
    ArgMin,
}

impl ReduceOp {
    #[inline]
    pub const fn is_arg(self) -> bool {
        matches!(self, Self::ArgMax | Self::ArgMin)
    }
}

/// 后缀指令。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instr {
    /// 压入第 n 个操作数在当前下标处的值。
    Load(usize),
    /// 压入第 n 个常量。
    Const(usize),
    Unary(UnaryOp),
    Binary(BinaryOp),
}

/// 逐元素函数 f(i, j)。
#[derive(Clone, Debug)]
pub struct Elementwise {
    pub code: Box<[Instr]>,
    /// 已转换为内核元素类型的常量。
    pub consts: Box<[Scalar]>,
    pub depth: usize,
}

/// 一个设备缓冲区视图，偏移和步长以字节计。
pub struct Operand<H: Hardware> {
    pub mem: Arc<MemOf<H>>,
    pub offset: isize,
    pub strides: [isize; 2],
}

impl<H: Hardware> Clone for Operand<H> {
    fn clone(&self) -> Self {
        Self {
            mem: self.mem.clone(),
            offset: self.offset,
            strides: self.strides,
        }
    }
}

/// 内核要解决的问题，下标空间总是二维的 `[d0, d1]`。
#[derive(Clone, Debug)]
pub enum Problem {
    /// dst[i, j] = f(i, j)
    Map { shape: [usize; 2], f: Elementwise },
    /// dst[0] = R f(i, j)
    Reduce {
        shape: [usize; 2],
        op: ReduceOp,
        f: Elementwise,
    },
    /// axis = 1: dst[i] = R_j f(i, j)；axis = 0: dst[j] = R_i f(i, j)。
    /// 输出下标总是沿 dst 的第 0 个步长。
    ReduceAxis {
        shape: [usize; 2],
        axis: usize,
        op: ReduceOp,
        f: Elementwise,
    },
    /// dst = beta * dst + alpha * a · b，a 和 b 是前两个操作数。
    Product {
        m: usize,
        n: usize,
        k: usize,
        alpha: Scalar,
        beta: Scalar,
    },
}

/// 一次发射的全部参数。
pub struct KernelArgs<H: Hardware> {
    pub dtype: ElementType,
    pub dst: Operand<H>,
    pub operands: Vec<Operand<H>>,
    pub problem: Problem,
}

impl<H: Hardware> KernelArgs<H> {
    /// 参与本次发射的全部缓冲区，目标在前。
    pub fn buffers(&self) -> impl Iterator<Item = &Arc<MemOf<H>>> {
        std::iter::once(&self.dst.mem).chain(self.operands.iter().map(|o| &o.mem))
    }
}

/// 发射几何。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NdRange {
    pub global: [usize; 2],
    pub local: [usize; 2],
}

impl NdRange {
    #[inline]
    pub const fn groups(&self) -> [usize; 2] {
        [
            self.global[0] / self.local[0],
            self.global[1] / self.local[1],
        ]
    }

    #[inline]
    pub const fn work_items(&self) -> usize {
        self.global[0] * self.global[1]
    }
}
