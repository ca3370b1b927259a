use super::{lower::signature, Array};
use crate::{BinaryOp, Error, Hardware, ReduceOp, Scalar, Stream, UnaryOp};
use std::ops;

pub(super) enum Node<H: Hardware> {
    Array(Array<H>),
    /// 弱类型标量，派发时转换为数组的元素类型。
    Scalar(Scalar),
    Unary(UnaryOp, Box<Node<H>>),
    Binary(BinaryOp, Box<Node<H>>, Box<Node<H>>),
    Reduce(ReduceOp, Option<usize>, Box<Node<H>>),
    Dot(Box<Node<H>>, Box<Node<H>>),
}

/// 惰性的数组表达式。
///
/// 构造时不访问设备，形状和类型在派发时才检查；派发消耗表达式。
pub struct ArrayExpression<H: Hardware>(pub(super) Node<H>);

impl<H: Hardware> ArrayExpression<H> {
    #[inline]
    fn reduce(self, op: ReduceOp, axis: Option<usize>) -> Self {
        Self(Node::Reduce(op, axis, Box::new(self.0)))
    }

    /// 求和，`axis` 为 `None` 时归约所有元素。
    #[inline]
    pub fn sum(self, axis: Option<usize>) -> Self {
        self.reduce(ReduceOp::Sum, axis)
    }

    #[inline]
    pub fn max(self, axis: Option<usize>) -> Self {
        self.reduce(ReduceOp::Max, axis)
    }

    #[inline]
    pub fn min(self, axis: Option<usize>) -> Self {
        self.reduce(ReduceOp::Min, axis)
    }

    /// 最大值的下标，以元素类型表示。相等时取最小的下标。
    #[inline]
    pub fn argmax(self, axis: Option<usize>) -> Self {
        self.reduce(ReduceOp::ArgMax, axis)
    }

    #[inline]
    pub fn argmin(self, axis: Option<usize>) -> Self {
        self.reduce(ReduceOp::ArgMin, axis)
    }

    /// 在 `stream` 上求值到新分配的数组。
    pub fn eval(self, stream: &Stream<H>) -> Result<Array<H>, Error> {
        let (dtype, shape) = signature(&self.0)?;
        let dst = Array::alloc(&shape, dtype, stream.hardware(), stream.context());
        stream.dispatch(&dst, self)?;
        Ok(dst)
    }
}

/// 可以作为表达式操作数的值。
pub trait IntoExpression<H: Hardware> {
    fn into_expression(self) -> ArrayExpression<H>;
}

impl<H: Hardware> IntoExpression<H> for ArrayExpression<H> {
    #[inline]
    fn into_expression(self) -> ArrayExpression<H> {
        self
    }
}

impl<H: Hardware> IntoExpression<H> for Array<H> {
    #[inline]
    fn into_expression(self) -> ArrayExpression<H> {
        ArrayExpression(Node::Array(self))
    }
}

impl<H: Hardware> IntoExpression<H> for &Array<H> {
    #[inline]
    fn into_expression(self) -> ArrayExpression<H> {
        ArrayExpression(Node::Array(self.clone()))
    }
}

macro_rules! scalar {
    ($( $ty:ty )+) => {
        $(
            impl<H: Hardware> IntoExpression<H> for $ty {
                #[inline]
                fn into_expression(self) -> ArrayExpression<H> {
                    ArrayExpression(Node::Scalar(self.into()))
                }
            }
        )+
    };
}

scalar!(i8 u8 i16 u16 i32 u32 i64 u64 f32 f64);

#[inline]
fn unary<H: Hardware>(op: UnaryOp, x: impl IntoExpression<H>) -> ArrayExpression<H> {
    ArrayExpression(Node::Unary(op, Box::new(x.into_expression().0)))
}

#[inline]
fn binary<H: Hardware>(
    op: BinaryOp,
    a: impl IntoExpression<H>,
    b: impl IntoExpression<H>,
) -> ArrayExpression<H> {
    ArrayExpression(Node::Binary(
        op,
        Box::new(a.into_expression().0),
        Box::new(b.into_expression().0),
    ))
}

/// 向量点积、矩阵乘向量、向量乘矩阵或矩阵乘。
#[inline]
pub fn dot<H: Hardware>(a: impl IntoExpression<H>, b: impl IntoExpression<H>) -> ArrayExpression<H> {
    ArrayExpression(Node::Dot(
        Box::new(a.into_expression().0),
        Box::new(b.into_expression().0),
    ))
}

macro_rules! binary_fn {
    ($( $(#[$meta:meta])* $name:ident => $op:ident )+) => {
        $(
            $(#[$meta])*
            #[inline]
            pub fn $name<H: Hardware>(
                a: impl IntoExpression<H>,
                b: impl IntoExpression<H>,
            ) -> ArrayExpression<H> {
                binary(BinaryOp::$op, a, b)
            }
        )+
    };
}

binary_fn! {
    pow => Pow
    /// 逐元素取大。
    max => Max
    /// 逐元素取小。
    min => Min
    /// 比较的结果是元素类型的 1 或 0。
    gt  => Gt
    ge  => Ge
    lt  => Lt
    le  => Le
    eq  => Eq
    ne  => Ne
}

macro_rules! unary_fn {
    ($( $name:ident => $op:ident )+) => {
        $(
            #[inline]
            pub fn $name<H: Hardware>(x: impl IntoExpression<H>) -> ArrayExpression<H> {
                unary(UnaryOp::$op, x)
            }
        )+
    };
}

unary_fn! {
    abs   => Abs
    acos  => Acos
    asin  => Asin
    atan  => Atan
    ceil  => Ceil
    cos   => Cos
    cosh  => Cosh
    exp   => Exp
    floor => Floor
    log   => Log
    log10 => Log10
    sin   => Sin
    sinh  => Sinh
    sqrt  => Sqrt
    tan   => Tan
    tanh  => Tanh
}

macro_rules! std_binary {
    ($( $trait:ident::$fn:ident => $op:ident )+) => {
        $(
            impl<H: Hardware, R: IntoExpression<H>> ops::$trait<R> for ArrayExpression<H> {
                type Output = ArrayExpression<H>;
                #[inline]
                fn $fn(self, rhs: R) -> Self::Output {
                    binary(BinaryOp::$op, self, rhs)
                }
            }

            impl<H: Hardware, R: IntoExpression<H>> ops::$trait<R> for &Array<H> {
                type Output = ArrayExpression<H>;
                #[inline]
                fn $fn(self, rhs: R) -> Self::Output {
                    binary(BinaryOp::$op, self, rhs)
                }
            }
        )+
    };
}

std_binary! {
    Add::add => Add
    Sub::sub => Sub
    Mul::mul => Mul
    Div::div => Div
}

// 标量在左
macro_rules! scalar_lhs {
    (@ $ty:ty; $( $trait:ident::$fn:ident => $op:ident ),+) => {
        $(
            impl<H: Hardware> ops::$trait<&Array<H>> for $ty {
                type Output = ArrayExpression<H>;
                #[inline]
                fn $fn(self, rhs: &Array<H>) -> Self::Output {
                    binary(BinaryOp::$op, self, rhs)
                }
            }

            impl<H: Hardware> ops::$trait<ArrayExpression<H>> for $ty {
                type Output = ArrayExpression<H>;
                #[inline]
                fn $fn(self, rhs: ArrayExpression<H>) -> Self::Output {
                    binary(BinaryOp::$op, self, rhs)
                }
            }
        )+
    };
    ($( $ty:ty )+) => {
        $(
            scalar_lhs!(@ $ty; Add::add => Add, Sub::sub => Sub, Mul::mul => Mul, Div::div => Div);
        )+
    };
}

scalar_lhs!(i32 i64 f32 f64);

impl<H: Hardware> ops::Neg for ArrayExpression<H> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        unary(UnaryOp::Neg, self)
    }
}

impl<H: Hardware> ops::Neg for &Array<H> {
    type Output = ArrayExpression<H>;
    #[inline]
    fn neg(self) -> Self::Output {
        unary(UnaryOp::Neg, self)
    }
}
