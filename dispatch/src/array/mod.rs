//! 设备上的一维或二维数组，以及由数组构成的惰性表达式。

mod expr;
mod lower;

pub use expr::{
    abs, acos, asin, atan, ceil, cos, cosh, dot, eq, exp, floor, ge, gt, le, log, log10, lt, max,
    min, ne, pow, sin, sinh, sqrt, tan, tanh, ArrayExpression, IntoExpression,
};
pub use lower::Launch;

pub(crate) use lower::lower;

use crate::{
    not_found, shape_error, unrecognized_type, Context, ContextId, Element, ElementType, Error,
    Hardware, MemOf, Queue, Stream,
};
use ndarray_layout::{ArrayLayout, Endian::BigEndian};
use std::{fmt, sync::Arc};

/// 设备数组。
///
/// 克隆和转置只复制句柄，与原数组共享存储。存储随最后一个句柄释放。
pub struct Array<H: Hardware> {
    dtype: ElementType,
    layout: ArrayLayout<2>,
    mem: Arc<MemOf<H>>,
    context: ContextId,
}

impl<H: Hardware> Clone for Array<H> {
    fn clone(&self) -> Self {
        Self {
            dtype: self.dtype,
            layout: self.layout.clone(),
            mem: self.mem.clone(),
            context: self.context,
        }
    }
}

impl<H: Hardware> fmt::Debug for Array<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Array<{}>{:?} strides {:?} in context {}",
            self.dtype,
            self.shape(),
            self.strides(),
            self.context,
        )
    }
}

fn check_shape(shape: &[usize]) -> Result<(), Error> {
    if !(1..=2).contains(&shape.len()) {
        return Err(shape_error(format!(
            "arrays of rank {} are not supported",
            shape.len()
        )));
    }
    if shape.contains(&0) {
        return Err(shape_error(format!("shape {shape:?} has an empty dimension")));
    }
    Ok(())
}

impl<H: Hardware> Array<H> {
    /// 在上下文中分配零初始化的数组。
    pub fn empty(shape: &[usize], dtype: ElementType, context: &Context<H>) -> Result<Self, Error> {
        check_shape(shape)?;
        Ok(Self::alloc(shape, dtype, context.hardware(), context.id()))
    }

    /// 形状已经检查过。
    pub(crate) fn alloc(
        shape: &[usize],
        dtype: ElementType,
        hardware: &H,
        context: ContextId,
    ) -> Self {
        let layout = ArrayLayout::<2>::new_contiguous(shape, BigEndian, dtype.size_of());
        let size = shape.iter().product::<usize>() * dtype.size_of();
        Self {
            dtype,
            layout,
            mem: Arc::new(hardware.malloc(size)),
            context,
        }
    }

    /// 从主机数据创建数组，数据按行优先排列。
    pub fn from_host<T: Element>(
        data: &[T],
        shape: &[usize],
        context: &Context<H>,
    ) -> Result<Self, Error> {
        let len = std::mem::size_of_val(data);
        let bytes = unsafe { std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), len) };
        Self::from_bytes(bytes, shape, T::TYPE, context)
    }

    /// 从主机字节创建数组，经上下文的默认流上传，返回时上传已经完成。
    pub fn from_bytes(
        bytes: &[u8],
        shape: &[usize],
        dtype: ElementType,
        context: &Context<H>,
    ) -> Result<Self, Error> {
        let ans = Self::empty(shape, dtype, context)?;
        if bytes.len() != ans.len() * dtype.size_of() {
            return Err(shape_error(format!(
                "{} bytes cannot fill {dtype} array of shape {shape:?}",
                bytes.len(),
            )));
        }
        let stream = context.default_stream();
        stream.queue().write(ans.mem.clone(), 0, bytes.to_vec())?;
        stream.finish()?;
        Ok(ans)
    }

    #[inline]
    pub fn dtype(&self) -> ElementType {
        self.dtype
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// 元素总数。
    #[inline]
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 字节步长。
    #[inline]
    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    /// 首元素在存储中的字节偏移。
    #[inline]
    pub fn offset(&self) -> isize {
        self.layout.offset()
    }

    #[inline]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// 是否按行优先紧密排列。
    pub fn is_contiguous(&self) -> bool {
        let size = self.dtype.size_of() as isize;
        let mut expected = size;
        for (&d, &s) in self.shape().iter().zip(self.strides()).rev() {
            if d > 1 && s != expected {
                return false;
            }
            expected *= d as isize
        }
        true
    }

    /// 是否是行优先矩阵的转置视图。
    pub(crate) fn is_transposed(&self) -> bool {
        let size = self.dtype.size_of() as isize;
        match (self.shape(), self.strides()) {
            (&[d0, d1], &[s0, s1]) => d0 > 1 && d1 > 1 && s0 == size && s1 != size,
            _ => false,
        }
    }

    /// 转置视图，不复制数据。一维数组的转置是它自己。
    pub fn trans(&self) -> Self {
        let mut ans = self.clone();
        if self.ndim() == 2 {
            ans.layout = self.layout.transpose(&[1, 0])
        }
        ans
    }

    /// 改变紧密数组的形状，不复制数据。
    pub fn reshape(&self, shape: &[usize]) -> Result<Self, Error> {
        check_shape(shape)?;
        if !self.is_contiguous() {
            return Err(shape_error("only contiguous arrays can be reshaped"));
        }
        if shape.iter().product::<usize>() != self.len() {
            return Err(shape_error(format!(
                "cannot reshape {:?} into {shape:?}",
                self.shape(),
            )));
        }
        let strides = ArrayLayout::<2>::new_contiguous(shape, BigEndian, self.dtype.size_of())
            .strides()
            .to_vec();
        let mut ans = self.clone();
        ans.layout = ArrayLayout::new(shape, &strides, self.offset());
        Ok(ans)
    }

    /// 沿 `axis` 从 `start` 起每隔 `step` 取一个、共 `len` 个元素的视图，不复制数据。
    pub fn slice(&self, axis: usize, start: usize, step: usize, len: usize) -> Result<Self, Error> {
        let Some(&d) = self.shape().get(axis) else {
            return Err(shape_error(format!(
                "axis {axis} out of array of rank {}",
                self.ndim(),
            )));
        };
        if step == 0 || len == 0 {
            return Err(shape_error(format!(
                "slice step {step} and length {len} must be positive"
            )));
        }
        let last = (len - 1)
            .checked_mul(step)
            .and_then(|n| n.checked_add(start));
        if !matches!(last, Some(last) if last < d) {
            return Err(shape_error(format!(
                "{len} elements from {start} by {step} exceed axis {axis} of length {d}"
            )));
        }
        // 只取一个元素时步长无意义
        let step = if len == 1 { 1 } else { step as isize };
        let mut ans = self.clone();
        ans.layout = self.layout.slice(axis, start, step, len);
        Ok(ans)
    }

    fn check_stream(&self, stream: &Stream<H>) -> Result<(), Error> {
        if stream.context() == self.context {
            Ok(())
        } else {
            Err(not_found(format!(
                "array of context {} is not visible from stream {} of context {}",
                self.context,
                stream.id(),
                stream.context(),
            )))
        }
    }

    /// 在流上读回数组，按逻辑下标的行优先顺序排列。阻塞直到读取完成。
    pub fn read_bytes(&self, stream: &Stream<H>) -> Result<Vec<u8>, Error> {
        self.check_stream(stream)?;
        let size = self.dtype.size_of();
        if self.is_contiguous() {
            return stream
                .queue()
                .read(self.mem.clone(), self.offset() as usize, self.len() * size);
        }
        // 读出覆盖整个视图的区间再收集
        let span = self
            .shape()
            .iter()
            .zip(self.strides())
            .map(|(&d, &s)| (d - 1) as isize * s)
            .sum::<isize>() as usize
            + size;
        let raw = stream
            .queue()
            .read(self.mem.clone(), self.offset() as usize, span)?;
        let (rows, cols, s0, s1) = match (self.shape(), self.strides()) {
            (&[d0, d1], &[s0, s1]) => (d0, d1, s0 as usize, s1 as usize),
            (&[d], &[s]) => (1, d, 0, s as usize),
            _ => unreachable!(),
        };
        let mut ans = Vec::with_capacity(self.len() * size);
        for i in 0..rows {
            for j in 0..cols {
                let at = i * s0 + j * s1;
                ans.extend_from_slice(&raw[at..][..size])
            }
        }
        Ok(ans)
    }

    /// 在流上读回数组。`T` 必须与元素类型一致。
    pub fn read<T: Element>(&self, stream: &Stream<H>) -> Result<Vec<T>, Error> {
        if T::TYPE != self.dtype {
            return Err(unrecognized_type(format!(
                "cannot read {} array as {}",
                self.dtype,
                T::TYPE,
            )));
        }
        let bytes = self.read_bytes(stream)?;
        Ok(bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(|chunk| unsafe { chunk.as_ptr().cast::<T>().read_unaligned() })
            .collect())
    }

    /// 在流上按序覆盖紧密数组的内容，不等待完成。
    pub fn write(&self, bytes: &[u8], stream: &Stream<H>) -> Result<(), Error> {
        self.check_stream(stream)?;
        if !self.is_contiguous() {
            return Err(shape_error("only contiguous arrays can be written"));
        }
        if bytes.len() != self.len() * self.dtype.size_of() {
            return Err(shape_error(format!(
                "{} bytes cannot fill {} array of shape {:?}",
                bytes.len(),
                self.dtype,
                self.shape(),
            )));
        }
        stream
            .queue()
            .write(self.mem.clone(), self.offset() as usize, bytes.to_vec())
    }

    /// `self = expr`，在流上派发。
    #[inline]
    pub fn assign(&self, expr: impl IntoExpression<H>, stream: &Stream<H>) -> Result<(), Error> {
        stream.dispatch(self, expr.into_expression())
    }

    #[inline]
    pub fn expr(&self) -> ArrayExpression<H> {
        self.into_expression()
    }

    #[inline]
    pub fn sum(&self, axis: Option<usize>) -> ArrayExpression<H> {
        self.expr().sum(axis)
    }

    #[inline]
    pub fn max(&self, axis: Option<usize>) -> ArrayExpression<H> {
        self.expr().max(axis)
    }

    #[inline]
    pub fn min(&self, axis: Option<usize>) -> ArrayExpression<H> {
        self.expr().min(axis)
    }

    #[inline]
    pub fn argmax(&self, axis: Option<usize>) -> ArrayExpression<H> {
        self.expr().argmax(axis)
    }

    #[inline]
    pub fn argmin(&self, axis: Option<usize>) -> ArrayExpression<H> {
        self.expr().argmin(axis)
    }
}
