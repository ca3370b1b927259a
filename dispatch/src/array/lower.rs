//! 把表达式展开为操作类型和内核参数。

use super::{expr::Node, Array, ArrayExpression};
use crate::{
    not_found, shape_error, unrecognized_type, BinaryOp, ContextId, ElementType, Elementwise,
    Error, Hardware, Instr, KernelArgs, Operand, OperationTag, Problem, ReduceOp, Scalar,
    MAX_DEPTH, MAX_OPERANDS,
};
use std::{fmt, sync::Arc};

/// 一次派发：操作类型和完整的内核参数。
pub struct Launch<H: Hardware> {
    pub op: OperationTag,
    pub args: KernelArgs<H>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Shape {
    Scalar,
    Vector(usize),
    Matrix(usize, usize),
}

impl Shape {
    fn of<H: Hardware>(a: &Array<H>) -> Self {
        match *a.shape() {
            [n] => Self::Vector(n),
            [m, n] => Self::Matrix(m, n),
            _ => unreachable!(),
        }
    }

    fn dims(self) -> Vec<usize> {
        match self {
            Self::Scalar => vec![],
            Self::Vector(n) => vec![n],
            Self::Matrix(m, n) => vec![m, n],
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.dims())
    }
}

/// 表达式根部的形态。
#[derive(Clone, Copy, Debug)]
enum Form {
    Map(Shape),
    /// 在下标空间上全归约。
    Full([usize; 2]),
    /// 沿一个轴归约。
    Axis([usize; 2], usize),
    Product { m: usize, k: usize, n: usize },
}

impl Form {
    fn output(self) -> Shape {
        match self {
            Self::Map(s) => s,
            Self::Full(_) => Shape::Vector(1),
            Self::Axis([d0, _], 1) => Shape::Vector(d0),
            Self::Axis([_, d1], _) => Shape::Vector(d1),
            Self::Product { m, n, .. } => Shape::Matrix(m, n),
        }
    }
}

fn leaves<'a, H: Hardware>(node: &'a Node<H>, f: &mut impl FnMut(&'a Array<H>)) {
    match node {
        Node::Array(a) => f(a),
        Node::Scalar(_) => {}
        Node::Unary(_, x) | Node::Reduce(_, _, x) => leaves(x, f),
        Node::Binary(_, a, b) | Node::Dot(a, b) => {
            leaves(a, f);
            leaves(b, f)
        }
    }
}

fn first_matrix<H: Hardware>(node: &Node<H>) -> Option<&Array<H>> {
    let mut ans = None;
    leaves(node, &mut |a| {
        if ans.is_none() && a.ndim() == 2 {
            ans = Some(a)
        }
    });
    ans
}

/// 所有数组操作数的公共元素类型。
fn dtype<H: Hardware>(root: &Node<H>) -> Result<ElementType, Error> {
    let mut types = Vec::new();
    leaves(root, &mut |a| types.push(a.dtype()));
    let Some(&first) = types.first() else {
        return Err(unrecognized_type("expression has no array operand"));
    };
    match types.iter().find(|&&ty| ty != first) {
        Some(other) => Err(unrecognized_type(format!(
            "operands of different element types {first} and {other}"
        ))),
        None => Ok(first),
    }
}

fn elementwise_shape<H: Hardware>(node: &Node<H>) -> Result<Shape, Error> {
    match node {
        Node::Array(a) => Ok(Shape::of(a)),
        Node::Scalar(_) => Ok(Shape::Scalar),
        Node::Unary(_, x) => elementwise_shape(x),
        Node::Binary(_, a, b) => match (elementwise_shape(a)?, elementwise_shape(b)?) {
            (Shape::Scalar, s) | (s, Shape::Scalar) => Ok(s),
            (a, b) if a == b => Ok(a),
            (a, b) => Err(shape_error(format!(
                "operands of shapes {a} and {b} do not match"
            ))),
        },
        Node::Reduce(..) | Node::Dot(..) => Err(unrecognized_type(
            "reductions and products are only supported at the root of an expression",
        )),
    }
}

fn analyze<H: Hardware>(root: &Node<H>) -> Result<Form, Error> {
    use Shape::{Matrix, Scalar, Vector};
    match root {
        Node::Reduce(_, axis, x) => match (elementwise_shape(x)?, *axis) {
            (Vector(n), None | Some(0)) => Ok(Form::Full([n, 1])),
            (Matrix(m, n), None) => Ok(Form::Full([m, n])),
            (Matrix(m, n), Some(axis @ (0 | 1))) => Ok(Form::Axis([m, n], axis)),
            (Scalar, _) => Err(unrecognized_type("cannot reduce a scalar")),
            (s, Some(axis)) => Err(shape_error(format!(
                "axis {axis} is out of range for shape {s}"
            ))),
        },
        Node::Dot(a, b) => match (elementwise_shape(a)?, elementwise_shape(b)?) {
            (Vector(n), Vector(n_)) if n == n_ => Ok(Form::Full([n, 1])),
            (Matrix(m, k), Vector(k_)) if k == k_ => Ok(Form::Axis([m, k], 1)),
            (Vector(k), Matrix(k_, n)) if k == k_ => Ok(Form::Axis([k, n], 0)),
            (Matrix(m, k), Matrix(k_, n)) if k == k_ => Ok(Form::Product { m, k, n }),
            (Scalar, _) | (_, Scalar) => Err(unrecognized_type("dot requires array operands")),
            (a, b) => Err(shape_error(format!("cannot dot shape {a} with {b}"))),
        },
        _ => match elementwise_shape(root)? {
            Scalar => Err(unrecognized_type("expression has no array operand")),
            s => Ok(Form::Map(s)),
        },
    }
}

/// 表达式结果的元素类型和形状。
pub(super) fn signature<H: Hardware>(root: &Node<H>) -> Result<(ElementType, Vec<usize>), Error> {
    let dtype = dtype(root)?;
    Ok((dtype, analyze(root)?.output().dims()))
}

/// 向量在二维下标空间 `(i, j)` 中随哪个下标变化。
#[derive(Clone, Copy)]
enum Place {
    Rows,
    Cols,
}

fn operand<H: Hardware>(a: &Array<H>, place: Place) -> Operand<H> {
    let strides = match (a.strides(), place) {
        (&[s], Place::Rows) => [s, 0],
        (&[s], Place::Cols) => [0, s],
        (&[s0, s1], _) => [s0, s1],
        _ => unreachable!(),
    };
    Operand {
        mem: a.mem.clone(),
        offset: a.offset(),
        strides,
    }
}

/// 生成逐元素部分的后缀程序。
struct Emitter<H: Hardware> {
    dtype: ElementType,
    code: Vec<Instr>,
    consts: Vec<Scalar>,
    operands: Vec<Operand<H>>,
    depth: usize,
    max_depth: usize,
}

impl<H: Hardware> Emitter<H> {
    fn new(dtype: ElementType) -> Self {
        Self {
            dtype,
            code: Vec::new(),
            consts: Vec::new(),
            operands: Vec::new(),
            depth: 0,
            max_depth: 0,
        }
    }

    fn push(&mut self, instr: Instr) {
        self.code.push(instr);
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth)
    }

    fn binary(&mut self, op: BinaryOp) {
        self.code.push(Instr::Binary(op));
        self.depth -= 1
    }

    fn emit(&mut self, node: &Node<H>, place: Place) -> Result<(), Error> {
        match node {
            Node::Array(a) => {
                let o = operand(a, place);
                // 相同的视图只绑定一次
                let i = match self.operands.iter().position(|x| {
                    Arc::ptr_eq(&x.mem, &o.mem) && x.offset == o.offset && x.strides == o.strides
                }) {
                    Some(i) => i,
                    None => {
                        self.operands.push(o);
                        self.operands.len() - 1
                    }
                };
                self.push(Instr::Load(i))
            }
            Node::Scalar(s) => {
                self.consts.push(s.cast(self.dtype));
                self.push(Instr::Const(self.consts.len() - 1))
            }
            Node::Unary(op, x) => {
                self.emit(x, place)?;
                self.code.push(Instr::Unary(*op))
            }
            Node::Binary(op, a, b) => {
                self.emit(a, place)?;
                self.emit(b, place)?;
                self.binary(*op)
            }
            Node::Reduce(..) | Node::Dot(..) => {
                return Err(unrecognized_type(
                    "reductions and products are only supported at the root of an expression",
                ))
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<(Elementwise, Vec<Operand<H>>), Error> {
        if self.max_depth > MAX_DEPTH {
            return Err(unrecognized_type(format!(
                "expression needs a stack of {}, more than {MAX_DEPTH}",
                self.max_depth,
            )));
        }
        if self.operands.len() > MAX_OPERANDS {
            return Err(unrecognized_type(format!(
                "expression binds {} arrays, more than {MAX_OPERANDS}",
                self.operands.len(),
            )));
        }
        let f = Elementwise {
            code: self.code.into(),
            consts: self.consts.into(),
            depth: self.max_depth,
        };
        Ok((f, self.operands))
    }
}

/// 展开 `dst = expr`，校验形状、类型和上下文。不访问设备。
pub(crate) fn lower<H: Hardware>(
    context: ContextId,
    dst: &Array<H>,
    expr: ArrayExpression<H>,
) -> Result<Launch<H>, Error> {
    let root = &expr.0;

    let mut foreign = None;
    leaves(root, &mut |a| {
        if a.context() != context {
            foreign = Some(a.context())
        }
    });
    if dst.context() != context {
        foreign = Some(dst.context())
    }
    if let Some(other) = foreign {
        return Err(not_found(format!(
            "array of context {other} is not visible from context {context}"
        )));
    }

    let dtype = dtype(root)?;
    if dst.dtype() != dtype {
        return Err(unrecognized_type(format!(
            "cannot store {dtype} into an array of {}",
            dst.dtype(),
        )));
    }

    let form = analyze(root)?;
    let out = form.output();
    let fits = match form {
        Form::Full(_) => dst.len() == 1,
        _ => Shape::of(dst) == out,
    };
    if !fits {
        return Err(shape_error(format!(
            "destination of shape {} cannot hold a result of shape {out}",
            Shape::of(dst),
        )));
    }

    let mut e = Emitter::new(dtype);
    let (op, problem, operands, dst) = match form {
        Form::Map(shape) => {
            e.emit(root, Place::Rows)?;
            let (f, operands) = e.finish()?;
            let (op, shape) = match shape {
                Shape::Matrix(m, n) => (OperationTag::MatrixAxpy, [m, n]),
                Shape::Vector(n) => (OperationTag::VectorAxpy, [n, 1]),
                Shape::Scalar => unreachable!(),
            };
            let problem = Problem::Map { shape, f };
            (op, problem, operands, operand(dst, Place::Rows))
        }
        Form::Full(shape) => {
            let op = match root {
                Node::Reduce(op, _, x) => {
                    e.emit(x, Place::Rows)?;
                    *op
                }
                Node::Dot(a, b) => {
                    e.emit(a, Place::Rows)?;
                    e.emit(b, Place::Rows)?;
                    e.binary(BinaryOp::Mul);
                    ReduceOp::Sum
                }
                _ => unreachable!(),
            };
            let (f, operands) = e.finish()?;
            let dst = Operand {
                mem: dst.mem.clone(),
                offset: dst.offset(),
                strides: [0, 0],
            };
            let problem = Problem::Reduce { shape, op, f };
            (OperationTag::Reduction, problem, operands, dst)
        }
        Form::Axis(mut shape, mut axis) => {
            let (op, matrix) = match root {
                Node::Reduce(op, _, x) => {
                    e.emit(x, Place::Rows)?;
                    (*op, first_matrix(x))
                }
                // 矩阵乘向量：向量随 j 变化
                Node::Dot(a, b) if axis == 1 => {
                    e.emit(a, Place::Rows)?;
                    e.emit(b, Place::Cols)?;
                    e.binary(BinaryOp::Mul);
                    (ReduceOp::Sum, first_matrix(a))
                }
                // 向量乘矩阵：向量随 i 变化
                Node::Dot(a, b) => {
                    e.emit(a, Place::Rows)?;
                    e.emit(b, Place::Rows)?;
                    e.binary(BinaryOp::Mul);
                    (ReduceOp::Sum, first_matrix(b))
                }
                _ => unreachable!(),
            };
            let (f, mut operands) = e.finish()?;
            // 矩阵是转置视图时在存储顺序上归约
            if matrix.is_some_and(Array::is_transposed) {
                shape.swap(0, 1);
                axis = 1 - axis;
                for o in &mut operands {
                    o.strides.swap(0, 1)
                }
            }
            let tag = if axis == 1 {
                OperationTag::RowWiseReduction
            } else {
                OperationTag::ColWiseReduction
            };
            let problem = Problem::ReduceAxis {
                shape,
                axis,
                op,
                f,
            };
            (tag, problem, operands, operand(dst, Place::Rows))
        }
        Form::Product { m, k, n } => {
            let Node::Dot(a, b) = root else {
                unreachable!()
            };
            let (Node::Array(a), Node::Array(b)) = (&**a, &**b) else {
                return Err(unrecognized_type(
                    "operands of a matrix product must be arrays",
                ));
            };
            let op = OperationTag::matrix_product(a.is_transposed(), b.is_transposed());
            let problem = Problem::Product {
                m,
                n,
                k,
                alpha: Scalar::I8(1).cast(dtype),
                beta: Scalar::I8(0).cast(dtype),
            };
            let operands = vec![operand(a, Place::Rows), operand(b, Place::Rows)];
            (op, problem, operands, operand(dst, Place::Rows))
        }
    };

    Ok(Launch {
        op,
        args: KernelArgs {
            dtype,
            dst,
            operands,
            problem,
        },
    })
}
