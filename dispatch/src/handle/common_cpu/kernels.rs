use super::{element::HostElement, mat_mul, Cpu, HostMemory, HostProgram};
use crate::{
    templates::FetchingPolicy, ElementType, Elementwise, Instr, KernelArgs, NdRange, Operand,
    OperationTag, Problem, ReduceOp, MAX_DEPTH,
};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::sync::Arc;

/// 以绝对地址表示的缓冲区视图，可以在工作线程间传递。
#[derive(Clone, Copy, Debug)]
pub(super) struct View {
    base: isize,
    pub strides: [isize; 2],
}

impl View {
    #[inline]
    pub fn ptr<T>(&self, i: usize, j: usize) -> *mut T {
        let [s0, s1] = self.strides;
        (self.base + i as isize * s0 + j as isize * s1) as *mut T
    }
}

/// 在工作线程上执行一次发射。
pub(super) fn launch(program: &HostProgram, args: KernelArgs<Cpu>, range: NdRange) {
    let KernelArgs {
        dtype,
        dst,
        operands,
        problem,
    } = args;
    assert_eq!(dtype, program.dtype, "program built for another element type");

    // 同一缓冲区只锁一次，按地址顺序加锁
    let key = |mem: &Arc<HostMemory>| Arc::as_ptr(mem) as usize;
    let mut mems = std::iter::once(&dst.mem)
        .chain(operands.iter().map(|o| &o.mem))
        .collect::<Vec<_>>();
    mems.sort_by_key(|mem| key(*mem));
    mems.dedup_by_key(|mem| key(*mem));
    let mut guards = mems.iter().map(|mem| mem.lock()).collect::<Vec<_>>();
    let bases = mems
        .iter()
        .zip(&mut guards)
        .map(|(mem, guard)| (key(*mem), guard.as_mut_ptr() as isize))
        .collect::<Vec<_>>();
    let view = |o: &Operand<Cpu>| {
        let Some(&(_, base)) = bases.iter().find(|(k, _)| *k == key(&o.mem)) else {
            unreachable!()
        };
        View {
            base: base + o.offset,
            strides: o.strides,
        }
    };
    let dst = view(&dst);
    let srcs = operands.iter().map(view).collect::<Vec<_>>();

    macro_rules! run {
        ($( $tag:ident => $ty:ty )+) => {
            match dtype {
                $( ElementType::$tag => run::<$ty>(program, range, dst, &srcs, &problem), )+
            }
        };
    }
    match (&problem, dtype) {
        (&Problem::Product { .. }, ElementType::F32) => {
            mat_mul::gemm::<f32>(dst, &srcs, &problem)
        }
        (&Problem::Product { .. }, ElementType::F64) => {
            mat_mul::gemm::<f64>(dst, &srcs, &problem)
        }
        _ => run! {
            I8  => i8
            U8  => u8
            I16 => i16
            U16 => u16
            I32 => i32
            U32 => u32
            I64 => i64
            U64 => u64
            F32 => f32
            F64 => f64
        },
    }
    drop(guards)
}

fn run<T: HostElement>(
    program: &HostProgram,
    range: NdRange,
    dst: View,
    srcs: &[View],
    problem: &Problem,
) {
    match problem {
        Problem::Map { shape, f } => map::<T>(program, range, *shape, dst, &Eval::new(f, srcs)),
        Problem::Reduce { shape, op, f } => {
            reduce::<T>(program, range, *shape, *op, dst, &Eval::new(f, srcs))
        }
        &Problem::ReduceAxis {
            shape,
            axis,
            op,
            ref f,
        } => reduce_axis::<T>(program, shape, axis, op, dst, &Eval::new(f, srcs)),
        Problem::Product { .. } => mat_mul::naive::<T>(dst, srcs, problem),
    }
}

/// 逐元素程序的解释器。
struct Eval<'a, T> {
    code: &'a [Instr],
    consts: Box<[T]>,
    srcs: &'a [View],
}

impl<'a, T: HostElement> Eval<'a, T> {
    fn new(f: &'a Elementwise, srcs: &'a [View]) -> Self {
        Self {
            code: &f.code,
            consts: f.consts.iter().map(|&c| T::from_scalar(c)).collect(),
            srcs,
        }
    }

    fn at(&self, i: usize, j: usize) -> T {
        let mut stack = [T::ZERO; MAX_DEPTH];
        let mut top = 0;
        for instr in self.code {
            match *instr {
                Instr::Load(n) => {
                    stack[top] = unsafe { self.srcs[n].ptr::<T>(i, j).read() };
                    top += 1
                }
                Instr::Const(n) => {
                    stack[top] = self.consts[n];
                    top += 1
                }
                Instr::Unary(op) => stack[top - 1] = stack[top - 1].unary(op),
                Instr::Binary(op) => {
                    top -= 1;
                    stack[top - 1] = stack[top - 1].binary(op, stack[top])
                }
            }
        }
        stack[0]
    }
}

/// 对第 `gid` 个工作项（共 `items` 个）负责的下标调用 `f`。
///
/// 连续取数时每个工作项负责一段连续的元素；否则按 `simd` 个元素一组交错分配。
fn for_each_index(
    gid: usize,
    items: usize,
    n: usize,
    simd: usize,
    fetch: FetchingPolicy,
    mut f: impl FnMut(usize),
) {
    match fetch {
        FetchingPolicy::FetchFromGlobalContiguous => {
            let chunk = n.div_ceil(items * simd) * simd;
            let begin = (gid * chunk).min(n);
            let end = ((gid + 1) * chunk).min(n);
            (begin..end).for_each(f)
        }
        FetchingPolicy::FetchFromGlobalStrided | FetchingPolicy::FetchFromLocal => {
            let mut base = gid * simd;
            while base < n {
                (base..(base + simd).min(n)).for_each(&mut f);
                base += items * simd
            }
        }
    }
}

fn map<T: HostElement>(
    program: &HostProgram,
    range: NdRange,
    [d0, d1]: [usize; 2],
    dst: View,
    f: &Eval<T>,
) {
    let &HostProgram {
        op,
        simd_width,
        fetch,
        ..
    } = program;
    let store = |i: usize, j: usize| unsafe { dst.ptr::<T>(i, j).write(f.at(i, j)) };
    match op {
        OperationTag::MatrixAxpy => {
            let [n0, n1] = range.global;
            (0..n0 * n1).into_par_iter().for_each(|gid| {
                let (g0, g1) = (gid / n1, gid % n1);
                for i in (g0..d0).step_by(n0) {
                    for_each_index(g1, n1, d1, simd_width, fetch, |j| store(i, j))
                }
            })
        }
        _ => {
            let n = d0 * d1;
            let items = range.work_items();
            (0..items).into_par_iter().for_each(|gid| {
                for_each_index(gid, items, n, simd_width, fetch, |x| store(x / d1, x % d1))
            })
        }
    }
}

/// 归约的累加器，值相等时保留较小的下标。
#[derive(Clone, Copy)]
struct Acc<T> {
    op: ReduceOp,
    best: Option<(T, usize)>,
}

impl<T: HostElement> Acc<T> {
    #[inline]
    fn new(op: ReduceOp) -> Self {
        Self { op, best: None }
    }

    fn push(&mut self, v: T, i: usize) {
        let Some((cur, ci)) = self.best else {
            self.best = Some((v, i));
            return;
        };
        let replace = match self.op {
            ReduceOp::Sum => {
                self.best = Some((cur.binary(crate::BinaryOp::Add, v), 0));
                return;
            }
            ReduceOp::Max | ReduceOp::ArgMax => v > cur || (v == cur && i < ci),
            ReduceOp::Min | ReduceOp::ArgMin => v < cur || (v == cur && i < ci),
        };
        if replace {
            self.best = Some((v, i))
        }
    }

    #[inline]
    fn merge(mut self, other: Self) -> Self {
        if let Some((v, i)) = other.best {
            self.push(v, i)
        }
        self
    }

    fn finish(self) -> T {
        match self.best {
            Some((_, i)) if self.op.is_arg() => T::from_index(i),
            Some((v, _)) => v,
            None => T::ZERO,
        }
    }
}

fn reduce<T: HostElement>(
    program: &HostProgram,
    range: NdRange,
    [d0, d1]: [usize; 2],
    op: ReduceOp,
    dst: View,
    f: &Eval<T>,
) {
    let n = d0 * d1;
    let items = range.work_items();
    // 每个工作项的部分结果，再按工作项顺序合并
    let partials = (0..items)
        .into_par_iter()
        .map(|gid| {
            let mut acc = Acc::new(op);
            for_each_index(gid, items, n, program.simd_width, program.fetch, |x| {
                acc.push(f.at(x / d1, x % d1), x)
            });
            acc
        })
        .collect::<Vec<_>>();
    let acc = partials.into_iter().fold(Acc::new(op), Acc::merge);
    unsafe { dst.ptr::<T>(0, 0).write(acc.finish()) }
}

fn reduce_axis<T: HostElement>(
    program: &HostProgram,
    [d0, d1]: [usize; 2],
    axis: usize,
    op: ReduceOp,
    dst: View,
    f: &Eval<T>,
) {
    let (outputs, len) = if axis == 1 { (d0, d1) } else { (d1, d0) };
    let lanes = program.lanes;
    (0..outputs).into_par_iter().for_each(|out| {
        let acc = (0..lanes).fold(Acc::new(op), |acc, lane| {
            let mut part = Acc::new(op);
            for_each_index(
                lane,
                lanes,
                len,
                program.simd_width,
                FetchingPolicy::FetchFromGlobalStrided,
                |x| {
                    let v = if axis == 1 { f.at(out, x) } else { f.at(x, out) };
                    part.push(v, x)
                },
            );
            acc.merge(part)
        });
        unsafe { dst.ptr::<T>(out, 0).write(acc.finish()) }
    })
}

#[cfg(test)]
mod test {
    use super::{for_each_index, Acc};
    use crate::{templates::FetchingPolicy::*, ReduceOp};

    #[test]
    fn test_partition() {
        for fetch in [FetchFromGlobalStrided, FetchFromGlobalContiguous] {
            for (items, n, simd) in [(1, 10, 1), (4, 10, 2), (8, 3, 4), (3, 100, 4)] {
                let mut seen = vec![0; n];
                for gid in 0..items {
                    for_each_index(gid, items, n, simd, fetch, |x| seen[x] += 1)
                }
                assert!(seen.iter().all(|&c| c == 1), "{fetch:?} {items} {n} {simd}");
            }
        }
    }

    #[test]
    fn test_acc() {
        let mut a = Acc::<f32>::new(ReduceOp::ArgMax);
        for (i, v) in [1., 5., 3., 5.].into_iter().enumerate() {
            a.push(v, i)
        }
        assert_eq!(a.finish(), 1.);

        let mut b = Acc::<i32>::new(ReduceOp::ArgMin);
        b.push(2, 7);
        b.push(-1, 9);
        let mut c = Acc::<i32>::new(ReduceOp::ArgMin);
        c.push(-1, 3);
        assert_eq!(b.merge(c).finish(), 3);

        let mut s = Acc::<u8>::new(ReduceOp::Sum);
        for v in [200, 100, 1] {
            s.push(v, 0)
        }
        assert_eq!(s.finish(), 45);
        assert_eq!(Acc::<f64>::new(ReduceOp::Max).finish(), 0.);
    }
}
