use super::{element::HostElement, kernels::View};
use crate::{BinaryOp, Problem};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// 浮点矩阵乘交给 gemm。
pub(super) fn gemm<T: HostElement>(c: View, srcs: &[View], problem: &Problem) {
    let &Problem::Product {
        m,
        n,
        k,
        alpha,
        beta,
    } = problem
    else {
        unreachable!()
    };
    let (a, b) = (srcs[0], srcs[1]);
    let size = std::mem::size_of::<T>() as isize;
    let [c_rs, c_cs] = c.strides.map(|s| s / size);
    let [a_rs, a_cs] = a.strides.map(|s| s / size);
    let [b_rs, b_cs] = b.strides.map(|s| s / size);
    let beta = T::from_scalar(beta);
    // gemm 的 alpha 是目标的系数，beta 是乘积的系数
    unsafe {
        gemm::gemm(
            m,
            n,
            k,
            c.ptr::<T>(0, 0),
            c_cs,
            c_rs,
            beta != T::ZERO,
            a.ptr::<T>(0, 0).cast_const(),
            a_cs,
            a_rs,
            b.ptr::<T>(0, 0).cast_const(),
            b_cs,
            b_rs,
            beta,
            T::from_scalar(alpha),
            false,
            false,
            false,
            gemm::Parallelism::Rayon(0),
        )
    }
}

/// 整数矩阵乘，按行并行，回绕累加。
pub(super) fn naive<T: HostElement>(c: View, srcs: &[View], problem: &Problem) {
    let &Problem::Product {
        m,
        n,
        k,
        alpha,
        beta,
    } = problem
    else {
        unreachable!()
    };
    let (a, b) = (srcs[0], srcs[1]);
    let alpha = T::from_scalar(alpha);
    let beta = T::from_scalar(beta);
    (0..m).into_par_iter().for_each(|i| {
        for j in 0..n {
            let dot = (0..k).fold(T::ZERO, |acc, p| {
                let (x, y) = unsafe { (a.ptr::<T>(i, p).read(), b.ptr::<T>(p, j).read()) };
                acc.binary(BinaryOp::Add, x.binary(BinaryOp::Mul, y))
            });
            let dst = c.ptr::<T>(i, j);
            let mut ans = alpha.binary(BinaryOp::Mul, dot);
            if beta != T::ZERO {
                ans = unsafe { dst.read() }
                    .binary(BinaryOp::Mul, beta)
                    .binary(BinaryOp::Add, ans)
            }
            unsafe { dst.write(ans) }
        }
    })
}
