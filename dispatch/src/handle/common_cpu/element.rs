use crate::{BinaryOp, Element, ElementType, Scalar, UnaryOp};

/// 主机内核能够计算的元素。
///
/// 整数运算按补码回绕，整数除以 0 得 0；比较运算得 1 或 0。
pub(super) trait HostElement: Element + PartialOrd {
    const ZERO: Self;

    fn from_scalar(s: Scalar) -> Self;
    fn from_index(i: usize) -> Self;
    fn unary(self, op: UnaryOp) -> Self;
    fn binary(self, op: BinaryOp, rhs: Self) -> Self;
}

fn float_unary(op: UnaryOp, x: f64) -> f64 {
    use UnaryOp::*;
    match op {
        Neg => -x,
        Abs => x.abs(),
        Acos => x.acos(),
        Asin => x.asin(),
        Atan => x.atan(),
        Ceil => x.ceil(),
        Cos => x.cos(),
        Cosh => x.cosh(),
        Exp => x.exp(),
        Floor => x.floor(),
        Log => x.ln(),
        Log10 => x.log10(),
        Sin => x.sin(),
        Sinh => x.sinh(),
        Sqrt => x.sqrt(),
        Tan => x.tan(),
        Tanh => x.tanh(),
    }
}

macro_rules! from_scalar {
    ($tag:ident) => {
        #[inline]
        fn from_scalar(s: Scalar) -> Self {
            match s.cast(ElementType::$tag) {
                Scalar::$tag(v) => v,
                _ => unreachable!(),
            }
        }
    };
}

macro_rules! int {
    ($( $ty:ty => $tag:ident, $abs:path; )+) => {
        $(
            impl HostElement for $ty {
                const ZERO: Self = 0;

                from_scalar!($tag);

                #[inline]
                fn from_index(i: usize) -> Self {
                    i as _
                }

                fn unary(self, op: UnaryOp) -> Self {
                    match op {
                        UnaryOp::Neg => self.wrapping_neg(),
                        UnaryOp::Abs => $abs(self),
                        op => float_unary(op, self as f64) as _,
                    }
                }

                fn binary(self, op: BinaryOp, rhs: Self) -> Self {
                    use BinaryOp::*;
                    match op {
                        Add => self.wrapping_add(rhs),
                        Sub => self.wrapping_sub(rhs),
                        Mul => self.wrapping_mul(rhs),
                        Div if rhs == 0 => 0,
                        Div => self.wrapping_div(rhs),
                        Pow => (self as f64).powf(rhs as f64) as _,
                        Max => self.max(rhs),
                        Min => self.min(rhs),
                        Gt => (self > rhs) as _,
                        Ge => (self >= rhs) as _,
                        Lt => (self < rhs) as _,
                        Le => (self <= rhs) as _,
                        Eq => (self == rhs) as _,
                        Ne => (self != rhs) as _,
                    }
                }
            }
        )+
    };
}

macro_rules! float {
    ($( $ty:ty => $tag:ident; )+) => {
        $(
            impl HostElement for $ty {
                const ZERO: Self = 0.;

                from_scalar!($tag);

                #[inline]
                fn from_index(i: usize) -> Self {
                    i as _
                }

                fn unary(self, op: UnaryOp) -> Self {
                    use UnaryOp::*;
                    match op {
                        Neg => -self,
                        Abs => self.abs(),
                        Acos => self.acos(),
                        Asin => self.asin(),
                        Atan => self.atan(),
                        Ceil => self.ceil(),
                        Cos => self.cos(),
                        Cosh => self.cosh(),
                        Exp => self.exp(),
                        Floor => self.floor(),
                        Log => self.ln(),
                        Log10 => self.log10(),
                        Sin => self.sin(),
                        Sinh => self.sinh(),
                        Sqrt => self.sqrt(),
                        Tan => self.tan(),
                        Tanh => self.tanh(),
                    }
                }

                fn binary(self, op: BinaryOp, rhs: Self) -> Self {
                    use BinaryOp::*;
                    let flag = |b: bool| if b { 1. } else { 0. };
                    match op {
                        Add => self + rhs,
                        Sub => self - rhs,
                        Mul => self * rhs,
                        Div => self / rhs,
                        Pow => self.powf(rhs),
                        Max => self.max(rhs),
                        Min => self.min(rhs),
                        Gt => flag(self > rhs),
                        Ge => flag(self >= rhs),
                        Lt => flag(self < rhs),
                        Le => flag(self <= rhs),
                        Eq => flag(self == rhs),
                        Ne => flag(self != rhs),
                    }
                }
            }
        )+
    };
}

int! {
    i8  => I8 , i8::wrapping_abs;
    u8  => U8 , std::convert::identity;
    i16 => I16, i16::wrapping_abs;
    u16 => U16, std::convert::identity;
    i32 => I32, i32::wrapping_abs;
    u32 => U32, std::convert::identity;
    i64 => I64, i64::wrapping_abs;
    u64 => U64, std::convert::identity;
}

float! {
    f32 => F32;
    f64 => F64;
}

#[cfg(test)]
mod test {
    use super::HostElement;
    use crate::{BinaryOp::*, Scalar, UnaryOp::*};

    #[test]
    fn test_int() {
        assert_eq!(7i32.binary(Div, 0), 0);
        assert_eq!(7u8.binary(Div, 2), 3);
        assert_eq!(250u8.binary(Add, 10), 4);
        assert_eq!(i8::MIN.unary(Abs), i8::MIN);
        assert_eq!(3u16.unary(Neg), u16::MAX - 2);
        assert_eq!(5i64.binary(Gt, 4), 1);
        assert_eq!(5i64.binary(Le, 4), 0);
        assert_eq!(2u32.binary(Pow, 10), 1024);
        assert_eq!(17i32.unary(Sqrt), 4);
        assert_eq!(i16::from_scalar(Scalar::F64(-3.9)), -3);
    }

    #[test]
    fn test_float() {
        assert_eq!(2f32.binary(Max, -1.), 2.);
        assert_eq!(1f64.binary(Ne, 1.), 0.);
        assert_eq!(0f64.unary(Cos), 1.);
        assert!((2f32.unary(Sqrt) - std::f32::consts::SQRT_2).abs() < 1e-6);
        assert_eq!(f32::from_scalar(Scalar::I32(3)), 3.);
        assert_eq!(f64::from_index(42), 42.);
    }
}
