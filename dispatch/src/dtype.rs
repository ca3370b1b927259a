//! 元素类型标签与带类型的标量。

use crate::{unrecognized_type, Error};
use digit_layout::{types as ty, DigitLayout};
use std::{fmt, str::FromStr};

/// 封闭的元素类型集合。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ElementType {
    pub const ALL: [Self; 10] = [
        Self::I8,
        Self::U8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::F64,
    ];

    /// 元素占用的字节数。
    #[inline]
    pub const fn size_of(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        !matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    /// 面向绑定层的类型名。
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "int8",
            Self::U8 => "uint8",
            Self::I16 => "int16",
            Self::U16 => "uint16",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }

    /// 设备代码中的类型名。
    pub(crate) const fn device_name(self) -> &'static str {
        match self {
            Self::I8 => "char",
            Self::U8 => "uchar",
            Self::I16 => "short",
            Self::U16 => "ushort",
            Self::I32 => "int",
            Self::U32 => "uint",
            Self::I64 => "long",
            Self::U64 => "ulong",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }

    pub fn digit_layout(self) -> DigitLayout {
        match self {
            Self::I8 => ty::I8,
            Self::U8 => ty::U8,
            Self::I16 => ty::I16,
            Self::U16 => ty::U16,
            Self::I32 => ty::I32,
            Self::U32 => ty::U32,
            Self::I64 => ty::I64,
            Self::U64 => ty::U64,
            Self::F32 => ty::F32,
            Self::F64 => ty::F64,
        }
    }
}

impl TryFrom<DigitLayout> for ElementType {
    type Error = Error;

    fn try_from(dt: DigitLayout) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.digit_layout() == dt)
            .ok_or_else(|| unrecognized_type(format!("{dt:?} is not a supported element type")))
    }
}

impl FromStr for ElementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| unrecognized_type(format!("data type \"{s}\" not understood")))
    }
}

impl fmt::Display for ElementType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 可以存入数组的 Rust 标量类型，类型标签在编译期确定。
pub trait Element: Copy + Send + Sync + 'static {
    const TYPE: ElementType;
}

/// 任一元素类型的标量值。
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug)]
pub enum Scalar {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

macro_rules! element {
    ($( $ty:ty => $tag:ident )+) => {
        $(
            impl Element for $ty {
                const TYPE: ElementType = ElementType::$tag;
            }

            impl From<$ty> for Scalar {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self::$tag(value)
                }
            }
        )+

        impl Scalar {
            #[inline]
            pub const fn dtype(&self) -> ElementType {
                match self {
                    $( Self::$tag(_) => ElementType::$tag, )+
                }
            }

            /// 按另一元素类型重新解释数值，整数截断、浮点饱和，语义同 `as`。
            pub fn cast(self, dtype: ElementType) -> Self {
                if self.dtype().is_float() {
                    let v = self.to_f64();
                    match dtype {
                        $( ElementType::$tag => Self::$tag(v as $ty), )+
                    }
                } else {
                    let v = self.to_i128();
                    match dtype {
                        $( ElementType::$tag => Self::$tag(v as $ty), )+
                    }
                }
            }

            #[inline]
            pub fn to_f64(self) -> f64 {
                match self {
                    $( Self::$tag(v) => v as f64, )+
                }
            }

            #[inline]
            fn to_i128(self) -> i128 {
                match self {
                    $( Self::$tag(v) => v as i128, )+
                }
            }
        }
    };
}

element! {
    i8  => I8
    u8  => U8
    i16 => I16
    u16 => U16
    i32 => I32
    u32 => U32
    i64 => I64
    u64 => U64
    f32 => F32
    f64 => F64
}

impl Scalar {
    /// 标量占用的字节数。
    #[inline]
    pub const fn size(&self) -> usize {
        self.dtype().size_of()
    }
}

#[cfg(test)]
mod test {
    use super::{Element, ElementType, Scalar};
    use crate::ErrorKind;

    #[test]
    fn test_names() {
        for ty in ElementType::ALL {
            assert_eq!(ty.name().parse::<ElementType>().unwrap(), ty);
            assert_eq!(ElementType::try_from(ty.digit_layout()).unwrap(), ty);
        }
        let e = "float16".parse::<ElementType>().unwrap_err();
        assert_eq!(e.kind, ErrorKind::UnrecognizedType);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(<i8 as Element>::TYPE.size_of(), 1);
        assert_eq!(<u16 as Element>::TYPE.size_of(), 2);
        assert_eq!(<f32 as Element>::TYPE.size_of(), 4);
        assert_eq!(<u64 as Element>::TYPE.size_of(), 8);
        assert_eq!(Scalar::from(1.5f64).size(), 8);
        assert!(!ElementType::U32.is_signed());
    }

    #[test]
    fn test_cast() {
        assert_eq!(Scalar::from(2.75f64).cast(ElementType::I32), Scalar::I32(2));
        assert_eq!(Scalar::from(-1i32).cast(ElementType::U8), Scalar::U8(255));
        assert_eq!(Scalar::from(3u8).cast(ElementType::F32), Scalar::F32(3.));
        assert_eq!(Scalar::from(300i64).cast(ElementType::I8), Scalar::I8(44));
    }
}
