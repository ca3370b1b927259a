use std::{error, fmt};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    /// 无法从输入中确定元素类型或操作类型。
    UnrecognizedType,
    /// 模型表中不存在请求的键。
    KeyNotFound,
    /// 模板参数超出设备资源限制或自相矛盾。
    InvalidParameters,
    /// 数组秩或维度不满足约束。
    ShapeError,
    /// 注册表中不存在请求的上下文。
    NotFound,
    /// 设备执行失败，流不可恢复。
    ExecutionFailed,
}

#[derive(Clone, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub info: String,
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.info)
    }
}

impl error::Error for Error {}

pub(super) mod functions {
    use super::{Error, ErrorKind::*};

    macro_rules! builder {
        ($ty:ident: $name:ident $kind:expr) => {
            #[inline]
            pub fn $name(info: impl Into<String>) -> $ty {
                $ty {
                    kind: $kind,
                    info: info.into(),
                }
            }
        };
    }

    builder!(Error: unrecognized_type  UnrecognizedType );
    builder!(Error: key_not_found      KeyNotFound      );
    builder!(Error: invalid_parameters InvalidParameters);
    builder!(Error: shape_error        ShapeError       );
    builder!(Error: not_found          NotFound         );

    builder!(Error: execution_failed   ExecutionFailed  );
}

#[test]
fn test_display() {
    let e = functions::key_not_found("(Reduction, F64)");
    assert_eq!(e.kind, ErrorKind::KeyNotFound);
    assert_eq!(e.to_string(), "KeyNotFound: (Reduction, F64)");
}
