use std::{fmt, str::FromStr};

/// 以宏定义实例化的内核源码。
pub struct CodeGen {
    code: &'static str,
    defines: Vec<(String, String)>,
}

impl CodeGen {
    #[inline]
    pub fn new(code: &'static str) -> Self {
        Self {
            code,
            defines: Vec::new(),
        }
    }

    pub fn define(mut self, name: impl fmt::Display, value: impl fmt::Display) -> Self {
        self.defines.push((name.to_string(), value.to_string()));
        self
    }

    /// 生成以 `entry` 为入口的内核源码。
    pub fn finish(self, entry: &'static str) -> KernelSource {
        let text = self.to_string();
        KernelSource {
            entry,
            defines: self.defines,
            text,
        }
    }
}

impl fmt::Display for CodeGen {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, value) in &self.defines {
            writeln!(f, "#define {name} {value}")?;
        }
        writeln!(f)?;
        f.write_str(self.code)
    }
}

/// 代码生成器的产物，交给硬件编译。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct KernelSource {
    pub entry: &'static str,
    pub defines: Vec<(String, String)>,
    pub text: String,
}

impl KernelSource {
    /// 查找宏定义的值。
    pub fn define(&self, name: &str) -> Option<&str> {
        self.defines
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| &**v)
    }

    pub fn parse_define<T: FromStr>(&self, name: &str) -> Option<T> {
        self.define(name)?.parse().ok()
    }
}

#[test]
fn test_codegen() {
    let src = CodeGen::new("__kernel void k() {}\n")
        .define("T", "float")
        .define("SIMD_WIDTH", 4)
        .finish("k");
    assert_eq!(src.entry, "k");
    assert_eq!(src.define("T"), Some("float"));
    assert_eq!(src.parse_define::<usize>("SIMD_WIDTH"), Some(4));
    assert_eq!(src.parse_define::<usize>("T"), None);
    assert!(src.text.starts_with("#define T float\n#define SIMD_WIDTH 4\n"));
    assert!(src.text.ends_with("__kernel void k() {}\n"));
}
