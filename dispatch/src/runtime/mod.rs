//! 设备上下文与执行流的注册表。

mod context;
mod stream;

pub use context::{Context, ContextId};
pub use stream::{Stream, StreamId};

use crate::{not_found, Config, Diversity, Error, Hardware, KernelSource, ProgramOf};
use log::{debug, info};
use lru::LruCache;
use std::sync::{Arc, Mutex};

/// 一个上下文内所有流共享的状态。
pub(crate) struct Shared<H: Hardware> {
    pub hardware: H,
    programs: Mutex<LruCache<String, Arc<ProgramOf<H>>>>,
}

impl<H: Hardware> Shared<H> {
    fn new(hardware: H, config: &Config) -> Self {
        Self {
            hardware,
            programs: config.program_cache.new_cache(Diversity::High),
        }
    }

    /// 取得已编译的程序，源码相同的模板只编译一次。
    pub fn program(&self, source: &KernelSource) -> Result<Arc<ProgramOf<H>>, Error> {
        if let Some(program) = self.programs.lock().unwrap().get(&source.text) {
            debug!("program cache hit: {}", source.entry);
            return Ok(program.clone());
        }
        let program = Arc::new(self.hardware.build(source)?);
        self.programs
            .lock()
            .unwrap()
            .put(source.text.clone(), program.clone());
        Ok(program)
    }

    #[cfg(test)]
    pub fn cached_programs(&self) -> usize {
        self.programs.lock().unwrap().len()
    }
}

/// 运行时：上下文到其执行流的注册表。
///
/// 注册和注销需要独占引用，查找和同步只需共享引用。
pub struct Runtime<H: Hardware> {
    config: Config,
    contexts: Vec<Arc<Context<H>>>,
}

impl<H: Hardware> Default for Runtime<H> {
    #[inline]
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<H: Hardware> Runtime<H> {
    #[inline]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            contexts: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 为硬件创建上下文及其执行流。
    pub fn add_context(&mut self, hardware: H) -> Arc<Context<H>> {
        let shared = Arc::new(Shared::new(hardware, &self.config));
        let context = Arc::new(Context::new(shared, self.config.streams.max(1)));
        let device = context.device();
        info!(
            "register context {} on {} ({}) with {} stream(s)",
            context.id(),
            device.name(),
            device.vendor(),
            context.streams().len(),
        );
        self.contexts.push(context.clone());
        context
    }

    /// 注销上下文。已经取得的引用仍然有效。
    pub fn remove_context(&mut self, id: ContextId) -> Result<Arc<Context<H>>, Error> {
        let i = self
            .contexts
            .iter()
            .position(|ctx| ctx.id() == id)
            .ok_or_else(|| not_found(format!("context {id} is not registered")))?;
        Ok(self.contexts.remove(i))
    }

    #[inline]
    pub fn contexts(&self) -> &[Arc<Context<H>>] {
        &self.contexts
    }

    pub fn context(&self, id: ContextId) -> Result<&Arc<Context<H>>, Error> {
        self.contexts
            .iter()
            .find(|ctx| ctx.id() == id)
            .ok_or_else(|| not_found(format!("context {id} is not registered")))
    }

    /// 上下文的执行流，按创建顺序。
    #[inline]
    pub fn lookup(&self, id: ContextId) -> Result<&[Arc<Stream<H>>], Error> {
        self.context(id).map(|ctx| ctx.streams())
    }

    /// 阻塞直到所有上下文的所有流排空。
    ///
    /// 即使某个流失败也会等待其余的流，返回遇到的第一个错误。
    pub fn synchronize(&self) -> Result<(), Error> {
        let mut ans = Ok(());
        for ctx in &self.contexts {
            if let Err(e) = ctx.synchronize() {
                if ans.is_ok() {
                    ans = Err(e)
                }
            }
        }
        ans
    }
}

#[cfg(test)]
mod test {
    use super::Runtime;
    use crate::{
        array::test::{configure, template},
        common_cpu::Cpu,
        Array, Config, ElementType, Elementwise, ErrorKind, Hardware, Instr, KernelArgs,
        OperationTag, Operand, Problem, Queue, Scalar,
    };
    use std::sync::Arc;

    #[test]
    fn test_registry() {
        let mut rt = Runtime::new(Config {
            streams: 3,
            ..Default::default()
        });
        let a = rt.add_context(Cpu::default());
        let b = rt.add_context(Cpu::default());
        assert_ne!(a.id(), b.id());
        assert_eq!(rt.contexts().len(), 2);

        let streams = rt.lookup(a.id()).unwrap();
        assert_eq!(streams.len(), 3);
        assert!(streams.iter().all(|s| s.context() == a.id()));
        assert_ne!(streams[0].id(), streams[1].id());
        assert_eq!(streams[0].device().vendor(), "host");

        rt.remove_context(a.id()).unwrap();
        let e = rt.lookup(a.id()).unwrap_err();
        assert_eq!(e.kind, ErrorKind::NotFound);
        let e = rt.remove_context(a.id()).unwrap_err();
        assert_eq!(e.kind, ErrorKind::NotFound);
        assert_eq!(rt.lookup(b.id()).unwrap().len(), 3);
    }

    #[test]
    fn test_synchronize_empty() {
        let rt = Runtime::<Cpu>::default();
        rt.synchronize().unwrap();
    }

    #[test]
    fn test_synchronize_contexts() {
        let mut rt = Runtime::new(Config {
            streams: 2,
            ..Default::default()
        });
        let a = rt.add_context(Cpu::default());
        let b = rt.add_context(Cpu::default());
        let mut pending = Vec::new();
        for ctx in [&a, &b] {
            let x = Array::from_host(&[1f64, 2., 3., 4.], &[4], ctx).unwrap();
            for stream in ctx.streams() {
                configure(stream, &[ElementType::F64]);
                let y = Array::empty(&[4], ElementType::F64, ctx).unwrap();
                for _ in 0..8 {
                    y.assign(&x + &y, stream).unwrap();
                }
                pending.push((stream.clone(), y));
            }
        }
        rt.synchronize().unwrap();
        for (stream, y) in pending {
            assert_eq!(y.read::<f64>(&stream).unwrap(), [8., 16., 24., 32.]);
        }
    }

    #[test]
    fn test_synchronize_poisoned() {
        let mut rt = Runtime::new(Config {
            streams: 2,
            ..Default::default()
        });
        let a = rt.add_context(Cpu::default());
        let b = rt.add_context(Cpu::default());

        let good = b.default_stream();
        configure(good, &[ElementType::F32]);
        let x = Array::from_host(&[1f32, 2., 3.], &[3], &b).unwrap();
        let y = (&x + &x).eval(good).unwrap();

        // 为 f32 编译的程序收到 f64 参数，内核失败
        let bad = &a.streams()[1];
        let source = template(OperationTag::VectorAxpy, bad).source(ElementType::F32);
        let program = Arc::new(a.hardware().build(&source).unwrap());
        let dst = Operand {
            mem: Arc::new(a.hardware().malloc(8)),
            offset: 0,
            strides: [8, 0],
        };
        let args = KernelArgs {
            dtype: ElementType::F64,
            dst,
            operands: vec![],
            problem: Problem::Map {
                shape: [1, 1],
                f: Elementwise {
                    code: Box::new([Instr::Const(0)]),
                    consts: Box::new([Scalar::F64(1.)]),
                    depth: 1,
                },
            },
        };
        let range = template(OperationTag::VectorAxpy, bad).range(&args.problem);
        bad.queue().launch(program, args, range).unwrap();

        let e = rt.synchronize().unwrap_err();
        assert_eq!(e.kind, ErrorKind::ExecutionFailed);
        assert!(e.info.contains("element type"), "{}", e.info);
        // 其他流照常排空
        assert_eq!(y.read::<f32>(good).unwrap(), [2., 4., 6.]);
        a.default_stream().finish().unwrap();
        b.synchronize().unwrap();
        assert_eq!(rt.synchronize().unwrap_err().kind, ErrorKind::ExecutionFailed);
    }
}
