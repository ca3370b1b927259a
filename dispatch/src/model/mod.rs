//! 模型：模板与执行流的绑定。

mod map;

pub use map::ModelMap;

use crate::{
    array::Launch, invalid_parameters, runtime::Shared, templates::Template, ElementType, Error,
    Hardware, ProgramOf, Queue, QueueOf, Stream, StreamId,
};
use log::debug;
use std::{
    fmt,
    sync::{Arc, Mutex},
};

/// 绑定到执行流的模板。
///
/// 首次执行时编译模板，之后复用；任何时刻至多持有一个编译产物。
pub struct Model<H: Hardware> {
    template: Template,
    stream: StreamId,
    shared: Arc<Shared<H>>,
    queue: Arc<QueueOf<H>>,
    program: Mutex<Option<(ElementType, Arc<ProgramOf<H>>)>>,
}

impl<H: Hardware> fmt::Debug for Model<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Model")
            .field("template", &self.template)
            .field("stream", &self.stream)
            .finish()
    }
}

impl<H: Hardware> Model<H> {
    /// 构造模型不编译任何内核。
    ///
    /// 模型总是在 `stream` 上排队执行，只能放入 `stream` 自己的模型表。
    pub fn new(template: Template, stream: &Stream<H>) -> Self {
        Self {
            template,
            stream: stream.id(),
            shared: stream.shared().clone(),
            queue: stream.queue().clone(),
            program: Mutex::new(None),
        }
    }

    #[inline]
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// 发射命令的执行流。
    #[inline]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// 当前编译产物对应的元素类型。
    #[inline]
    pub fn compiled(&self) -> Option<ElementType> {
        self.program.lock().unwrap().as_ref().map(|(ty, _)| *ty)
    }

    fn program(&self, dtype: ElementType) -> Result<Arc<ProgramOf<H>>, Error> {
        let mut program = self.program.lock().unwrap();
        match &*program {
            Some((ty, p)) if *ty == dtype => Ok(p.clone()),
            _ => {
                let p = self.shared.program(&self.template.source(dtype))?;
                *program = Some((dtype, p.clone()));
                Ok(p)
            }
        }
    }

    /// 把一次发射记录到绑定的流上，不等待完成。
    pub fn execute(&self, launch: Launch<H>) -> Result<(), Error> {
        let Launch { op, args } = launch;
        if op != self.template.op() {
            return Err(invalid_parameters(format!(
                "model of {} cannot execute {op}",
                self.template.op(),
            )));
        }
        let program = self.program(args.dtype)?;
        let range = self.template.range(&args.problem);
        debug!("launch {op} for {} in {range:?}", args.dtype);
        self.queue.launch(program, args, range)
    }
}
