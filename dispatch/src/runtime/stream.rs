use super::{ContextId, Shared};
use crate::{
    array::{lower, Array, ArrayExpression},
    model::{Model, ModelMap},
    Device, ElementType, Error, Hardware, OperationTag, Queue, QueueOf,
};
use log::debug;
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

/// 执行流标识，进程内唯一。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct StreamId(usize);

impl fmt::Display for StreamId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 有序的异步命令流，拥有自己的模型表。
pub struct Stream<H: Hardware> {
    id: StreamId,
    context: ContextId,
    shared: Arc<Shared<H>>,
    queue: Arc<QueueOf<H>>,
    models: Mutex<ModelMap<H>>,
}

impl<H: Hardware> fmt::Debug for Stream<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("context", &self.context)
            .finish()
    }
}

impl<H: Hardware> Stream<H> {
    pub(super) fn new(context: ContextId, shared: Arc<Shared<H>>) -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let id = StreamId(NEXT.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            context,
            queue: Arc::new(shared.hardware.queue()),
            shared,
            models: Mutex::new(ModelMap::new(id)),
        }
    }

    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// 所属上下文。
    #[inline]
    pub fn context(&self) -> ContextId {
        self.context
    }

    #[inline]
    pub fn device(&self) -> &Device {
        self.shared.hardware.device()
    }

    #[inline]
    pub fn hardware(&self) -> &H {
        &self.shared.hardware
    }

    /// 本流的模型表。
    ///
    /// 持有返回的守卫期间不能在本流上 `dispatch`，否则死锁。
    /// 单次查找或设置用 [`model`](Self::model) 和 [`set_model`](Self::set_model)。
    #[inline]
    pub fn models(&self) -> MutexGuard<ModelMap<H>> {
        self.models.lock().unwrap()
    }

    /// 查找模型。
    #[inline]
    pub fn model(&self, op: OperationTag, dtype: ElementType) -> Result<Arc<Model<H>>, Error> {
        self.models().get(op, dtype)
    }

    /// 设置模型，见 [`ModelMap::set`]。
    #[inline]
    pub fn set_model(
        &self,
        op: OperationTag,
        dtype: ElementType,
        model: Model<H>,
    ) -> Result<(), Error> {
        self.models().set(op, dtype, model)
    }

    #[inline]
    pub(crate) fn shared(&self) -> &Arc<Shared<H>> {
        &self.shared
    }

    #[inline]
    pub(crate) fn queue(&self) -> &Arc<QueueOf<H>> {
        &self.queue
    }

    /// 阻塞直到流上已提交的命令全部完成。
    #[inline]
    pub fn finish(&self) -> Result<(), Error> {
        self.queue.finish()
    }

    /// 把表达式的结果写入 `dst`。
    ///
    /// 按 (操作类型, 元素类型) 在本流的模型表中查找一次，由找到的模型执行。
    /// 没有配置的组合直接报错，不编译任何程序，也不改动任何缓冲区。
    pub fn dispatch(&self, dst: &Array<H>, expr: ArrayExpression<H>) -> Result<(), Error> {
        let launch = lower(self.context, dst, expr)?;
        debug!(
            "dispatch ({}, {}) on stream {}",
            launch.op, launch.args.dtype, self.id
        );
        let model = self.model(launch.op, launch.args.dtype)?;
        model.execute(launch)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        array::test::template, common_cpu::Cpu, model::Model, Array, ElementType, ErrorKind,
        OperationTag, Runtime,
    };

    #[test]
    fn test_model_access() {
        let mut rt = Runtime::default();
        let ctx = rt.add_context(Cpu::default());
        let stream = ctx.default_stream();
        let op = OperationTag::VectorAxpy;

        let e = stream.model(op, ElementType::I32).unwrap_err();
        assert_eq!(e.kind, ErrorKind::KeyNotFound);
        stream
            .set_model(op, ElementType::I32, Model::new(template(op, stream), stream))
            .unwrap();

        // 持有模型本身不占用模型表
        let model = stream.model(op, ElementType::I32).unwrap();
        assert_eq!(model.compiled(), None);
        let x = Array::from_host(&[1i32, -2, 3], &[3], &ctx).unwrap();
        let y = (&x * 2i32).eval(stream).unwrap();
        assert_eq!(y.read::<i32>(stream).unwrap(), [2, -4, 6]);
        assert_eq!(model.compiled(), Some(ElementType::I32));
        assert_eq!(stream.models().keys().collect::<Vec<_>>(), [(op, ElementType::I32)]);
    }

    #[test]
    fn test_debug() {
        let mut rt = Runtime::default();
        let ctx = rt.add_context(Cpu::default());
        let stream = format!("{:?}", ctx.default_stream());
        assert!(stream.starts_with("Stream"), "{stream}");
        assert!(format!("{ctx:?}").contains("streams: 1"));
    }
}
