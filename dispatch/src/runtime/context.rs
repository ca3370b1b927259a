use super::{Shared, Stream};
use crate::{Device, Error, Hardware};
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// 上下文标识，进程内唯一。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ContextId(usize);

impl fmt::Display for ContextId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 一个设备会话，拥有若干有序的执行流。
pub struct Context<H: Hardware> {
    id: ContextId,
    shared: Arc<Shared<H>>,
    streams: Vec<Arc<Stream<H>>>,
}

impl<H: Hardware> fmt::Debug for Context<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("device", &self.device().name())
            .field("streams", &self.streams.len())
            .finish()
    }
}

impl<H: Hardware> Context<H> {
    pub(super) fn new(shared: Arc<Shared<H>>, streams: usize) -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let id = ContextId(NEXT.fetch_add(1, Ordering::Relaxed));
        let streams = (0..streams)
            .map(|_| Arc::new(Stream::new(id, shared.clone())))
            .collect();
        Self {
            id,
            shared,
            streams,
        }
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[inline]
    pub fn hardware(&self) -> &H {
        &self.shared.hardware
    }

    #[inline]
    pub fn device(&self) -> &Device {
        self.shared.hardware.device()
    }

    #[inline]
    pub fn streams(&self) -> &[Arc<Stream<H>>] {
        &self.streams
    }

    /// 第一个流，承担数组的上传。
    #[inline]
    pub fn default_stream(&self) -> &Arc<Stream<H>> {
        &self.streams[0]
    }

    /// 等待本上下文的所有流排空。
    pub fn synchronize(&self) -> Result<(), Error> {
        let mut ans = Ok(());
        for stream in &self.streams {
            if let Err(e) = stream.finish() {
                if ans.is_ok() {
                    ans = Err(e)
                }
            }
        }
        ans
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Shared<H> {
        &self.shared
    }
}
