use super::{kernels, Cpu, HostMemory, HostProgram};
use crate::{execution_failed, shape_error, Error, KernelArgs, NdRange, Queue};
use log::{error, warn};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

type Task = Box<dyn FnOnce() + Send>;

enum Command {
    Run(Task),
    Fence(Sender<()>),
}

#[derive(Default)]
struct State {
    poisoned: AtomicBool,
    reason: Mutex<String>,
}

/// 由一个工作线程按提交顺序执行命令的队列。
///
/// 命令执行中发生 panic 会使队列中毒，之后的命令不再执行，并报告 [`ExecutionFailed`](crate::ErrorKind::ExecutionFailed)。
pub struct HostQueue {
    sender: Mutex<Option<Sender<Command>>>,
    worker: Option<JoinHandle<()>>,
    state: Arc<State>,
}

impl HostQueue {
    pub fn new() -> Self {
        let (sender, receiver) = channel::<Command>();
        let state = Arc::new(State::default());
        let worker = {
            let state = state.clone();
            thread::spawn(move || {
                for command in receiver {
                    match command {
                        Command::Run(task) => {
                            if state.poisoned.load(Ordering::Acquire) {
                                continue;
                            }
                            if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                                let reason = panic_message(&*payload);
                                error!("host kernel failed: {reason}");
                                *state.reason.lock().unwrap() = reason;
                                state.poisoned.store(true, Ordering::Release);
                            }
                        }
                        Command::Fence(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            })
        };
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Some(worker),
            state,
        }
    }

    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.state.poisoned.load(Ordering::Acquire)
    }

    fn failure(&self) -> Error {
        let reason = self.state.reason.lock().unwrap();
        execution_failed(format!("stream is poisoned by a failed command: {reason}"))
    }

    fn submit(&self, command: Command) -> Result<(), Error> {
        if self.is_poisoned() {
            return Err(self.failure());
        }
        self.sender
            .lock()
            .unwrap()
            .as_ref()
            .ok_or_else(|| execution_failed("queue is closed"))?
            .send(command)
            .map_err(|_| execution_failed("host worker exited"))
    }
}

impl Default for HostQueue {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HostQueue {
    fn drop(&mut self) {
        if let Ok(sender) = self.sender.get_mut() {
            sender.take();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("host worker exited abnormally");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

fn check_range(mem: &HostMemory, offset: usize, len: usize) -> Result<(), Error> {
    if offset + len <= mem.len() {
        Ok(())
    } else {
        Err(shape_error(format!(
            "access [{offset}, {}) out of buffer of {} bytes",
            offset + len,
            mem.len(),
        )))
    }
}

impl Queue for HostQueue {
    type Hardware = Cpu;

    fn launch(
        &self,
        program: Arc<HostProgram>,
        args: KernelArgs<Cpu>,
        range: NdRange,
    ) -> Result<(), Error> {
        self.submit(Command::Run(Box::new(move || {
            kernels::launch(&program, args, range)
        })))
    }

    fn write(&self, dst: Arc<HostMemory>, offset: usize, data: Vec<u8>) -> Result<(), Error> {
        check_range(&dst, offset, data.len())?;
        self.submit(Command::Run(Box::new(move || {
            dst.lock()[offset..][..data.len()].copy_from_slice(&data)
        })))
    }

    fn read(&self, src: Arc<HostMemory>, offset: usize, len: usize) -> Result<Vec<u8>, Error> {
        check_range(&src, offset, len)?;
        let (sender, receiver) = channel();
        self.submit(Command::Run(Box::new(move || {
            let _ = sender.send(src.lock()[offset..][..len].to_vec());
        })))?;
        // 前序命令失败时读取命令被丢弃
        receiver.recv().map_err(|_| self.failure())
    }

    fn finish(&self) -> Result<(), Error> {
        let (sender, receiver) = channel();
        self.submit(Command::Fence(sender))?;
        receiver
            .recv()
            .map_err(|_| execution_failed("host worker exited"))?;
        if self.is_poisoned() {
            Err(self.failure())
        } else {
            Ok(())
        }
    }
}
