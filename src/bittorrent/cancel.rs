use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Default, Debug)]
struct Inner {
    cancelled: AtomicBool,
    // 设置取消时持有写锁，保证之后没有人再往结果队列里写
    gate: RwLock<()>,
}

/// 所有worker共享的取消信号，assembler收齐piece之后设置
#[derive(Default, Debug, Clone)]
pub struct CancelToken(Arc<Inner>);

impl CancelToken {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn cancel(&self) {
        let _guard = self.0.gate.write().unwrap_or_else(|e| e.into_inner());
        self.0.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// 只有在没有取消的情况下才执行 `f`，执行期间 `cancel` 会等待
    pub fn unless_cancelled<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let _guard = self.0.gate.read().unwrap_or_else(|e| e.into_inner());
        if self.is_cancelled() {
            return None;
        }
        Some(f())
    }
}
