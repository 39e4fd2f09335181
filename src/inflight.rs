use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// 按分镜 id 去重的进行中标记
///
/// 检查和插入在同一把锁内完成；标记由 [`InFlightGuard`] 持有，任何退出路径
/// （包括 panic 和调用方不再等待）都会在 drop 时释放。
#[derive(Debug, Default)]
pub struct InFlightSet {
    ids: Mutex<HashSet<u32>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已有同 id 的操作在进行时返回 `None`
    pub fn try_acquire(&self, id: u32) -> Option<InFlightGuard<'_>> {
        if self.lock().insert(id) {
            Some(InFlightGuard { set: self, id })
        } else {
            None
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.lock().contains(&id)
    }

    pub fn snapshot(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    // 锁中毒时集合本身仍然一致，继续使用
    fn lock(&self) -> MutexGuard<'_, HashSet<u32>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
pub struct InFlightGuard<'a> {
    set: &'a InFlightSet,
    id: u32,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}
