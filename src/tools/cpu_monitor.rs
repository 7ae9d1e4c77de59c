use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use sysinfo::System;

/// 預設工作執行緒數量上限
pub const MAX_DEFAULT_WORKERS: usize = 4;

/// 預設 worker 數：CPU 核心數，最多 4 個
#[must_use]
pub fn default_worker_count() -> usize {
    static COUNT: OnceLock<usize> = OnceLock::new();
    *COUNT.get_or_init(|| {
        let system = System::new_all();
        system.cpus().len().clamp(1, MAX_DEFAULT_WORKERS)
    })
}

/// 顯示進度時使用的 CPU 使用率監看
pub struct CpuMonitor {
    system: System,
}

impl CpuMonitor {
    #[must_use]
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        thread::sleep(Duration::from_millis(200));
        system.refresh_cpu_all();
        Self { system }
    }

    pub fn current_usage(&mut self) -> f32 {
        self.system.refresh_cpu_all();
        self.system.global_cpu_usage()
    }
}

impl Default for CpuMonitor {
    fn default() -> Self {
        Self::new()
    }
}
