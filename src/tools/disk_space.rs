use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// 查詢目錄所在檔案系統的可用空間
pub trait SpaceProbe: Send + Sync {
    fn available_bytes(&self, dir: &Path) -> Result<u64>;
}

/// 透過 sysinfo 讀取磁碟資訊；每次呼叫都重新讀取，不快取
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpaceProbe;

impl SpaceProbe for SystemSpaceProbe {
    fn available_bytes(&self, dir: &Path) -> Result<u64> {
        let target = nearest_existing_ancestor(dir);
        let target = target.canonicalize().unwrap_or(target);

        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<(PathBuf, u64)> = disks
            .list()
            .iter()
            .map(|disk| (disk.mount_point().to_path_buf(), disk.available_space()))
            .collect();

        available_on_mount(&target, &mounts)
            .ok_or_else(|| anyhow!("找不到 {} 所在的磁碟", target.display()))
    }
}

/// 目錄尚未建立時，往上找到第一個存在的路徑
#[must_use]
pub fn nearest_existing_ancestor(dir: &Path) -> PathBuf {
    dir.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// 取掛載點前綴最長者的可用空間
fn available_on_mount(target: &Path, mounts: &[(PathBuf, u64)]) -> Option<u64> {
    mounts
        .iter()
        .filter(|(mount, _)| target.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, available)| *available)
}
