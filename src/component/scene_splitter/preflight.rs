//! 執行前的磁碟空間檢查

use crate::error::{Result, SplitError};
use crate::tools::SpaceProbe;
use log::{debug, warn};
use std::path::Path;

/// 每個工作預留的空間倍數（暫存 + 輸出）
pub const SPACE_FACTOR: u64 = 2;

/// 所需空間 = 2 × 最大的輸入檔
///
/// 各工作依序完成並清除暫存，空間可重複使用，因此不是總和
#[must_use]
pub fn required_bytes(sizes: &[u64]) -> u64 {
    sizes
        .iter()
        .copied()
        .max()
        .unwrap_or(0)
        .saturating_mul(SPACE_FACTOR)
}

/// 檢查 `output_dir` 所在磁碟是否有 `required` 位元組的可用空間
///
/// 目錄不存在時改查最近的上層目錄，不會因此失敗
pub fn check(required: u64, output_dir: &Path, probe: &dyn SpaceProbe) -> Result<()> {
    let available = probe.available_bytes(output_dir).map_err(|e| {
        warn!("無法讀取可用空間 {}: {e:#}", output_dir.display());
        SplitError::Io(format!("{e:#}"))
    })?;

    debug!(
        "空間檢查 {}: 需要 {required} bytes, 可用 {available} bytes",
        output_dir.display()
    );

    check_available(required, available)
}

/// 純計算：可用空間不足時回傳差額
pub const fn check_available(required: u64, available: u64) -> Result<()> {
    if available >= required {
        Ok(())
    } else {
        Err(SplitError::InsufficientSpace {
            required,
            available,
            shortfall: required - available,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const MB: u64 = 1024 * 1024;

    struct FixedSpace(u64);

    impl SpaceProbe for FixedSpace {
        fn available_bytes(&self, _dir: &Path) -> anyhow::Result<u64> {
            Ok(self.0)
        }
    }

    struct RecordingProbe {
        seen: Mutex<Vec<std::path::PathBuf>>,
    }

    impl SpaceProbe for RecordingProbe {
        fn available_bytes(&self, dir: &Path) -> anyhow::Result<u64> {
            self.seen.lock().unwrap().push(dir.to_path_buf());
            Ok(u64::MAX)
        }
    }

    #[test]
    fn test_required_uses_largest_file() {
        assert_eq!(required_bytes(&[100 * MB, 250 * MB, 80 * MB]), 500 * MB);
        assert_eq!(required_bytes(&[]), 0);
        assert_eq!(required_bytes(&[u64::MAX]), u64::MAX);
    }

    #[test]
    fn test_batch_rejected_with_shortfall() {
        let required = required_bytes(&[100 * MB, 250 * MB, 80 * MB]);
        let err = check(required, Path::new("/out"), &FixedSpace(450 * MB)).unwrap_err();
        assert_eq!(
            err,
            SplitError::InsufficientSpace {
                required: 500 * MB,
                available: 450 * MB,
                shortfall: 50 * MB,
            }
        );
    }

    #[test]
    fn test_exact_fit_passes() {
        assert!(check_available(500, 500).is_ok());
        assert!(check_available(0, 0).is_ok());
    }

    #[test]
    fn test_missing_directory_is_not_an_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let missing = temp_dir.path().join("a").join("b");
        let probe = RecordingProbe {
            seen: Mutex::new(Vec::new()),
        };
        assert!(check(10, &missing, &probe).is_ok());
        assert_eq!(probe.seen.lock().unwrap().as_slice(), &[missing]);
    }

    #[test]
    fn test_probe_failure_is_io_error() {
        struct Broken;
        impl SpaceProbe for Broken {
            fn available_bytes(&self, _dir: &Path) -> anyhow::Result<u64> {
                anyhow::bail!("no disk")
            }
        }
        let err = check(1, Path::new("/out"), &Broken).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }
}
