mod cpu_monitor;
mod disk_space;
pub mod engine;
mod ffprobe_info;
mod path_validator;
mod video_scanner;

pub use cpu_monitor::{CpuMonitor, MAX_DEFAULT_WORKERS, default_worker_count};
pub use disk_space::{SpaceProbe, SystemSpaceProbe, nearest_existing_ancestor};
pub use engine::{EngineError, EngineOutput, Invocation, MediaEngine, ProcessEngine, Tool};
pub use ffprobe_info::{MediaInfo, probe_args, probe_media};
pub use path_validator::{ensure_directory_exists, validate_directory_exists, validate_file_exists};
pub use video_scanner::{
    DiscoveryResult, VIDEO_EXTENSIONS, VideoFileInfo, describe_video_file, has_video_extension,
    scan_video_files,
};
