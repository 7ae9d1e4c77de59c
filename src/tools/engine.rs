//! 外部媒體引擎（ffmpeg / ffprobe）呼叫介面
//!
//! 核心流程只依賴 [`MediaEngine`]：`invoke(args) -> (exit_status, stdout_lines, stderr)`。
//! 測試時可注入假的實作，回傳預先準備好的輸出。

use log::{debug, warn};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// 等待子程序時的輪詢間隔
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

/// 一次引擎呼叫
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: Tool,
    pub args: Vec<String>,
    /// 超過此時間點仍未結束則終止程序
    pub deadline: Option<Instant>,
}

impl Invocation {
    #[must_use]
    pub fn new(tool: Tool, args: Vec<String>) -> Self {
        Self {
            tool,
            args,
            deadline: None,
        }
    }

    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// 被訊號終止時為 `None`
    pub exit_code: Option<i32>,
    pub stdout_lines: Vec<String>,
    pub stderr: String,
}

impl EngineOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// stderr 最後幾行，用於錯誤訊息
    #[must_use]
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} killed after exceeding its deadline")]
    DeadlineExceeded { program: String },
}

pub trait MediaEngine: Send + Sync {
    fn invoke(&self, invocation: &Invocation) -> Result<EngineOutput, EngineError>;
}

/// 以子程序執行 ffmpeg / ffprobe 的引擎
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl ProcessEngine {
    #[must_use]
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn program(&self, tool: Tool) -> &PathBuf {
        match tool {
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Ffprobe => &self.ffprobe,
        }
    }

    /// 是否能在 PATH 中找到 ffmpeg
    #[must_use]
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
}

impl MediaEngine for ProcessEngine {
    fn invoke(&self, invocation: &Invocation) -> Result<EngineOutput, EngineError> {
        let program = self.program(invocation.tool);
        let program_name = program.display().to_string();
        debug!("執行 {program_name} {}", invocation.args.join(" "));

        let mut child = Command::new(program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program_name.clone(),
                source,
            })?;

        // 兩個管道都要持續讀取，避免子程序因緩衝區滿而卡住
        let stdout_reader = spawn_line_reader(child.stdout.take());
        let stderr_reader = spawn_text_reader(child.stderr.take());

        let outcome = wait_with_deadline(&mut child, invocation.deadline, &program_name)?;

        let stdout_lines = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        match outcome {
            WaitOutcome::Exited(code) => Ok(EngineOutput {
                exit_code: code,
                stdout_lines,
                stderr,
            }),
            WaitOutcome::Killed => Err(EngineError::DeadlineExceeded {
                program: program_name,
            }),
        }
    }
}

enum WaitOutcome {
    Exited(Option<i32>),
    Killed,
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Option<Instant>,
    program: &str,
) -> Result<WaitOutcome, EngineError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(WaitOutcome::Exited(status.code())),
            Ok(None) => {}
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Wait {
                    program: program.to_string(),
                    source,
                });
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!("程序執行逾時，終止 [{}]: {program}", child.id());
            let _ = child.kill();
            let _ = child.wait();
            return Ok(WaitOutcome::Killed);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        pipe.map(|p| {
            BufReader::new(p)
                .lines()
                .map_while(Result::ok)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
    })
}

fn spawn_text_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut p) = pipe {
            let mut bytes = Vec::new();
            if p.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        text
    })
}
