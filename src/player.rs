// player.rs — 原始 I420 文件的后台读取线程 (解码器的替身)
//
// 每次只发送读满的一帧；读到文件尾就回到开头循环播放。接收端被丢弃后线程退出。

use crate::frame::{i420_len, FrameSender, YuvFrame};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RawVideo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
}

/// `"1920x960"` -> (1920, 960)
pub fn parse_size(text: &str) -> Option<(u32, u32)> {
    let (w, h) = text.split_once(['x', 'X'])?;
    let w = w.trim().parse().ok()?;
    let h = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

pub fn spawn_raw_yuv(video: RawVideo, tx: FrameSender) -> io::Result<JoinHandle<()>> {
    let file = File::open(&video.path)?;
    let frame_len = i420_len(video.width, video.height);
    let total = file.metadata()?.len();
    if total < frame_len as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{} holds {} bytes, one {}x{} frame needs {}",
                video.path.display(),
                total,
                video.width,
                video.height,
                frame_len
            ),
        ));
    }

    log::info!(
        "playing {} ({}x{} @ {} fps, {} frames)",
        video.path.display(),
        video.width,
        video.height,
        video.fps,
        total / frame_len as u64
    );

    thread::Builder::new()
        .name("raw-yuv-reader".into())
        .spawn(move || {
            if let Err(e) = read_loop(&video.path, file, &video, frame_len, &tx) {
                log::error!("raw video reader stopped: {}", e);
            }
        })
}

fn read_loop(
    path: &Path,
    file: File,
    video: &RawVideo,
    frame_len: usize,
    tx: &FrameSender,
) -> io::Result<()> {
    let interval = if video.fps > 0.0 {
        Duration::from_secs_f32(1.0 / video.fps)
    } else {
        Duration::ZERO
    };
    let mut reader = BufReader::new(file);
    let mut buffer = vec![0u8; frame_len];
    let mut next = Instant::now();
    // 从文件头开始读也凑不满一帧，说明文件在播放中被截短了
    let mut at_start = true;

    loop {
        match reader.read_exact(&mut buffer) {
            Ok(()) => at_start = false,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && at_start => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} no longer holds a whole frame", path.display()),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                // 末尾不足一帧的数据直接丢弃
                log::debug!("{}: rewinding", path.display());
                reader.seek(SeekFrom::Start(0))?;
                at_start = true;
                continue;
            }
            Err(e) => return Err(e),
        }

        let frame = match YuvFrame::from_i420(video.width, video.height, &buffer) {
            Ok(frame) => frame,
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
        };
        if tx.send(frame).is_err() {
            log::debug!("frame receiver dropped, reader exits");
            return Ok(());
        }

        next += interval;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::frame_channel;

    fn temp_file(name: &str, data: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("dualfish-{}-{}.yuv", std::process::id(), name));
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("1920x960"), Some((1920, 960)));
        assert_eq!(parse_size("64X32"), Some((64, 32)));
        assert_eq!(parse_size("0x32"), None);
        assert_eq!(parse_size("wide"), None);
    }

    #[test]
    fn reader_sends_whole_frames_and_loops() {
        // 4x2: Y 8 字节 + U 2 + V 2 = 12 字节一帧；两帧加半帧尾巴
        let mut data = vec![10u8; 12];
        data.extend_from_slice(&[20u8; 12]);
        data.extend_from_slice(&[30u8; 6]);
        let path = temp_file("loop", &data);

        let (tx, rx) = std::sync::mpsc::sync_channel(8);
        let video = RawVideo {
            path: path.clone(),
            width: 4,
            height: 2,
            fps: 1000.0,
        };
        let handle = spawn_raw_yuv(video, tx).unwrap();

        let first: YuvFrame = rx.recv().unwrap();
        let second: YuvFrame = rx.recv().unwrap();
        let third: YuvFrame = rx.recv().unwrap();
        assert_eq!(first.y, vec![10; 8]);
        assert_eq!(second.y, vec![20; 8]);
        assert_eq!(third, first);
        assert_eq!(third.u.len(), 2);

        drop(rx);
        handle.join().unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn reader_stops_when_file_is_truncated() {
        let path = temp_file("truncated", &[10u8; 12]);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let video = RawVideo {
            path: path.clone(),
            width: 4,
            height: 2,
            fps: 1000.0,
        };
        let handle = spawn_raw_yuv(video, tx).unwrap();
        let first: YuvFrame = rx.recv().unwrap();
        assert_eq!(first.y, vec![10; 8]);

        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(0)
            .unwrap();
        // 截短前读进来的帧收完，之后不应再有任何帧
        while rx.recv_timeout(Duration::from_millis(200)).is_ok() {}
        drop(rx);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished(), "reader still running after truncation");
        handle.join().unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn file_shorter_than_a_frame_is_rejected() {
        let path = temp_file("short", &[0u8; 5]);
        let (tx, _rx) = frame_channel(1);
        let video = RawVideo {
            path: path.clone(),
            width: 4,
            height: 2,
            fps: 30.0,
        };
        let err = spawn_raw_yuv(video, tx).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let _ = std::fs::remove_file(path);
    }
}
