// frame.rs — 视频帧 (平面 YUV) 以及解码线程 -> 渲染线程的交接
//
// 生产者只发送写完整的帧 (所有权随通道转移)，渲染线程在一次 draw 里同步消费，
// 因此永远不会上传半帧。

use crate::error::{Plane, StateError};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};

/// U/V 平面在两个方向上各减半 (奇数尺寸向上取整)
pub fn chroma_size(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(2), height.div_ceil(2))
}

/// I420 一帧的字节数
pub fn i420_len(width: u32, height: u32) -> usize {
    let (cw, ch) = chroma_size(width, height);
    width as usize * height as usize + 2 * cw as usize * ch as usize
}

/// 一帧完整的平面 YUV 数据，由生产者拥有并整体交出。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvFrame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl YuvFrame {
    /// Splits one packed I420 buffer into its three planes.
    pub fn from_i420(width: u32, height: u32, data: &[u8]) -> Result<Self, StateError> {
        let expected = i420_len(width, height);
        if data.len() != expected {
            return Err(StateError::PlaneSize {
                plane: Plane::Y,
                expected,
                actual: data.len(),
            });
        }
        let luma = width as usize * height as usize;
        let (cw, ch) = chroma_size(width, height);
        let chroma = cw as usize * ch as usize;

        Ok(Self {
            width,
            height,
            y: data[..luma].to_vec(),
            u: data[luma..luma + chroma].to_vec(),
            v: data[luma + chroma..].to_vec(),
        })
    }

    pub fn view(&self) -> YuvFrameRef<'_> {
        YuvFrameRef {
            width: self.width,
            height: self.height,
            y: &self.y,
            u: &self.u,
            v: &self.v,
        }
    }
}

/// 借用的一帧，只在一次上传期间有效
#[derive(Debug, Clone, Copy)]
pub struct YuvFrameRef<'a> {
    pub width: u32,
    pub height: u32,
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
}

impl YuvFrameRef<'_> {
    /// Checks every plane against the declared frame size before anything is uploaded.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.width == 0 || self.height == 0 {
            return Err(StateError::EmptyFrame {
                width: self.width,
                height: self.height,
            });
        }
        let (cw, ch) = chroma_size(self.width, self.height);
        let luma = self.width as usize * self.height as usize;
        let chroma = cw as usize * ch as usize;

        for (plane, expected, actual) in [
            (Plane::Y, luma, self.y.len()),
            (Plane::U, chroma, self.u.len()),
            (Plane::V, chroma, self.v.len()),
        ] {
            if expected != actual {
                return Err(StateError::PlaneSize {
                    plane,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// 每次 draw 的帧输入：位图表面没有逐帧数据
#[derive(Debug, Clone, Copy)]
pub enum FrameInput<'a> {
    Static,
    Yuv(YuvFrameRef<'a>),
}

impl FrameInput<'_> {
    pub fn describe(&self) -> &'static str {
        match self {
            FrameInput::Static => "static",
            FrameInput::Yuv(_) => "planar YUV",
        }
    }
}

pub type FrameSender = SyncSender<YuvFrame>;

/// 渲染线程这一端。`latest` 丢掉积压的旧帧，只留最新的一帧。
pub struct FrameHandoff {
    rx: Receiver<YuvFrame>,
    disconnected: bool,
}

/// Bounded channel: a producer that runs ahead blocks instead of piling up frames.
pub fn frame_channel(capacity: usize) -> (FrameSender, FrameHandoff) {
    let (tx, rx) = sync_channel(capacity.max(1));
    (
        tx,
        FrameHandoff {
            rx,
            disconnected: false,
        },
    )
}

impl FrameHandoff {
    pub fn latest(&mut self) -> Option<YuvFrame> {
        let mut newest = None;
        loop {
            match self.rx.try_recv() {
                Ok(frame) => newest = Some(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        log::info!("frame producer finished");
                    }
                    self.disconnected = true;
                    break;
                }
            }
        }
        newest
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}
