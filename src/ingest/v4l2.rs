//! V4L2 capture device.
//!
//! Opens a local device node (e.g. /dev/video0), negotiates resolution, frame
//! rate and a single mmap buffer, and converts whatever pixel layout the
//! driver settles on to RGB24. A single buffer keeps latency at one frame:
//! the loop never drains a backlog of stale captures.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CaptureConfig, CaptureDevice};
use crate::frame::Frame;
use crate::NavError;

const CAPTURE_BUFFERS: u32 = 1;

#[self_referencing]
struct StreamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// A V4L2 camera streaming through one mmap buffer.
pub struct V4l2Device {
    path: String,
    state: Option<StreamState>,
    width: u32,
    height: u32,
    format: PixelFormat,
    frames_captured: u64,
}

impl V4l2Device {
    /// Open `path` and negotiate the configured format.
    ///
    /// Any failure here is `NavError::DeviceUnavailable`.
    pub fn open(path: &str, config: &CaptureConfig) -> Result<Self> {
        Self::negotiate(path, config).map_err(|err| {
            NavError::DeviceUnavailable {
                device: path.to_string(),
                reason: format!("{:#}", err),
            }
            .into()
        })
    }

    fn negotiate(path: &str, config: &CaptureConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device =
            v4l::Device::with_path(path).with_context(|| format!("open v4l2 device {}", path))?;
        let mut requested = device.format().context("read v4l2 format")?;
        requested.width = config.width;
        requested.height = config.height;
        requested.fourcc = v4l::FourCC::new(b"RGB3");

        let active = match device.set_format(&requested) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Device: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let format = PixelFormat::from_fourcc(&active.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "unsupported pixel format {} on {}",
                String::from_utf8_lossy(&active.fourcc.repr),
                path
            )
        })?;

        if config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Device: failed to set fps on {}: {}", path, err);
            }
        }

        let state = StreamState::try_new(device, |device| {
            v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, CAPTURE_BUFFERS)
                .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
        })?;

        log::info!(
            "V4l2Device: opened {} ({}x{} {:?})",
            path,
            active.width,
            active.height,
            format
        );

        Ok(Self {
            path: path.to_string(),
            state: Some(state),
            width: active.width,
            height: active.height,
            format,
            frames_captured: 0,
        })
    }
}

impl CaptureDevice for V4l2Device {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn capture(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let path = &self.path;
        let state = self.state.as_mut().ok_or_else(|| NavError::TransientCaptureFailure {
            device: path.clone(),
            reason: "device released".to_string(),
        })?;
        let pixels = state
            .with_mut(|fields| {
                fields.stream.next().map(|(buf, meta)| {
                    let used = (meta.bytesused as usize).min(buf.len());
                    let used = if used == 0 { buf.len() } else { used };
                    normalize_to_rgb(&buf[..used], self.width, self.height, self.format)
                })
            })
            .map_err(|err| NavError::TransientCaptureFailure {
                device: path.clone(),
                reason: err.to_string(),
            })??;

        self.frames_captured += 1;
        Frame::new(pixels, self.width, self.height)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Device: released {} after {} frames",
                self.path,
                self.frames_captured
            );
        }
    }
}
