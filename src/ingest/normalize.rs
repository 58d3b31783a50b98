use anyhow::{anyhow, Result};

/// Pixel layouts a V4L2 device may settle on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Nv12,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"NV12" => Some(PixelFormat::Nv12),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }

    /// Bytes occupied by one frame in this layout.
    pub(crate) fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
            PixelFormat::Yuyv => pixels.checked_mul(2),
        }
    }
}

/// Convert a captured buffer to packed RGB24.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format
        .frame_len(width, height)
        .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", format))?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "{:?} frame too short: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    let pixels = &pixels[..expected];

    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Nv12 => Ok(nv12_to_rgb(pixels, width as usize, height as usize)),
        PixelFormat::Yuyv => Ok(yuyv_to_rgb(pixels, width as usize, height as usize)),
    }
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let offset = (j * w + i) * 3;
            write_rgb(
                &mut rgb[offset..offset + 3],
                pixels[j * w + i],
                pixels[uv_index],
                pixels[uv_index + 1],
            );
        }
    }
    rgb
}

fn yuyv_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let mut rgb = vec![0u8; w * h * 3];
    // Each 4-byte macropixel Y0 U Y1 V covers two horizontal pixels.
    for (pair, chunk) in pixels.chunks_exact(4).enumerate() {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        let offset = pair * 6;
        write_rgb(&mut rgb[offset..offset + 3], y0, u, v);
        if offset + 6 <= rgb.len() {
            write_rgb(&mut rgb[offset + 3..offset + 6], y1, u, v);
        }
    }
    rgb
}

fn write_rgb(out: &mut [u8], y: u8, u: u8, v: u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    out[0] = clamp_to_u8(y + 1.402_f32 * v);
    out[1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
    out[2] = clamp_to_u8(y + 1.772_f32 * u);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
