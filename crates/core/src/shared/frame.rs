use ndarray::ArrayView3;

use crate::shared::display_size::DisplaySize;

/// One captured camera frame: contiguous RGB bytes in row-major order.
///
/// Pixel format conversion happens in the capture adapters; everything
/// downstream sees tightly packed 3-channel data.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, sequence: u64) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            sequence,
        }
    }

    /// Solid-colour RGB frame, mostly useful as a placeholder and in tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width as usize) * (height as usize) * 3)
            .collect();
        Self::new(data, width, height, 3, sequence)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Monotonic capture counter assigned by the stream.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Intrinsic dimensions of the frame.
    pub fn size(&self) -> DisplaySize {
        DisplaySize::new(self.width, self.height)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                self.channels as usize,
            ),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }

    /// Expands the pixels to RGBA with full opacity.
    pub fn to_rgba(&self) -> Vec<u8> {
        let channels = self.channels as usize;
        let mut out = Vec::with_capacity((self.width as usize) * (self.height as usize) * 4);
        for px in self.data.chunks_exact(channels) {
            match channels {
                1 => out.extend_from_slice(&[px[0], px[0], px[0], 255]),
                4 => out.extend_from_slice(px),
                _ => out.extend_from_slice(&[px[0], px[1], px[2], 255]),
            }
        }
        out
    }
}
