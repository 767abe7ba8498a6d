//! Frame-stride math for uniform temporal sampling.

/// Number of decoded frames between consecutive samples.
///
/// `round(native_fps / rate_hz)`, never less than 1. An unknown or
/// non-positive native rate samples every frame.
pub fn frame_stride(native_fps: f64, rate_hz: f64) -> u64 {
    if !native_fps.is_finite() || native_fps <= 0.0 || !rate_hz.is_finite() || rate_hz <= 0.0 {
        return 1;
    }
    let stride = (native_fps / rate_hz).round();
    if stride < 1.0 {
        1
    } else {
        stride as u64
    }
}

/// Decides which decoded frame ordinals are kept.
#[derive(Debug, Clone, Copy)]
pub struct FrameSelector {
    stride: u64,
    limit: usize,
    selected: usize,
}

impl FrameSelector {
    /// Keep every `stride`-th frame, at most `limit` of them.
    pub fn new(stride: u64, limit: usize) -> Self {
        Self {
            stride: stride.max(1),
            limit,
            selected: 0,
        }
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Whether the frame at `ordinal` should be sampled. Counts it if so.
    pub fn select(&mut self, ordinal: u64) -> bool {
        if self.is_full() || ordinal % self.stride != 0 {
            return false;
        }
        self.selected += 1;
        true
    }

    /// The sampling ceiling has been reached.
    pub fn is_full(&self) -> bool {
        self.selected >= self.limit
    }
}
