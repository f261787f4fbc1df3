// Frame buffer: reusable RGBA pixel storage for the polling loop

/// RGBA, as produced by canvas `getImageData`
pub const BYTES_PER_PIXEL: usize = 4;

/// Pixel buffer reused across ticks.
///
/// The buffer is sized to the frame's native resolution and only reallocates
/// when that resolution changes.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        let mut buffer = Self::new();
        buffer.ensure_size(width, height);
        buffer
    }

    /// Resize for a `width` x `height` frame. Returns true if the size changed.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels
            .resize(width as usize * height as usize * BYTES_PER_PIXEL, 0);
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Copy `data` in; the length must match the current size exactly
    pub fn copy_from(&mut self, data: &[u8]) -> Result<(), usize> {
        if data.len() != self.pixels.len() {
            return Err(data.len());
        }
        self.pixels.copy_from_slice(data);
        Ok(())
    }

    /// Zero every pixel without changing the size
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_size_allocates_rgba() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.is_empty());
        assert!(buffer.ensure_size(4, 3));
        assert_eq!(buffer.pixels().len(), 4 * 3 * BYTES_PER_PIXEL);
    }

    #[test]
    fn test_ensure_size_same_resolution_is_noop() {
        let mut buffer = FrameBuffer::with_size(8, 8);
        buffer.pixels_mut()[0] = 42;
        assert!(!buffer.ensure_size(8, 8));
        assert_eq!(buffer.pixels()[0], 42);
    }

    #[test]
    fn test_ensure_size_new_resolution_resets() {
        let mut buffer = FrameBuffer::with_size(2, 2);
        buffer.pixels_mut().fill(7);
        assert!(buffer.ensure_size(3, 1));
        assert_eq!(buffer.width(), 3);
        assert_eq!(buffer.height(), 1);
        assert!(buffer.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_copy_from_length_mismatch() {
        let mut buffer = FrameBuffer::with_size(1, 1);
        assert_eq!(buffer.copy_from(&[1, 2, 3]), Err(3));
        assert!(buffer.copy_from(&[1, 2, 3, 4]).is_ok());
        assert_eq!(buffer.pixels(), &[1, 2, 3, 4]);
    }
}
