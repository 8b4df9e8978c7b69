use crate::error::{EncodeError, Result};
use crate::video::stream::{FrameSink, FrameSource};
use crate::video::types::{Frame, VideoStreamDescriptor};

/// A [`FrameSource`] over frames held in memory
///
/// Useful for synthetic inputs and for driving the pipeline in tests.
#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    frames: Vec<Frame>,
    fps: f64,
    position: usize,
    rewinds: usize,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Frame>, fps: f64) -> Self {
        Self { frames, fps, position: 0, rewinds: 0 }
    }

    /// `count` frames of one solid color
    pub fn solid(width: u32, height: u32, color: [u8; 3], count: usize, fps: f64) -> Self {
        Self::new(vec![Frame::new_filled(width, height, color); count], fps)
    }

    /// Number of times [`FrameSource::rewind`] was called
    pub fn rewinds(&self) -> usize {
        self.rewinds
    }
}

impl FrameSource for MemoryFrameSource {
    fn descriptor(&self) -> VideoStreamDescriptor {
        let (width, height) = self.frames.first().map(Frame::dimensions).unwrap_or((0, 0));
        VideoStreamDescriptor {
            width,
            height,
            fps: self.fps,
            frame_count: self.frames.len() as u64,
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        self.rewinds += 1;
        Ok(())
    }

    fn label(&self) -> String {
        format!("memory({} frames)", self.frames.len())
    }
}

/// A [`FrameSink`] collecting frames in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameSink {
    frames: Vec<Frame>,
    finished: bool,
}

impl MemoryFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl FrameSink for MemoryFrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(EncodeError::WriteFailed {
                index: self.frames.len(),
                reason: "sink already finished".to_string(),
            }
            .into());
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn frames_written(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_reads_then_ends_then_rewinds() {
        let mut source = MemoryFrameSource::solid(2, 2, [9, 9, 9], 2, 30.0);
        assert_eq!(source.descriptor().frame_count, 2);
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_none());

        source.rewind().unwrap();
        assert_eq!(source.rewinds(), 1);
        assert!(source.read_frame().unwrap().is_some());
    }

    #[test]
    fn test_sink_rejects_writes_after_finish() {
        let mut sink = MemoryFrameSink::new();
        let frame = Frame::new_black(1, 1);
        sink.write_frame(&frame).unwrap();
        sink.finish().unwrap();
        assert!(sink.write_frame(&frame).is_err());
        assert_eq!(sink.frames_written(), 1);
    }
}
