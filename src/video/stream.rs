use crate::error::Result;
use crate::video::types::{Frame, VideoStreamDescriptor};

/// Sequential access to the decoded frames of one video
pub trait FrameSource: Send {
    /// Metadata read when the stream was opened
    fn descriptor(&self) -> VideoStreamDescriptor;

    /// Read the next frame. `Ok(None)` signals end of stream.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Restart the stream so the next read returns its first frame
    fn rewind(&mut self) -> Result<()>;

    /// Human-readable origin of the stream, used in logs and errors
    fn label(&self) -> String {
        "stream".to_string()
    }
}

/// Consumer of composited frames, in order
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close. Further writes are an error.
    fn finish(&mut self) -> Result<()>;

    fn frames_written(&self) -> usize;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn descriptor(&self) -> VideoStreamDescriptor {
        (**self).descriptor()
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        (**self).read_frame()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }

    fn frames_written(&self) -> usize {
        (**self).frames_written()
    }
}
