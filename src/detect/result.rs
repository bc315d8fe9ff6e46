use crate::frame::{Frame, FrameId};
use crate::overlay::Rect;

/// Outcome of comparing one frame against its predecessor.
#[derive(Clone, Debug)]
pub struct MotionEvent {
    /// At least one changed region reached the minimum area.
    pub detected: bool,
    pub frame_id: FrameId,
    /// The color frame, with motion rectangles drawn when enabled.
    pub frame: Frame,
    /// Bounding boxes of every qualifying region.
    pub regions: Vec<Rect>,
}
