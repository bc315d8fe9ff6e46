mod contours;
mod filters;
mod motion;
mod result;

pub use contours::{find_external_contours, Contour};
pub use filters::{abs_diff, close, gaussian_blur, threshold};
pub use motion::{
    MotionAnalyzer, MotionDetector, BLUR_KERNEL, CLOSE_KERNEL, DIFF_THRESHOLD, MIN_CONTOUR_AREA,
};
pub use result::MotionEvent;
