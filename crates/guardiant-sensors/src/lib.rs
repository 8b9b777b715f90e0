pub mod monitor;
pub mod motion;
pub mod speed;

pub use monitor::{spawn_detector, AnomalyDetector};
pub use motion::MotionAnomalyDetector;
pub use speed::SpeedAnomalyDetector;
