//! 단일 카메라 영상에서 차선을 찾고 조향 방향을 추정하는 라이브러리
//!
//! 처리 순서: 전처리(`image_processing`) → Bird's-eye 변환 → 히스토그램(`histogram`)
//! → 슬라이딩 윈도우(`sliding_window`) → 다항식 피팅(`polyfit`) → 중앙선/조향각(`steering`).
//! 전체 흐름은 `lane_detection::Pipeline`이 묶어서 실행합니다.

pub mod config;
pub mod error;
pub mod histogram;
pub mod image_processing;
pub mod lane_detection;
pub mod lane_info;
pub mod overlay;
pub mod polyfit;
pub mod sliding_window;
pub mod smoother;
pub mod steering;
pub mod video;

pub use config::Config;
pub use error::{LaneDetectionResult, LaneError};
pub use histogram::generate_histogram;
pub use lane_detection::{Detection, FrameReport, Pipeline, RunStats};
pub use lane_info::{LaneInfo, LanePixelSet, LaneSide};
pub use polyfit::{fit_polynomial, PolynomialCoefficients};
pub use sliding_window::{LaneExtractor, SlidingWindowConfig, SmoothingPolicy};
pub use smoother::AnchorSmoother;
pub use steering::{derive_central_line, CentralLine, TurnDirection, TurnEstimate};
pub use video::{FrameSource, VideoSource};
