use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LaneDetectionResult, LaneError};
use crate::sliding_window::SlidingWindowConfig;
use crate::steering::SteeringConfig;

/// 전체 설정. 모든 섹션은 기본값을 가지므로 YAML에는 바꾸고 싶은 항목만 적으면 됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub preprocessing: PreprocessingConfig,
    pub threshold: ThresholdConfig,
    pub perspective: PerspectiveConfig,
    pub detection: SlidingWindowConfig,
    pub steering: SteeringConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

/// 카메라 내부 파라미터와 왜곡 계수 `[k1, k2, p1, p2, k3]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion: [f64; 5],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fx: 1154.22732,
            fy: 1148.18221,
            cx: 671.627794,
            cy: 386.046312,
            distortion: [
                -0.242565104,
                -0.0477893070,
                -0.00131388084,
                -0.0000879107779,
                0.0220573263,
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// 가우시안 커널 크기 (홀수)
    pub blur_kernel: i32,
    pub blur_sigma_x: f64,
    pub blur_sigma_y: f64,
    /// 관심 영역으로 남길 row 범위 `[top, bottom)`
    pub roi_top: i32,
    pub roi_bottom: i32,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            blur_sigma_x: 0.04,
            blur_sigma_y: 0.06,
            roi_top: 429,
            roi_bottom: 672,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    Hls,
    Bgr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub color_space: ColorSpace,
    pub hls_low: [f64; 3],
    pub hls_high: [f64; 3],
    pub bgr_low: [f64; 3],
    pub bgr_high: [f64; 3],
    /// 차선이 나타나는 다각형 영역 (x, y)
    pub lane_polygon: Vec<[i32; 2]>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            color_space: ColorSpace::Hls,
            hls_low: [18.0, 97.0, 97.0],
            hls_high: [32.0, 255.0, 255.0],
            bgr_low: [200.0, 200.0, 200.0],
            bgr_high: [255.0, 255.0, 255.0],
            lane_polygon: vec![[560, 429], [690, 429], [1155, 672], [225, 672]],
        }
    }
}

/// 투시 변환용 사각형. `dst_quad`가 없으면 프레임의 네 모서리를 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveConfig {
    pub src_quad: [[f32; 2]; 4],
    pub dst_quad: Option<[[f32; 2]; 4]>,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        Self {
            src_quad: [[544.0, 462.0], [731.0, 462.0], [1268.0, 708.0], [0.0, 708.0]],
            dst_quad: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// 파일 경로 또는 카메라 번호
    pub source: String,
    pub frame_width: i32,
    pub frame_height: i32,
    /// 결과 영상을 저장할 경로
    pub output: Option<String>,
    pub max_frames: Option<u64>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            source: "./video/challenge.mp4".to_string(),
            frame_width: 1280,
            frame_height: 720,
            output: None,
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> LaneDetectionResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| LaneError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> LaneDetectionResult<Self> {
        let config: Config =
            serde_yaml::from_str(contents).map_err(|e| LaneError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LaneDetectionResult<()> {
        let d = &self.detection;
        if d.num_windows == 0 {
            return Err(invalid("detection.num_windows must be at least 1"));
        }
        if d.window_buffer == 0 {
            return Err(invalid("detection.window_buffer must be at least 1"));
        }
        if d.evict_on_overflow == 0 || d.evict_on_overflow > d.window_buffer {
            return Err(invalid(
                "detection.evict_on_overflow must be between 1 and window_buffer",
            ));
        }
        if self.video.frame_width <= 0 || self.video.frame_height <= 0 {
            return Err(invalid("video frame size must be positive"));
        }
        if self.preprocessing.blur_kernel <= 0 || self.preprocessing.blur_kernel % 2 == 0 {
            return Err(invalid("preprocessing.blur_kernel must be a positive odd number"));
        }
        if self.threshold.lane_polygon.len() < 3 {
            return Err(invalid("threshold.lane_polygon needs at least 3 vertices"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> LaneError {
    LaneError::InvalidArgument(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sliding_window::SmoothingPolicy;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.detection.poly_order, 2);
        assert_eq!(config.detection.num_windows, 8);
        assert_eq!(config.detection.window_buffer, 15);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "
camera:
  fx: 1.0
  fy: 2.0
  cx: 3.0
  cy: 4.0
detection:
  num_windows: 12
  smoothing: right_only
";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.camera.fx, 1.0);
        assert_eq!(config.camera.cy, 4.0);
        assert_eq!(config.camera.distortion, CameraConfig::default().distortion);
        assert_eq!(config.detection.num_windows, 12);
        assert_eq!(config.detection.smoothing, SmoothingPolicy::RightOnly);
        assert_eq!(config.detection.window_buffer, 15);
        assert_eq!(config.preprocessing.blur_sigma_y, 0.06);
    }

    #[test]
    fn rejects_zero_windows() {
        let err = Config::from_yaml("detection:\n  num_windows: 0\n").unwrap_err();
        assert!(matches!(err, LaneError::InvalidArgument(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        assert!(matches!(
            Config::load("/definitely/not/here.yaml"),
            Err(LaneError::Config(_))
        ));
    }
}
