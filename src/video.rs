use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use tracing::info;

use crate::error::{LaneDetectionResult, LaneError};

/// 프레임을 읽어올 곳: 동영상 파일 또는 카메라 장치 번호
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    File(PathBuf),
    Device(i32),
}

impl FromStr for VideoSource {
    type Err = LaneError;

    /// 정수로 해석되면 카메라 번호, 아니면 파일 경로
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LaneError::InvalidArgument("empty video source".to_string()));
        }
        match s.parse::<i32>() {
            Ok(index) => Ok(Self::Device(index)),
            Err(_) => Ok(Self::File(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Device(index) => write!(f, "camera #{}", index),
        }
    }
}

/// 프레임을 순서대로 공급하는 쪽. 스트림 끝은 `Ok(None)`.
pub trait FrameSource {
    fn next_frame(&mut self) -> LaneDetectionResult<Option<Mat>>;

    /// 초당 프레임 수. 알 수 없으면 0.
    fn fps(&self) -> f64 {
        0.0
    }
}

pub struct FrameReader {
    cap: VideoCapture,
    pub fps: f64,
    pub frames_read: u64,
}

impl FrameReader {
    pub fn open(source: &VideoSource) -> LaneDetectionResult<Self> {
        info!("Opening video source: {}", source);
        let cap = match source {
            VideoSource::Device(index) => VideoCapture::new(*index, videoio::CAP_ANY)?,
            VideoSource::File(path) => {
                let path_str = path
                    .to_str()
                    .ok_or_else(|| LaneError::SourceUnavailable(format!("non UTF-8 path {}", path.display())))?;
                VideoCapture::from_file(path_str, videoio::CAP_ANY)?
            }
        };

        if !cap.is_opened()? {
            return Err(LaneError::SourceUnavailable(source.to_string()));
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        info!("Video properties: {}x{} @ {:.1} FPS", width, height, fps);

        Ok(Self {
            cap,
            fps,
            frames_read: 0,
        })
    }

}

impl FrameSource for FrameReader {
    /// 다음 프레임. 스트림이 끝났거나 빈 프레임이면 `None`.
    fn next_frame(&mut self) -> LaneDetectionResult<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.cap.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        self.frames_read += 1;
        Ok(Some(frame))
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

/// 합성 결과를 동영상 파일로 저장합니다.
pub struct FrameWriter {
    writer: VideoWriter,
}

impl FrameWriter {
    pub fn create(path: &Path, fps: f64, size: Size) -> LaneDetectionResult<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| LaneError::SourceUnavailable(format!("{}: {}", dir.display(), e)))?;
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| LaneError::SourceUnavailable(format!("non UTF-8 path {}", path.display())))?;

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
        let writer = VideoWriter::new(path_str, fourcc, fps, size, true)?;
        if !writer.is_opened()? {
            return Err(LaneError::SourceUnavailable(format!("cannot write {}", path.display())));
        }
        info!("Output video: {}", path.display());
        Ok(Self { writer })
    }

    pub fn write(&mut self, frame: &Mat) -> LaneDetectionResult<()> {
        self.writer.write(frame)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_and_file() {
        assert_eq!("0".parse::<VideoSource>().unwrap(), VideoSource::Device(0));
        assert_eq!(
            "./video/challenge.mp4".parse::<VideoSource>().unwrap(),
            VideoSource::File(PathBuf::from("./video/challenge.mp4"))
        );
        assert!("  ".parse::<VideoSource>().is_err());
    }

    #[test]
    fn missing_file_is_unavailable() {
        let source = VideoSource::File(PathBuf::from("/no/such/clip.mp4"));
        assert!(matches!(
            FrameReader::open(&source),
            Err(LaneError::SourceUnavailable(_))
        ));
    }
}
