use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{LaneDetectionResult, LaneError};
use crate::histogram::generate_histogram;
use crate::image_processing::{composite, ImageProcessing, PerspectiveTransform};
use crate::lane_info::{LaneInfo, LaneSide};
use crate::overlay;
use crate::polyfit::PolynomialCoefficients;
use crate::sliding_window::{LaneExtractor, LaneScan};
use crate::steering::{
    derive_central_line, derive_midline, estimate_turn, CentralLine, CentralLineStrategy, TurnEstimate,
};
use crate::video::{FrameReader, FrameSource, FrameWriter, VideoSource};

/// Bird's-eye 이진 영상 한 장에 대한 검출 결과
#[derive(Debug, Clone)]
pub struct Detection {
    pub histogram: Vec<u32>,
    pub left: LaneInfo,
    pub right: LaneInfo,
    pub left_scan: LaneScan,
    pub right_scan: LaneScan,
    pub central_line: CentralLine,
    pub central_fit: Option<PolynomialCoefficients>,
    pub turn: Option<TurnEstimate>,
    /// `turn`이 이번 프레임에서 새로 계산되었는지 (false면 이전 값 유지)
    pub turn_fresh: bool,
}

impl Detection {
    pub fn lane(&self, side: LaneSide) -> &LaneInfo {
        match side {
            LaneSide::Left => &self.left,
            LaneSide::Right => &self.right,
        }
    }
}

/// 한 프레임 처리 결과: 검출 결과와 원본 위에 합성한 영상
pub struct FrameReport {
    pub frame_index: u64,
    pub detection: Detection,
    pub output: Mat,
}

/// `start_detection` 루프 통계
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub total_frames: u64,
    pub skipped_frames: u64,
    pub frames_with_turn: u64,
    pub left_misses: u64,
    pub right_misses: u64,
    pub avg_fps: f64,
}

/// 차선 검출을 프레임 단위로 수행하는 파이프라인입니다.
///
/// # 주요 멤버
///
/// - `width`, `height`: 처리 해상도 (입력 프레임은 이 크기로 리사이즈)
/// - `image_processing`: 왜곡 보정/블러/ROI/색 임계처리
/// - `perspective`: 투시/역투시 변환 행렬
/// - `extractor`: 슬라이딩 윈도우 탐색기 (앵커 이력, 차선별 다항식 보관)
/// - `central_line`, `central_fit`, `turn`: 마지막으로 유효했던 중앙선/조향 결과
/// - `stop`: 외부에서 루프를 멈추기 위한 플래그
///
/// 상태를 프레임 간에 공유하므로 스트림마다 별도의 `Pipeline`을 만들어야 합니다.
pub struct Pipeline {
    width: i32,
    height: i32,
    config: Config,
    image_processing: ImageProcessing,
    perspective: PerspectiveTransform,
    extractor: LaneExtractor,
    central_line: CentralLine,
    central_fit: Option<PolynomialCoefficients>,
    turn: Option<TurnEstimate>,
    frame_index: u64,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    /// 설정으로부터 파이프라인을 만듭니다. 투시 변환 행렬은 여기서 한 번만 계산합니다.
    pub fn new(config: Config) -> LaneDetectionResult<Self> {
        config.validate()?;
        let width = config.video.frame_width;
        let height = config.video.frame_height;

        let image_processing =
            ImageProcessing::new(&config.camera, &config.preprocessing, &config.threshold)?;
        let perspective = PerspectiveTransform::from_config(&config.perspective, width, height)?;
        let extractor = LaneExtractor::new(config.detection.clone());

        Ok(Self {
            width,
            height,
            image_processing,
            perspective,
            extractor,
            central_line: CentralLine::default(),
            central_fit: None,
            turn: None,
            frame_index: 0,
            stop: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn image_processing(&self) -> &ImageProcessing {
        &self.image_processing
    }

    pub fn perspective(&self) -> &PerspectiveTransform {
        &self.perspective
    }

    pub fn extractor(&self) -> &LaneExtractor {
        &self.extractor
    }

    /// 루프 밖에서 `true`로 바꾸면 다음 프레임 전에 `start_detection`이 끝납니다.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// 원본 프레임을 Bird's-eye 이진 영상으로 바꿉니다.
    pub fn birds_eye(&self, frame: &Mat) -> LaneDetectionResult<Mat> {
        let binary = self.image_processing.binary_image(frame)?;
        self.perspective.warp(&binary)
    }

    /// Bird's-eye 이진 영상에서 좌/우 차선, 중앙선, 조향각을 구합니다.
    ///
    /// 기준 차선의 피팅이 이번 프레임에 실패하면 중앙선/조향각은 이전 값을 유지합니다.
    pub fn detect(&mut self, birds_eye: &Mat) -> LaneDetectionResult<Detection> {
        // 1) 히스토그램
        let histogram = generate_histogram(birds_eye)?;

        // 2) 슬라이딩 윈도우
        let left_scan = self.extractor.extract_lane(birds_eye, &histogram, LaneSide::Left)?;
        let right_scan = self.extractor.extract_lane(birds_eye, &histogram, LaneSide::Right)?;
        let left = self.lane_info(&left_scan);
        let right = self.lane_info(&right_scan);

        // 3) 중앙선 + 조향각
        let steering = &self.config.steering;
        let order = self.config.detection.poly_order;
        let candidate = match steering.strategy {
            CentralLineStrategy::Offset => {
                let (reference, offset) = match steering.reference_side {
                    LaneSide::Left => (&left, steering.lateral_offset),
                    LaneSide::Right => (&right, -steering.lateral_offset),
                };
                reference
                    .is_detected()
                    .then(|| derive_central_line(&reference.pixels, offset))
            }
            CentralLineStrategy::Midpoint => match (&left.coeffs, &right.coeffs) {
                (Some(l), Some(r)) if left.is_detected() && right.is_detected() => {
                    Some(derive_midline(l, r, 0..birds_eye.rows()))
                }
                _ => None,
            },
        };

        let mut turn_fresh = false;
        if let Some(central_line) = candidate {
            match central_line.fit(order) {
                Ok(fit) => {
                    let eval_row = (birds_eye.rows() - 1) as f64;
                    let turn = estimate_turn(&fit, eval_row, steering);
                    debug!(
                        angle = turn.angle_deg,
                        direction = turn.direction.as_str(),
                        radius_px = turn.radius_px,
                        "turn estimate"
                    );
                    self.central_line = central_line;
                    self.central_fit = Some(fit);
                    self.turn = Some(turn);
                    turn_fresh = true;
                }
                Err(LaneError::UnderdeterminedFit { distinct, required }) => {
                    warn!(distinct, required, "central line fit underdetermined, holding last turn");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Detection {
            histogram,
            left,
            right,
            left_scan,
            right_scan,
            central_line: self.central_line.clone(),
            central_fit: self.central_fit.clone(),
            turn: self.turn,
            turn_fresh,
        })
    }

    fn lane_info(&self, scan: &LaneScan) -> LaneInfo {
        let mut info = LaneInfo::new(scan.side);
        info.pixels = scan.pixels.clone();
        if let Some(stored) = self.extractor.fit(scan.side) {
            info.coeffs = Some(stored.coeffs.clone());
            info.fresh = stored.fresh;
        }
        info
    }

    /// 단일 프레임에 대한 전체 차선 인식 처리 과정입니다.
    ///
    /// 1) 해상도 맞추기
    /// 2) 왜곡 보정 → 블러 → ROI → 색 임계처리 → Bird's-eye 변환
    /// 3) 히스토그램 → 슬라이딩 윈도우 → 다항식 피팅
    /// 4) 중앙선 / 조향각
    /// 5) 오버레이를 역투시 변환해 원본과 합성
    pub fn processing(&mut self, frame: &Mat) -> LaneDetectionResult<FrameReport> {
        if frame.empty() {
            return Err(LaneError::InvalidInput("empty frame".to_string()));
        }
        self.frame_index += 1;

        let img = self.fit_to_size(frame)?;
        let birds_eye = self.birds_eye(&img)?;
        let detection = self.detect(&birds_eye)?;

        let mut windows = detection.left_scan.windows.clone();
        windows.extend_from_slice(&detection.right_scan.windows);
        let overlay_img = overlay::draw_detection(
            Size::new(self.width, self.height),
            &[&detection.left, &detection.right],
            &windows,
            &detection.central_line,
            detection.central_fit.as_ref(),
        )?;
        let unwarped = self.perspective.unwarp(&overlay_img)?;
        let mut output = composite(&img, &unwarped)?;
        overlay::annotate_turn(&mut output, detection.turn.as_ref(), !detection.turn_fresh)?;

        Ok(FrameReport {
            frame_index: self.frame_index,
            detection,
            output,
        })
    }

    /// 프레임을 처리 해상도로 맞춥니다.
    fn fit_to_size(&self, frame: &Mat) -> LaneDetectionResult<Mat> {
        if frame.cols() == self.width && frame.rows() == self.height {
            return Ok(frame.try_clone()?);
        }
        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            Size::new(self.width, self.height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        Ok(resized)
    }

    /// 차선 검출 루프를 실행합니다.
    ///
    /// 소스를 열 수 없으면 `SourceUnavailable`을 반환합니다. 루프 동작은 [`Pipeline::run`] 참고.
    pub fn start_detection(
        &mut self,
        source: &VideoSource,
        output: Option<&Path>,
        max_frames: Option<u64>,
    ) -> LaneDetectionResult<RunStats> {
        let mut reader = FrameReader::open(source)?;
        let mut writer = match output {
            Some(path) => Some(FrameWriter::create(path, reader.fps(), Size::new(self.width, self.height))?),
            None => None,
        };

        let stats = self.run(&mut reader, writer.as_mut(), max_frames)?;
        info!("Frames read from {}: {}", source, reader.frames_read);
        Ok(stats)
    }

    /// `frames`가 끝나거나(`Ok(None)`), `max_frames`에 도달하거나, `stop_handle`이
    /// 설정될 때까지 프레임을 처리합니다.
    ///
    /// 프레임 처리 실패는 로그만 남기고 다음 프레임으로 넘어갑니다.
    /// 프레임 읽기 실패는 스트림 단위 실패이므로 그대로 반환합니다.
    pub fn run<S: FrameSource>(
        &mut self,
        frames: &mut S,
        mut writer: Option<&mut FrameWriter>,
        max_frames: Option<u64>,
    ) -> LaneDetectionResult<RunStats> {
        let mut stats = RunStats::default();
        let started = Instant::now();

        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("Stop requested");
                break;
            }
            if max_frames.is_some_and(|max| stats.total_frames >= max) {
                info!("Reached frame limit");
                break;
            }

            let frame = match frames.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("End of stream");
                    break;
                }
                Err(e) => {
                    error!(frame = stats.total_frames + 1, "Failed to read frame: {}", e);
                    return Err(e);
                }
            };
            stats.total_frames += 1;

            match self.processing(&frame) {
                Ok(report) => {
                    let det = &report.detection;
                    if det.turn_fresh {
                        stats.frames_with_turn += 1;
                    }
                    if !det.left.is_detected() {
                        stats.left_misses += 1;
                    }
                    if !det.right.is_detected() {
                        stats.right_misses += 1;
                    }
                    if let Some(w) = writer.as_deref_mut() {
                        w.write(&report.output)?;
                    }
                }
                Err(e) => {
                    warn!(frame = stats.total_frames, "Skipping frame: {}", e);
                    stats.skipped_frames += 1;
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            stats.avg_fps = stats.total_frames as f64 / elapsed;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Rect, Scalar, CV_8UC1, CV_8UC3};
    use std::collections::VecDeque;

    fn stripes(rows: i32, cols: i32, xs: &[i32]) -> Mat {
        let mut img = Mat::zeros(rows, cols, CV_8UC1).unwrap().to_mat().unwrap();
        for &x in xs {
            imgproc::rectangle(
                &mut img,
                Rect::new(x - 10, 0, 20, rows),
                Scalar::all(255.0),
                -1,
                imgproc::LINE_8,
                0,
            )
            .unwrap();
        }
        img
    }

    #[test]
    fn offset_central_line_from_left_lane() {
        let mut pipeline = Pipeline::new(Config::default()).unwrap();
        let det = pipeline.detect(&stripes(720, 1280, &[300, 950])).unwrap();

        assert!(det.lane(LaneSide::Left).is_detected());
        assert!(det.lane(LaneSide::Right).is_detected());
        assert!(det.turn_fresh);
        let turn = det.turn.unwrap();
        assert!(turn.angle_deg.abs() < 1.0);
        let fit = det.central_fit.unwrap();
        assert!((fit.eval(360.0) - (300.0 + 320.0)).abs() < 2.0);
    }

    #[test]
    fn midpoint_strategy_averages_boundaries() {
        let mut config = Config::default();
        config.steering.strategy = CentralLineStrategy::Midpoint;
        let mut pipeline = Pipeline::new(config).unwrap();
        let det = pipeline.detect(&stripes(720, 1280, &[300, 950])).unwrap();
        let fit = det.central_fit.unwrap();
        assert!((fit.eval(700.0) - 624.5).abs() < 2.0);
    }

    #[test]
    fn holds_turn_when_reference_lane_disappears() {
        let mut pipeline = Pipeline::new(Config::default()).unwrap();
        let first = pipeline.detect(&stripes(720, 1280, &[300, 950])).unwrap();
        let second = pipeline.detect(&stripes(720, 1280, &[950])).unwrap();

        assert!(!second.left.is_detected());
        assert!(!second.turn_fresh);
        assert_eq!(second.turn, first.turn);
        assert_eq!(second.central_fit, first.central_fit);
    }

    #[test]
    fn processing_composites_full_frame() {
        let mut pipeline = Pipeline::new(Config::default()).unwrap();
        let frame = Mat::new_rows_cols_with_default(360, 640, CV_8UC3, Scalar::all(40.0)).unwrap();
        let report = pipeline.processing(&frame).unwrap();
        assert_eq!(report.frame_index, 1);
        assert_eq!(report.output.size().unwrap(), Size::new(1280, 720));
        assert!(report.detection.turn.is_none());
    }

    #[test]
    fn stop_handle_is_shared() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let stop = pipeline.stop_handle();
        stop.store(true, Ordering::Relaxed);
        assert!(pipeline.stop.load(Ordering::Relaxed));
    }

    #[test]
    fn missing_source_is_fatal() {
        let mut pipeline = Pipeline::new(Config::default()).unwrap();
        let source = VideoSource::File("/no/such/clip.mp4".into());
        assert!(matches!(
            pipeline.start_detection(&source, None, None),
            Err(LaneError::SourceUnavailable(_))
        ));
    }

    /// 미리 정해 둔 결과를 차례로 돌려주는 프레임 공급자
    struct ScriptedFrames(VecDeque<LaneDetectionResult<Option<Mat>>>);

    impl FrameSource for ScriptedFrames {
        fn next_frame(&mut self) -> LaneDetectionResult<Option<Mat>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    fn gray_frame() -> Mat {
        Mat::new_rows_cols_with_default(360, 640, CV_8UC3, Scalar::all(40.0)).unwrap()
    }

    #[test]
    fn run_stops_cleanly_at_end_of_stream() {
        let mut pipeline = Pipeline::new(Config::default()).unwrap();
        let mut frames = ScriptedFrames(VecDeque::from(vec![Ok(Some(gray_frame())), Ok(Some(gray_frame()))]));
        let stats = pipeline.run(&mut frames, None, None).unwrap();
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.skipped_frames, 0);
        assert_eq!(stats.left_misses, 2);
        assert_eq!(stats.frames_with_turn, 0);
    }

    #[test]
    fn run_returns_read_failure() {
        let mut pipeline = Pipeline::new(Config::default()).unwrap();
        let mut frames = ScriptedFrames(VecDeque::from(vec![
            Ok(Some(gray_frame())),
            Err(LaneError::InvalidInput("decoder error".to_string())),
            Ok(Some(gray_frame())),
        ]));
        assert!(matches!(
            pipeline.run(&mut frames, None, None),
            Err(LaneError::InvalidInput(_))
        ));
        assert_eq!(frames.0.len(), 1);
    }

    #[test]
    fn run_skips_bad_frames_and_honours_limit() {
        let mut pipeline = Pipeline::new(Config::default()).unwrap();
        let mut frames = ScriptedFrames(VecDeque::from(vec![
            Ok(Some(Mat::default())),
            Ok(Some(gray_frame())),
            Ok(Some(gray_frame())),
        ]));
        let stats = pipeline.run(&mut frames, None, Some(2)).unwrap();
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.skipped_frames, 1);
        assert_eq!(frames.0.len(), 1);
    }

    #[test]
    fn empty_frame_is_invalid_input() {
        let mut pipeline = Pipeline::new(Config::default()).unwrap();
        assert!(matches!(
            pipeline.processing(&Mat::default()),
            Err(LaneError::InvalidInput(_))
        ));
    }
}
