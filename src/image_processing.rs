use opencv::{
    calib3d,
    core::{self, Mat, Point, Point2f, Rect, Scalar, Size, Vector, CV_8UC1, DECOMP_LU},
    imgproc,
    prelude::*,
};
use opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT;

use crate::config::{CameraConfig, ColorSpace, PerspectiveConfig, PreprocessingConfig, ThresholdConfig};
use crate::error::{LaneDetectionResult, LaneError};

/// 카메라 보정, 노이즈 제거, ROI, 색 공간 임계처리를 담당하는 전처리기입니다.
///
/// 실제 영상 처리는 모두 OpenCV 함수 호출이며, 이 구조체는 파라미터를 보관합니다.
pub struct ImageProcessing {
    /// 카메라 내부 파라미터 (3x3, CV_64F)
    intrinsic: Mat,
    /// 왜곡 계수 (1x5, CV_64F)
    distortion: Mat,
    preprocessing: PreprocessingConfig,
    threshold: ThresholdConfig,
}

impl ImageProcessing {
    pub fn new(
        camera: &CameraConfig,
        preprocessing: &PreprocessingConfig,
        threshold: &ThresholdConfig,
    ) -> LaneDetectionResult<Self> {
        Ok(Self {
            intrinsic: intrinsic_matrix(camera.fx, camera.fy, camera.cx, camera.cy)?,
            distortion: Mat::from_slice_2d(&[camera.distortion])?,
            preprocessing: preprocessing.clone(),
            threshold: threshold.clone(),
        })
    }

    pub fn set_intrinsic(&mut self, fx: f64, fy: f64, cx: f64, cy: f64) -> LaneDetectionResult<()> {
        self.intrinsic = intrinsic_matrix(fx, fy, cx, cy)?;
        Ok(())
    }

    pub fn set_dist_coeffs(&mut self, k1: f64, k2: f64, p1: f64, p2: f64, k3: f64) -> LaneDetectionResult<()> {
        self.distortion = Mat::from_slice_2d(&[[k1, k2, p1, p2, k3]])?;
        Ok(())
    }

    pub fn set_blur_sigma(&mut self, sigma_x: f64, sigma_y: f64) {
        self.preprocessing.blur_sigma_x = sigma_x;
        self.preprocessing.blur_sigma_y = sigma_y;
    }

    pub fn set_hls_threshold(&mut self, low: [f64; 3], high: [f64; 3]) {
        self.threshold.hls_low = low;
        self.threshold.hls_high = high;
    }

    pub fn set_bgr_threshold(&mut self, low: [f64; 3], high: [f64; 3]) {
        self.threshold.bgr_low = low;
        self.threshold.bgr_high = high;
    }

    pub fn intrinsic(&self) -> &Mat {
        &self.intrinsic
    }

    pub fn dist_coeffs(&self) -> &Mat {
        &self.distortion
    }

    pub fn blur_sigma(&self) -> (f64, f64) {
        (self.preprocessing.blur_sigma_x, self.preprocessing.blur_sigma_y)
    }

    pub fn threshold(&self) -> &ThresholdConfig {
        &self.threshold
    }

    /// 카메라 왜곡을 보정합니다. 결과는 입력과 같은 크기입니다.
    pub fn undistort(&self, img: &Mat) -> LaneDetectionResult<Mat> {
        let mut dst = Mat::default();
        calib3d::undistort(img, &mut dst, &self.intrinsic, &self.distortion, &Mat::default())?;
        Ok(dst)
    }

    /// 가우시안 블러를 적용하여 영상 노이즈를 줄입니다.
    pub fn denoise(&self, img: &Mat) -> LaneDetectionResult<Mat> {
        let k = self.preprocessing.blur_kernel;
        let mut dst = Mat::default();
        imgproc::gaussian_blur(
            img,
            &mut dst,
            Size::new(k, k),
            self.preprocessing.blur_sigma_x,
            self.preprocessing.blur_sigma_y,
            core::BORDER_DEFAULT,
            ALGO_HINT_DEFAULT,
        )?;
        Ok(dst)
    }

    /// 관심 row 구간 `[roi_top, roi_bottom)`만 남기고 나머지는 0으로 채웁니다.
    pub fn roi(&self, img: &Mat) -> LaneDetectionResult<Mat> {
        let (rows, cols) = (img.rows(), img.cols());
        let top = self.preprocessing.roi_top.clamp(0, rows);
        let bottom = self.preprocessing.roi_bottom.clamp(top, rows);

        let mut mask = Mat::zeros(rows, cols, CV_8UC1)?.to_mat()?;
        imgproc::rectangle(
            &mut mask,
            Rect::new(0, top, cols, bottom - top),
            Scalar::all(255.0),
            -1,
            imgproc::LINE_8,
            0,
        )?;

        let mut dst = Mat::zeros(rows, cols, img.typ())?.to_mat()?;
        img.copy_to_masked(&mut dst, &mask)?;
        Ok(dst)
    }

    /// 색 공간 임계처리 후 차선 다각형 영역만 남긴 이진(0/255) 영상을 만듭니다.
    ///
    /// # 인자
    /// * `img` - BGR 3채널 영상
    /// * `color_space` - `Hls`면 HLS로 변환한 뒤, `Bgr`이면 그대로 범위 검사
    pub fn color_threshold(&self, img: &Mat, color_space: ColorSpace) -> LaneDetectionResult<Mat> {
        if img.channels() != 3 {
            return Err(LaneError::InvalidInput(format!(
                "color threshold expects a 3-channel BGR image, got {} channel(s)",
                img.channels()
            )));
        }

        let (converted, low, high) = match color_space {
            ColorSpace::Hls => {
                let mut hls = Mat::default();
                imgproc::cvt_color(img, &mut hls, imgproc::COLOR_BGR2HLS, 0, ALGO_HINT_DEFAULT)?;
                (hls, self.threshold.hls_low, self.threshold.hls_high)
            }
            ColorSpace::Bgr => (img.try_clone()?, self.threshold.bgr_low, self.threshold.bgr_high),
        };

        let mut thresholded = Mat::default();
        core::in_range(
            &converted,
            &Scalar::new(low[0], low[1], low[2], 0.0),
            &Scalar::new(high[0], high[1], high[2], 0.0),
            &mut thresholded,
        )?;

        let mut lane_mask = Mat::zeros(img.rows(), img.cols(), CV_8UC1)?.to_mat()?;
        let polygon: Vector<Point> = self
            .threshold
            .lane_polygon
            .iter()
            .map(|p| Point::new(p[0], p[1]))
            .collect();
        imgproc::fill_convex_poly(&mut lane_mask, &polygon, Scalar::all(255.0), imgproc::LINE_8, 0)?;

        let mut binary = Mat::default();
        core::bitwise_and(&thresholded, &lane_mask, &mut binary, &Mat::default())?;
        Ok(binary)
    }

    /// 왜곡 보정 → 블러 → ROI → 색 임계처리 순으로 원본 프레임을 이진 영상으로 바꿉니다.
    pub fn binary_image(&self, frame: &Mat) -> LaneDetectionResult<Mat> {
        let undistorted = self.undistort(frame)?;
        let denoised = self.denoise(&undistorted)?;
        let masked = self.roi(&denoised)?;
        self.color_threshold(&masked, self.threshold.color_space)
    }
}

fn intrinsic_matrix(fx: f64, fy: f64, cx: f64, cy: f64) -> LaneDetectionResult<Mat> {
    Ok(Mat::from_slice_2d(&[[fx, 0.0, cx], [0.0, fy, cy], [0.0, 0.0, 1.0]])?)
}

/// 투시 변환(전방 시야 -> Bird's-eye) 행렬과 그 역행렬
pub struct PerspectiveTransform {
    forward: Mat,
    inverse: Mat,
    size: Size,
}

impl PerspectiveTransform {
    /// `src` 사각형을 `dst` 사각형으로 보내는 변환과 역변환을 함께 계산합니다.
    pub fn new(src: &[Point2f; 4], dst: &[Point2f; 4], size: Size) -> LaneDetectionResult<Self> {
        let forward = imgproc::get_perspective_transform(
            &Mat::from_slice_2d(&[&src[..]])?,
            &Mat::from_slice_2d(&[&dst[..]])?,
            DECOMP_LU,
        )?;
        let inverse = imgproc::get_perspective_transform(
            &Mat::from_slice_2d(&[&dst[..]])?,
            &Mat::from_slice_2d(&[&src[..]])?,
            DECOMP_LU,
        )?;
        Ok(Self { forward, inverse, size })
    }

    pub fn from_config(config: &PerspectiveConfig, width: i32, height: i32) -> LaneDetectionResult<Self> {
        let src = config.src_quad.map(|p| Point2f::new(p[0], p[1]));
        let dst = match config.dst_quad {
            Some(quad) => quad.map(|p| Point2f::new(p[0], p[1])),
            None => {
                let (w, h) = (width as f32, height as f32);
                [
                    Point2f::new(0.0, 0.0),
                    Point2f::new(w, 0.0),
                    Point2f::new(w, h),
                    Point2f::new(0.0, h),
                ]
            }
        };
        Self::new(&src, &dst, Size::new(width, height))
    }

    pub fn forward(&self) -> &Mat {
        &self.forward
    }

    pub fn inverse(&self) -> &Mat {
        &self.inverse
    }

    /// Bird's-eye 시야로 변환합니다. 이진 영상이 0/255를 유지하도록 최근접 보간을 씁니다.
    pub fn warp(&self, img: &Mat) -> LaneDetectionResult<Mat> {
        warp_with(img, &self.forward, self.size, imgproc::INTER_NEAREST)
    }

    /// Bird's-eye 시야의 영상을 원근 시야로 되돌립니다.
    pub fn unwarp(&self, img: &Mat) -> LaneDetectionResult<Mat> {
        warp_with(img, &self.inverse, self.size, imgproc::INTER_LINEAR)
    }

    /// 점들을 순방향(`inverse == false`) 또는 역방향으로 변환합니다.
    pub fn project_points(&self, points: &[Point2f], inverse: bool) -> LaneDetectionResult<Vec<Point2f>> {
        let src: Vector<Point2f> = points.iter().copied().collect();
        let mut dst: Vector<Point2f> = Vector::new();
        let m = if inverse { &self.inverse } else { &self.forward };
        core::perspective_transform(&src, &mut dst, m)?;
        Ok(dst.to_vec())
    }
}

fn warp_with(img: &Mat, m: &Mat, size: Size, interpolation: i32) -> LaneDetectionResult<Mat> {
    let mut result = Mat::default();
    imgproc::warp_perspective(
        img,
        &mut result,
        m,
        size,
        interpolation,
        core::BORDER_CONSTANT,
        Scalar::default(),
    )?;
    Ok(result)
}

/// 오버레이에서 0이 아닌 픽셀만 원본 위에 덮어씁니다. 0인 픽셀 자리에는 원본이 보입니다.
pub fn composite(base: &Mat, overlay: &Mat) -> LaneDetectionResult<Mat> {
    if base.size()? != overlay.size()? || base.typ() != overlay.typ() {
        return Err(LaneError::InvalidInput(format!(
            "overlay {:?} does not match frame {:?}",
            overlay.size()?,
            base.size()?
        )));
    }

    let mut channels: Vector<Mat> = Vector::new();
    core::split(overlay, &mut channels)?;
    let mut mask = Mat::zeros(overlay.rows(), overlay.cols(), CV_8UC1)?.to_mat()?;
    for channel in channels.iter() {
        let mut merged = Mat::default();
        core::bitwise_or(&mask, &channel, &mut merged, &Mat::default())?;
        mask = merged;
    }

    let mut out = base.try_clone()?;
    overlay.copy_to_masked(&mut out, &mask)?;
    Ok(out)
}
