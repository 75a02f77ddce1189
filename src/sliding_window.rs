use opencv::{core::Mat, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LaneDetectionResult, LaneError};
use crate::histogram::{check_binary, histogram_peaks};
use crate::lane_info::{LanePixelSet, LaneSide};
use crate::polyfit::{fit_polynomial, PolynomialCoefficients};
use crate::smoother::AnchorSmoother;

/// 어느 쪽 차선의 시작 앵커에 시간 평활화를 적용할지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingPolicy {
    Both,
    RightOnly,
    Off,
}

impl SmoothingPolicy {
    fn applies_to(&self, side: LaneSide) -> bool {
        match self {
            Self::Both => true,
            Self::RightOnly => side == LaneSide::Right,
            Self::Off => false,
        }
    }
}

/// 슬라이딩 윈도우 탐색 파라미터
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlidingWindowConfig {
    /// 세로 방향 윈도우 개수
    pub num_windows: usize,
    /// 피팅할 다항식 차수
    pub poly_order: usize,
    /// 앵커 이력 버퍼 크기
    pub window_buffer: usize,
    /// 버퍼가 가득 찼을 때 한 번에 제거할 가장 오래된 값의 개수
    pub evict_on_overflow: usize,
    /// 다음 밴드로 올라갈 때 밴드 높이에 더해 건너뛸 픽셀 수
    pub band_gap: i32,
    /// 윈도우 중심을 갱신하는 데 필요한 최소 픽셀 수
    pub min_pixels: usize,
    pub smoothing: SmoothingPolicy,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            num_windows: 8,
            poly_order: 2,
            window_buffer: 15,
            evict_on_overflow: 1,
            band_gap: 0,
            min_pixels: 1,
            smoothing: SmoothingPolicy::Both,
        }
    }
}

/// 탐색에 사용한 윈도우 하나 (시각화용). 범위는 `[x_low, x_high) x [y_low, y_high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub x_low: i32,
    pub x_high: i32,
    pub y_low: i32,
    pub y_high: i32,
    pub anchor: i32,
    pub pixel_count: usize,
}

/// 한 차선에 대한 슬라이딩 윈도우 탐색 결과
#[derive(Debug, Clone)]
pub struct LaneScan {
    pub side: LaneSide,
    /// 히스토그램(및 평활화)에서 얻은 시작 앵커
    pub base: i32,
    pub pixels: LanePixelSet,
    pub windows: Vec<SearchWindow>,
}

/// 차선별로 저장해 두는 다항식 계수
#[derive(Debug, Clone)]
pub struct StoredFit {
    pub coeffs: PolynomialCoefficients,
    /// 이번 프레임에 피팅된 값이면 true, 이전 프레임에서 이월된 값이면 false
    pub fresh: bool,
}

/// 히스토그램과 이진 영상으로부터 좌/우 차선 픽셀을 찾고 다항식을 피팅합니다.
///
/// 앵커 이력과 마지막 피팅 결과는 이 구조체가 소유하며 프레임 간에 유지됩니다.
/// 스트림마다 별도 인스턴스를 사용해야 합니다.
pub struct LaneExtractor {
    config: SlidingWindowConfig,
    left_history: AnchorSmoother,
    right_history: AnchorSmoother,
    left_fit: Option<StoredFit>,
    right_fit: Option<StoredFit>,
}

impl LaneExtractor {
    pub fn new(config: SlidingWindowConfig) -> Self {
        let history = AnchorSmoother::with_eviction(config.window_buffer, config.evict_on_overflow);
        Self {
            left_history: history.clone(),
            right_history: history,
            left_fit: None,
            right_fit: None,
            config,
        }
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    pub fn history(&self, side: LaneSide) -> &AnchorSmoother {
        match side {
            LaneSide::Left => &self.left_history,
            LaneSide::Right => &self.right_history,
        }
    }

    /// 마지막으로 유효했던 피팅 결과
    pub fn fit(&self, side: LaneSide) -> Option<&StoredFit> {
        match side {
            LaneSide::Left => self.left_fit.as_ref(),
            LaneSide::Right => self.right_fit.as_ref(),
        }
    }

    /// 문자열로 차선을 지정하는 버전. 알 수 없는 문자열은 `InvalidArgument`.
    pub fn extract_lane_named(
        &mut self,
        binary_img: &Mat,
        hist: &[u32],
        side: &str,
    ) -> LaneDetectionResult<LaneScan> {
        let side = side.parse::<LaneSide>()?;
        self.extract_lane(binary_img, hist, side)
    }

    /// **슬라이딩 윈도우** 방식으로 한쪽 차선 픽셀을 수집하고 다항식을 피팅합니다.
    ///
    /// 주요 단계:
    /// 1. 히스토그램의 해당 절반에서 최댓값 위치를 시작 앵커로 잡고, 정책에 따라 평활화
    ///    (해당 절반에 픽셀이 하나도 없으면 이력을 갱신하지 않고 직전 앵커를 그대로 사용)
    /// 2. 영상을 `num_windows`개의 밴드로 나누어 아래에서 위로 탐색
    /// 3. 윈도우(폭 = 2 x 밴드 높이) 안의 양수 픽셀을 수집하고, 충분하면 평균 x로 앵커 이동
    /// 4. 수집한 픽셀로 다항식 피팅. 점이 부족하면 이전 계수를 이월
    ///
    /// 픽셀이 부족한 것은 에러가 아니며, 반환된 `LaneScan`의 픽셀 집합이 비어 있을 뿐입니다.
    pub fn extract_lane(
        &mut self,
        binary_img: &Mat,
        hist: &[u32],
        side: LaneSide,
    ) -> LaneDetectionResult<LaneScan> {
        check_binary(binary_img)?;
        let width = binary_img.cols();
        let height = binary_img.rows();
        if hist.len() != width as usize {
            return Err(LaneError::InvalidInput(format!(
                "histogram length {} does not match image width {}",
                hist.len(),
                width
            )));
        }

        // -------------------------------------------
        // 1) 시작 앵커
        // -------------------------------------------
        let (left_peak, right_peak) = histogram_peaks(hist)?;
        let peak_idx = match side {
            LaneSide::Left => left_peak,
            LaneSide::Right => right_peak,
        };
        let peak = peak_idx as i32;
        let base = if self.config.smoothing.applies_to(side) {
            let history = match side {
                LaneSide::Left => &mut self.left_history,
                LaneSide::Right => &mut self.right_history,
            };
            // 해당 절반이 비어 있으면 argmax는 의미가 없으므로 이력에 넣지 않고 직전 앵커 유지
            if hist[peak_idx] == 0 {
                history.last().unwrap_or(peak)
            } else {
                history.smooth(peak)
            }
        } else {
            peak
        };

        // -------------------------------------------
        // 2) 윈도우 탐색: 아래에서 위로
        // -------------------------------------------
        let nonzero_points_by_row = get_nonzero_points_by_row(binary_img)?;
        let (pixels, windows) = self.scan_windows(&nonzero_points_by_row, width, height, base)?;

        debug!(
            side = %side,
            peak,
            base,
            pixels = pixels.len(),
            "sliding window scan finished"
        );

        // -------------------------------------------
        // 3) 다항식 피팅 (실패 시 이전 계수 이월)
        // -------------------------------------------
        let slot = match side {
            LaneSide::Left => &mut self.left_fit,
            LaneSide::Right => &mut self.right_fit,
        };
        match fit_polynomial(pixels.points(), self.config.poly_order) {
            Ok(coeffs) => {
                *slot = Some(StoredFit { coeffs, fresh: true });
            }
            Err(LaneError::UnderdeterminedFit { distinct, required }) => {
                warn!(
                    side = %side,
                    distinct,
                    required,
                    "not enough lane pixels for a fit, keeping previous polynomial"
                );
                if let Some(prev) = slot.as_mut() {
                    prev.fresh = false;
                }
            }
            Err(e) => return Err(e),
        }

        Ok(LaneScan {
            side,
            base,
            pixels,
            windows,
        })
    }

    fn scan_windows(
        &self,
        nonzero_points_by_row: &[Vec<i32>],
        width: i32,
        height: i32,
        base: i32,
    ) -> LaneDetectionResult<(LanePixelSet, Vec<SearchWindow>)> {
        let nwindows = self.config.num_windows.max(1) as i32;
        let band_height = height / nwindows;
        if band_height <= 0 {
            return Err(LaneError::InvalidInput(format!(
                "image height {} is smaller than the window count {}",
                height, nwindows
            )));
        }
        let step = band_height + self.config.band_gap.max(0);

        let mut current = base;
        let mut pixels = LanePixelSet::new();
        let mut windows = Vec::with_capacity(nwindows as usize);

        for window_i in 0..nwindows {
            let win_y_high = height - window_i * step;
            if win_y_high <= 0 {
                break;
            }
            let win_y_low = (win_y_high - band_height).max(0);
            let win_x_low = (current - band_height).max(0);
            let win_x_high = (current + band_height).min(width);

            let mut sum_x: i64 = 0;
            let mut count = 0usize;
            for y in win_y_low..win_y_high {
                let row_nonzeros = &nonzero_points_by_row[y as usize];
                for &x in row_nonzeros.iter().filter(|&&x| x >= win_x_low && x < win_x_high) {
                    pixels.push(y, x);
                    sum_x += x as i64;
                    count += 1;
                }
            }

            windows.push(SearchWindow {
                x_low: win_x_low,
                x_high: win_x_high,
                y_low: win_y_low,
                y_high: win_y_high,
                anchor: current,
                pixel_count: count,
            });

            // 픽셀이 충분하면 그 평균 x좌표를 새 중심으로, 아니면 이전 중심 유지
            if count > 0 && count >= self.config.min_pixels {
                current = (sum_x / count as i64) as i32;
            }
        }

        Ok((pixels, windows))
    }
}

/// 이진 영상에서 각 row별로 0이 아닌 픽셀의 x좌표를 모아둔 벡터를 생성합니다.
///
/// # 반환
/// * `Vec<Vec<i32>>` : `i`번째 원소는 `i`번째 row의 nonzero 픽셀 x좌표 목록
fn get_nonzero_points_by_row(binary_img: &Mat) -> LaneDetectionResult<Vec<Vec<i32>>> {
    let rows = binary_img.rows();
    let mut result = vec![Vec::new(); rows as usize];

    for y in 0..rows {
        let row_slice = binary_img.at_row::<u8>(y)?;
        let row_vec = &mut result[y as usize];
        for (x, &px) in row_slice.iter().enumerate() {
            if px != 0 {
                row_vec.push(x as i32);
            }
        }
    }

    Ok(result)
}
