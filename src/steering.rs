use opencv::core::Point;
use serde::{Deserialize, Serialize};

use crate::error::LaneDetectionResult;
use crate::lane_info::{LanePixelSet, LaneSide};
use crate::polyfit::{fit_polynomial, PolynomialCoefficients};

/// 중앙선을 어떤 방식으로 만들지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralLineStrategy {
    /// 기준 차선 하나를 고정 픽셀만큼 옆으로 이동
    Offset,
    /// 좌/우 피팅 곡선의 평균
    Midpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub strategy: CentralLineStrategy,
    /// `Offset` 방식에서 기준으로 삼을 차선
    pub reference_side: LaneSide,
    /// 기준 차선에서 중앙선까지의 가로 거리 (px)
    pub lateral_offset: i32,
    /// 차량 위치(영상 하단)에서 앞쪽으로 내다볼 거리 (row 단위)
    pub lookahead_rows: f64,
    /// 이 각도 이하(절댓값)는 직진으로 판단 (도)
    pub straight_threshold_deg: f64,
    /// 조향각 최대 절댓값 (도)
    pub max_angle_deg: f64,
    /// Bird's-eye 영상 1px 당 실제 거리 (m)
    pub meters_per_pixel: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            strategy: CentralLineStrategy::Offset,
            reference_side: LaneSide::Left,
            lateral_offset: 320,
            lookahead_rows: 360.0,
            straight_threshold_deg: 2.0,
            max_angle_deg: 45.0,
            meters_per_pixel: 30.0 / 720.0,
        }
    }
}

/// 추정된 차량 진행 경로 (Bird's-eye 좌표, `Point { x: col, y: row }`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CentralLine {
    pub points: Vec<Point>,
}

impl CentralLine {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 중앙선 점들에 `col = f(row)` 다항식을 피팅합니다.
    pub fn fit(&self, order: usize) -> LaneDetectionResult<PolynomialCoefficients> {
        let samples: Vec<(i32, i32)> = self.points.iter().map(|p| (p.y, p.x)).collect();
        fit_polynomial(&samples, order)
    }
}

/// 기준 차선의 각 픽셀 `(row, col)`을 가로로 `lateral_offset`만큼 옮겨 중앙선을 만듭니다.
/// 오른쪽 차선을 기준으로 할 때는 음수 offset을 넘기면 됩니다.
pub fn derive_central_line(lane: &LanePixelSet, lateral_offset: i32) -> CentralLine {
    let points = lane
        .iter()
        .map(|&(row, col)| Point::new(col + lateral_offset, row))
        .collect();
    CentralLine { points }
}

/// 좌/우 피팅 곡선의 평균을 `rows` 구간에서 샘플링해 중앙선을 만듭니다.
pub fn derive_midline(
    left: &PolynomialCoefficients,
    right: &PolynomialCoefficients,
    rows: std::ops::Range<i32>,
) -> CentralLine {
    let mid = left.midpoint(right);
    let points = rows
        .map(|row| Point::new(mid.eval(row as f64).round() as i32, row))
        .collect();
    CentralLine { points }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnDirection {
    Left,
    Straight,
    Right,
}

impl TurnDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Straight => "STRAIGHT",
            Self::Right => "RIGHT",
        }
    }
}

/// 한 프레임의 조향 판단 결과
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurnEstimate {
    /// 부호 있는 조향각 (도, 양수 = 우회전)
    pub angle_deg: f64,
    pub direction: TurnDirection,
    /// 곡률 반경 (px). 직선이면 무한대
    pub radius_px: f64,
    /// 곡률 반경 (m)
    pub radius_m: f64,
}

/// 중앙선 다항식으로부터 조향각을 계산합니다.
///
/// 차량은 `eval_row`(보통 영상 맨 아래)에 있고 row가 줄어드는 방향으로 전진합니다.
/// `lookahead`만큼 앞의 목표점을 1차/2차 도함수로 근사하고, 그 방향의 각도를 반환합니다.
pub fn compute_turn_angle(central: &PolynomialCoefficients, eval_row: f64, lookahead: f64) -> f64 {
    let lookahead = lookahead.max(1.0);
    let d1 = central.derivative(eval_row);
    let d2 = central.second_derivative(eval_row);
    // row가 -L 만큼 변할 때의 x 변화량 (Taylor 2차)
    let dx = -d1 * lookahead + 0.5 * d2 * lookahead * lookahead;
    (dx / lookahead).atan().to_degrees()
}

/// 곡률 반경 `R = (1 + f'^2)^(3/2) / |f''|` (px). `f'' == 0`이면 무한대.
pub fn compute_radius_of_curve(central: &PolynomialCoefficients, eval_row: f64) -> f64 {
    let d1 = central.derivative(eval_row);
    let d2 = central.second_derivative(eval_row);
    if d2.abs() < f64::EPSILON {
        return f64::INFINITY;
    }
    (1.0 + d1 * d1).powf(1.5) / d2.abs()
}

pub fn estimate_turn(central: &PolynomialCoefficients, eval_row: f64, config: &SteeringConfig) -> TurnEstimate {
    let max = config.max_angle_deg.abs();
    let angle_deg = compute_turn_angle(central, eval_row, config.lookahead_rows).clamp(-max, max);
    let direction = if angle_deg.abs() <= config.straight_threshold_deg {
        TurnDirection::Straight
    } else if angle_deg > 0.0 {
        TurnDirection::Right
    } else {
        TurnDirection::Left
    };
    let radius_px = compute_radius_of_curve(central, eval_row);
    TurnEstimate {
        angle_deg,
        direction,
        radius_px,
        radius_m: radius_px * config.meters_per_pixel,
    }
}
