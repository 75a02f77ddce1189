use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LaneError;
use crate::polyfit::PolynomialCoefficients;

/// 탐색 대상 차선의 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneSide {
    Left,
    Right,
}

impl LaneSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for LaneSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaneSide {
    type Err = LaneError;

    /// `"left"` / `"right"`(대소문자 무시) 외의 값은 `InvalidArgument`로 돌려줍니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            other => Err(LaneError::InvalidArgument(format!(
                "unknown lane side '{}', expected 'left' or 'right'",
                other
            ))),
        }
    }
}

/// 한 프레임에서 하나의 차선 경계에 속한다고 판단한 픽셀 좌표 모음입니다.
///
/// 좌표는 `(row, col)` 순서, 즉 `(y, x)`로 저장합니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanePixelSet {
    points: Vec<(i32, i32)>,
}

impl LanePixelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: i32, col: i32) {
        self.points.push((row, col));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(i32, i32)] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i32, i32)> {
        self.points.iter()
    }

    /// 모든 픽셀의 평균 열(x) 좌표. 비어 있으면 `None`.
    pub fn mean_col(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let sum: i64 = self.points.iter().map(|&(_, col)| col as i64).sum();
        Some(sum as f64 / self.points.len() as f64)
    }
}

impl FromIterator<(i32, i32)> for LanePixelSet {
    fn from_iter<I: IntoIterator<Item = (i32, i32)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// 차선 하나에 대한 프레임 단위 결과 묶음
///
/// - `pixels`: 이번 프레임에서 수집한 차선 픽셀
/// - `coeffs`: 사용 중인 다항식 계수 (이번 프레임 것이거나 이전 프레임에서 이월된 것)
/// - `fresh`: `coeffs`가 이번 프레임에서 새로 피팅된 값인지 여부
/// - `color`: 오버레이에 칠할 BGR 색상
#[derive(Debug, Clone)]
pub struct LaneInfo {
    pub side: LaneSide,
    pub pixels: LanePixelSet,
    pub coeffs: Option<PolynomialCoefficients>,
    pub fresh: bool,
    pub color: [u8; 3],
}

impl LaneInfo {
    pub fn new(side: LaneSide) -> Self {
        Self {
            side,
            pixels: LanePixelSet::new(),
            coeffs: None,
            fresh: false,
            color: default_color(side),
        }
    }

    pub fn is_detected(&self) -> bool {
        self.fresh && !self.pixels.is_empty()
    }
}

/// 왼쪽=파랑, 오른쪽=빨강 (BGR)
pub fn default_color(side: LaneSide) -> [u8; 3] {
    match side {
        LaneSide::Left => [255, 0, 0],
        LaneSide::Right => [0, 0, 255],
    }
}
