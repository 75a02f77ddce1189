use opencv::{
    core::{Mat, Point, Rect, Scalar, Size, Vector, CV_8UC1, CV_8UC3},
    imgproc,
    prelude::*,
};

use crate::error::LaneDetectionResult;
use crate::lane_info::LaneInfo;
use crate::polyfit::PolynomialCoefficients;
use crate::sliding_window::SearchWindow;
use crate::steering::{CentralLine, TurnEstimate};

const WINDOW_COLOR: [f64; 3] = [0.0, 255.0, 0.0];
const FIT_COLOR: [f64; 3] = [0.0, 255.0, 255.0];
const CENTRAL_COLOR: [f64; 3] = [255.0, 0.0, 255.0];

fn bgr(c: [f64; 3]) -> Scalar {
    Scalar::new(c[0], c[1], c[2], 255.0)
}

/// Bird's-eye 좌표계에서 검출 결과를 그린 3채널 오버레이를 만듭니다.
///
/// 배경은 0(검정)이며, 합성 단계에서 0인 픽셀은 원본 프레임으로 대체됩니다.
pub fn draw_detection(
    size: Size,
    lanes: &[&LaneInfo],
    windows: &[SearchWindow],
    central_line: &CentralLine,
    central_fit: Option<&PolynomialCoefficients>,
) -> LaneDetectionResult<Mat> {
    let mut out_img = Mat::new_size_with_default(size, CV_8UC3, Scalar::all(0.0))?;

    // 탐색 윈도우 사각형
    for w in windows {
        imgproc::rectangle(
            &mut out_img,
            Rect::new(w.x_low, w.y_low, (w.x_high - w.x_low).max(0), (w.y_high - w.y_low).max(0)),
            bgr(WINDOW_COLOR),
            2,
            imgproc::LINE_8,
            0,
        )?;
    }

    // 차선 픽셀을 마스크로 만든 뒤 차선 색으로 칠하기
    for lane in lanes {
        let mut mask = Mat::zeros(size.height, size.width, CV_8UC1)?.to_mat()?;
        for &(y, x) in lane.pixels.iter() {
            if y >= 0 && y < size.height && x >= 0 && x < size.width {
                *mask.at_2d_mut::<u8>(y, x)? = 255;
            }
        }
        let [b, g, r] = lane.color;
        out_img.set_to(&Scalar::new(b as f64, g as f64, r as f64, 255.0), &mask)?;

        if let Some(coeffs) = &lane.coeffs {
            draw_curve(&mut out_img, coeffs, size, bgr(FIT_COLOR), 3)?;
        }
    }

    match central_fit {
        Some(fit) => draw_curve(&mut out_img, fit, size, bgr(CENTRAL_COLOR), 5)?,
        None => {
            for p in &central_line.points {
                imgproc::circle(&mut out_img, *p, 1, bgr(CENTRAL_COLOR), -1, imgproc::LINE_8, 0)?;
            }
        }
    }

    Ok(out_img)
}

/// `col = f(row)` 곡선을 영상 전체 높이에 걸쳐 그립니다.
fn draw_curve(
    img: &mut Mat,
    coeffs: &PolynomialCoefficients,
    size: Size,
    color: Scalar,
    thickness: i32,
) -> LaneDetectionResult<()> {
    let curve: Vector<Point> = (0..size.height)
        .step_by(4)
        .map(|row| Point::new(coeffs.eval(row as f64).round() as i32, row))
        .filter(|p| p.x >= 0 && p.x < size.width)
        .collect();
    if curve.len() < 2 {
        return Ok(());
    }
    let mut polylines: Vector<Vector<Point>> = Vector::new();
    polylines.push(curve);
    imgproc::polylines(img, &polylines, false, color, thickness, imgproc::LINE_8, 0)?;
    Ok(())
}

/// 조향각/방향/곡률 반경 텍스트를 표시합니다.
pub fn annotate_turn(img: &mut Mat, turn: Option<&TurnEstimate>, stale: bool) -> LaneDetectionResult<()> {
    let text = match turn {
        Some(t) if t.radius_m.is_finite() => format!(
            "Angle: {:+.1} {} R={:.0}m{}",
            t.angle_deg,
            t.direction.as_str(),
            t.radius_m,
            if stale { " (held)" } else { "" }
        ),
        Some(t) => format!(
            "Angle: {:+.1} {}{}",
            t.angle_deg,
            t.direction.as_str(),
            if stale { " (held)" } else { "" }
        ),
        None => "Angle: --".to_string(),
    };
    imgproc::put_text(
        img,
        &text,
        Point::new(20, 60),
        imgproc::FONT_HERSHEY_SIMPLEX,
        1.2,
        Scalar::new(255.0, 255.0, 255.0, 255.0),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane_info::LaneSide;
    use opencv::core::Vec3b;

    #[test]
    fn paints_lane_pixels_in_lane_color() {
        let mut left = LaneInfo::new(LaneSide::Left);
        left.pixels.push(10, 20);
        let size = Size::new(64, 48);
        let img = draw_detection(size, &[&left], &[], &CentralLine::default(), None).unwrap();
        assert_eq!(img.size().unwrap(), size);
        assert_eq!(*img.at_2d::<Vec3b>(10, 20).unwrap(), Vec3b::from([255, 0, 0]));
        assert_eq!(*img.at_2d::<Vec3b>(40, 60).unwrap(), Vec3b::from([0, 0, 0]));
    }

    #[test]
    fn draws_central_curve() {
        let size = Size::new(64, 48);
        let fit = PolynomialCoefficients::new(vec![32.0]);
        let img = draw_detection(size, &[], &[], &CentralLine::default(), Some(&fit)).unwrap();
        assert_eq!(*img.at_2d::<Vec3b>(20, 32).unwrap(), Vec3b::from([255, 0, 255]));
    }

    #[test]
    fn central_curve_differs_from_windows() {
        let size = Size::new(64, 48);
        let window = SearchWindow {
            x_low: 4,
            x_high: 20,
            y_low: 4,
            y_high: 20,
            anchor: 12,
            pixel_count: 0,
        };
        let fit = PolynomialCoefficients::new(vec![40.0]);
        let img = draw_detection(size, &[], &[window], &CentralLine::default(), Some(&fit)).unwrap();
        let window_px = *img.at_2d::<Vec3b>(4, 12).unwrap();
        let central_px = *img.at_2d::<Vec3b>(30, 40).unwrap();
        assert_eq!(window_px, Vec3b::from([0, 255, 0]));
        assert_ne!(window_px, central_px);
    }
}
