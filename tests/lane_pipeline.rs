use approx::assert_abs_diff_eq;
use opencv::{
    core::{Mat, Point2f, Rect, Scalar, CV_8UC1},
    imgproc,
    prelude::*,
};

use lane_steering::config::PerspectiveConfig;
use lane_steering::image_processing::PerspectiveTransform;
use lane_steering::{generate_histogram, Config, LaneExtractor, LaneSide, Pipeline, SlidingWindowConfig};

fn two_stripes() -> Mat {
    let mut img = Mat::zeros(720, 1280, CV_8UC1).unwrap().to_mat().unwrap();
    for x in [300, 950] {
        imgproc::rectangle(
            &mut img,
            Rect::new(x - 10, 0, 20, 720),
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
fn two_vertical_stripes_are_found() {
    let img = two_stripes();
    let hist = generate_histogram(&img).unwrap();
    assert_eq!(hist.len(), 1280);
    assert_eq!(hist.iter().map(|&v| v as u64).sum::<u64>(), 40 * 360);

    let mut extractor = LaneExtractor::new(SlidingWindowConfig::default());
    let left = extractor.extract_lane(&img, &hist, LaneSide::Left).unwrap();
    let right = extractor.extract_lane(&img, &hist, LaneSide::Right).unwrap();

    let left_mean = left.pixels.mean_col().unwrap();
    let right_mean = right.pixels.mean_col().unwrap();
    assert_abs_diff_eq!(left_mean, 300.0, epsilon = 10.0);
    assert_abs_diff_eq!(right_mean, 950.0, epsilon = 10.0);

    let left_fit = extractor.fit(LaneSide::Left).unwrap();
    let right_fit = extractor.fit(LaneSide::Right).unwrap();
    assert!(left_fit.fresh && right_fit.fresh);
    assert_eq!(left_fit.coeffs.order(), 2);
    assert_abs_diff_eq!(left_fit.coeffs.eval(100.0), left_mean, epsilon = 1.0);
    assert_abs_diff_eq!(right_fit.coeffs.eval(600.0), right_mean, epsilon = 1.0);
}

#[test]
fn perspective_corners_round_trip() {
    let transform = PerspectiveTransform::from_config(&PerspectiveConfig::default(), 1280, 720).unwrap();
    let src: Vec<Point2f> = PerspectiveConfig::default()
        .src_quad
        .iter()
        .map(|p| Point2f::new(p[0], p[1]))
        .collect();

    let warped = transform.project_points(&src, false).unwrap();
    let expected = [(0.0, 0.0), (1280.0, 0.0), (1280.0, 720.0), (0.0, 720.0)];
    for (p, (x, y)) in warped.iter().zip(expected) {
        assert_abs_diff_eq!(p.x, x, epsilon = 0.5);
        assert_abs_diff_eq!(p.y, y, epsilon = 0.5);
    }

    let back = transform.project_points(&warped, true).unwrap();
    for (p, q) in back.iter().zip(&src) {
        assert_abs_diff_eq!(p.x, q.x, epsilon = 0.5);
        assert_abs_diff_eq!(p.y, q.y, epsilon = 0.5);
    }
}

#[test]
fn pipeline_reports_straight_road() {
    let mut pipeline = Pipeline::new(Config::default()).unwrap();
    let det = pipeline.detect(&two_stripes()).unwrap();
    let turn = det.turn.unwrap();
    assert_eq!(turn.direction, lane_steering::TurnDirection::Straight);
    assert!(turn.radius_m.is_infinite() || turn.radius_m > 1000.0);
}
