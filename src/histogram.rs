use opencv::{core::Mat, prelude::*};

use crate::error::{LaneDetectionResult, LaneError};

/// Bird's-eye 이진 영상의 아래쪽 절반에서 열(column)별 차선 픽셀 개수를 셉니다.
///
/// 0보다 큰 픽셀은 값과 무관하게 1로 셉니다. 따라서 히스토그램의 합은
/// 아래쪽 절반의 양수 픽셀 개수와 같고, 길이는 영상 폭과 같습니다.
///
/// # 에러
/// * 행이나 열이 0개인 영상, 단일 채널 8비트가 아닌 영상은 `InvalidInput`
pub fn generate_histogram(binary_img: &Mat) -> LaneDetectionResult<Vec<u32>> {
    check_binary(binary_img)?;

    let rows = binary_img.rows();
    let cols = binary_img.cols() as usize;
    let mut hist = vec![0u32; cols];

    for y in rows / 2..rows {
        let row = binary_img.at_row::<u8>(y)?;
        for (bin, &px) in hist.iter_mut().zip(row.iter()) {
            if px != 0 {
                *bin += 1;
            }
        }
    }

    Ok(hist)
}

/// 히스토그램을 좌/우 절반으로 나눠 각 절반의 최댓값 위치를 반환합니다.
/// 동일한 최댓값이 여러 개면 가장 왼쪽 위치를 택합니다.
pub fn histogram_peaks(hist: &[u32]) -> LaneDetectionResult<(usize, usize)> {
    if hist.len() < 2 {
        return Err(LaneError::InvalidInput(format!(
            "histogram needs at least 2 bins, got {}",
            hist.len()
        )));
    }
    let midpoint = hist.len() / 2;
    let left = argmax(&hist[..midpoint]);
    let right = midpoint + argmax(&hist[midpoint..]);
    Ok((left, right))
}

fn argmax(values: &[u32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// 단일 채널(CV_8UC1)이며 비어 있지 않은 영상인지 확인합니다.
pub(crate) fn check_binary(img: &Mat) -> LaneDetectionResult<()> {
    if img.rows() <= 0 || img.cols() <= 0 {
        return Err(LaneError::InvalidInput(format!(
            "empty image ({}x{})",
            img.cols(),
            img.rows()
        )));
    }
    if img.typ() != opencv::core::CV_8UC1 {
        return Err(LaneError::InvalidInput(format!(
            "expected a single-channel 8-bit image, got {} channel(s)",
            img.channels()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Rect, Scalar, CV_8UC1, CV_8UC3};
    use opencv::imgproc;

    fn blank(rows: i32, cols: i32) -> Mat {
        Mat::zeros(rows, cols, CV_8UC1).unwrap().to_mat().unwrap()
    }

    fn fill(img: &mut Mat, rect: Rect, value: f64) {
        imgproc::rectangle(img, rect, Scalar::all(value), -1, imgproc::LINE_8, 0).unwrap();
    }

    #[test]
    fn counts_only_bottom_half() {
        let mut img = blank(100, 40);
        // 위쪽 절반: 무시되어야 함
        fill(&mut img, Rect::new(0, 0, 40, 50), 255.0);
        // 아래쪽 절반: 열 10..15, 행 60..80
        fill(&mut img, Rect::new(10, 60, 5, 20), 255.0);

        let hist = generate_histogram(&img).unwrap();
        assert_eq!(hist.len(), 40);
        assert_eq!(hist.iter().sum::<u32>(), 5 * 20);
        assert_eq!(hist[12], 20);
        assert_eq!(hist[0], 0);
    }

    #[test]
    fn sum_matches_positive_pixel_count() {
        let mut img = blank(60, 30);
        for (y, x) in [(31, 2), (40, 7), (59, 29), (45, 7), (10, 3)] {
            *img.at_2d_mut::<u8>(y, x).unwrap() = 1 + x as u8;
        }
        let hist = generate_histogram(&img).unwrap();
        assert_eq!(hist.iter().sum::<u32>(), 4);
        assert_eq!(hist[7], 2);
    }

    #[test]
    fn rejects_empty_and_color_images() {
        assert!(matches!(
            generate_histogram(&Mat::default()),
            Err(LaneError::InvalidInput(_))
        ));
        let color = Mat::zeros(10, 10, CV_8UC3).unwrap().to_mat().unwrap();
        assert!(matches!(
            generate_histogram(&color),
            Err(LaneError::InvalidInput(_))
        ));
    }

    #[test]
    fn peaks_per_half() {
        let mut hist = vec![0u32; 10];
        hist[2] = 5;
        hist[3] = 5;
        hist[8] = 9;
        assert_eq!(histogram_peaks(&hist).unwrap(), (2, 8));
        assert_eq!(histogram_peaks(&[0; 10]).unwrap(), (0, 5));
        assert!(histogram_peaks(&[1]).is_err());
    }
}
