// oak-view/src/draw.rs
// Overlay rendering and ndarray ↔ Mat conversion.

use ndarray::{Array2, Array3};
use opencv::{
    core::{Point, Rect, Scalar, CV_8UC1, CV_8UC3},
    imgproc,
    prelude::*,
};

use oak_device::Detection;

use crate::{Result, ViewError};

/// Pixel corners of a normalized detection box on a W×H frame.
/// Casts truncate toward zero, so a box never spills past the edge it
/// was computed against.
pub fn detection_rect(det: &Detection, width: u32, height: u32) -> (i32, i32, i32, i32) {
    (
        (det.xmin * width as f32) as i32,
        (det.ymin * height as f32) as i32,
        (det.xmax * width as f32) as i32,
        (det.ymax * height as f32) as i32,
    )
}

/// Draw detection boxes plus class/confidence labels in place.
pub fn draw_detections(frame: &mut Mat, detections: &[Detection]) -> Result<()> {
    let (width, height) = (frame.cols() as u32, frame.rows() as u32);
    for det in detections {
        let (x1, y1, x2, y2) = detection_rect(det, width, height);
        imgproc::rectangle(
            frame,
            Rect::new(x1, y1, x2 - x1, y2 - y1),
            Scalar::new(0.0, 255.0, 0.0, 0.0),
            2,
            imgproc::LINE_8,
            0,
        )?;
        imgproc::put_text(
            frame,
            &format!("c{} {:.2}", det.label, det.confidence),
            Point::new(x1, y1 - 5),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            Scalar::new(0.0, 255.0, 0.0, 0.0),
            1,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}

/// Text banner with a light background box, top-left corner.
pub fn draw_banner(frame: &mut Mat, text: &str) -> Result<()> {
    let mut baseline = 0;
    let size = imgproc::get_text_size(text, imgproc::FONT_HERSHEY_SIMPLEX, 0.5, 2, &mut baseline)?;
    imgproc::rectangle(
        frame,
        Rect::new(0, 0, size.width + 4, size.height + baseline + 4),
        Scalar::new(180.0, 180.0, 180.0, 0.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        frame,
        text,
        Point::new(2, size.height + 2),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        Scalar::new(0.0, 0.0, 0.0, 0.0),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

/// Apply the magma colormap to an 8-bit map.
pub fn colorize_magma(map: &Array2<u8>) -> Result<Mat> {
    let gray = mat_from_gray(map)?;
    let mut colored = Mat::default();
    imgproc::apply_color_map(&gray, &mut colored, imgproc::COLORMAP_MAGMA)?;
    Ok(colored)
}

/// Resize a Mat to the given size (linear interpolation).
pub fn resize_to(mat: &Mat, width: u32, height: u32) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::resize(
        mat,
        &mut out,
        opencv::core::Size::new(width as i32, height as i32),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(out)
}

/// Interleaved BGR (h, w, 3) → CV_8UC3 Mat.
pub fn mat_from_bgr(image: &Array3<u8>) -> Result<Mat> {
    let (h, w, c) = image.dim();
    if c != 3 {
        return Err(ViewError::BadShape(format!("expected 3 channels, got {c}")));
    }
    let bytes = image
        .as_slice()
        .ok_or_else(|| ViewError::BadShape("non-contiguous image buffer".into()))?;
    let mut mat =
        Mat::new_rows_cols_with_default(h as i32, w as i32, CV_8UC3, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(bytes);
    Ok(mat)
}

/// Single-channel (h, w) → CV_8UC1 Mat.
pub fn mat_from_gray(map: &Array2<u8>) -> Result<Mat> {
    let (h, w) = map.dim();
    let bytes = map
        .as_slice()
        .ok_or_else(|| ViewError::BadShape("non-contiguous map buffer".into()))?;
    let mut mat =
        Mat::new_rows_cols_with_default(h as i32, w as i32, CV_8UC1, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(bytes);
    Ok(mat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Detection {
        Detection { label: 15, confidence: 0.9, xmin, ymin, xmax, ymax }
    }

    #[test]
    fn rect_corners_scale_by_frame_size() {
        let d = det(0.25, 0.5, 0.75, 1.0);
        assert_eq!(detection_rect(&d, 300, 200), (75, 100, 225, 200));
    }

    #[test]
    fn rect_corners_truncate_toward_zero() {
        // 0.999 * 300 = 299.7 → 299, never rounded up to the edge + 1
        let d = det(0.001, 0.001, 0.999, 0.999);
        assert_eq!(detection_rect(&d, 300, 300), (0, 0, 299, 299));
    }

    #[test]
    fn rect_differs_per_resolution() {
        // The box is in the source frame's coordinate space; callers
        // scale by whatever frame they draw on.
        let d = det(0.0, 0.0, 0.5, 0.5);
        assert_eq!(detection_rect(&d, 300, 300), (0, 0, 150, 150));
        assert_eq!(detection_rect(&d, 1920, 1080), (0, 0, 960, 540));
    }
}
