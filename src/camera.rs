//! OpenCV collaborators
//!
//! Webcam capture, a highgui preview window with the overlay drawn in,
//! and a 68-point LBF facemark extractor behind a Haar-cascade face
//! finder. Each type releases its native handle in `Drop`.

use crate::config::CameraConfig;
use crate::frame::{Display, FrameError, FrameSource, LandmarkExtractor, Overlay};
use crate::geometry::{LandmarkPoint, MouthPoints};
use crate::landmarks::MouthLandmarkIndices;
use opencv::core::{Mat, Point, Point2f, Rect, Scalar, Size, Vector};
use opencv::prelude::*;
use opencv::{face, highgui, imgproc, objdetect, videoio};
use tracing::{debug, info, warn};

const ESC_KEY: i32 = 27;

fn bgr(b: f64, g: f64, r: f64) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

fn to_point(p: &LandmarkPoint) -> Point {
    Point::new(p.x as i32, p.y as i32)
}

/// Webcam frame source
pub struct OpenCvCamera {
    capture: videoio::VideoCapture,
    index: i32,
}

impl OpenCvCamera {
    /// Open capture device `index`; fails if the device cannot be opened
    pub fn open(index: i32) -> Result<Self, FrameError> {
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|e| FrameError::SourceUnavailable(e.to_string()))?;

        let opened = capture
            .is_opened()
            .map_err(|e| FrameError::SourceUnavailable(e.to_string()))?;
        if !opened {
            return Err(FrameError::SourceUnavailable(format!(
                "could not open camera {}",
                index
            )));
        }

        info!("Opened camera {}", index);
        Ok(Self { capture, index })
    }
}

impl FrameSource for OpenCvCamera {
    type Frame = Mat;

    fn next_frame(&mut self) -> Result<Option<Mat>, FrameError> {
        let mut frame = Mat::default();
        let ok = self
            .capture
            .read(&mut frame)
            .map_err(|e| FrameError::Read(e.to_string()))?;

        if !ok || frame.rows() == 0 {
            return Ok(None);
        }

        Ok(Some(frame))
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("Failed to release camera {}: {}", self.index, e);
        } else {
            debug!("Released camera {}", self.index);
        }
    }
}

/// Preview window
pub struct OpenCvDisplay {
    window: String,
}

impl OpenCvDisplay {
    pub fn new(title: impl Into<String>) -> Result<Self, FrameError> {
        let window = title.into();
        highgui::named_window(&window, highgui::WINDOW_AUTOSIZE)
            .map_err(|e| FrameError::Display(e.to_string()))?;
        Ok(Self { window })
    }
}

impl Display<Mat> for OpenCvDisplay {
    fn show(&mut self, frame: &mut Mat, overlay: &Overlay) -> Result<(), FrameError> {
        draw_overlay(frame, overlay).map_err(|e| FrameError::Display(e.to_string()))?;
        highgui::imshow(&self.window, &*frame).map_err(|e| FrameError::Display(e.to_string()))
    }

    fn poll_stop(&mut self) -> Result<bool, FrameError> {
        let key = highgui::wait_key(1).map_err(|e| FrameError::Display(e.to_string()))? & 0xFF;
        Ok(key == ESC_KEY || key == 'q' as i32)
    }
}

impl Drop for OpenCvDisplay {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.window) {
            warn!("Failed to close window {:?}: {}", self.window, e);
        }
    }
}

/// Draw mouth points, ratio text, alert banner and FPS onto a BGR frame
fn draw_overlay(frame: &mut Mat, overlay: &Overlay) -> opencv::Result<()> {
    let green = bgr(0.0, 255.0, 0.0);

    if let Some(mouth) = overlay.mouth {
        let top = to_point(&mouth.top);
        let bottom = to_point(&mouth.bottom);

        imgproc::circle(frame, top, 2, green, -1, imgproc::LINE_8, 0)?;
        imgproc::circle(frame, bottom, 2, green, -1, imgproc::LINE_8, 0)?;
        imgproc::line(frame, top, bottom, green, 1, imgproc::LINE_8, 0)?;
        imgproc::line(
            frame,
            to_point(&mouth.left),
            to_point(&mouth.right),
            bgr(255.0, 0.0, 0.0),
            1,
            imgproc::LINE_8,
            0,
        )?;
    }

    if let Some(text) = overlay.ratio_text() {
        put_text(frame, &text, Point::new(10, 30), 0.7, bgr(0.0, 255.0, 255.0), 2)?;
    }

    if let Some(banner) = overlay.banner_text() {
        put_text(frame, banner, Point::new(10, 70), 1.0, bgr(0.0, 0.0, 255.0), 3)?;
    }

    if let Some(text) = overlay.fps_text() {
        let bottom = frame.rows() - 10;
        put_text(frame, &text, Point::new(10, bottom), 0.6, bgr(200.0, 200.0, 200.0), 1)?;
    }

    Ok(())
}

fn put_text(
    frame: &mut Mat,
    text: &str,
    origin: Point,
    scale: f64,
    color: Scalar,
    thickness: i32,
) -> opencv::Result<()> {
    imgproc::put_text(
        frame,
        text,
        origin,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        thickness,
        imgproc::LINE_8,
        false,
    )
}

/// Haar-cascade face finder plus LBF 68-point facemarks
pub struct LbfLandmarkExtractor {
    cascade: objdetect::CascadeClassifier,
    facemark: opencv::core::Ptr<face::Facemark>,
    indices: MouthLandmarkIndices,
    min_face_size: i32,
}

impl LbfLandmarkExtractor {
    pub fn from_config(config: &CameraConfig) -> Result<Self, FrameError> {
        let cascade_path = config.cascade_path.to_string_lossy();
        let model_path = config.facemark_model_path.to_string_lossy();

        let cascade = objdetect::CascadeClassifier::new(&cascade_path)
            .map_err(|e| FrameError::Extraction(format!("{}: {}", cascade_path, e)))?;
        if cascade.empty().unwrap_or(true) {
            return Err(FrameError::Extraction(format!(
                "could not load face cascade {}",
                cascade_path
            )));
        }

        let mut facemark =
            face::create_facemark_lbf().map_err(|e| FrameError::Extraction(e.to_string()))?;
        facemark
            .load_model(&model_path)
            .map_err(|e| FrameError::Extraction(format!("{}: {}", model_path, e)))?;

        info!("Loaded face cascade {} and facemark model {}", cascade_path, model_path);

        Ok(Self {
            cascade,
            facemark,
            indices: MouthLandmarkIndices::ibug68(),
            min_face_size: config.min_face_size,
        })
    }

    fn largest_face(&mut self, frame: &Mat) -> opencv::Result<Option<Rect>> {
        let mut gray = Mat::default();
        imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        let mut equalized = Mat::default();
        imgproc::equalize_hist(&gray, &mut equalized)?;

        let mut faces = Vector::<Rect>::new();
        self.cascade.detect_multi_scale(
            &equalized,
            &mut faces,
            1.1,
            3,
            0,
            Size::new(self.min_face_size, self.min_face_size),
            Size::default(),
        )?;

        Ok(faces.iter().max_by_key(|r| r.width * r.height))
    }
}

impl LandmarkExtractor<Mat> for LbfLandmarkExtractor {
    fn extract(&mut self, frame: &Mat) -> Result<Option<MouthPoints>, FrameError> {
        let face_rect = match self
            .largest_face(frame)
            .map_err(|e| FrameError::Extraction(e.to_string()))?
        {
            Some(rect) => rect,
            None => return Ok(None),
        };

        let faces = Vector::<Rect>::from_iter([face_rect]);
        let mut landmarks = Vector::<Vector<Point2f>>::new();
        let fitted = self
            .facemark
            .fit(frame, &faces, &mut landmarks)
            .map_err(|e| FrameError::Extraction(e.to_string()))?;

        if !fitted || landmarks.is_empty() {
            return Ok(None);
        }

        let points: Vec<LandmarkPoint> = landmarks
            .get(0)
            .map_err(|e| FrameError::Extraction(e.to_string()))?
            .iter()
            .map(|p| LandmarkPoint::new(p.x, p.y))
            .collect();

        Ok(MouthPoints::from_pixels(&points, &self.indices))
    }
}
