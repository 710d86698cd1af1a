// src/yolo.rs
//
// Learned candidate extractor: YOLOv8 (COCO, 80 classes) through ONNX Runtime.
// Emits the same DetectedObject shape as the heuristic extractor, so the
// classifier does not care which one produced the candidates.

use crate::error::{CivicError, Result};
use crate::extractor::ObjectExtractor;
use crate::image_input::validate_image;
use crate::types::{BBox, DetectedObject, ImageAnalysis};
use opencv::{
    core::{self, Mat, Size},
    imgproc,
    prelude::*,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

const INPUT_SIZE: i32 = 640;
const NUM_CLASSES: usize = 80;
const NMS_IOU_THRESHOLD: f32 = 0.45;
/// Ultralytics letterbox fill
const PAD_VALUE: f64 = 114.0;

const COCO_NAMES: [&str; NUM_CLASSES] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Raw box in original image coordinates, corner format.
#[derive(Debug, Clone)]
struct RawBox {
    bbox: [f32; 4],
    confidence: f32,
    class_id: usize,
}

/// Mapping from letterboxed model input back to the source image.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

pub struct YoloExtractor {
    session: Session,
    confidence_threshold: f32,
}

impl YoloExtractor {
    pub fn new(model_path: &str, confidence_threshold: f32) -> Result<Self> {
        info!("Loading YOLO model: {}", model_path);

        let session = Session::builder()
            .map_err(model_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_err)?
            .with_intra_threads(4)
            .map_err(model_err)?
            .commit_from_file(model_path)
            .map_err(|e| CivicError::Model(format!("failed to load {}: {}", model_path, e)))?;

        info!("✓ YOLO extractor initialized");
        Ok(Self {
            session,
            confidence_threshold,
        })
    }

    /// Letterbox to 640x640, BGR → RGB, scale to [0, 1], HWC → CHW.
    fn preprocess(&self, image: &Mat) -> Result<(Vec<f32>, Letterbox)> {
        let (w, h) = (image.cols(), image.rows());
        let scale = (INPUT_SIZE as f32 / w as f32).min(INPUT_SIZE as f32 / h as f32);
        let scaled_w = ((w as f32 * scale) as i32).max(1);
        let scaled_h = ((h as f32 * scale) as i32).max(1);

        let mut resized = Mat::default();
        imgproc::resize(
            image,
            &mut resized,
            Size::new(scaled_w, scaled_h),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let pad_left = (INPUT_SIZE - scaled_w) / 2;
        let pad_top = (INPUT_SIZE - scaled_h) / 2;
        let mut padded = Mat::default();
        core::copy_make_border(
            &resized,
            &mut padded,
            pad_top,
            INPUT_SIZE - scaled_h - pad_top,
            pad_left,
            INPUT_SIZE - scaled_w - pad_left,
            core::BORDER_CONSTANT,
            core::Scalar::all(PAD_VALUE),
        )?;

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&padded, &mut rgb, imgproc::COLOR_BGR2RGB)?;
        let rgb = if rgb.is_continuous() { rgb } else { rgb.try_clone()? };
        let bytes = rgb.data_bytes()?;

        let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
        let mut input = vec![0.0f32; 3 * plane];
        for (i, px) in bytes.chunks_exact(3).enumerate() {
            for c in 0..3 {
                input[c * plane + i] = px[c] as f32 / 255.0;
            }
        }

        Ok((
            input,
            Letterbox {
                scale,
                pad_x: pad_left as f32,
                pad_y: pad_top as f32,
            },
        ))
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
        let value = ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))
            .map_err(model_err)?;
        let outputs = self
            .session
            .run(ort::inputs!["images" => value])
            .map_err(model_err)?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(model_err)?;
        Ok(data.to_vec())
    }
}

impl ObjectExtractor for YoloExtractor {
    fn name(&self) -> &'static str {
        "yolo"
    }

    fn extract(&mut self, image: &Mat) -> Result<ImageAnalysis> {
        validate_image(image)?;
        let (input, letterbox) = self.preprocess(image)?;
        let output = self.infer(input)?;

        let boxes = nms(
            decode_output(&output, letterbox, self.confidence_threshold),
            NMS_IOU_THRESHOLD,
        );
        let (w, h) = (image.cols(), image.rows());
        let objects: Vec<DetectedObject> = boxes.iter().map(|b| to_object(b, w, h)).collect();

        debug!("YOLO extractor: {} object(s)", objects.len());
        Ok(ImageAnalysis::new(w, h, objects))
    }
}

fn model_err(e: impl std::fmt::Display) -> CivicError {
    CivicError::Model(e.to_string())
}

/// Output layout [1, 4 + classes, N]: column i is (cx, cy, w, h, scores...).
fn decode_output(output: &[f32], letterbox: Letterbox, conf_thresh: f32) -> Vec<RawBox> {
    let rows = 4 + NUM_CLASSES;
    let n = output.len() / rows;
    let mut boxes = Vec::new();

    for i in 0..n {
        let (best_class, best_conf) = (0..NUM_CLASSES)
            .map(|c| (c, output[(4 + c) * n + i]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if best_conf < conf_thresh {
            continue;
        }

        let (cx, cy, bw, bh) = (output[i], output[n + i], output[2 * n + i], output[3 * n + i]);
        let unpad = |v: f32, pad: f32| (v - pad) / letterbox.scale;
        boxes.push(RawBox {
            bbox: [
                unpad(cx - bw / 2.0, letterbox.pad_x),
                unpad(cy - bh / 2.0, letterbox.pad_y),
                unpad(cx + bw / 2.0, letterbox.pad_x),
                unpad(cy + bh / 2.0, letterbox.pad_y),
            ],
            confidence: best_conf,
            class_id: best_class,
        });
    }
    boxes
}

fn to_object(raw: &RawBox, width: i32, height: i32) -> DetectedObject {
    let x1 = (raw.bbox[0].max(0.0) as i32).min(width);
    let y1 = (raw.bbox[1].max(0.0) as i32).min(height);
    let x2 = (raw.bbox[2].max(0.0) as i32).min(width);
    let y2 = (raw.bbox[3].max(0.0) as i32).min(height);
    let bbox = BBox::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0));
    // Area comes from the unclamped float box
    let [bx1, by1, bx2, by2] = raw.bbox;
    let raw_area = (bx2 - bx1) as f64 * (by2 - by1) as f64;
    let area_percentage = raw_area / (width as f64 * height as f64) * 100.0;

    DetectedObject::new(
        COCO_NAMES[raw.class_id],
        raw.confidence,
        bbox,
        area_percentage,
    )
}

/// Greedy class-agnostic suppression, highest confidence first.
fn nms(mut boxes: Vec<RawBox>, iou_threshold: f32) -> Vec<RawBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<RawBox> = Vec::new();
    for b in boxes {
        if keep.iter().all(|k| iou(&k.bbox, &b.bbox) < iou_threshold) {
            keep.push(b);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
