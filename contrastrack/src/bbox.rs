//! Bounding box conversions and pairwise IoU / GIoU matrices

use ndarray::prelude::*;
use rayon::prelude::*;
use std::fmt;

/// Corner-format bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox<T = f32> {
    pub xmin: T,
    pub ymin: T,
    pub xmax: T,
    pub ymax: T,
}

impl Bbox<f32> {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Create from center format [center_x, center_y, width, height]
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            xmin: cx - 0.5 * w,
            ymin: cy - 0.5 * h,
            xmax: cx + 0.5 * w,
            ymax: cy + 0.5 * h,
        }
    }

    /// Read the first four values of a row as [xmin, ymin, xmax, ymax]
    fn from_row(row: ArrayView1<f32>) -> Self {
        Self::new(row[0], row[1], row[2], row[3])
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f32 {
        (self.xmin + self.xmax) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.ymin + self.ymax) / 2.0
    }

    /// Convert to bounds array [xmin, ymin, xmax, ymax]
    pub fn to_bounds(&self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    /// Strict containment of a point
    pub fn contains_strict(&self, x: f32, y: f32) -> bool {
        x > self.xmin && x < self.xmax && y > self.ymin && y < self.ymax
    }
}

impl<T: fmt::Display> fmt::Display for Bbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bbox({}, {}, {}, {})",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

/// Intersection area and union area of two boxes
fn intersection_union(bbox1: &Bbox<f32>, bbox2: &Bbox<f32>) -> (f32, f32) {
    let w = (bbox1.xmax.min(bbox2.xmax) - bbox1.xmin.max(bbox2.xmin)).max(0.0);
    let h = (bbox1.ymax.min(bbox2.ymax) - bbox1.ymin.max(bbox2.ymin)).max(0.0);
    let intersection = w * h;
    (intersection, bbox1.area() + bbox2.area() - intersection)
}

/// Calculate IoU between two bounding boxes
pub fn calculate_iou(bbox1: &Bbox<f32>, bbox2: &Bbox<f32>) -> f32 {
    let (intersection, union) = intersection_union(bbox1, bbox2);
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Generalized IoU: IoU minus the share of the enclosing box not covered by the union
pub fn calculate_giou(bbox1: &Bbox<f32>, bbox2: &Bbox<f32>) -> f32 {
    let (intersection, union) = intersection_union(bbox1, bbox2);
    let iou = if union > 0.0 {
        intersection / union
    } else {
        0.0
    };

    let enclosing = Bbox::new(
        bbox1.xmin.min(bbox2.xmin),
        bbox1.ymin.min(bbox2.ymin),
        bbox1.xmax.max(bbox2.xmax),
        bbox1.ymax.max(bbox2.ymax),
    );
    let enclosing_area = enclosing.area().max(0.0);

    if enclosing_area > 0.0 {
        iou - (enclosing_area - union) / enclosing_area
    } else {
        iou
    }
}

/// Convert Nx4 [cx, cy, w, h] rows to Nx4 [x1, y1, x2, y2]
pub fn box_cxcywh_to_xyxy(boxes: ArrayView2<f32>) -> Array2<f32> {
    let mut out = Array2::zeros((boxes.nrows(), 4));
    for (src, mut dst) in boxes.outer_iter().zip(out.outer_iter_mut()) {
        let b = Bbox::from_cxcywh(src[0], src[1], src[2], src[3]);
        dst.assign(&aview1(&b.to_bounds()));
    }
    out
}

/// Area of each Nx4 corner-format box
pub fn box_area(boxes: ArrayView2<f32>) -> Array1<f32> {
    boxes
        .outer_iter()
        .map(|row| Bbox::from_row(row).area())
        .collect()
}

/// Evaluate `metric` on every pair of rows, parallel over the rows of `a`
fn pairwise<F>(a: ArrayView2<f32>, b: ArrayView2<f32>, metric: F) -> Array2<f32>
where
    F: Fn(&Bbox<f32>, &Bbox<f32>) -> f32 + Sync,
{
    let n = a.nrows();
    let m = b.nrows();

    if n == 0 || m == 0 {
        return Array2::zeros((n, m));
    }

    let b_boxes: Vec<Bbox<f32>> = b.outer_iter().map(Bbox::from_row).collect();
    let a_boxes: Vec<Bbox<f32>> = a.outer_iter().map(Bbox::from_row).collect();

    let data: Vec<f32> = a_boxes
        .par_iter()
        .flat_map_iter(|a_box| b_boxes.iter().map(|b_box| metric(a_box, b_box)).collect::<Vec<_>>())
        .collect();

    Array2::from_shape_vec((n, m), data).unwrap_or_else(|_| Array2::zeros((n, m)))
}

/// Pairwise IoU between Nx4 and Mx4 corner-format boxes, shape (N, M)
pub fn box_iou(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array2<f32> {
    pairwise(a, b, calculate_iou)
}

/// Pairwise generalized IoU between Nx4 and Mx4 corner-format boxes, shape (N, M)
pub fn generalized_box_iou(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array2<f32> {
    pairwise(a, b, calculate_giou)
}
