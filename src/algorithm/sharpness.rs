//! Focus sharpness metrics.
//!
//! Each metric is a weighted mean over the pixels of a [`WeightMap`], so
//! weighted ROIs bias the score towards the regions the caller cares about.

use super::statistics::WeightMap;
use afl_core::{Image, SharpnessAlgorithm};

/// Luma of a sub-rectangle, one pixel of margin included where available.
struct LumaPatch {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl LumaPatch {
    fn new(image: &Image, x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        let width = x1 - x0;
        let height = y1 - y0;
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in y0..y1 {
            for x in x0..x1 {
                values.push(image.luma(x, y).unwrap_or(0.0) as f32);
            }
        }
        Self {
            x0,
            y0,
            width,
            height,
            values,
        }
    }

    fn at(&self, x: u32, y: u32) -> f32 {
        let (lx, ly) = (x - self.x0, y - self.y0);
        self.values[ly as usize * self.width as usize + lx as usize]
    }

    fn sobel(&self, x: u32, y: u32) -> (f32, f32) {
        let p = |dx: i32, dy: i32| {
            self.at(
                (x as i64 + i64::from(dx)) as u32,
                (y as i64 + i64::from(dy)) as u32,
            )
        };
        let gx = p(1, -1) + 2.0 * p(1, 0) + p(1, 1) - p(-1, -1) - 2.0 * p(-1, 0) - p(-1, 1);
        let gy = p(-1, 1) + 2.0 * p(0, 1) + p(1, 1) - p(-1, -1) - 2.0 * p(0, -1) - p(1, -1);
        (gx, gy)
    }
}

/// Sharpness score of an image. Larger is sharper; zero when nothing is weighted.
pub fn sharpness(algorithm: SharpnessAlgorithm, image: &Image, weights: &WeightMap) -> f64 {
    let bounds = weights.bounds();
    if bounds.width == 0 || bounds.height == 0 || image.width < 3 || image.height < 3 {
        return 0.0;
    }
    let x0 = bounds.x.saturating_sub(1);
    let y0 = bounds.y.saturating_sub(1);
    let x1 = (bounds.x + bounds.width + 1).min(image.width);
    let y1 = (bounds.y + bounds.height + 1).min(image.height);
    let patch = LumaPatch::new(image, x0, y0, x1, y1);

    // Gradient metrics need a full 3x3 neighbourhood.
    let gx0 = bounds.x.max(1);
    let gy0 = bounds.y.max(1);
    let gx1 = (bounds.x + bounds.width).min(image.width - 1);
    let gy1 = (bounds.y + bounds.height).min(image.height - 1);

    let mut sum = 0.0f64;
    let mut total_weight = 0.0f64;
    match algorithm {
        SharpnessAlgorithm::Auto | SharpnessAlgorithm::Tenengrad | SharpnessAlgorithm::Sobel => {
            let squared = !matches!(algorithm, SharpnessAlgorithm::Sobel);
            for y in gy0..gy1 {
                for x in gx0..gx1 {
                    let w = weights.weight(x, y);
                    if w == 0.0 {
                        continue;
                    }
                    let (gx, gy) = patch.sobel(x, y);
                    let energy = f64::from(gx * gx + gy * gy);
                    let v = if squared { energy } else { energy.sqrt() };
                    sum += f64::from(w) * v;
                    total_weight += f64::from(w);
                }
            }
        }
        SharpnessAlgorithm::MeanScore => {
            for y in gy0..gy1 {
                for x in gx0..gx1 {
                    let w = weights.weight(x, y);
                    if w == 0.0 {
                        continue;
                    }
                    let c = patch.at(x, y);
                    let v = (patch.at(x + 1, y) - c).abs() + (patch.at(x, y + 1) - c).abs();
                    sum += f64::from(w) * f64::from(v);
                    total_weight += f64::from(w);
                }
            }
        }
        SharpnessAlgorithm::HistogramVariance => {
            let mut sum_sq = 0.0f64;
            for y in bounds.y..bounds.y + bounds.height {
                for x in bounds.x..bounds.x + bounds.width {
                    let w = f64::from(weights.weight(x, y));
                    if w == 0.0 {
                        continue;
                    }
                    let v = f64::from(patch.at(x, y));
                    sum += w * v;
                    sum_sq += w * v * v;
                    total_weight += w;
                }
            }
            if total_weight == 0.0 {
                return 0.0;
            }
            let mean = sum / total_weight;
            return (sum_sq / total_weight - mean * mean).max(0.0);
        }
    }

    if total_weight == 0.0 {
        0.0
    } else {
        sum / total_weight
    }
}
