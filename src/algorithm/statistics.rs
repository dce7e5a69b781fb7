//! ROI statistics and weighted-ROI weight maps.

use afl_core::{AflError, AflResult, Image, Rect, RoiCombination, RoiPreset, WeightedRoi};

/// Upper bound on the number of pixels sampled for one statistic.
const MAX_SAMPLES: u64 = 1 << 18;

/// Resolve the configured ROI (or preset) against a frame.
pub fn resolve_roi(roi: Rect, preset: Option<RoiPreset>, image: &Image) -> AflResult<Rect> {
    let rect = match preset {
        Some(RoiPreset::Center) => Rect::centered(image.width, image.height),
        None => roi,
    };
    rect.clip_to(image.width, image.height).ok_or_else(|| {
        AflError::InvalidParameter(format!(
            "ROI {rect} lies outside the {}x{} frame",
            image.width, image.height
        ))
    })
}

/// Pixel stride keeping a statistic under [`MAX_SAMPLES`] samples.
fn stride(rect: &Rect) -> u32 {
    let area = rect.area();
    if area <= MAX_SAMPLES {
        return 1;
    }
    ((area as f64 / MAX_SAMPLES as f64).sqrt().ceil() as u32).max(1)
}

fn sample_points(rect: Rect) -> impl Iterator<Item = (u32, u32)> {
    let step = stride(&rect) as usize;
    (rect.y..rect.y + rect.height)
        .step_by(step)
        .flat_map(move |y| (rect.x..rect.x + rect.width).step_by(step).map(move |x| (x, y)))
}

/// Mean luma of the ROI after discarding the brightest `100 - percentile`
/// percent of the sampled pixels. At least one pixel is always kept.
pub fn luma_statistic(image: &Image, rect: Rect, percentile: f64) -> f64 {
    let mut histogram = [0u64; 256];
    let mut total = 0u64;
    for (x, y) in sample_points(rect) {
        if let Some(l) = image.luma(x, y) {
            histogram[l.round().clamp(0.0, 255.0) as usize] += 1;
            total += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }

    let keep = ((total as f64 * percentile / 100.0).ceil() as u64).clamp(1, total);
    let mut remaining = keep;
    let mut sum = 0.0;
    for (value, &count) in histogram.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        let taken = count.min(remaining);
        sum += value as f64 * taken as f64;
        remaining -= taken;
    }
    sum / keep as f64
}

/// Mean red, green and blue over the ROI.
pub fn rgb_means(image: &Image, rect: Rect) -> [f64; 3] {
    let mut sums = [0.0; 3];
    let mut n = 0u64;
    for (x, y) in sample_points(rect) {
        if let Some(rgb) = image.rgb(x, y) {
            for c in 0..3 {
                sums[c] += rgb[c];
            }
            n += 1;
        }
    }
    if n == 0 {
        return [0.0; 3];
    }
    sums.map(|s| s / n as f64)
}

/// Per-pixel weights derived from a list of weighted ROIs.
///
/// Only the clipped regions are kept; weights are combined on lookup, so the
/// cost does not grow with the frame size. An empty list weighs every pixel
/// of the frame equally.
#[derive(Debug, Clone)]
pub struct WeightMap {
    width: u32,
    height: u32,
    bounds: Rect,
    combination: RoiCombination,
    regions: Option<Vec<(Rect, f32)>>,
}

impl WeightMap {
    /// Build the map for a frame.
    pub fn new(width: u32, height: u32, rois: &[WeightedRoi], combination: RoiCombination) -> Self {
        if rois.is_empty() {
            return Self {
                width,
                height,
                bounds: Rect::new(0, 0, width, height),
                combination,
                regions: None,
            };
        }
        let regions: Vec<(Rect, f32)> = rois
            .iter()
            .filter_map(|wroi| {
                let rect = wroi.roi.clip_to(width, height)?;
                Some((rect, wroi.weight.factor() as f32))
            })
            .collect();
        let bounds = regions
            .iter()
            .map(|(r, _)| (r.x, r.y, r.x + r.width, r.y + r.height))
            .reduce(|(a, b, c, d), (x0, y0, x1, y1)| (a.min(x0), b.min(y0), c.max(x1), d.max(y1)))
            .map_or(Rect::new(0, 0, 0, 0), |(x0, y0, x1, y1)| {
                Rect::new(x0, y0, x1 - x0, y1 - y0)
            });
        Self {
            width,
            height,
            bounds,
            combination,
            regions: Some(regions),
        }
    }

    /// Smallest rectangle enclosing every weighted pixel.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Weight of a pixel, zero outside the frame.
    pub fn weight(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        let Some(regions) = &self.regions else {
            return 1.0;
        };
        regions
            .iter()
            .filter(|(r, _)| r.contains(x, y))
            .fold(0.0, |acc, &(_, w)| match self.combination {
                RoiCombination::Additive => acc + w,
                RoiCombination::Maximum => acc.max(w),
            })
    }

    /// Whether any pixel carries weight.
    pub fn is_empty(&self) -> bool {
        match &self.regions {
            None => self.width == 0 || self.height == 0,
            Some(regions) => regions.iter().all(|&(_, w)| w == 0.0),
        }
    }
}
