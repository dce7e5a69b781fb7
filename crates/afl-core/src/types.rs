//! Controller identities, state enums and region-of-interest types.

use crate::error::AflError;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Controller identity and state
// =============================================================================

/// Role of a controller. A manager holds at most one controller per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ControllerType {
    /// Exposure time and gain.
    Brightness = 1,
    /// Per-channel colour gains.
    WhiteBalance = 2,
    /// Focus stepper position.
    Autofocus = 5,
}

impl ControllerType {
    /// Every valid controller type, in ascending raw order.
    pub const ALL: [ControllerType; 3] = [
        ControllerType::Brightness,
        ControllerType::WhiteBalance,
        ControllerType::Autofocus,
    ];

    /// Raw numeric value.
    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for ControllerType {
    type Error = AflError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(ControllerType::Brightness),
            2 => Ok(ControllerType::WhiteBalance),
            5 => Ok(ControllerType::Autofocus),
            other => Err(AflError::InvalidParameter(format!(
                "controller type {other} is invalid or reserved"
            ))),
        }
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ControllerType::Brightness => "brightness",
            ControllerType::WhiteBalance => "white_balance",
            ControllerType::Autofocus => "autofocus",
        };
        write!(f, "{}", label)
    }
}

/// Caller-set intent of a controller or brightness component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Inert, never evaluated.
    #[default]
    Off,
    /// Evaluated on every eligible frame.
    Continuous,
    /// Evaluated until convergence, then reverts to `Off`.
    Once,
}

impl Mode {
    /// `Continuous` or `Once`.
    pub fn is_active(self) -> bool {
        !matches!(self, Mode::Off)
    }
}

/// Observed run state of a controller or brightness component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No mode has been set yet.
    #[default]
    Undefined,
    /// Not running. Also the armed state after activating a mode, until the next frame.
    Off,
    /// Evaluating frames.
    InProgress,
    /// A `Once` run converged.
    Finished,
    /// An evaluation overlapped with one already in flight and was rejected.
    Busy,
    /// The mode was forced to `Off` while in progress.
    Canceled,
    /// An evaluation failed. Cleared only by the next mode change.
    Error,
}

/// Sub-channel of a brightness controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum BrightnessComponent {
    /// Exposure time.
    Exposure = 0x01,
    /// Analog or host gain.
    Gain = 0x02,
}

impl BrightnessComponent {
    /// Both components.
    pub const ALL: [BrightnessComponent; 2] =
        [BrightnessComponent::Exposure, BrightnessComponent::Gain];

    /// Position inside per-component arrays.
    pub fn slot(self) -> usize {
        match self {
            BrightnessComponent::Exposure => 0,
            BrightnessComponent::Gain => 1,
        }
    }
}

impl fmt::Display for BrightnessComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrightnessComponent::Exposure => write!(f, "exposure"),
            BrightnessComponent::Gain => write!(f, "gain"),
        }
    }
}

// =============================================================================
// Algorithms
// =============================================================================

/// Search strategy of a search-based controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Let the engine choose (golden ratio search).
    #[default]
    Auto,
    /// Golden-section bracketing of the sharpness peak.
    GoldenRatioSearch,
    /// Step towards increasing sharpness, reversing and halving on overshoot.
    HillClimbingSearch,
    /// Coarse scan of the whole range followed by a fine scan around the best sample.
    GlobalSearch,
    /// Evenly spaced samples over the whole range.
    FullScan,
}

impl Algorithm {
    /// Every algorithm.
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Auto,
        Algorithm::GoldenRatioSearch,
        Algorithm::HillClimbingSearch,
        Algorithm::GlobalSearch,
        Algorithm::FullScan,
    ];
}

/// Sharpness metric used by the autofocus search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharpnessAlgorithm {
    /// Let the engine choose (Tenengrad).
    #[default]
    Auto,
    /// Mean squared Sobel gradient magnitude.
    Tenengrad,
    /// Mean absolute Sobel gradient magnitude.
    Sobel,
    /// Mean absolute difference between horizontal and vertical neighbours.
    MeanScore,
    /// Variance of the luma histogram.
    HistogramVariance,
}

impl SharpnessAlgorithm {
    /// Every sharpness metric.
    pub const ALL: [SharpnessAlgorithm; 5] = [
        SharpnessAlgorithm::Auto,
        SharpnessAlgorithm::Tenengrad,
        SharpnessAlgorithm::Sobel,
        SharpnessAlgorithm::MeanScore,
        SharpnessAlgorithm::HistogramVariance,
    ];
}

// =============================================================================
// Regions of interest
// =============================================================================

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Rectangle in sensor pixel coordinates.
///
/// The all-zero rectangle stands for the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether this is the full-frame sentinel.
    pub fn is_full_frame(&self) -> bool {
        *self == Rect::default()
    }

    /// Size of the rectangle.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Centered rectangle covering half of each frame dimension.
    pub fn centered(frame_width: u32, frame_height: u32) -> Self {
        let width = (frame_width / 2).max(1);
        let height = (frame_height / 2).max(1);
        Rect::new(
            (frame_width - width) / 2,
            (frame_height - height) / 2,
            width,
            height,
        )
    }

    /// Clip to a frame, resolving the full-frame sentinel.
    ///
    /// Returns `None` when the rectangle lies entirely outside the frame.
    pub fn clip_to(&self, frame_width: u32, frame_height: u32) -> Option<Rect> {
        if self.is_full_frame() {
            return Some(Rect::new(0, 0, frame_width, frame_height));
        }
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let right = self.x.saturating_add(self.width).min(frame_width);
        let bottom = self.y.saturating_add(self.height).min(frame_height);
        Some(Rect::new(self.x, self.y, right - self.x, bottom - self.y))
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Whether the pixel lies inside the rectangle.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && y >= self.y
            && u64::from(x) < u64::from(self.x) + u64::from(self.width)
            && u64::from(y) < u64::from(self.y) + u64::from(self.height)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Named ROI placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiPreset {
    /// Centered half-size rectangle, resolved against each processed frame.
    Center,
}

/// Influence tier of a weighted ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum RoiWeight {
    /// Weight factor 1.
    Weak = 0x21,
    /// Weight factor 2.
    Medium = 0x42,
    /// Weight factor 3.
    Strong = 0x63,
}

impl RoiWeight {
    /// Multiplicative weight applied to pixels covered by the ROI.
    pub fn factor(self) -> f64 {
        match self {
            RoiWeight::Weak => 1.0,
            RoiWeight::Medium => 2.0,
            RoiWeight::Strong => 3.0,
        }
    }
}

/// Rectangle plus an influence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightedRoi {
    /// Region in sensor pixels.
    pub roi: Rect,
    /// Influence tier.
    pub weight: RoiWeight,
}

impl WeightedRoi {
    /// Create a weighted ROI.
    pub const fn new(roi: Rect, weight: RoiWeight) -> Self {
        Self { roi, weight }
    }
}

impl Default for WeightedRoi {
    fn default() -> Self {
        Self::new(Rect::default(), RoiWeight::Medium)
    }
}

/// How overlapping weighted ROIs combine on a shared pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiCombination {
    /// Weights of overlapping ROIs add up.
    #[default]
    Additive,
    /// The largest weight covering a pixel wins.
    Maximum,
}
