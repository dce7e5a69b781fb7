//! Frame-sequential focus search strategies.
//!
//! A search never blocks: each processed frame yields one sharpness sample at
//! the current focus position, and the strategy answers with the next
//! position to move to or with the best position found.

use afl_core::{Algorithm, Limit};
use std::fmt;

/// Upper bound on samples of any single search.
const MAX_SAMPLES: usize = 256;

/// What the autofocus should do after a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStep {
    /// Move the focus and sample again on the next frame.
    MoveTo(i32),
    /// The search is over; move to this position.
    Converged(i32),
}

/// A focus search strategy.
pub trait FocusSearch: Send + fmt::Debug {
    /// Begin a search inside `limit`. Returns the first position to sample.
    fn start(&mut self, limit: Limit, current: i32) -> i32;

    /// Feed the sharpness measured at `position`.
    fn advance(&mut self, position: i32, sharpness: f64) -> SearchStep;
}

/// Strategy implementing an algorithm. `Auto` selects the golden ratio search.
pub fn search_for(algorithm: Algorithm) -> Box<dyn FocusSearch> {
    match algorithm {
        Algorithm::Auto | Algorithm::GoldenRatioSearch => Box::<GoldenRatio>::default(),
        Algorithm::HillClimbingSearch => Box::<HillClimbing>::default(),
        Algorithm::GlobalSearch => Box::<GlobalSearch>::default(),
        Algorithm::FullScan => Box::new(Scan::new(FULL_SCAN_SAMPLES)),
    }
}

/// Best sample seen so far.
#[derive(Debug, Clone, Copy, Default)]
struct Best {
    position: i32,
    sharpness: Option<f64>,
    samples: usize,
}

impl Best {
    fn record(&mut self, position: i32, sharpness: f64) {
        self.samples += 1;
        if self.sharpness.map_or(true, |s| sharpness > s) {
            self.position = position;
            self.sharpness = Some(sharpness);
        }
    }

    fn exhausted(&self) -> bool {
        self.samples >= MAX_SAMPLES
    }
}

// =============================================================================
// Golden ratio
// =============================================================================

const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Golden section search, assuming one sharpness peak inside the limit.
#[derive(Debug, Default)]
pub struct GoldenRatio {
    a: i32,
    b: i32,
    c: i32,
    d: i32,
    fc: Option<f64>,
    fd: Option<f64>,
    best: Best,
}

impl GoldenRatio {
    fn offset(a: i32, b: i32) -> i32 {
        (f64::from(b - a) * INV_PHI).round() as i32
    }

    fn done(&self) -> bool {
        self.b - self.a <= 3 || self.best.exhausted()
    }

    fn next_missing(&self) -> SearchStep {
        match (self.fc, self.fd) {
            (None, _) => SearchStep::MoveTo(self.c),
            (_, None) => SearchStep::MoveTo(self.d),
            _ => SearchStep::Converged(self.best.position),
        }
    }
}

impl FocusSearch for GoldenRatio {
    fn start(&mut self, limit: Limit, _current: i32) -> i32 {
        *self = Self {
            a: limit.min,
            b: limit.max,
            ..Default::default()
        };
        let off = Self::offset(self.a, self.b);
        self.c = self.b - off;
        self.d = self.a + off;
        if self.c > self.d {
            std::mem::swap(&mut self.c, &mut self.d);
        }
        self.c
    }

    fn advance(&mut self, position: i32, sharpness: f64) -> SearchStep {
        self.best.record(position, sharpness);
        if position == self.c && self.fc.is_none() {
            self.fc = Some(sharpness);
        } else if position == self.d {
            self.fd = Some(sharpness);
        }
        if self.done() {
            return SearchStep::Converged(self.best.position);
        }
        let (Some(fc), Some(fd)) = (self.fc, self.fd) else {
            return self.next_missing();
        };

        if fc >= fd {
            // Peak lies in [a, d].
            self.b = self.d;
            self.d = self.c;
            self.fd = Some(fc);
            self.c = (self.b - Self::offset(self.a, self.b)).min(self.d - 1);
            self.fc = None;
        } else {
            // Peak lies in [c, b].
            self.a = self.c;
            self.c = self.d;
            self.fc = Some(fd);
            self.d = (self.a + Self::offset(self.a, self.b)).max(self.c + 1);
            self.fd = None;
        }
        if self.done() {
            return SearchStep::Converged(self.best.position);
        }
        self.next_missing()
    }
}

// =============================================================================
// Hill climbing
// =============================================================================

/// Step towards rising sharpness, reversing and halving the step past the peak.
#[derive(Debug, Default)]
pub struct HillClimbing {
    limit: Option<Limit>,
    step: i32,
    direction: i32,
    last: Option<f64>,
    best: Best,
}

impl FocusSearch for HillClimbing {
    fn start(&mut self, limit: Limit, current: i32) -> i32 {
        *self = Self {
            limit: Some(limit),
            step: ((limit.span() / 16) as i32).max(1),
            direction: 1,
            ..Default::default()
        };
        limit.clamp(current)
    }

    fn advance(&mut self, position: i32, sharpness: f64) -> SearchStep {
        self.best.record(position, sharpness);
        let Some(limit) = self.limit else {
            return SearchStep::Converged(position);
        };
        if self.last.is_some_and(|last| sharpness < last) {
            self.direction = -self.direction;
            self.step /= 2;
        }
        self.last = Some(sharpness);
        if self.step == 0 || self.best.exhausted() {
            return SearchStep::Converged(self.best.position);
        }

        let mut next = position + self.direction * self.step;
        if next < limit.min || next > limit.max {
            self.direction = -self.direction;
            self.step /= 2;
            if self.step == 0 {
                return SearchStep::Converged(self.best.position);
            }
            next = limit.clamp(position + self.direction * self.step);
        }
        SearchStep::MoveTo(next)
    }
}

// =============================================================================
// Scans
// =============================================================================

/// Samples taken by a full scan.
pub const FULL_SCAN_SAMPLES: usize = 32;
/// Coarse samples of a global search.
pub const GLOBAL_COARSE_SAMPLES: usize = 16;
/// Fine samples of a global search.
pub const GLOBAL_FINE_SAMPLES: usize = 9;

fn spread(limit: Limit, samples: usize) -> Vec<i32> {
    let span = limit.span();
    let n = (samples as i64).min(span + 1).max(1);
    if n == 1 {
        return vec![limit.min];
    }
    (0..n)
        .map(|i| (i64::from(limit.min) + i * span / (n - 1)) as i32)
        .collect()
}

/// Evenly spaced scan over the whole limit.
#[derive(Debug, Default)]
pub struct Scan {
    samples: usize,
    positions: Vec<i32>,
    next: usize,
    best: Best,
}

impl Scan {
    /// Scan with `samples` evenly spaced positions.
    pub fn new(samples: usize) -> Self {
        Self {
            samples,
            ..Default::default()
        }
    }

    fn spacing(&self) -> i32 {
        match self.positions.as_slice() {
            [first, second, ..] => second - first,
            _ => 1,
        }
    }
}

impl FocusSearch for Scan {
    fn start(&mut self, limit: Limit, _current: i32) -> i32 {
        self.positions = spread(limit, self.samples);
        self.next = 1;
        self.best = Best::default();
        self.positions[0]
    }

    fn advance(&mut self, position: i32, sharpness: f64) -> SearchStep {
        self.best.record(position, sharpness);
        match self.positions.get(self.next) {
            Some(&p) => {
                self.next += 1;
                SearchStep::MoveTo(p)
            }
            None => SearchStep::Converged(self.best.position),
        }
    }
}

/// Coarse scan over the whole limit, then a fine scan around the best coarse sample.
#[derive(Debug)]
pub struct GlobalSearch {
    limit: Limit,
    coarse: Scan,
    fine: Option<Scan>,
}

impl Default for GlobalSearch {
    fn default() -> Self {
        Self {
            limit: Limit { min: 0, max: 0 },
            coarse: Scan::new(GLOBAL_COARSE_SAMPLES),
            fine: None,
        }
    }
}

impl FocusSearch for GlobalSearch {
    fn start(&mut self, limit: Limit, current: i32) -> i32 {
        self.limit = limit;
        self.fine = None;
        self.coarse.start(limit, current)
    }

    fn advance(&mut self, position: i32, sharpness: f64) -> SearchStep {
        if let Some(fine) = &mut self.fine {
            return fine.advance(position, sharpness);
        }
        match self.coarse.advance(position, sharpness) {
            SearchStep::MoveTo(p) => SearchStep::MoveTo(p),
            SearchStep::Converged(center) => {
                let spacing = self.coarse.spacing();
                let window = Limit {
                    min: self.limit.clamp(center.saturating_sub(spacing)),
                    max: self.limit.clamp(center.saturating_add(spacing)),
                };
                let mut fine = Scan::new(GLOBAL_FINE_SAMPLES);
                let first = fine.start(window, center);
                self.fine = Some(fine);
                SearchStep::MoveTo(first)
            }
        }
    }
}
