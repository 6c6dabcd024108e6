//! Head motion between consecutive valid frames

use landmarks::Point2;

/// Mean displacement tracker over the layout's reference points
#[derive(Debug, Clone, Default)]
pub struct MotionDetector {
    previous: Option<Vec<Point2>>,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score the current reference points against the previous valid frame
    ///
    /// Returns 0 when there is no comparable previous frame. "No data yet"
    /// must read as "no motion" to the classifier.
    pub fn update(&mut self, current: Vec<Point2>) -> f32 {
        let score = match &self.previous {
            Some(previous) if previous.len() == current.len() && !current.is_empty() => {
                let total: f32 = previous
                    .iter()
                    .zip(current.iter())
                    .map(|(a, b)| a.distance(b))
                    .sum();
                total / current.len() as f32
            }
            _ => 0.0,
        };

        self.previous = Some(current);
        score
    }

    /// Forget the previous frame (invalid frame or face lost)
    pub fn invalidate(&mut self) {
        self.previous = None;
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }
}
