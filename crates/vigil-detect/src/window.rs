use std::collections::VecDeque;

/// Floor for standard deviation, guards the z-score division
pub const STD_EPSILON: f64 = 1e-10;

/// Bounded FIFO of recent values for one sensor type
///
/// Insertion order is time order; the oldest value is evicted once the
/// window is full. Mean and variance are derived queries over the current
/// contents.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest on overflow
    pub fn push(&mut self, value: f64) {
        if self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().fold(None, |acc, v| {
            Some(acc.map_or(v, |a: f64| a.min(v)))
        })
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().fold(None, |acc, v| {
            Some(acc.map_or(v, |a: f64| a.max(v)))
        })
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Sample variance with Bessel's correction; 0 when fewer than 2 samples
    pub fn variance(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq: f64 = self.values.iter().map(|v| (v - mean) * (v - mean)).sum();
        sum_sq / (n - 1) as f64
    }

    /// Sample standard deviation, floored at [`STD_EPSILON`]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt().max(STD_EPSILON)
    }

    /// Rebuild into a window of a different capacity, oldest values
    /// dropped first when shrinking
    pub fn resized(&self, capacity: usize) -> RollingWindow {
        let mut window = RollingWindow::new(capacity);
        for value in &self.values {
            window.push(*value);
        }
        window
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }
}
