use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 100;

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Upload throughput over a sliding time window.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: VecDeque::new(),
                max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
                window_size: window_size.unwrap_or(DEFAULT_WINDOW),
            }),
        }
    }

    /// Records that `bytes` more were sent just now.
    pub fn add_sample(&self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    fn add_sample_at(&self, bytes: u64, timestamp: Instant) {
        let mut s = self.inner.lock().unwrap();
        s.samples.push_back(SpeedSample { bytes, timestamp });

        let window = s.window_size;
        while s
            .samples
            .front()
            .is_some_and(|first| timestamp.duration_since(first.timestamp) > window)
        {
            s.samples.pop_front();
        }
        while s.samples.len() > s.max_samples {
            s.samples.pop_front();
        }
    }

    /// Average bytes/second within the window; 0.0 with fewer than 2 samples.
    ///
    /// The first sample only marks the start of the window, so its bytes are
    /// not counted.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap();
        let (Some(first), Some(last)) = (s.samples.front(), s.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if s.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        let bytes: u64 = s.samples.iter().skip(1).map(|sample| sample.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }
}
