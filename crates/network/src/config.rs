use std::time::Duration;

use rand::Rng;

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Lower bound of the simulated one-way delivery delay.
    pub min_delay: Duration,
    /// Upper bound of the simulated one-way delivery delay. Random delays
    /// within the range reorder messages. Zero delivers inline.
    pub max_delay: Duration,
}

impl Config {
    pub fn with_delay(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
        }
    }

    pub(crate) fn sample_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }

        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }
}
