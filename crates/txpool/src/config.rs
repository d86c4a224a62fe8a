#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of transactions held by the pool. Defaults to 100_000.
    pub max_tx_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_tx_count: 100_000,
        }
    }
}
