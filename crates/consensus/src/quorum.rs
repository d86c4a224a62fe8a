use crate::config::ConfigError;

/// Quorum arithmetic for a fixed replica count `n`:
/// `f = (n - 1) / 3` tolerated faults and a threshold of `2f + 1` matching votes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quorum {
    replicas: usize,
    faulty: usize,
    threshold: usize,
}

impl Quorum {
    pub fn new(replicas: usize) -> Result<Self, ConfigError> {
        if replicas == 0 {
            return Err(ConfigError::NoReplicas);
        }

        let faulty = (replicas - 1) / 3;
        let threshold = 2 * faulty + 1;
        // Two quorums must always intersect
        if 2 * threshold <= replicas {
            return Err(ConfigError::InsufficientQuorum {
                replicas,
                threshold,
            });
        }

        Ok(Self {
            replicas,
            faulty,
            threshold,
        })
    }

    /// Total replica count `n`.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Tolerated faulty replicas `f`.
    pub fn faulty(&self) -> usize {
        self.faulty
    }

    /// Matching votes required to make progress, `q = 2f + 1`.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_reached(&self, votes: usize) -> bool {
        votes >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ConfigError;

    use super::Quorum;

    #[test]
    fn threshold_for_common_sizes() {
        for (n, q) in [(1, 1), (4, 3), (5, 3), (7, 5), (10, 7), (13, 9), (100, 67)] {
            let quorum = Quorum::new(n).unwrap();
            assert_eq!(quorum.threshold(), q, "n = {n}");
            assert_eq!(quorum.faulty(), (n - 1) / 3);
            assert!(!quorum.is_reached(q - 1));
            assert!(quorum.is_reached(q));
        }
    }

    #[test]
    fn rejects_non_intersecting_quorums() {
        assert_eq!(Quorum::new(0), Err(ConfigError::NoReplicas));
        for n in [2, 3, 6] {
            assert!(
                matches!(
                    Quorum::new(n),
                    Err(ConfigError::InsufficientQuorum { replicas, .. }) if replicas == n
                ),
                "n = {n}"
            );
        }
    }
}
