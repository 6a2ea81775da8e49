use std::sync::atomic::{AtomicI64, Ordering};

/// Time-derived message ids, strictly increasing within one generator.
#[derive(Debug, Default)]
pub struct MessageIds {
    last: AtomicI64,
}

impl MessageIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Milliseconds since the epoch, bumped past the previous id on collision.
    pub fn next(&self) -> String {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return candidate.to_string(),
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MessageIds;

    #[test]
    fn ids_are_unique_within_the_same_millisecond() {
        let ids = MessageIds::new();
        let generated: Vec<i64> = (0..50)
            .map(|_| ids.next().parse().unwrap())
            .collect();
        assert!(generated.windows(2).all(|w| w[0] < w[1]));
    }
}
