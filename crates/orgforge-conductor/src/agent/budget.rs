/// Counts consistency retries for one event against `retry_budget`.
///
/// The budget counts re-invocations after the first attempt, so a budget of
/// 3 allows 4 attempts in total.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    retries: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(retries: u32) -> Self {
        Self { retries, used: 0 }
    }

    pub fn record(&mut self) {
        self.used += 1;
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.retries.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.retries
    }

    /// 1-based number of the attempt about to run.
    pub fn attempt(&self) -> u32 {
        self.used + 1
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}
