//! The composite job-attempt tag stored per result row.

/// Hard cap on dispatch attempts per job.
pub const MAX_ATTEMPTS: u32 = 5;

/// The attempt count reached [`MAX_ATTEMPTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("attempt count {attempt} for job {job_id} reached the limit of {}", MAX_ATTEMPTS)]
pub struct AttemptOverflow {
    /// The offending job.
    pub job_id: u64,
    /// The attempt count that overflowed.
    pub attempt: u32,
}

/// The composite `job_id * MAX_ATTEMPTS + attempt` tag.
///
/// Every row in a merge table carries one of these in its leading column,
/// so rows of retried (invalidated) attempts can be scrubbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobIdAttempt(i64);

impl JobIdAttempt {
    /// Combine `job_id` and `attempt`; fails when the attempt count is out
    /// of range.
    pub fn try_new(job_id: u64, attempt: u32) -> Result<Self, AttemptOverflow> {
        if attempt >= MAX_ATTEMPTS {
            return Err(AttemptOverflow { job_id, attempt });
        }
        Ok(Self(job_id as i64 * MAX_ATTEMPTS as i64 + attempt as i64))
    }

    /// The tag value stored in the result table.
    pub fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for JobIdAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotone_in_job_and_attempt() {
        let mut last = -1;
        for job in 0..4u64 {
            for attempt in 0..MAX_ATTEMPTS {
                let tag = JobIdAttempt::try_new(job, attempt).unwrap().value();
                assert!(tag > last);
                last = tag;
            }
        }
    }

    #[test]
    fn attempt_limit_enforced() {
        assert!(JobIdAttempt::try_new(1, MAX_ATTEMPTS - 1).is_ok());
        let err = JobIdAttempt::try_new(1, MAX_ATTEMPTS).unwrap_err();
        assert_eq!(err.attempt, MAX_ATTEMPTS);
    }
}
