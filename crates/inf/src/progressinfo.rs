//! Progress reporting for long running block passes.
//! Progress is informational only, a pass can not be interrupted through it.

pub trait ProgressNotification {
    /// Starts a new phase with the given number of steps
    fn reset(&mut self, phase: &str, total: u64);

    /// Reports that `done` of the `total` steps of the current phase are finished
    fn tick(&mut self, done: u64);

    fn done(&mut self) {}
}

/// Progress sink that ignores all notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressNotification for SilentProgress {
    fn reset(&mut self, _phase: &str, _total: u64) {}
    fn tick(&mut self, _done: u64) {}
}

/// Forwards the progress as a fraction in the range [0, 1] together with the current phase name
pub struct CallbackProgress<F>
where
    F: FnMut(f64, &str),
{
    cb: F,
    phase: String,
    total: u64,
    last_percentage: Option<u64>,
}

impl<F> CallbackProgress<F>
where
    F: FnMut(f64, &str),
{
    pub fn with_cb(cb: F) -> Self {
        CallbackProgress {
            cb,
            phase: String::new(),
            total: 0,
            last_percentage: None,
        }
    }
}

impl<F> ProgressNotification for CallbackProgress<F>
where
    F: FnMut(f64, &str),
{
    fn reset(&mut self, phase: &str, total: u64) {
        self.phase = phase.to_string();
        self.total = total;
        self.last_percentage = Some(0);
        (self.cb)(0.0, &self.phase);
    }

    fn tick(&mut self, done: u64) {
        if self.total == 0 {
            return;
        }

        // only notify on whole percentages, passes can have millions of steps
        let percentage = (done.min(self.total) * 100) / self.total;
        if self.last_percentage == Some(percentage) {
            return;
        }

        self.last_percentage = Some(percentage);
        (self.cb)(percentage as f64 / 100.0, &self.phase);
    }

    fn done(&mut self) {
        (self.cb)(1.0, &self.phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_reports_whole_percentages() {
        let mut positions = Vec::new();
        {
            let mut progress = CallbackProgress::with_cb(|pos, phase| {
                assert_eq!(phase, "count");
                positions.push(pos);
            });

            progress.reset("count", 1000);
            for i in 1..=1000 {
                progress.tick(i);
            }
        }

        assert_eq!(positions.first(), Some(&0.0));
        assert_eq!(positions.last(), Some(&1.0));
        // reset + 100 distinct percentages
        assert_eq!(positions.len(), 101);
    }

    #[test]
    fn empty_phase_does_not_divide_by_zero() {
        let mut calls = 0;
        {
            let mut progress = CallbackProgress::with_cb(|_, _| calls += 1);
            progress.reset("empty", 0);
            progress.tick(5);
        }
        assert_eq!(calls, 1);
    }
}
