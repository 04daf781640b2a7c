/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}


pub mod timing {

    use super::group_digits;
    use std::time::{Duration, Instant};
    use std::io::Write;

    /// Wall-clock reporting of the successive stages of a long-running
    /// executable.
    pub struct Progress {
        previous: Instant,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self { Self { previous: Instant::now() } }

        /// Print message, append ellipsis, flush stdout, stay on same line, start timer.
        pub fn start(&mut self, message: &str) {
            print!("{message} ... ");
            // Losing the flush only delays the message
            let _ = std::io::stdout().flush();
            self.start_timer();
        }

        /// Print message, go to next line, start timer
        pub fn startln(&mut self, message: &str) {
            self.start(message);
            println!();
            self.start_timer();
        }

        // Print time elapsed since last start or done
        pub fn done(&mut self) {
            let elapsed = self.lap();
            println!("{} ms", group_digits(elapsed.as_millis()));
        }

        // Print message followed by time elapsed since last start or done
        pub fn done_with_message(&mut self, message: &str) {
            let elapsed = self.lap();
            tracing::debug!(stage = message, ms = elapsed.as_millis() as u64, "done");
            println!("{message}: {} ms", group_digits(elapsed.as_millis()));
        }

        /// Time elapsed since last start or done; restarts the timer
        pub fn lap(&mut self) -> Duration {
            let elapsed = self.previous.elapsed();
            self.start_timer();
            elapsed
        }

        fn start_timer(&mut self) { self.previous = Instant::now() }
    }

    /// Mean and standard deviation (of the population, not of the sample) of
    /// repeated timings, in seconds. `None` if there are no timings.
    pub fn mean_and_std(laps: &[Duration]) -> Option<(f64, f64)> {
        if laps.is_empty() { return None }
        let n = laps.len() as f64;
        let mean = laps.iter().map(Duration::as_secs_f64).sum::<f64>() / n;
        let variance = laps.iter()
            .map(|t| (t.as_secs_f64() - mean).powi(2))
            .sum::<f64>() / n;
        Some((mean, variance.sqrt()))
    }
}
