use std::time::Duration;

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Slowest logic rate a clock will run at, in steps per second.
pub const MIN_TICK_RATE: f64 = 1.0;
/// Fastest logic rate a clock will run at, in steps per second.
pub const MAX_TICK_RATE: f64 = 10_000.0;

/// Outcome of feeding one loop iteration's elapsed time into the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTick {
    /// Number of fixed logic steps to run this iteration.
    pub steps: u32,
    /// Whether this iteration should render. True only when at least one
    /// step boundary was crossed.
    pub render: bool,
    /// Frames presented during the FPS window that just closed, if one did.
    pub fps: Option<u32>,
}

/// Fixed-timestep accumulator plus a one-second FPS window.
///
/// All bookkeeping is done in `Duration` so no elapsed time is lost to
/// floating-point rounding: after any sequence of `advance` calls the
/// leftover equals the total elapsed time modulo the step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    step: Duration,
    accumulator: Duration,
    fps_window: Duration,
    frames: u32,
}

impl FrameClock {
    /// Clock stepping `tick_rate` times per second. The rate is clamped to
    /// `MIN_TICK_RATE..=MAX_TICK_RATE`; NaN becomes the minimum.
    pub fn new(tick_rate: f64) -> Self {
        let rate = tick_rate.max(MIN_TICK_RATE).min(MAX_TICK_RATE);
        Self::from_step(Duration::from_secs_f64(1.0 / rate))
    }

    pub fn from_step(step: Duration) -> Self {
        Self {
            step: step.max(Duration::from_nanos(1)),
            accumulator: Duration::ZERO,
            fps_window: Duration::ZERO,
            frames: 0,
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Time accumulated but not yet consumed by a step.
    pub fn leftover(&self) -> Duration {
        self.accumulator
    }

    /// Count one frame that actually reached the screen.
    pub fn frame_presented(&mut self) {
        self.frames += 1;
    }

    pub fn advance(&mut self, elapsed: Duration) -> FrameTick {
        self.accumulator += elapsed;
        let step_ns = self.step.as_nanos();
        let acc_ns = self.accumulator.as_nanos();
        let steps = u32::try_from(acc_ns / step_ns).unwrap_or(u32::MAX);
        self.accumulator = Duration::from_nanos((acc_ns % step_ns) as u64);
        let render = acc_ns >= step_ns;

        self.fps_window += elapsed;
        let fps = if self.fps_window >= FPS_WINDOW {
            let rem = self.fps_window.as_nanos() % FPS_WINDOW.as_nanos();
            self.fps_window = Duration::from_nanos(rem as u64);
            Some(std::mem::take(&mut self.frames))
        } else {
            None
        };

        FrameTick { steps, render, fps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn short_iterations_accumulate() {
        let mut clock = FrameClock::from_step(Duration::from_millis(10));
        let tick = clock.advance(Duration::from_millis(4));
        assert_eq!(tick.steps, 0);
        assert!(!tick.render);
        let tick = clock.advance(Duration::from_millis(4));
        assert!(!tick.render);
        let tick = clock.advance(Duration::from_millis(4));
        assert_eq!(tick.steps, 1);
        assert!(tick.render);
        assert_eq!(clock.leftover(), Duration::from_millis(2));
    }

    #[test]
    fn long_iteration_runs_many_steps_but_renders_once() {
        let mut clock = FrameClock::from_step(Duration::from_millis(10));
        let tick = clock.advance(Duration::from_millis(35));
        assert_eq!(tick.steps, 3);
        assert!(tick.render);
        assert_eq!(clock.leftover(), Duration::from_millis(5));
    }

    #[test]
    fn never_loses_time() {
        let step = Duration::from_secs_f64(1.0 / 60.0);
        let mut clock = FrameClock::from_step(step);
        let mut rng = StdRng::seed_from_u64(7);
        let mut total = Duration::ZERO;
        let mut steps = 0u128;
        for _ in 0..10_000 {
            let elapsed = Duration::from_micros(rng.gen_range(0..40_000));
            total += elapsed;
            let tick = clock.advance(elapsed);
            assert_eq!(tick.render, tick.steps > 0);
            steps += tick.steps as u128;
        }
        assert_eq!(clock.leftover().as_nanos(), total.as_nanos() % step.as_nanos());
        assert_eq!(steps, total.as_nanos() / step.as_nanos());
    }

    #[test]
    fn reports_fps_once_per_second() {
        let mut clock = FrameClock::from_step(Duration::from_millis(250));
        let quarter = Duration::from_millis(250);
        let mut present = |clock: &mut FrameClock| {
            let tick = clock.advance(quarter);
            if tick.render {
                clock.frame_presented();
            }
            tick.fps
        };
        assert_eq!(present(&mut clock), None);
        assert_eq!(present(&mut clock), None);
        assert_eq!(present(&mut clock), None);
        assert_eq!(present(&mut clock), Some(4));
        // Window restarts empty.
        assert_eq!(present(&mut clock), None);
    }

    #[test]
    fn fps_counts_only_rendered_frames() {
        let mut clock = FrameClock::from_step(Duration::from_millis(100));
        let mut reported = None;
        for _ in 0..20 {
            // Two iterations per step: only every other one renders.
            let tick = clock.advance(Duration::from_millis(50));
            if tick.render {
                clock.frame_presented();
            }
            if let Some(fps) = tick.fps {
                reported = Some(fps);
            }
        }
        assert_eq!(reported, Some(10));
    }

    #[test]
    fn skipped_presents_are_not_counted() {
        let mut clock = FrameClock::from_step(Duration::from_millis(100));
        let mut reported = None;
        for i in 0..10 {
            let tick = clock.advance(Duration::from_millis(100));
            assert!(tick.render);
            // Every third frame loses its surface texture.
            if i % 3 != 0 {
                clock.frame_presented();
            }
            if let Some(fps) = tick.fps {
                reported = Some(fps);
            }
        }
        assert_eq!(reported, Some(6));
    }

    #[test]
    fn extreme_tick_rates_are_clamped() {
        let slow = FrameClock::new(1e-20);
        assert_eq!(slow.step(), Duration::from_secs(1));
        let fast = FrameClock::new(1e12);
        assert_eq!(fast.step(), Duration::from_micros(100));
        let nan = FrameClock::new(f64::NAN);
        assert_eq!(nan.step(), Duration::from_secs(1));
    }

    #[test]
    fn tiny_step_is_counted_without_iterating() {
        let mut clock = FrameClock::from_step(Duration::from_nanos(1));
        let tick = clock.advance(Duration::from_millis(250));
        assert_eq!(tick.steps, 250_000_000);
        assert_eq!(clock.leftover(), Duration::ZERO);
    }

    #[test]
    fn tick_rate_constructor() {
        let clock = FrameClock::new(50.0);
        assert_eq!(clock.step(), Duration::from_millis(20));
    }

    #[test]
    fn zero_step_is_clamped() {
        let mut clock = FrameClock::from_step(Duration::ZERO);
        assert_eq!(clock.step(), Duration::from_nanos(1));
        assert_eq!(clock.advance(Duration::from_nanos(3)).steps, 3);
    }
}
