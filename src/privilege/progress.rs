//! 伪进度条：后台命令未完成时缓慢爬升到软上限，完成后快速走满

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

// 以千分比存储，保证上限与满值精确
const FULL: u16 = 1000;
const SOFT_CEILING: u16 = 800;
const PRIMING_STEP: u16 = 5;
const DRAINING_STEP: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// 任务未完成，最多爬到软上限
    Priming,
    /// 任务已完成，向满值推进
    Draining,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Advanced,
    /// 到达满值，每个实例只返回一次
    Finished,
    Idle,
}

#[derive(Debug)]
pub struct ProgressReflector {
    phase: ProgressPhase,
    permille: u16,
    completed: Arc<AtomicBool>,
}

impl ProgressReflector {
    pub fn new() -> Self {
        Self {
            phase: ProgressPhase::Priming,
            permille: 0,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 交给后台任务，完成时置位
    pub fn completion_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.completed)
    }

    pub fn phase(&self) -> ProgressPhase {
        self.phase
    }

    /// 0.0 ..= 1.0
    pub fn value(&self) -> f64 {
        f64::from(self.permille) / f64::from(FULL)
    }

    pub fn tick(&mut self) -> Tick {
        match self.phase {
            ProgressPhase::Priming => {
                if self.completed.load(Ordering::SeqCst) {
                    self.phase = ProgressPhase::Draining;
                    self.drain()
                } else {
                    self.permille = (self.permille + PRIMING_STEP).min(SOFT_CEILING);
                    Tick::Advanced
                }
            }
            ProgressPhase::Draining => self.drain(),
            ProgressPhase::Done => Tick::Idle,
        }
    }

    fn drain(&mut self) -> Tick {
        self.permille = (self.permille + DRAINING_STEP).min(FULL);
        if self.permille == FULL {
            self.phase = ProgressPhase::Done;
            Tick::Finished
        } else {
            Tick::Advanced
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn priming_stops_at_soft_ceiling() {
        let mut progress = ProgressReflector::new();
        for _ in 0..1000 {
            assert_eq!(progress.tick(), Tick::Advanced);
        }
        assert_eq!(progress.phase(), ProgressPhase::Priming);
        assert_eq!(progress.value(), 0.8);
    }

    #[test]
    fn completion_drains_to_exactly_one() {
        let mut progress = ProgressReflector::new();
        for _ in 0..10 {
            progress.tick();
        }
        progress.completion_flag().store(true, Ordering::SeqCst);

        let mut finished = 0;
        for _ in 0..50 {
            if progress.tick() == Tick::Finished {
                finished += 1;
            }
        }
        assert_eq!(finished, 1);
        assert_eq!(progress.phase(), ProgressPhase::Done);
        assert_eq!(progress.value(), 1.0);
        assert_eq!(progress.tick(), Tick::Idle);
    }

    #[test]
    fn instant_completion_still_animates() {
        let mut progress = ProgressReflector::new();
        progress.completion_flag().store(true, Ordering::SeqCst);
        let ticks = std::iter::repeat_with(|| progress.tick())
            .take_while(|t| *t != Tick::Finished)
            .count();
        assert_eq!(ticks, 9);
    }

    proptest! {
        #[test]
        fn monotone_capped_and_finishes_once(flag_at in 0usize..400, total in 0usize..600) {
            let mut progress = ProgressReflector::new();
            let flag = progress.completion_flag();
            let mut last = progress.value();
            let mut finished = 0;

            for i in 0..total {
                if i == flag_at {
                    flag.store(true, Ordering::SeqCst);
                }
                let tick = progress.tick();
                let value = progress.value();
                prop_assert!(value >= last);
                if i < flag_at {
                    prop_assert!(value <= 0.8);
                    prop_assert_ne!(tick, Tick::Finished);
                }
                if tick == Tick::Finished {
                    finished += 1;
                    prop_assert_eq!(value, 1.0);
                }
                last = value;
            }

            prop_assert!(finished <= 1);
            if total >= flag_at + 10 {
                prop_assert_eq!(finished, 1);
            }
        }
    }
}
