use tokio::time::Instant;

/// One-shot timer state: either idle or armed with a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Debounce {
    #[default]
    Idle,
    Armed(Instant),
}

impl Debounce {
    /// Arms (or re-arms) the timer, replacing any earlier deadline.
    pub fn arm(&mut self, deadline: Instant) {
        *self = Self::Armed(deadline);
    }

    pub fn cancel(&mut self) {
        *self = Self::Idle;
    }

    /// Returns true exactly once when an armed deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match *self {
            Self::Armed(deadline) if deadline <= now => {
                *self = Self::Idle;
                true
            }
            Self::Armed(_) | Self::Idle => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Armed(deadline) => Some(*deadline),
            Self::Idle => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed(_))
    }
}

/// Earliest of several optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn rearming_replaces_the_deadline() {
        let start = Instant::now();
        let mut timer = Debounce::default();

        timer.arm(start + Duration::from_millis(100));
        timer.arm(start + Duration::from_millis(300));

        assert!(!timer.fire(start + Duration::from_millis(150)));
        assert!(timer.fire(start + Duration::from_millis(300)));
        assert!(!timer.fire(start + Duration::from_millis(400)));
        assert_eq!(timer, Debounce::Idle);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let start = Instant::now();
        let mut timer = Debounce::default();

        timer.arm(start);
        timer.cancel();

        assert!(!timer.fire(start + Duration::from_secs(10)));
        assert_eq!(timer.deadline(), None);
    }
}
