use chrono::{DateTime, Duration, Utc};

/// Which flight the single-flight ticker shows, stepping to the next one
/// once per rotation interval.
#[derive(Debug, Default)]
pub struct TickerRotation {
    index: usize,
    last_rotation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerPick {
    pub index: usize,
    /// Seconds until the next step, never negative.
    pub next_rotation_in: f64,
}

impl TickerRotation {
    /// Picks an index into a list of `count` flights. `None` when empty.
    pub fn pick(&mut self, count: usize, interval: Duration, now: DateTime<Utc>) -> Option<TickerPick> {
        if count == 0 {
            return None;
        }

        let last = match self.last_rotation {
            Some(last) if now - last < interval => last,
            Some(_) => {
                self.index += 1;
                now
            }
            None => now,
        };
        self.last_rotation = Some(last);

        // The list may have shrunk since the last pick.
        if self.index >= count {
            self.index = 0;
        }

        let remaining = (interval - (now - last)).max(Duration::zero());
        Some(TickerPick {
            index: self.index,
            next_rotation_in: remaining.num_milliseconds() as f64 / 1000.0,
        })
    }
}
