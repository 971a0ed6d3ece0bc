use std::cmp::Ordering;

/// Keeps the best `limit` items by `(score desc, rank asc)` without sorting
/// the whole stream.
///
/// Items accumulate in a buffer of `limit + slack`; when it fills, the buffer
/// is sorted and cut back to `limit`, and the weakest survivor becomes a floor
/// that rejects anything that cannot make the final cut.
#[derive(Debug)]
pub struct TopK<T> {
    limit: usize,
    slack: usize,
    buffer: Vec<Slot<T>>,
    floor: Option<(f64, usize)>,
    pushed: usize,
    compactions: usize,
}

#[derive(Debug)]
struct Slot<T> {
    score: f64,
    rank: usize,
    item: T,
}

fn finite(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Ordering where "less" means "ranks higher".
fn compare(a: (f64, usize), b: (f64, usize)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1))
}

impl<T> TopK<T> {
    #[must_use]
    pub fn new(limit: usize, slack: usize) -> Self {
        Self {
            limit,
            slack,
            buffer: Vec::with_capacity(limit.saturating_add(slack).min(4_096)),
            floor: None,
            pushed: 0,
            compactions: 0,
        }
    }

    /// Offers an item; `rank` breaks score ties (lower wins). Returns whether
    /// it was kept for now.
    pub fn push(&mut self, score: f64, rank: usize, item: T) -> bool {
        self.pushed += 1;
        if self.limit == 0 {
            return false;
        }
        let score = finite(score);
        if let Some(floor) = self.floor {
            if compare((score, rank), floor) != Ordering::Less {
                return false;
            }
        }
        self.buffer.push(Slot { score, rank, item });
        if self.buffer.len() >= self.limit.saturating_add(self.slack) {
            self.compact();
        }
        true
    }

    fn compact(&mut self) {
        self.buffer
            .sort_by(|a, b| compare((a.score, a.rank), (b.score, b.rank)));
        self.buffer.truncate(self.limit);
        self.floor = self
            .buffer
            .last()
            .filter(|_| self.buffer.len() == self.limit)
            .map(|slot| (slot.score, slot.rank));
        self.compactions += 1;
    }

    #[must_use]
    pub const fn pushed(&self) -> usize {
        self.pushed
    }

    #[must_use]
    pub const fn compactions(&self) -> usize {
        self.compactions
    }

    /// Best items with their scores, best first.
    #[must_use]
    pub fn finish(mut self) -> Vec<(f64, T)> {
        self.compact();
        self.buffer
            .into_iter()
            .map(|slot| (slot.score, slot.item))
            .collect()
    }
}
