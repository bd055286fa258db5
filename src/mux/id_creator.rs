use serde::{Deserialize, Serialize};

/// Hands out ids from a closed range, wrapping back to the start after
/// the end is reached.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdCreator {
    min: u64,
    max: u64,
    next: u64,
}

impl IdCreator {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max, next: min }
    }

    pub fn next(&mut self) -> u64 {
        let id = self.next;
        self.next = if id >= self.max { self.min } else { id + 1 };
        id
    }
}
