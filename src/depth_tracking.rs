use crate::error::{Error, Result};

/// Tracks how deeply nested the composite values being walked are, and refuses to go past a
/// limit. Malformed data could otherwise nest deep enough to exhaust the stack.
#[derive(Clone, Debug)]
pub struct DepthTracker {
    depth: usize,
    max_depth: usize,
}

impl DepthTracker {
    /// Create a new depth tracker
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
        }
    }

    /// Step into a composite value.
    pub fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            self.depth -= 1;
            return Err(Error::ParseLimit(format!(
                "Depth limit of {} exceeded",
                self.max_depth
            )));
        }
        Ok(())
    }

    /// Step back out of a composite value.
    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn limit() {
        let mut tracker = DepthTracker::new(2);
        tracker.enter().unwrap();
        tracker.enter().unwrap();
        assert!(tracker.enter().is_err());
        assert_eq!(tracker.depth(), 2);
        tracker.exit();
        tracker.enter().unwrap();
        tracker.exit();
        tracker.exit();
        tracker.exit();
        assert_eq!(tracker.depth(), 0);
    }
}
