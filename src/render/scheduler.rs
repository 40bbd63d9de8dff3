/// Registration returned by [`FrameScheduler::request_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

/// One-shot "call me on the next display refresh" registrations.
///
/// Every registration fires at most once; a callback that wants to keep
/// running has to request the next frame itself.
pub struct FrameScheduler {
    next_id: u64,
    pending: Vec<FrameHandle>,
    waker: Option<Box<dyn Fn()>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            pending: Vec::new(),
            waker: None,
        }
    }

    /// The waker is called on every registration so the host produces a
    /// refresh (e.g. `Window::request_redraw`).
    pub fn with_waker(waker: impl Fn() + 'static) -> Self {
        Self {
            waker: Some(Box::new(waker)),
            ..Self::new()
        }
    }

    pub fn request_frame(&mut self) -> FrameHandle {
        self.next_id += 1;
        let handle = FrameHandle(self.next_id);
        self.pending.push(handle);
        if let Some(waker) = &self.waker {
            waker();
        }
        handle
    }

    /// Revokes a registration. Returns false if it already fired or was
    /// cancelled.
    pub fn cancel_frame(&mut self, handle: FrameHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|&h| h != handle);
        self.pending.len() != before
    }

    /// Hands out every registration due at this refresh.
    pub fn take_due(&mut self) -> Vec<FrameHandle> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_registrations_fire_once() {
        let mut scheduler = FrameScheduler::new();
        let a = scheduler.request_frame();
        let b = scheduler.request_frame();
        assert_ne!(a, b);
        assert_eq!(scheduler.take_due(), vec![a, b]);
        assert!(scheduler.take_due().is_empty());
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = FrameScheduler::new();
        let a = scheduler.request_frame();
        assert!(scheduler.cancel_frame(a));
        assert!(!scheduler.cancel_frame(a));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_waker_runs_per_request() {
        let wakes = Rc::new(Cell::new(0));
        let counter = Rc::clone(&wakes);
        let mut scheduler = FrameScheduler::with_waker(move || counter.set(counter.get() + 1));
        scheduler.request_frame();
        scheduler.request_frame();
        assert_eq!(wakes.get(), 2);
    }
}
