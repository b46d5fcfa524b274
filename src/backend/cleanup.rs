// Deferred cleanup list
//
// Multi-step setup registers a release action right after each successful
// driver call. If a later step fails, dropping the stack releases everything
// created so far in reverse order. On success the stack is disarmed and
// ownership moves into the finished component.

/// LIFO list of release actions, each run at most once
#[derive(Default)]
pub struct CleanupStack {
    actions: Vec<(&'static str, Box<dyn FnOnce()>)>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release action for a resource that was just created
    pub fn push(&mut self, label: &'static str, action: impl FnOnce() + 'static) {
        self.actions.push((label, Box::new(action)));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.actions.len()
    }

    /// Run every pending action, newest first. Calling again is a no-op.
    pub fn run(&mut self) {
        while let Some((label, action)) = self.actions.pop() {
            log::debug!("Releasing {}", label);
            action();
        }
    }

    /// Setup succeeded: forget the actions without running them
    pub fn disarm(mut self) {
        self.actions.clear();
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            log::warn!("Unwinding {} partially created resources", self.actions.len());
        }
        self.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name)) as Box<dyn FnOnce()>
        };
        (log, make)
    }

    #[test]
    fn releases_in_reverse_creation_order() {
        let (log, make) = recorder();
        {
            let mut stack = CleanupStack::new();
            stack.push("instance", make("instance"));
            stack.push("surface", make("surface"));
            stack.push("device", make("device"));
            assert_eq!(stack.len(), 3);
        }
        assert_eq!(*log.borrow(), vec!["device", "surface", "instance"]);
    }

    #[test]
    fn failure_midway_releases_only_what_exists() {
        let (log, make) = recorder();

        let build = |fail_at: usize| -> Result<CleanupStack, usize> {
            let mut stack = CleanupStack::new();
            for (step, name) in ["instance", "surface", "device"].into_iter().enumerate() {
                if step == fail_at {
                    return Err(step);
                }
                stack.push(name, make(name));
            }
            Ok(stack)
        };

        assert_eq!(build(2).err(), Some(2));
        assert_eq!(*log.borrow(), vec!["surface", "instance"]);

        log.borrow_mut().clear();
        assert_eq!(build(0).err(), Some(0));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn run_is_idempotent() {
        let (log, make) = recorder();
        let mut stack = CleanupStack::new();
        stack.push("fence", make("fence"));

        stack.run();
        stack.run();
        drop(stack);

        assert_eq!(*log.borrow(), vec!["fence"]);
    }

    #[test]
    fn disarm_keeps_resources_alive() {
        let (log, make) = recorder();
        let mut stack = CleanupStack::new();
        stack.push("instance", make("instance"));
        stack.disarm();
        assert!(log.borrow().is_empty());
    }
}
