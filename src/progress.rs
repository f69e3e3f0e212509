//! Progress reporting for volume builds.
//!
//! The build is synchronous; a caller that runs it on a worker thread can
//! observe it through a closure or a channel.

use futures::channel::mpsc::UnboundedSender;

/// Checkpoints reached during a build, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// Slices were ordered and filtered.
    Validated,
    /// The volume buffer was allocated.
    Allocated,
    /// Plane copies are running.
    Copying,
    /// The volume is installed.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub stage: BuildStage,
    pub completed: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Receives build checkpoints. Called from the building thread only.
pub trait BuildProgress {
    fn report(&mut self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoProgress;

impl BuildProgress for NoProgress {
    fn report(&mut self, _event: ProgressEvent) {}
}

impl<F> BuildProgress for F
where
    F: FnMut(ProgressEvent),
{
    fn report(&mut self, event: ProgressEvent) {
        self(event)
    }
}

impl BuildProgress for UnboundedSender<ProgressEvent> {
    fn report(&mut self, event: ProgressEvent) {
        // A dropped receiver only means nobody is watching anymore.
        let _ = self.unbounded_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::channel::mpsc;

    #[test]
    fn closures_receive_events() {
        let mut seen = Vec::new();
        let mut sink = |event: ProgressEvent| seen.push(event.stage);
        sink.report(ProgressEvent {
            stage: BuildStage::Validated,
            completed: 0,
            total: 3,
        });
        assert_eq!(seen, vec![BuildStage::Validated]);
    }

    #[test]
    fn channels_receive_events() {
        let (mut tx, rx) = mpsc::unbounded();
        tx.report(ProgressEvent {
            stage: BuildStage::Copying,
            completed: 1,
            total: 4,
        });
        drop(tx);
        let events: Vec<_> = futures::executor::block_on(rx.collect());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fraction(), 0.25);
    }
}
