use std::time::Duration;

/// The kind of event that starts a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Run on a fixed interval.
    Interval(Duration),
    /// Run once per day at a fixed UTC time.
    Daily { hour: u32, minute: u32 },
}

/// An event delivered to the scheduler.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    /// Which pipeline this event is for.
    pub pipeline: String,
    /// What kind of trigger caused this event.
    pub trigger: Trigger,
}
