//! Trigger producers: tokio tasks that emit `TriggerEvent`s on a schedule.

use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::trigger::{Trigger, TriggerEvent};

/// Spawn a task that emits events on a fixed interval. Abort the handle to
/// stop the timer.
pub fn spawn_interval_trigger(
    pipeline: String,
    interval: Duration,
    sender: mpsc::Sender<TriggerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the first immediate tick.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let event = TriggerEvent {
                pipeline: pipeline.clone(),
                trigger: Trigger::Interval(interval),
            };
            if sender.send(event).await.is_err() {
                // Receiver dropped, stop producing.
                break;
            }
        }
    })
}

/// Time until the next `hour:minute` occurrence after `now`.
fn until_next_occurrence(now: NaiveDateTime, hour: u32, minute: u32) -> Duration {
    let today = now
        .date()
        .and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| now.date().and_hms_opt(0, 0, 0).unwrap());
    let target = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Spawn a task that emits one event per day at a fixed UTC time.
pub fn spawn_daily_trigger(
    pipeline: String,
    hour: u32,
    minute: u32,
    sender: mpsc::Sender<TriggerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = until_next_occurrence(chrono::Utc::now().naive_utc(), hour, minute);
            tokio::time::sleep(wait).await;
            let event = TriggerEvent {
                pipeline: pipeline.clone(),
                trigger: Trigger::Daily { hour, minute },
            };
            if sender.send(event).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn interval_trigger_produces_events() {
        let (tx, mut rx) = mpsc::channel(16);

        let handle = spawn_interval_trigger(
            "product_model".to_string(),
            Duration::from_millis(50),
            tx,
        );

        let e1 = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert_eq!(e1.pipeline, "product_model");
        assert!(matches!(e1.trigger, Trigger::Interval(_)));

        handle.abort();
    }

    #[tokio::test]
    async fn interval_trigger_stops_when_receiver_drops() {
        let (tx, rx) = mpsc::channel(1);

        let handle = spawn_interval_trigger("x".to_string(), Duration::from_millis(10), tx);
        drop(rx);

        let result = tokio::time::timeout(Duration::from_millis(500), handle).await;
        assert!(result.is_ok());
    }

    #[test]
    fn next_occurrence_later_today() {
        let now = NaiveDate::from_ymd_opt(2022, 3, 5)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap();
        let wait = until_next_occurrence(now, 9, 0);
        assert_eq!(wait, Duration::from_secs(90 * 60));
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow() {
        let now = NaiveDate::from_ymd_opt(2022, 3, 5)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let wait = until_next_occurrence(now, 9, 0);
        assert_eq!(wait, Duration::from_secs(24 * 60 * 60));
    }
}
