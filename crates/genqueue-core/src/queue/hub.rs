//! NotificationHub - snapshot の同期的・順序付き配送
//!
//! # 設計
//! - scheduler は自分の lock を持ったまま `publish` する。outbox に入る順序は
//!   mutation の順序そのもの
//! - lock を離したあとに `flush` を呼ぶ。outbox が空いていれば呼び出し元が
//!   drainer になり、他スレッドが途中で publish した分も含めて順に配送する
//! - callback は scheduler の lock なしで走るので、`state()`、subscribe、
//!   unsubscribe を呼べる。callback 内の mutation は再入せず、現在の snapshot
//!   の後ろに並ぶ

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;

use super::{QueueSnapshot, lock};

type Callback = Arc<dyn Fn(&QueueSnapshot) + Send + Sync>;

#[derive(Default)]
struct Outbox {
    queue: VecDeque<QueueSnapshot>,
    draining: bool,
}

pub struct NotificationHub {
    subscribers: Mutex<Vec<(u64, Callback)>>,
    next_subscriber: AtomicU64,
    outbox: Mutex<Outbox>,
    latest: watch::Sender<QueueSnapshot>,
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl NotificationHub {
    pub(crate) fn new(initial: QueueSnapshot) -> Arc<Self> {
        let (latest, _) = watch::channel(initial);
        Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
            outbox: Mutex::new(Outbox::default()),
            latest,
        })
    }

    /// 以降のすべての snapshot を受け取る callback を登録
    ///
    /// 呼び出しは登録順。配送中に外された callback は、その 1 件だけ受け取る
    /// ことがある。
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&QueueSnapshot) + Send + Sync + 'static,
    {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).push((id, Arc::new(callback)));
        tracing::debug!(subscriber = id, "subscriber added");
        Subscription {
            hub: Arc::downgrade(self),
            id,
        }
    }

    /// 同じ broadcast から更新される最新値 channel（async な利用者向け）
    pub fn watch(&self) -> watch::Receiver<QueueSnapshot> {
        self.latest.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    fn remove(&self, id: u64) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }

    /// snapshot を配送待ちに積む。callback は走らせない
    pub(crate) fn publish(&self, snapshot: QueueSnapshot) {
        lock(&self.outbox).queue.push_back(snapshot);
    }

    /// 配送待ちを配送する。既に別の呼び出し元が配送中なら何もしない
    pub(crate) fn flush(&self) {
        {
            let mut outbox = lock(&self.outbox);
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let next = {
                let mut outbox = lock(&self.outbox);
                match outbox.queue.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            self.deliver(next);
        }
    }

    fn deliver(&self, snapshot: QueueSnapshot) {
        let callbacks: Vec<(u64, Callback)> = lock(&self.subscribers).clone();

        for (id, callback) in callbacks {
            // a panicking subscriber must not stall the drainer
            if catch_unwind(AssertUnwindSafe(|| callback(&snapshot))).is_err() {
                tracing::error!(
                    subscriber = id,
                    sequence = snapshot.sequence,
                    "subscriber panicked while handling snapshot"
                );
            }
        }

        self.latest.send_replace(snapshot);
    }
}

/// Subscription は `subscribe` が返すハンドル
///
/// drop しても解除されない。解除は [`Subscription::unsubscribe`] で行う。
#[derive(Debug)]
pub struct Subscription {
    hub: Weak<NotificationHub>,
    id: u64,
}

impl Subscription {
    /// callback が既に無い（または hub が drop 済み）なら `false`
    pub fn unsubscribe(self) -> bool {
        match self.hub.upgrade() {
            Some(hub) => {
                let removed = hub.remove(self.id);
                tracing::debug!(subscriber = self.id, removed, "subscriber removed");
                removed
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueStats;
    use chrono::Utc;

    fn snap(sequence: u64) -> QueueSnapshot {
        QueueSnapshot {
            sequence,
            taken_at: Utc::now(),
            size: 0,
            is_running: false,
            current_task_id: None,
            is_circuit_open: false,
            consecutive_failures: 0,
            stats: QueueStats::default(),
            pending_ids: Vec::new(),
            tasks: Vec::new(),
        }
    }

    fn recorder(hub: &Arc<NotificationHub>, tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Subscription {
        let log = Arc::clone(log);
        hub.subscribe(move |s| log.lock().unwrap().push(format!("{tag}:{}", s.sequence)))
    }

    #[test]
    fn delivers_in_publish_and_subscription_order() {
        let hub = NotificationHub::new(snap(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = recorder(&hub, "a", &log);
        let _b = recorder(&hub, "b", &log);

        hub.publish(snap(1));
        hub.publish(snap(2));
        hub.flush();

        assert_eq!(*log.lock().unwrap(), vec!["a:1", "b:1", "a:2", "b:2"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hub = NotificationHub::new(snap(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&hub, "a", &log);
        let _b = recorder(&hub, "b", &log);

        assert!(a.unsubscribe());
        hub.publish(snap(1));
        hub.flush();

        assert_eq!(*log.lock().unwrap(), vec!["b:1"]);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn panicking_subscriber_is_isolated() {
        let hub = NotificationHub::new(snap(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let _bad = hub.subscribe(|_| panic!("boom"));
        let _good = recorder(&hub, "good", &log);

        hub.publish(snap(1));
        hub.flush();
        hub.publish(snap(2));
        hub.flush();

        assert_eq!(*log.lock().unwrap(), vec!["good:1", "good:2"]);
    }

    #[test]
    fn publish_from_inside_a_callback_is_delivered_after() {
        let hub = NotificationHub::new(snap(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&hub);
        let _echo = hub.subscribe(move |s| {
            if s.sequence == 1
                && let Some(hub) = weak.upgrade()
            {
                hub.publish(snap(2));
                hub.flush(); // already draining: returns immediately
            }
        });
        let _rec = recorder(&hub, "r", &log);

        hub.publish(snap(1));
        hub.flush();

        assert_eq!(*log.lock().unwrap(), vec!["r:1", "r:2"]);
    }

    #[test]
    fn watch_sees_latest_snapshot() {
        let hub = NotificationHub::new(snap(0));
        let rx = hub.watch();
        assert_eq!(rx.borrow().sequence, 0);

        hub.publish(snap(1));
        hub.publish(snap(2));
        hub.flush();

        assert_eq!(rx.borrow().sequence, 2);
    }

    #[test]
    fn unsubscribe_after_hub_dropped_is_false() {
        let hub = NotificationHub::new(snap(0));
        let sub = hub.subscribe(|_| {});
        drop(hub);
        assert!(!sub.unsubscribe());
    }
}
