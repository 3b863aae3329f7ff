use bucket_core::{Error, SeqNo};
use parking_lot::Mutex;

type NotifyCallback = Box<dyn FnOnce(Result<(), Error>) + Send>;

struct HighPriorityWaiter {
    target_seqno: SeqNo,
    callback: NotifyCallback,
}

/// Ordered waiters blocked on a specific persisted `bySeqno` (§3
/// "High-priority notification list", §4.4 "State transition"). Waiters
/// have no intrinsic deadline (§5) — they resolve only on reaching the
/// target, vBucket death, or explicit shutdown.
#[derive(Default)]
pub struct NotificationList {
    waiters: Mutex<Vec<HighPriorityWaiter>>,
}

impl NotificationList {
    pub fn new() -> Self {
        NotificationList::default()
    }

    pub fn register(&self, target_seqno: SeqNo, callback: NotifyCallback) {
        self.waiters.lock().push(HighPriorityWaiter { target_seqno, callback });
    }

    /// Resolves, in registration order, every waiter whose target has been
    /// reached by `persisted_seqno` (§4.4 "notify all high-priority waiters
    /// ... with Success").
    pub fn notify_persisted_up_to(&self, persisted_seqno: SeqNo) {
        let mut ready = Vec::new();
        {
            let mut waiters = self.waiters.lock();
            let mut remaining = Vec::with_capacity(waiters.len());
            for waiter in waiters.drain(..) {
                if waiter.target_seqno <= persisted_seqno {
                    ready.push(waiter);
                } else {
                    remaining.push(waiter);
                }
            }
            *waiters = remaining;
        }
        for waiter in ready {
            (waiter.callback)(Ok(()));
        }
    }

    /// Fails every still-registered waiter, e.g. on `* -> Dead` (§4.4
    /// "fail all waiters with NotMyVBucket").
    pub fn fail_all(&self, error: Error) {
        let waiters = std::mem::take(&mut *self.waiters.lock());
        for waiter in waiters {
            (waiter.callback)(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }
}
