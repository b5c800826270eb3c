#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use crate::dispatch::{CallbackKind, Dispatch, DispatchConfig, Dispatcher};
    use crate::error::TransportError;
    use crate::replica::PrimaryGate;
    use crate::transport::{CallbackTable, LocalNetwork, LockCallback};
    use crate::types::{ClientId, LockId, LockStatus, Xid};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(CallbackKind, LockId, Xid)>>,
    }

    impl LockCallback for Recorder {
        fn revoke(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
            self.calls.lock().push((CallbackKind::Revoke, lid, xid));
            Ok(LockStatus::Ok)
        }

        fn retry(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
            self.calls.lock().push((CallbackKind::Retry, lid, xid));
            Ok(LockStatus::Ok)
        }
    }

    struct Switch(AtomicBool);

    impl PrimaryGate for Switch {
        fn is_primary(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn item(receiver: &str, lid: u64, xid: Xid) -> Dispatch {
        Dispatch::new(None, ClientId::new(receiver), LockId(lid), xid)
    }

    fn spawn(network: &Arc<LocalNetwork>, gate: Arc<dyn PrimaryGate>) -> Dispatcher {
        let callbacks = Arc::new(CallbackTable::new(network.clone()));
        let config = DispatchConfig {
            retry_backoff: Duration::from_millis(10),
        };
        Dispatcher::spawn(callbacks, gate, config).unwrap()
    }

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_callbacks_delivered_in_order_per_kind() {
        let network = Arc::new(LocalNetwork::new());
        let recorder = Arc::new(Recorder::default());
        network.register(ClientId::new("a"), recorder.clone());
        let dispatcher = spawn(&network, Arc::new(Switch(AtomicBool::new(true))));

        dispatcher.revoke(item("a", 1, 10));
        dispatcher.revoke(item("a", 2, 11));
        dispatcher.retry(item("a", 3, 12));

        wait_until("three deliveries", || recorder.calls.lock().len() == 3);
        let revokes: Vec<_> = recorder
            .calls
            .lock()
            .iter()
            .filter(|(kind, _, _)| *kind == CallbackKind::Revoke)
            .map(|(_, lid, xid)| (*lid, *xid))
            .collect();
        assert_eq!(revokes, vec![(LockId(1), 10), (LockId(2), 11)]);
        assert_eq!(dispatcher.stats(CallbackKind::Revoke).delivered, 2);
        assert_eq!(dispatcher.stats(CallbackKind::Retry).delivered, 1);
        dispatcher.shutdown();
    }

    #[test]
    fn test_failed_delivery_is_requeued_until_it_succeeds() {
        let network = Arc::new(LocalNetwork::new());
        let dispatcher = spawn(&network, Arc::new(Switch(AtomicBool::new(true))));

        // Nobody is registered as "late" yet
        dispatcher.retry(item("late", 4, 1));
        wait_until("a requeue", || dispatcher.stats(CallbackKind::Retry).requeued >= 1);

        let recorder = Arc::new(Recorder::default());
        network.register(ClientId::new("late"), recorder.clone());
        wait_until("delivery", || dispatcher.stats(CallbackKind::Retry).delivered == 1);
        assert_eq!(*recorder.calls.lock(), vec![(CallbackKind::Retry, LockId(4), 1)]);
        dispatcher.shutdown();
    }

    #[test]
    fn test_backup_drops_callbacks() {
        let network = Arc::new(LocalNetwork::new());
        let recorder = Arc::new(Recorder::default());
        network.register(ClientId::new("a"), recorder.clone());
        let gate = Arc::new(Switch(AtomicBool::new(false)));
        let dispatcher = spawn(&network, gate.clone());

        dispatcher.revoke(item("a", 1, 1));
        wait_until("drop", || dispatcher.stats(CallbackKind::Revoke).dropped == 1);

        gate.0.store(true, Ordering::SeqCst);
        dispatcher.revoke(item("a", 1, 2));
        wait_until("delivery", || dispatcher.stats(CallbackKind::Revoke).delivered == 1);

        assert_eq!(*recorder.calls.lock(), vec![(CallbackKind::Revoke, LockId(1), 2)]);
        dispatcher.shutdown();
    }
}
