/// Integration tests: broadcast hub under connect/disconnect churn.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fade_protocol::{BroadcastHub, Identity, MessageId, ServerEvent};

fn expired(n: usize) -> ServerEvent {
    ServerEvent::MessageExpired {
        id: MessageId::from(format!("msg-{n}")),
    }
}

/// Three channels, one publish: exactly one delivery each.
#[test]
fn three_channels_one_delivery_each() {
    let hub = BroadcastHub::default();
    let mut subs = vec![
        hub.connect(&Identity::from("alice")),
        hub.connect(&Identity::from("bob")),
        hub.connect(&Identity::from("carol")),
    ];

    let report = hub.publish(&expired(1));
    assert_eq!(report.delivered, 3);
    assert_eq!(report.dropped, 0);

    for sub in &mut subs {
        assert_eq!(sub.try_recv(), Some(expired(1)));
        assert_eq!(sub.try_recv(), None);
    }
}

/// Stable subscribers keep FIFO order while others come and go.
#[test]
fn fifo_survives_churn() {
    let hub = BroadcastHub::new(2_000);
    let mut stable = hub.connect(&Identity::from("stable"));
    let stop = Arc::new(AtomicBool::new(false));

    let churners: Vec<_> = (0..4)
        .map(|t| {
            let hub = hub.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let who = Identity::from(format!("churn{t}"));
                let mut cycles = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    let sub = hub.connect(&who);
                    drop(sub);
                    cycles += 1;
                }
                cycles
            })
        })
        .collect();

    for n in 0..1_000 {
        hub.publish(&expired(n));
    }
    stop.store(true, Ordering::Relaxed);
    for c in churners {
        c.join().unwrap();
    }

    for n in 0..1_000 {
        assert_eq!(stable.try_recv(), Some(expired(n)));
    }
    assert_eq!(hub.channel_count(), 1);
    assert_eq!(hub.identity_count(), 1);
}

/// A stalled reader is cut loose; everyone else keeps receiving.
#[test]
fn slow_consumer_is_dropped() {
    let hub = BroadcastHub::new(4);
    let _stalled = hub.connect(&Identity::from("stalled"));
    let mut live = hub.connect(&Identity::from("live"));

    for n in 0..10 {
        hub.publish(&expired(n));
        assert_eq!(live.try_recv(), Some(expired(n)));
    }
    assert!(!hub.is_connected(&Identity::from("stalled")));
    assert!(hub.is_connected(&Identity::from("live")));
}
