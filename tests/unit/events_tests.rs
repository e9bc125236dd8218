/*!
 * Tests for the event channel and subscription groups
 */

use parking_lot::Mutex;
use std::sync::Arc;

use ollama_translator::events::{Delivery, Event, EventBus, SubscriptionGroup, Topic};

fn recorder() -> (Arc<Mutex<Vec<Event>>>, impl Fn(Event) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |event| sink.lock().push(event))
}

/// Events reach only the subscribers of their topic, in publish order
#[test]
fn test_publish_withTopicSubscribers_shouldDeliverInOrder() {
    let bus = EventBus::new();
    let (chunks, on_chunk) = recorder();
    let (dones, on_done) = recorder();
    let _chunk_sub = bus.subscribe(Topic::Chunk, on_chunk);
    let _done_sub = bus.subscribe(Topic::Done, on_done);

    assert_eq!(bus.publish(Event::Chunk("A".into())), 1);
    assert_eq!(bus.publish(Event::Chunk("B".into())), 1);
    assert_eq!(bus.publish(Event::done(true, Some(0))), 1);
    assert_eq!(bus.publish(Event::Log("ignored".into())), 0);

    assert_eq!(
        *chunks.lock(),
        vec![Event::Chunk("A".into()), Event::Chunk("B".into())]
    );
    assert_eq!(*dones.lock(), vec![Event::done(true, Some(0))]);
}

/// Unsubscribing twice is harmless and stops delivery
#[test]
fn test_unsubscribe_calledTwice_shouldBeIdempotent() {
    let bus = EventBus::new();
    let (seen, handler) = recorder();
    let mut subscription = bus.subscribe(Topic::Input, handler);
    assert!(subscription.is_active());
    assert_eq!(subscription.topic(), Topic::Input);

    subscription.unsubscribe();
    subscription.unsubscribe();

    assert!(!subscription.is_active());
    assert_eq!(bus.subscriber_count(Topic::Input), 0);
    assert_eq!(bus.publish(Event::Input("hello".into())), 0);
    assert!(seen.lock().is_empty());
}

/// Dropping a subscription unregisters its handler
#[test]
fn test_subscription_whenDropped_shouldUnregister() {
    let bus = EventBus::new();
    {
        let _subscription = bus.subscribe(Topic::Chunk, |_| {});
        assert_eq!(bus.subscriber_count(Topic::Chunk), 1);
    }
    assert_eq!(bus.subscriber_count(Topic::Chunk), 0);
}

/// A closed bus drops everything and refuses new traffic
#[test]
fn test_close_withLiveSubscriptions_shouldStopDelivery() {
    let bus = EventBus::new();
    let (seen, handler) = recorder();
    let subscription = bus.subscribe(Topic::Chunk, handler);

    bus.close();

    assert!(bus.is_closed());
    assert!(!subscription.is_active());
    assert_eq!(bus.publish(Event::Chunk("late".into())), 0);
    assert!(seen.lock().is_empty());

    let late = bus.subscribe(Topic::Chunk, |_| {});
    assert!(!late.is_active());
    assert_eq!(bus.subscriber_count(Topic::Chunk), 0);
}

/// A group covers chunk, done, error and input, tagging deliveries with its generation
#[test]
fn test_subscription_group_withAllTopics_shouldTagGeneration() {
    let bus = EventBus::new();
    let deliveries = Arc::new(Mutex::new(Vec::<Delivery>::new()));
    let sink = deliveries.clone();
    let group = SubscriptionGroup::establish(&bus, 7, move |delivery| sink.lock().push(delivery));

    assert!(group.is_active());
    assert_eq!(group.generation(), 7);
    for topic in SubscriptionGroup::TOPICS {
        assert_eq!(bus.subscriber_count(topic), 1);
    }
    assert_eq!(bus.subscriber_count(Topic::Log), 0);

    bus.publish(Event::Chunk("x".into()));
    bus.publish(Event::error("boom"));
    bus.publish(Event::Input("text".into()));

    let deliveries = deliveries.lock();
    assert_eq!(deliveries.len(), 3);
    assert!(deliveries.iter().all(|delivery| delivery.generation == 7));
    assert_eq!(deliveries[1].event, Event::error("boom"));
}

/// Teardown removes all four members and can be repeated
#[test]
fn test_subscription_group_teardown_calledTwice_shouldLeaveNothingBehind() {
    let bus = EventBus::new();
    let mut group = SubscriptionGroup::establish(&bus, 1, |_| {});

    group.teardown();
    group.teardown();

    assert!(!group.is_active());
    for topic in SubscriptionGroup::TOPICS {
        assert_eq!(bus.subscriber_count(topic), 0);
    }
}

/// Replacing a group leaves exactly one live subscription per topic
#[test]
fn test_subscription_group_whenReplaced_shouldNotAccumulate() {
    let bus = EventBus::new();
    let mut current = SubscriptionGroup::establish(&bus, 1, |_| {});

    for generation in 2..6 {
        current.teardown();
        current = SubscriptionGroup::establish(&bus, generation, |_| {});
    }

    assert_eq!(current.generation(), 5);
    for topic in SubscriptionGroup::TOPICS {
        assert_eq!(bus.subscriber_count(topic), 1);
    }
}

/// With nobody listening the event goes to the fallback instead of being dropped
#[test]
fn test_publish_or_else_withoutSubscribers_shouldUseFallback() {
    let bus = EventBus::new();
    let (fallback, on_fallback) = recorder();

    assert_eq!(bus.publish_or_else(Event::Input("early".into()), &on_fallback), 0);

    let (inputs, on_input) = recorder();
    let _input_sub = bus.subscribe(Topic::Input, on_input);
    assert_eq!(bus.publish_or_else(Event::Input("late".into()), &on_fallback), 1);

    assert_eq!(*fallback.lock(), vec![Event::Input("early".into())]);
    assert_eq!(*inputs.lock(), vec![Event::Input("late".into())]);
}

/// Input published while groups are being swapped is received exactly once
#[test]
fn test_publish_or_else_duringGroupSwaps_shouldLoseNothing() {
    const SENT: usize = 20_000;
    let bus = EventBus::new();
    let received = Arc::new(Mutex::new(Vec::new()));

    let publisher = {
        let bus = bus.clone();
        let received = received.clone();
        std::thread::spawn(move || {
            for i in 0..SENT {
                bus.publish_or_else(Event::Input(i.to_string()), |event| received.lock().push(event));
            }
        })
    };

    let forward = |received: Arc<Mutex<Vec<Event>>>| {
        move |delivery: Delivery| {
            if let Event::Input(_) = delivery.event {
                received.lock().push(delivery.event);
            }
        }
    };
    let mut group = SubscriptionGroup::establish(&bus, 1, forward(received.clone()));
    let mut generation = 1;
    while !publisher.is_finished() {
        group.teardown();
        generation += 1;
        group = SubscriptionGroup::establish(&bus, generation, forward(received.clone()));
    }
    publisher.join().unwrap();
    group.teardown();

    let received = received.lock();
    assert_eq!(received.len(), SENT);
    let mut seen: Vec<usize> = received
        .iter()
        .map(|event| match event {
            Event::Input(text) => text.parse().unwrap(),
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), SENT);
}
