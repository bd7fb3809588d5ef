//! Property tests for refcounting, expiry and selector parsing.

use futures::executor::LocalPool;
use futures::future::{self, FutureExt, LocalBoxFuture};
use proptest::prelude::*;
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use switchyard::dom::SelectorList;
use switchyard::{
    BindingError, Context, Event, EventBus, ListenerHandle, ListenerResult, ManualClock,
    MemoryStorage, ResourceBinding, SetOptions, Tier, Timestamp,
};

#[derive(Default)]
struct CountingBinding {
    enables: Cell<usize>,
    disables: Cell<usize>,
}

impl CountingBinding {
    fn enable_call(&self) -> LocalBoxFuture<'static, Result<(), BindingError>> {
        self.enables.set(self.enables.get() + 1);
        future::ready(Ok(())).boxed_local()
    }

    fn disable_call(&self) -> LocalBoxFuture<'static, Result<(), BindingError>> {
        self.disables.set(self.disables.get() + 1);
        future::ready(Ok(())).boxed_local()
    }
}

impl ResourceBinding for CountingBinding {
    fn enable(&self, _id: &str) -> LocalBoxFuture<'static, Result<(), BindingError>> {
        self.enable_call()
    }

    fn disable(&self, _id: &str) -> LocalBoxFuture<'static, Result<(), BindingError>> {
        self.disable_call()
    }

    fn enable_item(&self, _id: &str, _sub_id: &str) -> LocalBoxFuture<'static, Result<(), BindingError>> {
        self.enable_call()
    }

    fn disable_item(&self, _id: &str, _sub_id: &str) -> LocalBoxFuture<'static, Result<(), BindingError>> {
        self.disable_call()
    }
}

#[derive(Clone, Debug)]
enum Step {
    Subscribe,
    Unsubscribe(usize),
    /// Let in-flight binding calls resolve.
    Settle,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::Subscribe),
        3 => any::<usize>().prop_map(Step::Unsubscribe),
        2 => Just(Step::Settle),
    ]
}

fn noop(_: &Event) -> ListenerResult {
    Ok(())
}

proptest! {
    #[test]
    fn prop_feed_held_iff_listeners_after_settling(steps in prop::collection::vec(step(), 0..40)) {
        const NAME: &str = "resource:posts:update";
        let mut pool = LocalPool::new();
        let binding = Rc::new(CountingBinding::default());
        let bus = EventBus::builder()
            .resources(binding.clone(), Rc::new(pool.spawner()))
            .build();
        let mut live: Vec<ListenerHandle> = Vec::new();

        for step in steps {
            match step {
                Step::Subscribe => live.push(bus.on(NAME, noop).handle),
                Step::Unsubscribe(i) if !live.is_empty() => {
                    let handle = live.remove(i % live.len());
                    prop_assert!(bus.off(NAME, handle).is_some());
                }
                Step::Unsubscribe(_) => {}
                Step::Settle => pool.run_until_stalled(),
            }
            // Never a disable without a preceding enable.
            prop_assert!(binding.disables.get() <= binding.enables.get());
            prop_assert!(binding.enables.get() - binding.disables.get() <= 1);
        }

        pool.run_until_stalled();
        let held = binding.enables.get() - binding.disables.get();
        prop_assert_eq!(held == 1, !live.is_empty());
        prop_assert_eq!(bus.listener_count(NAME), live.len());
    }

    #[test]
    fn prop_entry_visible_until_ttl_passes(
        ttl in 0u64..10_000,
        elapsed in 0u64..20_000,
        tier_index in 0usize..3,
    ) {
        let clock = ManualClock::new(Timestamp(1_700_000_000_000));
        let ctx: Context = Context::builder()
            .clock(Rc::new(clock.clone()))
            .session(Rc::new(MemoryStorage::new()))
            .local(Rc::new(MemoryStorage::new()))
            .build();
        let tier = Tier::ALL[tier_index];

        ctx.store().set(
            "k",
            json!(ttl),
            SetOptions::default().tier(tier).ttl(Duration::from_millis(ttl)),
        );
        clock.advance(Duration::from_millis(elapsed));

        prop_assert_eq!(ctx.store().has("k"), elapsed <= ttl);
    }

    #[test]
    fn prop_selector_parse_never_panics(input in "\\PC{0,24}") {
        let _ = SelectorList::parse(&input);
    }

    #[test]
    fn prop_class_selectors_parse(classes in prop::collection::vec("[a-z][a-z0-9_-]{0,8}", 1..4)) {
        let selector = format!(".{}", classes.join("."));
        prop_assert!(SelectorList::parse(&selector).is_ok());
    }
}
