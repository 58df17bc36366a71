use singleton_cell::{DoubleChecked, InitError, OnceSlot, Phase, Singleton, Strategy, Synchronized};

/// An initializer that asks its own slot for the value gets an error instead of a deadlock, and
/// its own result still lands in the slot.
fn reentry_is_reported<S: Strategy<u32>>() {
    let slot = S::EMPTY;

    let outer = slot.get_or_try_init(|| {
        assert_eq!(slot.phase(), Phase::InProgress);
        assert!(slot.get().is_none());
        let inner = slot.get_or_try_init(|| Ok::<_, ()>(1));
        assert_eq!(inner, Err(InitError::Reentrant));
        Ok::<_, ()>(2)
    });

    assert_eq!(outer, Ok(&2));
    assert_eq!(slot.phase(), Phase::Ready);
}

#[test]
fn synchronized_reentry() {
    reentry_is_reported::<Synchronized<u32>>();
}

#[test]
fn double_checked_reentry() {
    reentry_is_reported::<DoubleChecked<u32>>();
}

#[test]
fn holder_reentry() {
    reentry_is_reported::<OnceSlot<u32>>();
}

#[test]
fn other_slots_are_not_reentry() {
    let outer = OnceSlot::new();
    let inner = DoubleChecked::new();

    let v = outer.get_or_init(|| *inner.get_or_init(|| 20) + 1);
    assert_eq!(*v, 21);
    assert_eq!(inner.get(), Some(&20));
}

#[test]
fn mark_is_cleared_after_failure() {
    let slot = Synchronized::new();
    assert_eq!(slot.get_or_try_init(|| Err::<u32, _>("down")), Err(InitError::Failed("down")));
    // a second attempt on the same thread is not mistaken for reentry
    assert_eq!(slot.get_or_try_init(|| Ok::<_, &str>(5)), Ok(&5));
}

static SELF_REFERENTIAL: Singleton<u32> = Singleton::new(|| *SELF_REFERENTIAL.get_instance() + 1);

#[test]
#[should_panic(expected = "requested from its own constructor")]
fn accessor_panics_on_reentry() {
    SELF_REFERENTIAL.get_instance();
}

#[test]
fn error_helpers() {
    let failed: InitError<&str> = InitError::Failed("down");
    assert_eq!(failed.to_string(), "instance construction failed: down");
    assert!(!failed.is_reentrant());
    assert_eq!(failed.map(str::len), InitError::Failed(4));
    assert_eq!(failed.into_failure(), Some("down"));

    let reentrant: InitError<&str> = InitError::Reentrant;
    assert!(reentrant.is_reentrant());
    assert_eq!(reentrant.into_failure(), None);
}
