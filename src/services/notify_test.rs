use super::*;

#[test]
fn notice_without_subscribers_is_dropped() {
    let notifier = Notifier::new();
    assert_eq!(notifier.notify(Notice::info("Saved", "tags")), 0);
}

#[test]
fn every_subscriber_sees_each_notice() {
    let notifier = Notifier::new();
    let mut a = notifier.subscribe();
    let mut b = notifier.subscribe();

    assert_eq!(notifier.notify(Notice::error("Save failed", "tags: io error")), 2);

    let got = a.try_recv().unwrap();
    assert_eq!(got.level, NoticeLevel::Error);
    assert_eq!(got.life, DEFAULT_NOTICE_LIFE);
    assert_eq!(b.try_recv().unwrap(), got);
}

#[test]
fn notice_serializes_level_in_snake_case() {
    let value = serde_json::to_value(Notice::warning("Heads up", "")).unwrap();
    assert_eq!(value["level"], "warning");
}
