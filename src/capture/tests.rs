use super::*;
use anyhow::bail;
use serde_json::json;
use std::panic::{self, AssertUnwindSafe};

// ===================================================================
// message_payload
// ===================================================================

#[test]
fn payload_from_content_field() {
    let msg = json!({ "role": "assistant", "content": "  Checking logs.  " });
    assert_eq!(message_payload(&msg), Ok(Some("Checking logs.".into())));
}

#[test]
fn payload_falls_back_to_output_when_content_missing_or_empty() {
    let missing = json!({ "output": "tool said hi" });
    let empty = json!({ "content": "", "output": "tool said hi" });
    let null = json!({ "content": null, "output": "tool said hi" });
    for msg in [missing, empty, null] {
        assert_eq!(message_payload(&msg), Ok(Some("tool said hi".into())));
    }
}

#[test]
fn payload_from_nested_text_then_message() {
    let text = json!({ "content": { "text": "nested text", "message": "ignored" } });
    let message = json!({ "content": { "text": "", "message": "nested message" } });
    assert_eq!(message_payload(&text), Ok(Some("nested text".into())));
    assert_eq!(message_payload(&message), Ok(Some("nested message".into())));
}

#[test]
fn nested_record_without_text_is_rendered_whole() {
    let msg = json!({ "content": { "tool": "search", "hits": 2 } });
    let payload = message_payload(&msg).unwrap().unwrap();
    let reparsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(reparsed, json!({ "tool": "search", "hits": 2 }));
}

#[test]
fn record_without_payload_fields_yields_nothing() {
    assert_eq!(message_payload(&json!({ "role": "assistant" })), Ok(None));
    assert_eq!(message_payload(&json!({ "content": "   " })), Ok(None));
    assert_eq!(message_payload(&json!({})), Ok(None));
}

#[test]
fn non_record_messages_are_rendered_as_strings() {
    assert_eq!(message_payload(&json!("plain reply")), Ok(Some("plain reply".into())));
    assert_eq!(message_payload(&json!(42)), Ok(Some("42".into())));
    assert_eq!(message_payload(&json!(["a", "b"])), Ok(Some(r#"["a","b"]"#.into())));
    assert_eq!(message_payload(&serde_json::Value::Null), Ok(None));
}

#[test]
fn non_text_content_is_an_error() {
    assert_eq!(
        message_payload(&json!({ "content": 7 })),
        Err(PayloadError::NotText { field: "content", kind: "number" })
    );
    assert_eq!(
        message_payload(&json!({ "content": ["x"] })),
        Err(PayloadError::NotText { field: "content", kind: "array" })
    );
    assert_eq!(
        message_payload(&json!({ "content": { "text": { "deep": true } } })),
        Err(PayloadError::NotText { field: "text", kind: "record" })
    );
}

// ===================================================================
// UserInbox taps
// ===================================================================

#[test]
fn delivery_without_taps_is_counted() {
    let inbox = UserInbox::new();
    inbox.deliver(json!({ "content": "hello" }));
    assert_eq!(inbox.delivered_count(), 1);
    assert_eq!(inbox.tap_count(), 0);
}

#[test]
fn tap_observes_and_guard_removes_it() {
    let inbox = UserInbox::new();
    let seen: Rc<RefCell<usize>> = Rc::default();
    {
        let counter = Rc::clone(&seen);
        let _guard = inbox.install_tap(move |_| *counter.borrow_mut() += 1);
        assert_eq!(inbox.tap_count(), 1);
        inbox.deliver(json!("one"));
        inbox.deliver(json!("two"));
    }
    assert_eq!(inbox.tap_count(), 0);
    inbox.deliver(json!("three"));
    assert_eq!(*seen.borrow(), 2);
    assert_eq!(inbox.delivered_count(), 3);
}

#[test]
fn dropping_one_guard_keeps_other_taps() {
    let inbox = UserInbox::new();
    let outer = inbox.install_tap(|_| {});
    {
        let _inner = inbox.install_tap(|_| {});
        assert_eq!(inbox.tap_count(), 2);
    }
    assert_eq!(inbox.tap_count(), 1);
    drop(outer);
    assert_eq!(inbox.tap_count(), 0);
}

// ===================================================================
// run_and_capture
// ===================================================================

#[test]
fn captures_payloads_in_delivery_order() {
    let inbox = UserInbox::new();
    let captured = run_and_capture(&inbox, |inbox| {
        inbox.deliver(json!({ "content": "Checking logs." }));
        inbox.deliver(json!({ "content": "Solution: restart the spooler service." }));
        inbox.deliver(json!({ "content": "Solution: clear the print queue." }));
        Ok(())
    })
    .unwrap();

    assert_eq!(
        captured,
        vec![
            "Checking logs.",
            "Solution: restart the spooler service.",
            "Solution: clear the print queue.",
        ]
    );
    assert_eq!(inbox.delivered_count(), 3);
    assert_eq!(inbox.tap_count(), 0);
}

#[test]
fn malformed_messages_are_skipped_not_fatal() {
    let inbox = UserInbox::new();
    let captured = run_and_capture(&inbox, |inbox| {
        inbox.deliver(json!({ "content": 12 }));
        inbox.deliver(json!({ "content": "   " }));
        inbox.deliver(json!({ "content": "still here" }));
        Ok(())
    })
    .unwrap();

    assert_eq!(captured, vec!["still here"]);
    // Delivery itself is untouched: every message reached the log.
    assert_eq!(inbox.delivered_count(), 3);
}

#[test]
fn round_with_no_messages_captures_nothing() {
    let inbox = UserInbox::new();
    let captured = run_and_capture(&inbox, |_| Ok(())).unwrap();
    assert!(captured.is_empty());
}

#[test]
fn failing_round_still_restores_delivery() {
    let inbox = UserInbox::new();
    let result = run_and_capture(&inbox, |inbox| {
        inbox.deliver(json!({ "content": "partial" }));
        bail!("conversation backend unavailable")
    });

    let err = result.unwrap_err();
    assert!(err.to_string().contains("backend unavailable"));
    assert_eq!(inbox.tap_count(), 0);

    inbox.deliver(json!({ "content": "after" }));
    assert_eq!(inbox.delivered_count(), 2);
}

#[test]
fn panicking_round_still_restores_delivery() {
    let inbox = UserInbox::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_and_capture(&inbox, |inbox| {
            inbox.deliver(json!("before panic"));
            panic!("round exploded");
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(inbox.tap_count(), 0);

    let seen: Rc<RefCell<Vec<serde_json::Value>>> = Rc::default();
    let log = Rc::clone(&seen);
    let _tap = inbox.install_tap(move |m| log.borrow_mut().push(m.clone()));
    inbox.deliver(json!("after"));
    assert_eq!(*seen.borrow(), vec![json!("after")]);
    assert_eq!(inbox.delivered_count(), 2);
}

#[test]
fn reentrant_tap_panics_without_wedging_the_inbox() {
    let inbox = Rc::new(UserInbox::new());
    let weak = Rc::downgrade(&inbox);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _echo = inbox.install_tap(move |m| {
            if let Some(inbox) = weak.upgrade() {
                inbox.deliver(m.clone());
            }
        });
        inbox.deliver(json!("loop"));
    }));

    assert!(outcome.is_err());
    assert_eq!(inbox.tap_count(), 0);
    assert_eq!(inbox.delivered_count(), 0);

    inbox.deliver(json!("after"));
    assert_eq!(inbox.delivered_count(), 1);
}

#[test]
fn capture_does_not_disturb_existing_taps() {
    let inbox = UserInbox::new();
    let seen: Rc<RefCell<Vec<serde_json::Value>>> = Rc::default();
    let log = Rc::clone(&seen);
    let _audit = inbox.install_tap(move |m| log.borrow_mut().push(m.clone()));

    let captured = run_and_capture(&inbox, |inbox| {
        inbox.deliver(json!({ "content": "hi" }));
        Ok(())
    })
    .unwrap();

    assert_eq!(captured, vec!["hi"]);
    assert_eq!(inbox.tap_count(), 1);
    assert_eq!(*seen.borrow(), vec![json!({ "content": "hi" })]);
}
