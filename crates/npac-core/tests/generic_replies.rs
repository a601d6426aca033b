//! Replies to messages sent on behalf of queued client requests

mod common;

use std::time::Duration;

use common::*;
use npac_core::message::error_codes;
use npac_core::prelude::*;

#[tokio::test(start_paused = true)]
async fn test_success_deletes_and_forwards() {
    let h = Harness::new(config());
    let session = live_session(&h.adapter, &["P1"]);

    let id = h
        .adapter
        .send_generic(&session, "msg-1", "P1", Some(southeast()), "<create/>")
        .await
        .unwrap();
    let (sent, request) = h.gateway.next().await;
    assert_eq!(sent, id);
    assert_eq!(request.name(), "generic");
    assert!(h.adapter.is_generic_reply(&id));

    h.reply(&id, Reply::new().with_status("success").with_body("<ok/>"));
    settle().await;

    assert!(!h.adapter.is_generic_reply(&id));
    assert_eq!(h.queue.events(), vec![QueueEvent::Deleted("msg-1".to_string())]);
    assert_eq!(h.processor.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_rejections_requeue() {
    let h = Harness::new(config());
    let session = live_session(&h.adapter, &["P1"]);

    let cases = [
        (error_codes::SESSION_INVALID, "session invalid"),
        (error_codes::ASSOCIATION_IN_RECOVERY, "association in recovery"),
        (error_codes::REGION_NOT_ASSOCIATED, "region not associated"),
    ];
    for (i, (code, reason)) in cases.iter().enumerate() {
        let key = format!("msg-{}", i);
        let id = h
            .adapter
            .send_generic(&session, &key, "P1", None, "<modify/>")
            .await
            .unwrap();
        h.gateway.next().await;
        h.reply(&id, Reply::new().with_status("failed").with_error_code(*code));
        settle().await;

        assert_eq!(
            h.queue.events().last().cloned(),
            Some(QueueEvent::Status(
                key,
                QueueStatus::Failure,
                Some(reason.to_string())
            ))
        );
    }
    assert_eq!(h.processor.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_error_reply_gets_customer_id() {
    let h = Harness::new(config());
    let session = live_session(&h.adapter, &["P1"]);

    let id = h
        .adapter
        .send_generic(&session, "msg-9", "P1", Some(southeast()), "<query/>")
        .await
        .unwrap();
    h.gateway.next().await;

    assert_eq!(
        h.adapter
            .handle_error(&id, Reply::new().with_error_code("syntax-error")),
        AckCode::Ack
    );
    settle().await;

    let processed = h.processor.replies.lock().unwrap().clone();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].customer_id.as_deref(), Some("P1"));
    assert_eq!(processed[0].region, Some(southeast()));
    assert_eq!(h.queue.events(), vec![QueueEvent::Deleted("msg-9".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_marks_for_retry() {
    let h = Harness::new(config());
    let session = live_session(&h.adapter, &["P1"]);

    h.adapter
        .send_generic(&session, "msg-2", "P1", None, "<cancel/>")
        .await
        .unwrap();
    h.gateway.next().await;

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(
        h.queue.events(),
        vec![QueueEvent::Status(
            "msg-2".to_string(),
            QueueStatus::Retry,
            Some("reply timed out".to_string())
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_requires_live_session() {
    let h = Harness::new(config());
    let session = h.adapter.add_session(Session::new("0002"));

    let result = h
        .adapter
        .send_generic(&session, "msg-3", "0002", None, "<create/>")
        .await;
    assert!(matches!(result, Err(NpacError::SessionNotFound(_))));
    assert!(h.gateway.next_within(Duration::from_secs(1)).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_refused_send_is_an_error() {
    let h = Harness::new(config());
    let session = live_session(&h.adapter, &["P1"]);
    h.gateway.set_nack(true);

    let result = h
        .adapter
        .send_generic(&session, "msg-4", "P1", None, "<create/>")
        .await;
    assert!(matches!(result, Err(NpacError::Gateway(_))));
    assert!(h.adapter.pending_replies().is_empty());
}

/// Many messages in flight at once each get their own reply
#[tokio::test(start_paused = true)]
async fn test_concurrent_sends_correlate() {
    let h = Harness::new(config());
    let session = live_session(&h.adapter, &["P1"]);

    let sends = (0..10).map(|i| {
        let adapter = h.adapter.clone();
        let session = session.clone();
        async move {
            let key = format!("msg-{}", i);
            let sent = adapter
                .send_generic(&session, &key, "P1", None, "<create/>")
                .await;
            sent
        }
    });
    let ids: Vec<InvokeId> = futures::future::join_all(sends)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(h.adapter.pending_replies().len(), 10);

    for id in ids.iter().rev() {
        h.reply(id, Reply::new().with_status("success"));
    }
    settle().await;

    assert!(h.adapter.pending_replies().is_empty());
    let mut deleted: Vec<_> = h
        .queue
        .events()
        .into_iter()
        .filter_map(|e| match e {
            QueueEvent::Deleted(key) => Some(key),
            _ => None,
        })
        .collect();
    deleted.sort();
    assert_eq!(deleted.len(), 10);
    assert_eq!(h.processor.count(), 10);
}

/// A queue bookkeeping failure does not keep the reply from going downstream
#[tokio::test(start_paused = true)]
async fn test_queue_failure_still_forwards() {
    let h = Harness::new(config());
    let session = live_session(&h.adapter, &["P1"]);
    h.queue.set_failing(true);

    let id = h
        .adapter
        .send_generic(&session, "msg-5", "P1", None, "<create/>")
        .await
        .unwrap();
    h.gateway.next().await;
    h.reply(&id, Reply::new().with_status("success"));
    settle().await;

    assert!(h.queue.events().is_empty());
    assert_eq!(h.processor.count(), 1);
}
