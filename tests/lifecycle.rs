//! End-to-end scenarios driven against the in-memory fake transport:
//! no real server is needed to exercise correlation and dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dms_client::{
    ChangelogQuery, ChangelogReadOptions, Client, ClientConfig, DeleteOptions, GetOptions,
    SetOptions, SubscribeOptions,
};
use serde_json::json;

async fn send_and_capture_tag(
    sent: &mut tokio::sync::mpsc::UnboundedReceiver<String>,
    verb: &str,
) -> (serde_json::Value, String) {
    let raw = sent.recv().await.expect("client should have sent a frame");
    let envelope: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let tag = envelope[verb][0]["tag"].as_str().unwrap().to_owned();
    (envelope, tag)
}

#[tokio::test]
async fn get_round_trips_a_datapoint_record() {
    let (client, (mut sent, feed)) = Client::from_fake(ClientConfig::new());

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.dp_get("/plant/temp", GetOptions::default()).await }
    });

    let (_envelope, tag) = send_and_capture_tag(&mut sent, "get").await;
    feed.send(format!(
        r#"{{"get":[{{"tag":"{tag}","code":"ok","data":[
            {{"path":"/plant/temp","value":21.5,"stamp":"2026-01-01T12:00:00Z","state":"ok"}}
        ]}}]}}"#
    ))
    .unwrap();

    let response = call.await.unwrap().unwrap();
    assert!(response.code.is_ok());
    assert_eq!(response.records.len(), 1);
    assert_eq!(response.records[0].path, "/plant/temp");
    assert_eq!(response.records[0].value, Some(json!(21.5)));
}

#[tokio::test]
async fn set_then_rename_then_delete() {
    let (client, (mut sent, feed)) = Client::from_fake(ClientConfig::new());

    for (verb, call) in [
        ("set", "dp_set"),
        ("rename", "dp_rename"),
        ("delete", "dp_delete"),
    ] {
        let client = client.clone();
        let handle = match call {
            "dp_set" => tokio::spawn(async move {
                client
                    .dp_set("/a/b", SetOptions::new(json!(true)).with_create(true))
                    .await
                    .map(|r| r.code)
            }),
            "dp_rename" => tokio::spawn(async move { client.dp_rename("/a/b", "/a/c").await.map(|r| r.code) }),
            _ => tokio::spawn(async move {
                client
                    .dp_delete("/a/c", DeleteOptions::new().with_recursive(false))
                    .await
                    .map(|r| r.code)
            }),
        };

        let (_envelope, tag) = send_and_capture_tag(&mut sent, verb).await;
        feed.send(format!(r#"{{"{verb}":[{{"tag":"{tag}","code":"ok"}}]}}"#))
            .unwrap();
        assert!(handle.await.unwrap().unwrap().is_ok());
    }
}

#[tokio::test]
async fn subscribe_receive_event_then_unsubscribe() {
    let (client, (mut sent, feed)) = Client::from_fake(ClientConfig::new());

    let sub_call = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .subscribe("/plant/pump1", SubscribeOptions::default())
                .await
        }
    });

    let (_envelope, sub_tag) = send_and_capture_tag(&mut sent, "subscribe").await;
    feed.send(format!(r#"{{"subscribe":[{{"tag":"{sub_tag}","code":"ok"}}]}}"#))
        .unwrap();
    let subscription = sub_call.await.unwrap().unwrap();
    assert_eq!(subscription.tag().as_str(), sub_tag);

    let received = Arc::new(AtomicUsize::new(0));
    let received_clone = received.clone();
    subscription.on_event(move |_event| {
        received_clone.fetch_add(1, Ordering::SeqCst);
    });

    feed.send(format!(
        r#"{{"event":[{{"tag":"{sub_tag}","path":"/plant/pump1","code":"onChange","value":true}}]}}"#
    ))
    .unwrap();

    for _ in 0..50 {
        if received.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(received.load(Ordering::SeqCst), 1);

    let unsub_call = tokio::spawn(async move { subscription.unsubscribe().await });
    let (_envelope, unsub_tag) = send_and_capture_tag(&mut sent, "unsubscribe").await;
    assert_eq!(unsub_tag, sub_tag);
    feed.send(format!(r#"{{"unsubscribe":[{{"tag":"{unsub_tag}","code":"ok"}}]}}"#))
        .unwrap();
    unsub_call.await.unwrap().unwrap();
}

#[tokio::test]
async fn subscription_update_reuses_the_same_tag_and_path() {
    let (client, (mut sent, feed)) = Client::from_fake(ClientConfig::new());

    let sub_call = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .subscribe("/plant/pump1", SubscribeOptions::default())
                .await
        }
    });
    let (_envelope, sub_tag) = send_and_capture_tag(&mut sent, "subscribe").await;
    feed.send(format!(r#"{{"subscribe":[{{"tag":"{sub_tag}","code":"ok"}}]}}"#))
        .unwrap();
    let subscription = sub_call.await.unwrap().unwrap();

    let update_call = tokio::spawn(async move {
        subscription
            .update(SubscribeOptions {
                query: None,
                event: Some(dms_client::EventFlags::ON_CHANGE),
            })
            .await
    });
    let (envelope, update_tag) = send_and_capture_tag(&mut sent, "subscribe").await;
    assert_eq!(update_tag, sub_tag, "update must reuse the subscription's own tag");
    assert_eq!(envelope["subscribe"][0]["path"], json!("/plant/pump1"));
    feed.send(format!(r#"{{"subscribe":[{{"tag":"{update_tag}","code":"ok"}}]}}"#))
        .unwrap();
    update_call.await.unwrap().unwrap();
}

#[tokio::test]
async fn changelog_get_groups_correlates_without_a_per_entry_tag() {
    let (client, (mut sent, feed)) = Client::from_fake(ClientConfig::new());

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.changelog_get_groups().await }
    });

    let raw = sent.recv().await.unwrap();
    let envelope: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(envelope["changelogGetGroups"][0].get("tag").is_none());
    let tag = envelope["tag"]["changelogGetGroups"][0].as_str().unwrap().to_owned();

    feed.send(format!(
        r#"{{"changelogGetGroups":[{{"code":"ok","data":["HVAC","Fire"]}}],"tag":{{"changelogGetGroups":["{tag}"]}}}}"#
    ))
    .unwrap();

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.groups, vec!["HVAC".to_string(), "Fire".to_string()]);
}

#[tokio::test]
async fn changelog_read_sniffs_alarm_shape() {
    let (client, (mut sent, feed)) = Client::from_fake(ClientConfig::new());

    let call = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .changelog_read(ChangelogReadOptions::new(ChangelogQuery::new(
                    "2026-01-01T00:00:00Z",
                )))
                .await
        }
    });

    let (_envelope, tag) = send_and_capture_tag(&mut sent, "changelogRead").await;
    feed.send(format!(
        r#"{{"changelogRead":[{{"tag":"{tag}","code":"ok","data":[
            {{"path":"/alarm/pump1","stamp":"2026-01-01T01:00:00Z","text":"pressure low","state":"active","priority":1,"priorityBacnet":1,"alarmGroup":0,"alarmCollectGroup":0,"siteGroup":0}}
        ]}}]}}"#
    ))
    .unwrap();

    let response = call.await.unwrap().unwrap();
    assert!(matches!(response.changelog, Some(dms_client::Changelog::Alarm(_))));
}

#[tokio::test]
async fn request_times_out_when_the_server_never_replies() {
    let (client, (mut sent, _feed)) =
        Client::from_fake(ClientConfig::new().with_request_timeout(std::time::Duration::from_millis(20)));

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.dp_get("/never/answers", GetOptions::default()).await }
    });

    let _ = sent.recv().await.unwrap();
    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, dms_client::DmsError::Timeout(_)));
}
