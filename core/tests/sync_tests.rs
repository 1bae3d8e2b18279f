//! Subscriptions sharing one connection

mod common;

use chatsync_core::error::ChatError;
use chatsync_core::models::{ContactDraft, UserId};
use chatsync_core::net::protocol::{InboundKind, Request};
use chatsync_core::sync::{
    ChatListSync, DirectorySync, NewContactSync, SingleChatSync, SubmissionState,
};
use common::*;
use serde_json::json;

fn draft() -> ContactDraft {
    ContactDraft {
        first_name: "Ann".to_string(),
        last_name: "Lee".to_string(),
        country_code: "+94".to_string(),
        contact_no: "771234567".to_string(),
        display_name: Some("Annie".to_string()),
    }
}

#[tokio::test]
async fn test_chat_list_tracks_latest_snapshot() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;

    let chats = ChatListSync::mount(&manager);
    assert!(chats.is_attached());
    let frame = socket.expect_frame("get_chat_list").await;
    assert_eq!(frame["userId"], 1);

    let mut list = chats.watch();
    socket.push(envelope(
        "friend_list",
        json!([
            conversation_json(2, "Bo", "hey", "2026-03-01T09:00:00", 1),
            conversation_json(3, "Cy", "yo", "2026-03-02T09:00:00", 4),
        ]),
    ));
    wait_until(&mut list, |l| l.len() == 2).await;
    assert_eq!(chats.total_unread(), 5);

    socket.push(envelope(
        "friend_list",
        json!([conversation_json(3, "Cy", "later", "2026-03-03T09:00:00", 0)]),
    ));
    wait_until(&mut list, |l| l.len() == 1).await;

    let current = chats.conversations();
    assert_eq!(current[0].friend_id, UserId(3));
    assert_eq!(current[0].last_message, "later");
}

#[tokio::test]
async fn test_chat_list_view_sorts_and_filters() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;
    let chats = ChatListSync::mount(&manager);
    socket.expect_frame("get_chat_list").await;

    let mut list = chats.watch();
    socket.push(envelope(
        "friend_list",
        json!([
            conversation_json(2, "Bo", "old news", "2026-03-01T09:00:00", 0),
            conversation_json(3, "Cy", "fresh", "2026-03-05T09:00:00", 0),
        ]),
    ));
    wait_until(&mut list, |l| l.len() == 2).await;

    // Server order is kept, the view is newest first
    assert_eq!(chats.conversations()[0].friend_id, UserId(2));
    let view = chats.view("");
    assert_eq!(view[0].friend_id, UserId(3));
    assert_eq!(chats.view("NEWS").len(), 1);
}

#[tokio::test]
async fn test_unmounted_subscription_ignores_events() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;

    let spied = ChatListSync::mount(&manager);
    let control = ChatListSync::mount(&manager);
    socket.expect_frame("get_chat_list").await;
    socket.expect_frame("get_chat_list").await;

    let mut spy = spied.watch();
    let mut control_list = control.watch();
    socket.push(envelope(
        "friend_list",
        json!([conversation_json(2, "Bo", "hi", "2026-03-01T09:00:00", 0)]),
    ));
    wait_until(&mut spy, |l| l.len() == 1).await;
    let _ = spy.borrow_and_update();

    spied.unmount();
    let conn = manager.state().connection.unwrap();
    assert_eq!(conn.bus().listener_count(InboundKind::ChatList), 1);

    socket.push(envelope(
        "friend_list",
        json!([
            conversation_json(2, "Bo", "hi", "2026-03-01T09:00:00", 0),
            conversation_json(4, "Di", "new", "2026-03-02T09:00:00", 0),
        ]),
    ));
    // The control saw the frame, so delivery already happened
    wait_until(&mut control_list, |l| l.len() == 2).await;

    assert!(!matches!(spy.has_changed(), Ok(true)));
    assert_eq!(spy.borrow().len(), 1);
}

#[tokio::test]
async fn test_subscription_follows_connection_replacement() {
    let (manager, mut server) = manager_with_server();

    // Mounted before any connection: waits, then queries on open
    let chats = ChatListSync::mount(&manager);
    assert!(!chats.is_attached());

    let mut a = connect_as(&manager, &mut server, 1).await;
    assert_eq!(a.expect_frame("get_chat_list").await["userId"], 1);

    let mut b = connect_as(&manager, &mut server, 2).await;
    assert_eq!(b.expect_frame("get_chat_list").await["userId"], 2);

    let mut list = chats.watch();
    b.push(envelope(
        "friend_list",
        json!([conversation_json(9, "Zed", "for user 2", "2026-03-01T09:00:00", 0)]),
    ));
    wait_until(&mut list, |l| l.len() == 1).await;
    assert!(chats.is_attached());

    let conn = manager.state().connection.unwrap();
    assert_eq!(conn.bus().listener_count(InboundKind::ChatList), 1);
}

#[tokio::test]
async fn test_directory_snapshot_order() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;

    let directory = DirectorySync::mount(&manager);
    socket.expect_frame("get_all_users").await;

    let mut users = directory.watch();
    socket.push(envelope(
        "get_all_users",
        json!([user_json(1, "Ann", "Lee"), user_json(2, "Bo", "Ray")]),
    ));
    wait_until(&mut users, |u| u.len() == 2).await;

    let list = directory.users();
    assert_eq!(list[0].id, UserId(1));
    assert_eq!(list[1].id, UserId(2));
    assert_eq!(directory.search("ray").len(), 1);
    assert_eq!(directory.search("5550001").len(), 1);
    assert_eq!(directory.search("").len(), 2);

    assert!(directory.refresh());
    socket.expect_frame("get_all_users").await;

    // The next snapshot replaces the list, nothing is merged
    socket.push(envelope("get_all_users", json!([user_json(3, "Cy", "Poe")])));
    wait_until(&mut users, |u| u.len() == 1).await;
    let ids: Vec<UserId> = directory.users().iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![UserId(3)]);
}

#[tokio::test]
async fn test_single_chat_queries_on_mount() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;

    let _chat = SingleChatSync::mount(&manager, UserId(2));

    assert_eq!(
        socket.next_frame().await.unwrap(),
        json!({"type": "get_single_chat", "friendId": 2, "userId": 1})
    );
    assert_eq!(
        socket.next_frame().await.unwrap(),
        json!({"type": "friend_data", "friendId": 2, "userId": 1})
    );
}

#[tokio::test]
async fn test_single_chat_history_and_appends() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;
    let chat = SingleChatSync::mount(&manager, UserId(2));
    socket.expect_frame("friend_data").await;

    let mut messages = chat.watch_messages();
    socket.push(envelope(
        "single_chat",
        json!([message_json(10, 1, 2, "first"), message_json(11, 2, 1, "second")]),
    ));
    wait_until(&mut messages, |m| m.len() == 2).await;

    // History for another conversation and messages from other peers are ignored
    socket.push(envelope("single_chat", json!([message_json(20, 1, 3, "other")])));
    socket.push(envelope("new_message", message_json(21, 3, 1, "not for this chat")));
    socket.push(envelope("new_message", message_json(12, 2, 1, "third")));
    wait_until(&mut messages, |m| m.len() == 3).await;

    let texts: Vec<String> = chat.messages().into_iter().map(|m| m.message).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_single_chat_peer_profile() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;
    let chat = SingleChatSync::mount(&manager, UserId(2));
    socket.expect_frame("friend_data").await;

    let mut peer = chat.watch_peer();
    socket.push(envelope("friend_data", user_json(2, "Bo", "Ray")));
    wait_until(&mut peer, |p| p.is_some()).await;

    // A missing user leaves the profile as it was
    socket.push(json!({"type": "friend_data", "payload": null, "error": "User not found"}));
    socket.push(envelope("friend_data", user_json(7, "Someone", "Else")));
    let mut messages = chat.watch_messages();
    socket.push(envelope("single_chat", json!([])));
    tokio::time::timeout(WAIT, messages.changed())
        .await
        .unwrap()
        .unwrap();

    let current = chat.peer().unwrap();
    assert_eq!(current.id, UserId(2));
    assert_eq!(current.display_name(), "Bo Ray");
}

#[tokio::test]
async fn test_single_chat_later_profile_replaces_earlier() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;
    let chat = SingleChatSync::mount(&manager, UserId(2));
    socket.expect_frame("friend_data").await;

    let mut peer = chat.watch_peer();
    socket.push(envelope("friend_data", user_json(2, "Bo", "Ray")));
    wait_until(&mut peer, |p| p.is_some()).await;

    let mut renamed = user_json(2, "Bobby", "Ray");
    renamed["status"] = json!("OFFLINE");
    socket.push(envelope("friend_data", renamed));
    wait_until(&mut peer, |p| {
        p.as_ref().map(|u| u.first_name.as_str()) == Some("Bobby")
    })
    .await;

    let current = chat.peer().unwrap();
    assert_eq!(current.display_name(), "Bobby Ray");
    assert_eq!(current.status.as_deref(), Some("OFFLINE"));
}

#[tokio::test]
async fn test_single_chat_send_and_switch_peer() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;
    let mut chat = SingleChatSync::mount(&manager, UserId(2));
    socket.expect_frame("friend_data").await;

    assert!(!chat.send("   "));
    assert!(chat.send(" hello "));
    assert_eq!(
        socket.expect_frame("send_message").await,
        json!({"type": "send_message", "toUserId": 2, "message": "hello", "userId": 1})
    );

    let mut messages = chat.watch_messages();
    socket.push(envelope("single_chat", json!([message_json(1, 1, 2, "hi")])));
    wait_until(&mut messages, |m| m.len() == 1).await;

    chat.set_peer(UserId(5));
    assert_eq!(chat.peer_id(), UserId(5));
    assert!(chat.messages().is_empty());
    assert!(chat.peer().is_none());
    assert_eq!(socket.expect_frame("get_single_chat").await["friendId"], 5);

    let conn = manager.state().connection.unwrap();
    assert_eq!(conn.bus().listener_count(InboundKind::SingleChat), 1);

    // Messages for the previous peer stay out of the new transcript
    socket.push(envelope("new_message", message_json(2, 2, 1, "from the old peer")));
    socket.push(envelope("new_message", message_json(3, 5, 1, "from the new peer")));
    wait_until(&mut messages, |m| !m.is_empty()).await;

    let texts: Vec<String> = chat.messages().into_iter().map(|m| m.message).collect();
    assert_eq!(texts, vec!["from the new peer"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_peer_switch_under_load_keeps_transcripts_apart() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;

    for round in 0..20 {
        let mut chat = SingleChatSync::mount(&manager, UserId(2));
        socket.expect_frame("friend_data").await;

        for i in 0..100 {
            socket.push(envelope("new_message", message_json(i, 2, 1, "old peer")));
        }
        chat.set_peer(UserId(5));
        socket.expect_frame("friend_data").await;

        let mut messages = chat.watch_messages();
        socket.push(envelope(
            "new_message",
            message_json(1000 + round, 5, 1, "new peer"),
        ));
        wait_until(&mut messages, |m| m.iter().any(|x| x.message == "new peer")).await;

        let transcript = chat.messages();
        assert!(
            transcript.iter().all(|m| m.involves(UserId(5))),
            "round {}: {} messages leaked from the old peer",
            round,
            transcript.iter().filter(|m| !m.involves(UserId(5))).count()
        );
        chat.unmount();
    }
}

#[tokio::test]
async fn test_invalid_contact_is_not_sent() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;
    let contacts = NewContactSync::mount(&manager);

    let result = contacts.submit(ContactDraft {
        first_name: String::new(),
        ..draft()
    });

    match result {
        Err(ChatError::Validation(message)) => assert_eq!(message, "First name is required"),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(contacts.state(), SubmissionState::None);

    // The next frame on the wire is the ping, not a contact
    assert!(manager.send(&Request::Ping));
    assert_eq!(socket.next_frame().await.unwrap()["type"], "ping");
}

#[tokio::test]
async fn test_contact_submission_outcomes() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 1).await;
    let contacts = NewContactSync::mount(&manager);
    let mut state = contacts.watch();

    assert!(contacts.submit(draft()).unwrap());
    assert_eq!(contacts.state(), SubmissionState::Pending);
    let frame = socket.expect_frame("save_new_contact").await;
    assert_eq!(frame["user"]["firstName"], "Ann");
    assert_eq!(frame["user"]["displayName"], "Annie");

    socket.push(envelope(
        "new_contact_response_text",
        json!({"message": "Contact saved", "responseStatus": true}),
    ));
    wait_until(&mut state, |s| matches!(s, SubmissionState::Success(_))).await;
    assert_eq!(contacts.state().message(), Some("Contact saved"));

    assert!(contacts.submit(draft()).unwrap());
    socket.push(envelope(
        "new_contact_response_text",
        json!({"message": "Number not registered", "responseStatus": false}),
    ));
    wait_until(&mut state, |s| {
        *s == SubmissionState::Failure("Number not registered".to_string())
    })
    .await;
}

#[tokio::test]
async fn test_contact_submit_while_disconnected() {
    let (manager, _server) = manager_with_server();
    let contacts = NewContactSync::mount(&manager);

    assert!(!contacts.submit(draft()).unwrap());
    assert_eq!(contacts.state(), SubmissionState::None);
}
