use super::*;
use tokio::net::TcpListener;
use tokio::time::timeout;

fn test_transport(url: &str) -> StompTransport {
    StompTransport::new(BrokerConfig {
        url: url.to_owned(),
        token: Some("tok".into()),
        reconnect_delay: Duration::from_millis(50),
    })
}

#[test]
fn broker_host_strips_scheme_port_and_path() {
    assert_eq!(broker_host("wss://chat.example.com:443/ws?x=1"), "chat.example.com");
    assert_eq!(broker_host("ws://localhost:8080/ws"), "localhost");
    assert_eq!(broker_host("broker"), "broker");
}

#[test]
fn subscribe_before_connect_is_rejected() {
    let transport = test_transport("ws://127.0.0.1:1/ws");
    let (tx, _rx) = mpsc::unbounded_channel();
    assert!(matches!(
        transport.subscribe("/topic/room/r1", tx),
        Err(TransportError::NotConnected)
    ));
    assert!(matches!(
        transport.publish("/app/chat.sendMessage/r1", "{}".into()),
        Err(TransportError::NotConnected)
    ));
}

#[test]
fn dispatch_routes_message_by_subscription_header() {
    let transport = test_transport("ws://127.0.0.1:1/ws");
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    {
        let mut routes = transport.shared.routes.lock().unwrap();
        routes.insert("sub-0".into(), Route { topic: "/topic/room/a".into(), sink: tx_a });
        routes.insert("sub-1".into(), Route { topic: "/topic/room/b".into(), sink: tx_b });
    }

    dispatch_inbound(&transport.shared, "MESSAGE\nsubscription:sub-1\ndestination:/topic/room/b\n\nhello\0");

    assert!(rx_a.try_recv().is_err());
    let delivery = rx_b.try_recv().unwrap();
    assert_eq!(delivery.topic, "/topic/room/b");
    assert_eq!(delivery.body, "hello");
}

#[test]
fn dispatch_error_frame_emits_transport_error() {
    let transport = test_transport("ws://127.0.0.1:1/ws");
    let mut events = transport.events();
    dispatch_inbound(&transport.shared, "ERROR\nmessage:session expired\n\n\0");
    assert_eq!(events.try_recv().unwrap(), TransportEvent::Error("session expired".into()));
}

#[test]
fn unsubscribe_unknown_id_is_a_no_op() {
    let transport = test_transport("ws://127.0.0.1:1/ws");
    transport.unsubscribe("sub-404");
    assert!(transport.shared.routes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn connect_after_close_is_rejected() {
    let transport = test_transport("ws://127.0.0.1:1/ws");
    transport.close();
    assert!(matches!(transport.connect().await, Err(TransportError::Closed)));
}

#[tokio::test]
async fn handshake_subscribe_and_deliver_against_local_broker() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Minimal broker: accept CONNECT, answer CONNECTED, then echo a MESSAGE
    // for the first SUBSCRIBE it sees.
    let broker = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let first = ws.next().await.unwrap().unwrap();
        let connect = stomp::decode_frame(first.to_text().unwrap()).unwrap().unwrap();
        assert_eq!(connect.command, Command::Connect);
        assert_eq!(connect.get("Authorization"), Some("Bearer tok"));
        ws.send(Message::text("CONNECTED\nversion:1.2\n\n\0")).await.unwrap();

        loop {
            let msg = ws.next().await.unwrap().unwrap();
            let Some(frame) = stomp::decode_frame(msg.to_text().unwrap()).unwrap() else { continue };
            if frame.command == Command::Subscribe {
                let id = frame.get("id").unwrap().to_owned();
                let reply = format!("MESSAGE\nsubscription:{id}\ndestination:/topic/room/r1\n\n{{\"ok\":true}}\0");
                ws.send(Message::text(reply)).await.unwrap();
                break;
            }
        }
        // Keep the socket open until the client goes away.
        while ws.next().await.is_some() {}
    });

    let transport = test_transport(&format!("ws://{addr}/ws"));
    let mut events = transport.events();
    transport.connect().await.unwrap();
    // Second connect is a no-op.
    transport.connect().await.unwrap();

    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("connected event timed out")
        .unwrap();
    assert_eq!(event, TransportEvent::Connected);
    assert!(transport.is_connected());

    let (tx, mut rx) = mpsc::unbounded_channel();
    transport.subscribe("/topic/room/r1", tx).unwrap();
    let delivery = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("delivery timed out")
        .unwrap();
    assert_eq!(delivery.topic, "/topic/room/r1");
    assert_eq!(delivery.body, "{\"ok\":true}");

    transport.close();
    assert!(!transport.is_connected());
    broker.abort();
}

#[tokio::test]
async fn close_during_handshake_drops_the_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (got_connect_tx, got_connect_rx) = tokio::sync::oneshot::channel();

    // Broker that reads CONNECT and never answers.
    let broker = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let _ = ws.next().await;
        let _ = got_connect_tx.send(());
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    });

    let transport = test_transport(&format!("ws://{addr}/ws"));
    transport.connect().await.unwrap();
    timeout(Duration::from_secs(2), got_connect_rx)
        .await
        .expect("CONNECT never arrived")
        .unwrap();
    assert!(!transport.is_connected());

    transport.close();
    timeout(Duration::from_secs(2), broker)
        .await
        .expect("socket still open after close")
        .unwrap();
}
