use crate::helpers::{delivery, BrokenAcker, RecordingAcker};
use amq_protocol_types::{AMQPValue, FieldTable};
use carrot_router::amqp::convenience::field_table;
use carrot_router::amqp::topology::Queue;
use carrot_router::amqp::BasicProperties;
use carrot_router::codec::{Json, JsonMap};
use carrot_router::consumers::{Acknowledgement, Consumer, Delivery, Route, RouteError};
use fake::{Fake, Faker};
use std::sync::Arc;
use tokio::sync::Mutex;

/// What the handlers saw, in order.
type Seen = Mutex<Vec<String>>;

async fn on_order(context: Arc<Seen>, body: String) -> Result<(), anyhow::Error> {
    context.lock().await.push(format!("order:{body}"));
    Ok(())
}

async fn on_anything(context: Arc<Seen>, body: Vec<u8>) -> Result<(), anyhow::Error> {
    let size = body.len();
    context.lock().await.push(format!("anything:{size}"));
    Ok(())
}

async fn failing(_context: Arc<Seen>, _body: String) -> Result<(), anyhow::Error> {
    Err(anyhow::anyhow!("Processing failed"))
}

async fn on_mapping(_context: Arc<Seen>, _body: JsonMap) -> Result<(), anyhow::Error> {
    Ok(())
}

fn kind(value: &str) -> FieldTable {
    field_table([("kind", AMQPValue::LongString(value.into()))])
}

#[tokio::test]
async fn messages_are_routed_to_the_first_matching_route() {
    // Arrange
    let consumer = Consumer::builder(Queue::new("orders"))
        .route(
            Route::builder()
                .with_str_header("kind", "order")
                .handler(on_order),
        )
        .route(Route::builder().handler(on_anything))
        .build()
        .unwrap();
    let context = Arc::new(Seen::default());
    let order = delivery(kind("order"), b"42", RecordingAcker::default());
    let refund = delivery(kind("refund"), b"42", RecordingAcker::default());

    // Act
    let first = consumer.dispatch(&context, &order).await;
    let second = consumer.dispatch(&context, &refund).await;

    // Assert
    assert_eq!(first.matched_route(), Some(0));
    assert_eq!(second.matched_route(), Some(1));
    assert_eq!(
        *context.lock().await,
        vec!["order:42".to_owned(), "anything:2".to_owned()]
    );
}

#[tokio::test]
async fn unmatched_messages_are_acked_without_invoking_any_handler() {
    // Arrange
    let consumer = Consumer::builder(Queue::new("orders"))
        .route(
            Route::builder()
                .with_str_header("kind", "order")
                .handler(on_order),
        )
        .build()
        .unwrap();
    let context = Arc::new(Seen::default());
    let acker = RecordingAcker::default();
    let message = delivery(FieldTable::default(), b"42", acker.clone());

    // Act
    let outcome = consumer.dispatch(&context, &message).await;

    // Assert
    assert_eq!(outcome.matched_route(), None);
    assert!(outcome.is_success());
    assert!(outcome.acknowledgement().is_sent());
    assert_eq!(acker.acks(), 1);
    assert!(context.lock().await.is_empty());
}

#[tokio::test]
async fn auto_ack_consumers_never_ack() {
    // Arrange
    let consumer = Consumer::builder(Queue::new("orders"))
        .auto_ack(true)
        .route(Route::builder().handler(on_anything))
        .build()
        .unwrap();
    let context = Arc::new(Seen::default());
    let acker = RecordingAcker::default();
    let message = delivery(FieldTable::default(), b"", acker.clone());

    // Act
    let outcome = consumer.dispatch(&context, &message).await;

    // Assert
    assert!(matches!(
        outcome.acknowledgement(),
        Acknowledgement::Automatic
    ));
    assert_eq!(acker.acks(), 0);
}

#[tokio::test]
async fn every_delivery_is_acked_exactly_once_whatever_the_outcome() {
    // Arrange
    let consumer = Consumer::builder(Queue::new("orders"))
        .route(
            Route::builder()
                .with_str_header("kind", "failing")
                .handler(failing),
        )
        .route(
            Route::builder()
                .with_str_header("kind", "mapping")
                .handler(on_mapping),
        )
        .route(Route::builder().handler(on_anything))
        .build()
        .unwrap();
    let context = Arc::new(Seen::default());
    let unknown_kind: String = Faker.fake();
    let cases = [
        ("failing", b"hello".as_slice()),
        ("mapping", b"{not json".as_slice()),
        (unknown_kind.as_str(), b"anything".as_slice()),
    ];

    for (kind_header, payload) in cases {
        // Act
        let acker = RecordingAcker::default();
        let message = delivery(kind(kind_header), payload, acker.clone());
        consumer.dispatch(&context, &message).await;

        // Assert
        assert_eq!(acker.acks(), 1, "Wrong number of acks for `{kind_header}`");
    }
}

#[tokio::test]
async fn malformed_json_is_contained() {
    // Arrange
    #[derive(serde::Deserialize)]
    struct Person {
        #[allow(dead_code)]
        name: String,
    }

    let consumer = Consumer::builder(Queue::new("people"))
        .route(
            Route::builder().handler(|context: Arc<Seen>, _: Json<Person>| async move {
                context.lock().await.push("person".into());
                Ok::<_, anyhow::Error>(())
            }),
        )
        .build()
        .unwrap();
    let context = Arc::new(Seen::default());
    let acker = RecordingAcker::default();
    let message = delivery(FieldTable::default(), b"{\"name\": ", acker.clone());

    // Act
    let outcome = consumer.dispatch(&context, &message).await;

    // Assert
    assert!(matches!(outcome.result(), Err(RouteError::Decode(_))));
    assert_eq!(outcome.matched_route(), Some(0));
    assert_eq!(acker.acks(), 1);
    assert!(context.lock().await.is_empty());
}

#[tokio::test]
async fn raw_routes_receive_the_payload_unchanged() {
    // Arrange
    let received: Arc<Mutex<Option<Vec<u8>>>> = Arc::default();
    let consumer = Consumer::builder(Queue::new("raw"))
        .route(Route::builder().handler(
            |context: Arc<Mutex<Option<Vec<u8>>>>, body: Vec<u8>| async move {
                *context.lock().await = Some(body);
                Ok::<_, anyhow::Error>(())
            },
        ))
        .build()
        .unwrap();
    let message = delivery(FieldTable::default(), b"abc", RecordingAcker::default());

    // Act
    consumer.dispatch(&received, &message).await;

    // Assert
    assert_eq!(received.lock().await.as_deref(), Some(b"abc".as_slice()));
}

#[tokio::test]
async fn record_routes_receive_the_decoded_record() {
    // Arrange
    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Person {
        name: String,
        age: i64,
    }

    let received: Arc<Mutex<Option<Person>>> = Arc::default();
    let consumer = Consumer::builder(Queue::new("people"))
        .route(
            Route::builder()
                .with_str_header("type", "person")
                .handler(
                    |context: Arc<Mutex<Option<Person>>>, person: Json<Person>| async move {
                        *context.lock().await = Some(person.into_inner());
                        Ok::<_, anyhow::Error>(())
                    },
                ),
        )
        .build()
        .unwrap();
    let headers = field_table([
        ("type", AMQPValue::ShortString("person".into())),
        ("source", AMQPValue::LongString(Faker.fake::<String>().into())),
    ]);

    let payload = br#"{"name":"Al","age":5}"#;
    let message = delivery(headers, payload, RecordingAcker::default());

    // Act
    let outcome = consumer.dispatch(&received, &message).await;

    // Assert
    assert!(outcome.is_success());
    assert_eq!(
        *received.lock().await,
        Some(Person {
            name: "Al".into(),
            age: 5
        })
    );
}

#[tokio::test]
async fn empty_match_mappings_match_messages_without_headers() {
    // Arrange
    let consumer = Consumer::builder(Queue::new("orders"))
        .route(Route::builder().handler(on_anything))
        .build()
        .unwrap();
    let context = Arc::new(Seen::default());
    let message = Delivery::new(
        7,
        BasicProperties::default(),
        b"xyz".to_vec(),
        RecordingAcker::default(),
    );

    // Act
    let outcome = consumer.dispatch(&context, &message).await;

    // Assert
    assert_eq!(outcome.matched_route(), Some(0));
    assert_eq!(outcome.delivery_tag(), 7);
    assert_eq!(*context.lock().await, vec!["anything:3".to_owned()]);
}

#[tokio::test]
async fn handler_panics_are_contained() {
    // Arrange
    let consumer = Consumer::builder(Queue::new("orders"))
        .route(Route::builder().handler(|_: Arc<Seen>, body: String| async move {
            if body == "boom" {
                panic!("Exploded while processing");
            }
            Ok::<_, anyhow::Error>(())
        }))
        .build()
        .unwrap();
    let context = Arc::new(Seen::default());
    let acker = RecordingAcker::default();
    let boom = delivery(FieldTable::default(), b"boom", acker.clone());

    // Act
    let outcome = consumer.dispatch(&context, &boom).await;

    // Assert
    match outcome.result() {
        Err(RouteError::Panic(message)) => assert_eq!(message, "Exploded while processing"),
        _ => panic!("Expected the panic to be reported"),
    }
    assert_eq!(acker.acks(), 1);

    // The consumer keeps working afterwards.
    let fine = delivery(FieldTable::default(), b"fine", RecordingAcker::default());
    assert!(consumer.dispatch(&context, &fine).await.is_success());
}

#[tokio::test]
async fn ack_failures_are_reported() {
    // Arrange
    let consumer = Consumer::builder(Queue::new("orders"))
        .route(Route::builder().handler(on_anything))
        .build()
        .unwrap();
    let context = Arc::new(Seen::default());
    let message = delivery(FieldTable::default(), b"", BrokenAcker);

    // Act
    let outcome = consumer.dispatch(&context, &message).await;

    // Assert
    assert!(outcome.is_success());
    assert!(matches!(
        outcome.acknowledgement(),
        Acknowledgement::Failed(_)
    ));
}

#[tokio::test]
async fn headers_match_across_wire_types() {
    // Arrange
    let consumer = Consumer::builder(Queue::new("orders"))
        .route(
            Route::builder()
                .with_str_header("kind", "order")
                .with_header("version", AMQPValue::ShortShortUInt(2))
                .handler(on_order),
        )
        .build()
        .unwrap();
    let context = Arc::new(Seen::default());
    let headers = field_table([
        ("kind", AMQPValue::ShortString("order".into())),
        ("version", AMQPValue::LongLongInt(2)),
    ]);

    let message = delivery(headers, b"1", RecordingAcker::default());

    // Act
    let outcome = consumer.dispatch(&context, &message).await;

    // Assert
    assert_eq!(outcome.matched_route(), Some(0));
}
