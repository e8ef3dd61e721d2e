use crate::helpers::{RecordingChannel, StalledChannel};
use amq_protocol_types::AMQPValue;
use carrot_router::amqp::convenience::{field_table, BasicPropertiesExt};
use carrot_router::amqp::topology::{Exchange, ExchangeKind, Queue};
use carrot_router::codec::{EncodeError, JsonMap, PayloadShape};
use carrot_router::publishers::{Publisher, PublisherError};
use fake::{Fake, Faker};
use std::time::Duration;

fn mapping() -> JsonMap {
    let mut map = JsonMap::new();
    map.insert("x".into(), 1.into());
    map
}

#[tokio::test]
async fn bound_queues_are_published_to_through_their_exchange() {
    // Arrange
    let channel = RecordingChannel::default();
    let exchange = Exchange::new("shop", ExchangeKind::Topic);
    let queue = Queue::new("orders").bound_to(exchange, "orders.created");
    let publisher = Publisher::builder(channel.clone(), queue)
        .queue_name_prefix("staging")
        .build();

    // Act
    publisher.publish(mapping(), None).await.unwrap();

    // Assert
    let published = channel.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, "shop");
    assert_eq!(published[0].routing_key, "orders.created");
    assert_eq!(published[0].payload, br#"{"x":1}"#);
}

#[tokio::test]
async fn unbound_queues_are_published_to_through_the_default_exchange() {
    // Arrange
    let channel = RecordingChannel::default();
    let queue_name: String = Faker.fake();
    let unprefixed = Publisher::builder(channel.clone(), Queue::new(&queue_name)).build();
    let prefixed = Publisher::builder(channel.clone(), Queue::new(&queue_name))
        .queue_name_prefix("staging")
        .build();

    // Act
    unprefixed.publish(mapping(), None).await.unwrap();
    prefixed.publish(mapping(), None).await.unwrap();

    // Assert
    let published = channel.published().await;
    assert_eq!(published[0].exchange, "");
    assert_eq!(published[0].routing_key, queue_name);
    assert_eq!(published[1].exchange, "");
    assert_eq!(published[1].routing_key, format!("staging|{queue_name}"));
}

#[tokio::test]
async fn raw_bytes_are_rejected_before_reaching_the_broker() {
    // Arrange
    let channel = RecordingChannel::default();
    let publisher = Publisher::builder(channel.clone(), Queue::new("orders")).build();

    // Act
    let outcome = publisher.publish(b"abc".to_vec(), None).await;

    // Assert
    assert!(matches!(
        outcome,
        Err(PublisherError::Encode(EncodeError::UnsupportedShape(
            PayloadShape::Raw
        )))
    ));
    assert!(channel.published().await.is_empty());
}

#[tokio::test]
async fn properties_describe_the_message() {
    // Arrange
    let channel = RecordingChannel::default();
    let publisher = Publisher::builder(channel.clone(), Queue::new("orders")).build();
    let kind: String = Faker.fake();
    let headers = field_table([("kind", AMQPValue::LongString(kind.clone().into()))]);

    // Act
    publisher.publish("hello", Some(headers)).await.unwrap();
    publisher.publish(mapping(), None).await.unwrap();

    // Assert
    let published = channel.published().await;
    let text = &published[0].properties;
    assert_eq!(text.content_type().as_ref().unwrap().as_str(), "text/plain");
    assert_eq!(text.get_header_str("kind").unwrap(), kind);
    assert!(text.message_id().is_some());
    assert!(text.timestamp().is_some());
    assert_eq!(published[0].payload, b"hello");

    let json = &published[1].properties;
    assert_eq!(
        json.content_type().as_ref().unwrap().as_str(),
        "application/json"
    );
    assert_ne!(json.message_id(), text.message_id());
}

#[tokio::test]
async fn records_are_published_as_json_objects() {
    // Arrange
    #[derive(serde::Serialize)]
    struct Person {
        name: String,
        age: i64,
    }

    let channel = RecordingChannel::default();
    let publisher = Publisher::builder(channel.clone(), Queue::new("people")).build();

    // Act
    publisher
        .publish_record(
            &Person {
                name: "Al".into(),
                age: 5,
            },
            None,
        )
        .await
        .unwrap();
    let not_a_record = publisher.publish_record(&42, None).await;

    // Assert
    let published = channel.published().await;
    assert_eq!(published.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(body, serde_json::json!({"name": "Al", "age": 5}));
    assert!(matches!(
        not_a_record,
        Err(PublisherError::Encode(EncodeError::NotARecord(_)))
    ));
}

#[tokio::test]
async fn publishing_times_out_if_the_broker_does_not_answer() {
    // Arrange
    let publisher = Publisher::builder(StalledChannel, Queue::new("orders"))
        .publish_timeout(Duration::from_millis(50))
        .build();

    // Act
    let outcome = publisher.publish("hello", None).await;

    // Assert
    assert!(matches!(outcome, Err(PublisherError::TimeoutError)));
}
