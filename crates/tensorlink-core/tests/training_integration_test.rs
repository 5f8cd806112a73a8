//! Integration tests for format and train calls against an in-process mock service.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tensorlink_core::{
    ClientError, Connection, FailureKind, PredictCall, PredictionClient, TrainJob, TrainingClient,
};

#[tokio::test]
async fn test_format_files_returns_status_text() {
    common::init_tracing();
    let (addr, recorded) = common::start_mock_server().await;
    let connection = Arc::new(Connection::open(common::config_for(addr)).unwrap());
    let client = TrainingClient::new(connection, Duration::from_secs(10));

    let status = client.format_files("job-42").await.unwrap();

    assert_eq!(status, "done");
    assert_eq!(*recorded.format.lock().unwrap(), vec!["job-42".to_string()]);
}

#[tokio::test]
async fn test_format_files_propagates_remote_error() {
    let (addr, _recorded) = common::start_mock_server().await;
    let connection = Arc::new(Connection::open(common::config_for(addr)).unwrap());
    let client = TrainingClient::new(connection, Duration::from_secs(10));

    let err = client.format_files(common::BROKEN_JOB).await.unwrap_err();
    match err {
        ClientError::RemoteStatus { code, message } => {
            assert_eq!(code, tonic::Code::Internal);
            assert_eq!(message, "format failed");
        }
        other => panic!("Expected RemoteStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn test_train_fields_reach_server_unchanged() {
    let (addr, recorded) = common::start_mock_server().await;
    let connection = Arc::new(Connection::open(common::config_for(addr)).unwrap());
    let client = TrainingClient::new(connection, Duration::from_secs(10));

    let status = client.train(&TrainJob::new("T1", 10, 0, 1)).await.unwrap();
    assert_eq!(status.key, "key-T1");
    assert_eq!(status.message, "training started");

    let requests = recorded.train.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].train_no, "T1");
    assert_eq!(requests[0].train_step, 10);
    assert_eq!(requests[0].train_test_percent, 0);
    assert_eq!(requests[0].train_shard_num, 1);
}

#[tokio::test]
async fn test_train_with_very_long_deadline() {
    let (addr, recorded) = common::start_mock_server().await;
    let connection = Arc::new(Connection::open(common::config_for(addr)).unwrap());
    let client = TrainingClient::new(connection, Duration::from_secs(u64::MAX / 2));

    let status = client
        .train_with_deadline(&TrainJob::new("T2", 5, 20, 1), Duration::from_secs(u64::MAX / 2))
        .await
        .unwrap();
    assert_eq!(status.key, "key-T2");
    assert_eq!(client.format_files("job-9").await.unwrap(), "done");
    assert_eq!(recorded.train.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_train_unreachable_propagates_connectivity() {
    let connection = Arc::new(Connection::open(common::unreachable_config()).unwrap());
    let client = TrainingClient::new(connection, Duration::from_secs(1));

    let err = client.train(&TrainJob::new("T1", 10, 0, 1)).await.unwrap_err();
    assert!(matches!(err.kind(), FailureKind::Connectivity | FailureKind::DeadlineExceeded));
}

#[tokio::test]
async fn test_one_connection_serves_all_capabilities() {
    let (addr, recorded) = common::start_mock_server().await;
    let connection = Arc::new(Connection::open(common::config_for(addr)).unwrap());
    let prediction = PredictionClient::new(Arc::clone(&connection));
    let training = TrainingClient::new(Arc::clone(&connection), Duration::from_secs(10));

    let call = PredictCall::new("inception", "predict_images").bytes(vec![7u8; 32]);
    let job = TrainJob::new("T7", 100, 10, 2);
    let (outcome, formatted, trained) = tokio::join!(
        prediction.predict(call),
        training.format_files("job-7"),
        training.train(&job),
    );

    assert!(outcome.unwrap().is_success());
    assert_eq!(formatted.unwrap(), "done");
    assert_eq!(trained.unwrap().key, "key-T7");
    assert_eq!(recorded.predict.lock().unwrap().len(), 1);
    assert_eq!(connection.in_flight(), 0);

    // A single shutdown closes every capability
    connection.shutdown(Duration::from_secs(1)).await;
    let err = training.format_files("job-8").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Closed);
}
