//! Integration tests for the Docker runtime backend.
//!
//! Tests are skipped if Docker is not available or SKIP_CONTAINER_TESTS=1.

#![cfg(feature = "docker")]

use dockyard::runtime::{
    DockerConnection, DockerFactoryConfig, NetworkCreateOpts, RuntimeConnection, RuntimeError,
};
use serial_test::serial;
use test_tag::tag;

/// Check if container tests should run.
fn should_run_container_tests() -> bool {
    if let Ok(value) = std::env::var("SKIP_CONTAINER_TESTS") {
        if value == "1" || value.eq_ignore_ascii_case("true") {
            return false;
        }
    }

    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn bridge() -> NetworkCreateOpts {
    NetworkCreateOpts {
        driver: "bridge".to_string(),
        attachable: false,
    }
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_docker_connection() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let connection = DockerConnection::connect(&DockerFactoryConfig::default())
        .await
        .expect("Failed to connect to Docker");
    assert!(!connection.daemon_host().is_empty());
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_network_lifecycle_is_idempotent_on_teardown() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let connection = DockerConnection::connect(&DockerFactoryConfig::default())
        .await
        .expect("Failed to connect to Docker");
    let name = format!("dockyard-test-{}", uuid::Uuid::new_v4().simple());

    connection
        .create_network(&name, &bridge())
        .await
        .expect("Failed to create network");

    connection
        .delete_network(&name)
        .await
        .expect("Failed to delete network");
    assert!(matches!(
        connection.delete_network(&name).await,
        Err(RuntimeError::NotFound(_))
    ));
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_missing_container_is_not_found() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let connection = DockerConnection::connect(&DockerFactoryConfig::default())
        .await
        .expect("Failed to connect to Docker");

    assert!(matches!(
        connection.delete_container("dockyard-missing-container").await,
        Err(RuntimeError::NotFound(_))
    ));
    assert!(matches!(
        connection.container_ips("dockyard-missing-container").await,
        Err(RuntimeError::NotFound(_))
    ));
}
