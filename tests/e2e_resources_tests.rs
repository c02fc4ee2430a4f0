//! End-to-end tests for MCP resources and prompts

mod common;

use common::*;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_resources_and_templates_are_listed() {
    let server = TestServer::spawn().await;
    let client = TestClient::anonymous(server.base_url.clone());

    let message = client.rpc("resources/list", json!({})).await;
    let uris: Vec<String> = message["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["uri"].as_str().map(str::to_string))
        .collect();
    assert!(uris.contains(&"query://plugin-iio".to_string()));
    assert!(uris.contains(&"stats://temperature".to_string()));

    let message = client.rpc("resources/templates/list", json!({})).await;
    let templates: Vec<String> = message["result"]["resourceTemplates"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["uriTemplate"].as_str().map(str::to_string))
        .collect();
    assert!(templates.contains(&"query://{plugin}".to_string()));
    assert!(templates.contains(&"docs://faq/{topic}".to_string()));
}

#[tokio::test]
async fn test_read_plugin_resource_as_csv() {
    let server = TestServer::spawn().await;
    let client = TestClient::anonymous(server.base_url.clone());

    let message = client.read_resource("query://plugin-iio").await;
    let content = &message["result"]["contents"][0];
    assert_eq!(content["uri"], "query://plugin-iio");
    assert_eq!(content["mimeType"], "text/csv");
    let csv = content["text"].as_str().unwrap();
    assert!(csv.starts_with("timestamp,name,value,"));
    assert_eq!(csv.lines().count(), 7);
    assert!(csv.contains("plugin-iio:0.4.5"));
}

#[tokio::test]
async fn test_read_temperature_stats() {
    let server = TestServer::spawn().await;
    let client = TestClient::anonymous(server.base_url.clone());

    let message = client.read_resource("stats://temperature").await;
    let csv = message["result"]["contents"][0]["text"].as_str().unwrap();
    assert_eq!(
        csv,
        "meta.vsn,meta.sensor,size,min,max,mean\nW023,bme680,3,21.000,23.000,22.000\n"
    );
}

#[tokio::test]
async fn test_faq_resource_over_http() {
    let server = TestServer::spawn().await;
    let client = TestClient::anonymous(server.base_url.clone());

    let response = client.get_resource("docs://faq/getting_started").await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = response.text().await.unwrap();
    assert!(text.starts_with("**How do I get started with SAGE?**"));

    let response = client.get_resource("docs://faq/time_travel").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let message = client.read_resource("docs://faq/time_travel").await;
    assert_eq!(message["error"]["code"], -32004);
}

#[tokio::test]
async fn test_prompts_get_fills_arguments() {
    let server = TestServer::spawn().await;
    let client = TestClient::anonymous(server.base_url.clone());

    let message = client.rpc("prompts/list", json!({})).await;
    let names: Vec<String> = message["result"]["prompts"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str().map(str::to_string))
        .collect();
    assert_eq!(names.len(), 7);
    assert!(names.contains(&"getting_started_guide".to_string()));

    let message = client
        .rpc("prompts/get", json!({"name": "getting_started_guide"}))
        .await;
    let messages = message["result"]["messages"].as_array().unwrap();
    assert!(!messages.is_empty());
    assert_eq!(messages[0]["role"], "user");

    let message = client.rpc("prompts/get", json!({"name": "nope"})).await;
    assert!(message.get("error").is_some());
}
