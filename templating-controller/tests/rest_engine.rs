use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use templating_controller::controller::engine::Engine;
use templating_controller::operations::rest::RestEngine;

fn composite(name: &str) -> DynamicObject {
    let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(
        "example.org",
        "v1alpha1",
        "CompositeDB",
    ));
    DynamicObject::new(name, &ar)
}

#[test_log::test(tokio::test)]
async fn posts_composite_and_decodes_yaml_stream() {
    let server = MockServer::start().await;
    let body = "\
apiVersion: example.org/v1alpha1
kind: Bucket
metadata:
  name: b1
---
apiVersion: example.org/v1alpha1
kind: Bucket
metadata:
  name: b2
";
    Mock::given(method("POST"))
        .and(path("/render"))
        .and(body_partial_json(
            serde_json::json!({"metadata": {"name": "db-1"}}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let engine = RestEngine::new(format!("{}/render", server.uri()));
    let objects = engine.run(&composite("db-1")).await.unwrap();

    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].metadata.name.as_deref(), Some("b1"));
    assert_eq!(objects[1].metadata.name.as_deref(), Some("b2"));
    assert_eq!(objects[0].types.as_ref().unwrap().kind, "Bucket");
}

#[test_log::test(tokio::test)]
async fn empty_response_renders_no_objects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let engine = RestEngine::new(format!("{}/render", server.uri()));
    let objects = engine.run(&composite("db-1")).await.unwrap();
    assert!(objects.is_empty());
}

#[test_log::test(tokio::test)]
async fn server_error_fails_the_render() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let engine = RestEngine::new(format!("{}/render", server.uri()));
    let err = engine.run(&composite("db-1")).await.unwrap_err();
    assert!(format!("{err:#}").contains("rendering server returned an error"));
}

#[test_log::test(tokio::test)]
async fn unreachable_server_fails_the_render() {
    // Nothing listens here.
    let engine = RestEngine::new("http://127.0.0.1:9/render");
    let err = engine.run(&composite("db-1")).await.unwrap_err();
    assert!(
        format!("{err:#}").contains("cannot make call to the rendering server")
    );
}
