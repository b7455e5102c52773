use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prepindex_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("prepindex");
    path
}

/// Write schema, data and a config pointing both services at `endpoint`.
fn setup_test_env(endpoint: &str, with_search_key: bool) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let data_dir = root.join("new-data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(
        data_dir.join("index-schema.json"),
        json!({
            "name": "products",
            "fields": [
                {"name": "id", "type": "Edm.String", "key": true},
                {"name": "content", "type": "Edm.String", "searchable": true},
                {"name": "availability", "type": "Edm.Double", "filterable": true}
            ]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        data_dir.join("index.json"),
        json!([
            {"id": "1", "content": "red shoes", "availability": 0.9},
            {"content": "blue hat"}
        ])
        .to_string(),
    )
    .unwrap();

    let search_key = if with_search_key {
        "api_key = \"admin-key\"\n"
    } else {
        ""
    };
    let config_content = format!(
        r#"[search]
endpoint = "{endpoint}"
{search_key}
[embedding]
host = "azure"
model = "text-embedding-3-small"
deployment = "emb"
azure_custom_url = "{endpoint}"
azure_api_key = "openai-key"
max_retries = 0
"#
    );

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("prepindex.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_prepindex(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    run_prepindex_with_env(config_path, args, &[])
}

fn run_prepindex_with_env(
    config_path: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> (String, String, bool) {
    let root = config_path.parent().unwrap().parent().unwrap();
    let binary = prepindex_binary();
    let output = Command::new(&binary)
        .env_clear()
        .envs(env.iter().copied())
        .current_dir(root)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run prepindex binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn embeddings_response(count: usize) -> Value {
    let data: Vec<Value> = (0..count)
        .map(|i| json!({"index": i, "embedding": vec![0.01; 1536]}))
        .collect();
    json!({"data": data})
}

async fn mount_service(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(header("api-key", "admin-key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "products"})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openai/deployments/emb/embeddings"))
        .and(header("api-key", "openai-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embeddings_response(2)))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes/products/docs/index"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [
            {"key": "1", "status": true, "statusCode": 201},
            {"key": "row-1", "status": true, "statusCode": 201}
        ]})))
        .expect(1)
        .mount(server)
        .await;
}

async fn request_body(server: &MockServer, verb: &str, url_path: &str) -> Value {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.method.as_str() == verb && r.url.path() == url_path)
        .unwrap_or_else(|| panic!("no {} {} request", verb, url_path))
        .body_json()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_creates_index_and_uploads() {
    let server = MockServer::start().await;
    mount_service(&server).await;
    let (_tmp, config_path) = setup_test_env(&server.uri(), true);

    let (stdout, stderr, success) = run_prepindex(&config_path, &[]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2 documents uploaded in 1 batches"));

    let index = request_body(&server, "POST", "/indexes").await;
    assert_eq!(index["name"], "products");
    let names: Vec<&str> = index["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["id", "content", "availability", "embedding"]);
    assert_eq!(index["fields"][3]["type"], "Collection(Edm.Single)");
    assert_eq!(index["fields"][3]["dimensions"], 1536);
    assert_eq!(index["scoringProfiles"][0]["name"], "availabilityBoost");
    assert_eq!(
        index["vectorSearch"]["vectorizers"][0]["azureOpenAIParameters"]["deploymentId"],
        "emb"
    );

    let upload = request_body(&server, "POST", "/indexes/products/docs/index").await;
    let docs = upload["value"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["@search.action"], "upload");
    assert_eq!(docs[1]["id"], "row-1");
    assert_eq!(docs[1]["embedding"].as_array().unwrap().len(), 1536);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_flag_overrides_schema_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    let (_tmp, config_path) = setup_test_env(&server.uri(), true);
    fs::write(
        config_path.parent().unwrap().parent().unwrap().join("empty.json"),
        "[]",
    )
    .unwrap();

    let (stdout, stderr, success) = run_prepindex(
        &config_path,
        &["--index", "renamed", "--data", "./empty.json"],
    );
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);

    let index = request_body(&server, "POST", "/indexes").await;
    assert_eq!(index["name"], "renamed");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_search_credentials_fails() {
    let server = MockServer::start().await;
    let (_tmp, config_path) = setup_test_env(&server.uri(), false);

    let (_, stderr, success) = run_prepindex(&config_path, &[]);
    assert!(!success);
    assert!(stderr.contains("search credentials missing"), "stderr={}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fatal_error_reported_with_logging_off() {
    let server = MockServer::start().await;
    let (_tmp, config_path) = setup_test_env(&server.uri(), false);

    let (_, stderr, success) =
        run_prepindex_with_env(&config_path, &[], &[("RUST_LOG", "off")]);
    assert!(!success);
    assert!(stderr.contains("Error: "), "stderr={}", stderr);
    assert!(stderr.contains("search credentials missing"), "stderr={}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_service_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let (_tmp, config_path) = setup_test_env(&server.uri(), true);

    let (_, stderr, success) = run_prepindex(&config_path, &[]);
    assert!(!success);
    assert!(stderr.contains("unable to connect"), "stderr={}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_content_field_fails() {
    let server = MockServer::start().await;
    let (_tmp, config_path) = setup_test_env(&server.uri(), true);

    let (_, stderr, success) = run_prepindex(&config_path, &["--contentfield", "body"]);
    assert!(!success);
    assert!(stderr.contains("content field 'body'"), "stderr={}", stderr);
}
