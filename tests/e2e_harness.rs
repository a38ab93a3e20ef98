#![allow(dead_code)]

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub struct ServerHarness {
    child: Child,
    pub api_port: u16,
    pub api_base: String,
    work_dir: tempfile::TempDir,
}

impl ServerHarness {
    /// Starts `moviebot serve` against `db_path`, with the LLM pointed at `llm_url`.
    pub async fn spawn(db_path: &Path, llm_url: &str) -> TestResult<Self> {
        let api_port = find_free_port()?;
        let work_dir = tempfile::tempdir()?;
        let config_path = work_dir.path().join("moviebot.toml");
        std::fs::write(
            &config_path,
            format!(
                "[database]\npath = {:?}\nconnect_retries = 1\nretry_backoff_ms = 10\n\n\
                 [llm]\nprovider = \"ollama\"\nmodel = \"mock-model-v1\"\nbase_url = {:?}\ntimeout_secs = 10\n\n\
                 [logging]\nlevel = \"debug\"\n",
                db_path.display().to_string(),
                llm_url
            ),
        )?;

        let log_path = work_dir.path().join(format!("server-{}.log", api_port));
        let log_file = std::fs::File::create(&log_path)?;
        let log_file_err = log_file.try_clone()?;

        let child = Command::new(moviebot_binary_path()?)
            .arg("serve")
            .arg("--config")
            .arg(&config_path)
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(api_port.to_string())
            .env_remove("MOVIEBOT_DB_PATH")
            .env_remove("MOVIEBOT_LLM_PROVIDER")
            .env_remove("MOVIEBOT_LLM_MODEL")
            .env_remove("MOVIEBOT_LLM_BASE_URL")
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_file_err))
            .spawn()?;

        let mut harness = Self {
            child,
            api_port,
            api_base: format!("http://127.0.0.1:{}", api_port),
            work_dir,
        };
        harness.wait_until_ready().await?;
        Ok(harness)
    }

    pub fn log_text(&self) -> String {
        std::fs::read_to_string(
            self.work_dir
                .path()
                .join(format!("server-{}.log", self.api_port)),
        )
        .unwrap_or_default()
    }

    async fn wait_until_ready(&mut self) -> TestResult<()> {
        for _ in 0..80 {
            if let Some(status) = self.child.try_wait()? {
                return Err(format!(
                    "moviebot exited early with status: {}\n{}",
                    status,
                    self.log_text()
                )
                .into());
            }

            let res = reqwest::Client::new()
                .get(format!("{}/health", self.api_base))
                .timeout(Duration::from_millis(700))
                .send()
                .await;
            if let Ok(resp) = res
                && resp.status().is_success()
            {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Err("Timed out waiting for moviebot API readiness".into())
    }

    pub async fn ask(&self, question: &str) -> TestResult<(u16, Value)> {
        let body = json!({
            "session_id": "e2e",
            "chat_history": [
                {"role": "assistant", "content": "Hi! Ask me anything about movies."},
                {"role": "user", "content": question}
            ]
        });
        self.request_json(reqwest::Method::POST, "/query", Some(body))
            .await
    }

    pub async fn request_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> TestResult<(u16, Value)> {
        let url = format!("{}{}", self.api_base, path);
        let mut req = reqwest::Client::new()
            .request(method, &url)
            .timeout(Duration::from_secs(30));
        if let Some(payload) = body {
            req = req.json(&payload);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let parsed = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "raw": text }));
        Ok((status, parsed))
    }
}

impl Drop for ServerHarness {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[derive(Clone)]
struct MockServerState {
    traces: Arc<Mutex<Vec<String>>>,
}

pub struct MockLlmServer {
    pub port: u16,
    traces: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct MockChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MockOpenAiRequest {
    messages: Vec<MockChatMessage>,
}

async fn mock_chat_completion(
    State(state): State<MockServerState>,
    Json(payload): Json<MockOpenAiRequest>,
) -> Json<Value> {
    let user = payload
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let response_content = mock_llm_response(user);
    let response = json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": response_content
            }
        }]
    });

    let mut traces = state.traces.lock().unwrap_or_else(|e| e.into_inner());
    traces.push(user.to_string());
    drop(traces);

    Json(response)
}

impl MockLlmServer {
    pub async fn start() -> TestResult<Self> {
        let port = find_free_port()?;
        let traces = Arc::new(Mutex::new(Vec::new()));
        let state = MockServerState {
            traces: Arc::clone(&traces),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(mock_chat_completion))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            port,
            traces,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}/v1/chat/completions", self.port)
    }

    /// User prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.traces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Canned replies keyed on the prompt the server receives.
fn mock_llm_response(user: &str) -> String {
    if user.contains("converts natural language questions") {
        if user.contains("tagged 'funny'") {
            return json!({ "query": "SELECT COUNT(*) AS n FROM tags WHERE tag = 'funny';" })
                .to_string();
        }
        if user.contains("movie titles") {
            return json!({ "query": "SELECT titel FROM movies" }).to_string();
        }
        return json!({ "query": "SELECT * FROM movies LIMIT 200" }).to_string();
    }
    if user.contains("Fix the SQL query") {
        return "```sql\nSELECT title FROM movies ORDER BY movieId LIMIT 200;\n```".to_string();
    }
    if user.contains("could not answer") {
        return "Sorry, I couldn't look that up. Could you rephrase?".to_string();
    }
    if user.contains("Rows (preview)") {
        if user.contains(r#"{"n":2}"#) {
            return "There are 2 movies tagged 'funny'.".to_string();
        }
        if user.contains("Toy Story (1995)") {
            return "Some titles: Toy Story (1995), Jumanji (1995).".to_string();
        }
        return "I found some results.".to_string();
    }
    "I am not sure.".to_string()
}

pub fn seed_movie_db(dir: &Path) -> TestResult<PathBuf> {
    let path = dir.join("movies.sqlite");
    let conn = rusqlite::Connection::open(&path)?;
    conn.execute_batch(
        "CREATE TABLE movies (movieId INTEGER PRIMARY KEY, title TEXT, genres TEXT);
         CREATE TABLE ratings (userId INTEGER, movieId INTEGER, rating REAL, timestamp INTEGER);
         CREATE TABLE tags (userId INTEGER, movieId INTEGER, tag TEXT, timestamp INTEGER);
         CREATE TABLE links (movieId INTEGER, imdbId TEXT, tmdbId TEXT);
         INSERT INTO movies VALUES
            (1, 'Toy Story (1995)', 'Adventure|Animation|Children|Comedy|Fantasy'),
            (2, 'Jumanji (1995)', 'Adventure|Children|Fantasy'),
            (3, 'Grumpier Old Men (1995)', 'Comedy|Romance');
         INSERT INTO ratings VALUES (1, 1, 4.0, 964982703), (1, 3, 4.0, 964981247);
         INSERT INTO tags VALUES
            (2, 1, 'funny', 1445714994),
            (2, 3, 'funny', 1445714996),
            (7, 2, 'fantasy', 1169687325);
         INSERT INTO links VALUES (1, '0114709', '862'), (2, '0113497', '8844');",
    )?;
    Ok(path)
}

pub fn find_free_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn moviebot_binary_path() -> TestResult<PathBuf> {
    if let Some(path) = option_env!("CARGO_BIN_EXE_moviebot") {
        return Ok(PathBuf::from(path));
    }

    let candidate = PathBuf::from("target")
        .join("debug")
        .join(if cfg!(windows) { "moviebot.exe" } else { "moviebot" });
    if candidate.exists() {
        return Ok(candidate);
    }

    Err("Could not locate moviebot test binary path".into())
}
