//! Common test utilities - CosmosTest harness for end-to-end testing

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cosmosd::{Config, Server};
use reqwest::Client;
use serde_json::Value;
use tokio::task::JoinHandle;

/// Test harness that spawns a real cosmosd server on a random port
pub struct CosmosTest {
    pub addr: SocketAddr,
    pub client: Client,
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
}

impl CosmosTest {
    /// Start a new test server with an in-memory database
    pub async fn start() -> Result<Self> {
        Self::start_with(Config::default()).await
    }

    /// Start a test server with the given config; the bind address is replaced
    pub async fn start_with(mut config: Config) -> Result<Self> {
        // Find a random available port
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        config.bind_addr = addr;

        let server = Arc::new(Server::new(config).await?);
        let server_clone = server.clone();

        // Spawn the server in a background task
        let handle = tokio::spawn(async move {
            if let Err(e) = server_clone.run().await {
                eprintln!("Server error: {}", e);
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        // Poll until server is ready (max 2 seconds)
        let mut ready = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
        }

        if !ready {
            panic!("Server failed to start within 2 seconds");
        }

        Ok(Self {
            addr,
            client,
            server,
            handle: Some(handle),
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    /// Make a POST request with JSON body
    pub async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await?)
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .put(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await?)
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .delete(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    /// POST with an empty JSON object
    pub async fn post_empty(&self, path: &str) -> Result<reqwest::Response> {
        self.post(path, &serde_json::json!({})).await
    }

    /// Create an encounter and return its id
    pub async fn create_encounter(&self, name: &str) -> Result<String> {
        let resp = self
            .post("/encounters", &serde_json::json!({ "name": name }))
            .await?;
        let body: Value = resp.json().await?;
        body["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("no id in {}", body))
    }

    /// Add a combatant and return its id
    pub async fn add_combatant(
        &self,
        encounter: &str,
        name: &str,
        max_hp: u32,
        initiative_modifier: i32,
    ) -> Result<u64> {
        let resp = self
            .post(
                &format!("/encounters/{}/combatants", encounter),
                &serde_json::json!({
                    "name": name,
                    "type": "npc",
                    "max_hp": max_hp,
                    "initiative_modifier": initiative_modifier,
                }),
            )
            .await?;
        let body: Value = resp.json().await?;
        body["result"]["id"]
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("no combatant id in {}", body))
    }

    /// Set a combatant's initiative by hand
    pub async fn set_initiative(&self, encounter: &str, combatant: u64, value: i32) -> Result<()> {
        let resp = self
            .put(
                &format!("/encounters/{}/combatants/{}/initiative", encounter, combatant),
                &serde_json::json!({ "value": value }),
            )
            .await?;
        anyhow::ensure!(resp.status() == 200, "set initiative failed: {}", resp.status());
        Ok(())
    }

    /// Get direct access to the database for assertions
    pub fn db(&self) -> Arc<cosmosd::db::Database> {
        self.server.db()
    }

    /// Stop the server and wait for it to release its port
    pub async fn stop(mut self) {
        self.server.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CosmosTest {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}
