use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use sqlx::PgPool;

/// Integration tests talk to a real PostgreSQL; they skip unless this is set
pub const DATABASE_URL_VAR: &str = "CRUD_TEST_DATABASE_URL";

pub fn database_url() -> Option<String> {
    std::env::var(DATABASE_URL_VAR).ok().filter(|s| !s.is_empty())
}

pub struct TestServer {
    pub base_url: String,
    child: Child,
}

impl TestServer {
    /// Spawn the server binary exposing `tables`
    pub async fn spawn(database_url: &str, tables: &[&str]) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let child = Command::new(env!("CARGO_BIN_EXE_crud-routes"))
            .env("DATABASE_URL", database_url)
            .env("CRUD_API_PORT", port.to_string())
            .env("API_BIND_ADDRESS", "127.0.0.1")
            .env("CRUD_TABLES", tables.join(","))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        let server = Self { base_url, child };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A throwaway table, dropped again when the value goes out of scope
pub struct TestTable {
    pub name: String,
    database_url: String,
}

impl TestTable {
    /// `users` shape: serial id, name limited to 50 characters, optional age
    pub async fn create(database_url: &str) -> Result<Self> {
        Self::create_with("it_users", database_url, |name| {
            format!(
                "CREATE TABLE \"{}\" (id SERIAL PRIMARY KEY, name VARCHAR(50) NOT NULL, age INTEGER)",
                name
            )
        })
        .await
    }

    /// `docs` shape: UUID id generated by the database, text title
    pub async fn create_uuid_keyed(database_url: &str) -> Result<Self> {
        Self::create_with("it_docs", database_url, |name| {
            format!(
                "CREATE TABLE \"{}\" (id UUID PRIMARY KEY DEFAULT gen_random_uuid(), title TEXT NOT NULL)",
                name
            )
        })
        .await
    }

    async fn create_with(prefix: &str, database_url: &str, ddl: impl Fn(&str) -> String) -> Result<Self> {
        let name = format!("{}_{}", prefix, uuid::Uuid::new_v4().simple());

        let pool = PgPool::connect(database_url).await?;
        sqlx::query(&ddl(&name)).execute(&pool).await?;
        pool.close().await;

        Ok(Self {
            name,
            database_url: database_url.to_string(),
        })
    }
}

impl Drop for TestTable {
    fn drop(&mut self) {
        let database_url = self.database_url.clone();
        let sql = format!("DROP TABLE IF EXISTS \"{}\"", self.name);

        // Also runs while a failed assertion unwinds, so it cannot borrow the
        // test's runtime
        let dropped = std::thread::spawn(move || -> Result<()> {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
            runtime.block_on(async {
                let pool = PgPool::connect(&database_url).await?;
                sqlx::query(&sql).execute(&pool).await?;
                pool.close().await;
                Ok::<(), anyhow::Error>(())
            })
        })
        .join();

        if let Ok(Err(e)) = dropped {
            eprintln!("failed to drop test table {}: {}", self.name, e);
        }
    }
}
