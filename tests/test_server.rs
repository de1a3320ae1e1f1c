//! Local HTTP server for tests
//!
//! Serves a small patient-record site: a login form, a profile page with a
//! few fields, and a notes page whose content lives in an iframe. The
//! remote notes page loads the same frame from another origin.
//! Each server instance runs on a random available port.

use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use warp::Filter;

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><title>Sign in</title></head>
<body>
    <form action="/" method="get">
        <input id="username" name="username">
        <input id="password" name="password" type="password">
        <button id="submit" type="submit">Sign in</button>
    </form>
</body>
</html>"#;

fn profile_page(patient_id: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><title>Profile {patient_id}</title></head>
<body>
    <div class="profile" style="margin-top: 1500px">
        <h1>Patient {patient_id}</h1>
        <div id="dob" style="width: 200px; height: 40px">1984-02-29</div>
        <div id="ins" style="width: 300px; height: 40px">Blue Shield</div>
    </div>
</body>
</html>"#
    )
}

fn notes_page(patient_id: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><title>Notes {patient_id}</title></head>
<body>
    <h1>Notes</h1>
    <iframe id="chart" src="/frames/chart/{patient_id}" width="800" height="600"></iframe>
</body>
</html>"#
    )
}

fn remote_notes_page(patient_id: &str, frame_origin: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><title>Remote notes {patient_id}</title></head>
<body>
    <h1>Remote notes</h1>
    <div style="height: 300px"></div>
    <iframe id="chart" src="{frame_origin}/frames/chart/{patient_id}" width="800" height="600"></iframe>
</body>
</html>"#
    )
}

fn chart_frame(patient_id: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<body>
    <div id="soap" style="width: 400px; height: 120px">SOAP note for {patient_id}</div>
</body>
</html>"#
    )
}

/// Test server that serves the patient-record pages
pub struct TestServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a new test server on a random available port
    pub async fn start() -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let index = warp::path::end().map(|| warp::reply::html("<html><body>Home</body></html>"));
        let login = warp::path!("login").map(|| warp::reply::html(LOGIN_PAGE));
        let profile = warp::path!("patients" / String / "profile")
            .map(|id: String| warp::reply::html(profile_page(&id)));
        let notes = warp::path!("patients" / String / "notes")
            .map(|id: String| warp::reply::html(notes_page(&id)));
        let remote_notes = warp::path!("patients" / String / "remote-notes")
            .and(warp::query::<HashMap<String, String>>())
            .map(|id: String, query: HashMap<String, String>| {
                let origin = query.get("frame_origin").cloned().unwrap_or_default();
                warp::reply::html(remote_notes_page(&id, &origin))
            });
        let chart = warp::path!("frames" / "chart" / String)
            .map(|id: String| warp::reply::html(chart_frame(&id)));

        let routes = index.or(login).or(profile).or(notes).or(remote_notes).or(chart);

        let (addr, server) =
            warp::serve(routes).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async {
                shutdown_rx.await.ok();
            });

        tokio::spawn(server);

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:12345`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The same server under another site (`localhost` instead of
    /// `127.0.0.1`), for cross-origin frames
    #[allow(dead_code)]
    pub fn cross_site_url(&self) -> String {
        format!("http://localhost:{}", self.addr.port())
    }

    #[allow(dead_code)]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready by making a test request
    pub async fn wait_ready(&self) -> anyhow::Result<()> {
        let url = self.url();
        let max_attempts = 10;

        for attempt in 1..=max_attempts {
            match reqwest::get(&url).await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    println!("Attempt {}: server returned {}", attempt, response.status());
                }
                Err(e) => {
                    println!("Attempt {}: server not ready - {}", attempt, e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        }

        anyhow::bail!("Server did not become ready after {} attempts", max_attempts)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
