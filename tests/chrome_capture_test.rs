//! End-to-end capture against a real headless Chrome and the local test
//! server. Run with `cargo test -- --ignored` on a machine with Chrome.

mod test_server;

use std::time::Duration;
use test_server::TestServer;
use webpt_capture::browser::wait::wait_for_presence;
use webpt_capture::{
    capture_patient, ensure_authenticated, AppConfig, CaptureOptions, ChromeSession, Credentials,
    LaunchOptions, Selector, Session,
};

fn config_for(base_url: &str) -> AppConfig {
    let yaml = format!(
        r##"
base_url: {base_url}
default_timeout_seconds: 5
login:
  url: {base_url}/login
  username_selector: {{ type: css, value: "#username" }}
  password_selector: {{ type: css, value: "#password" }}
  submit_selector: {{ type: xpath, value: "//button[@type='submit']" }}
  post_login_wait_seconds: 0.5
patients:
  pages:
    profile:
      url_template: {base_url}/patients/{{patient_id}}/profile
      ready_selector: {{ type: css, value: ".profile" }}
      fields:
        Date of Birth: {{ type: css, value: "#dob" }}
        Insurance: {{ type: xpath, value: "//div[@id='ins']" }}
        Missing: {{ type: css, value: "#nope" }}
    notes:
      url_template: {base_url}/patients/{{patient_id}}/notes
      iframe: {{ type: css, value: "iframe#chart" }}
      fields:
        SOAP: {{ type: css, value: "#soap" }}
"##
    );
    AppConfig::from_yaml(&yaml).unwrap()
}

async fn launch() -> anyhow::Result<ChromeSession> {
    ChromeSession::launch(LaunchOptions::default())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to launch Chrome: {}", e))
}

#[tokio::test]
#[ignore = "requires a local Chrome installation"]
async fn test_capture_patient_with_chrome() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let config = config_for(&server.url());
    let out = tempfile::tempdir()?;

    let session = launch().await?;
    let options = CaptureOptions {
        timeout: Duration::from_secs(2),
        settle_delay: Duration::from_millis(50),
    };

    let reports = capture_patient(&session, &config.pages, "1001", out.path(), None, &options).await?;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].saved(), 2);
    assert_eq!(reports[0].failed(), 1);
    assert_eq!(reports[1].saved(), 1);

    let profile = out.path().join("1001").join("profile");
    let png = std::fs::read(profile.join("Date_of_Birth.png"))?;
    assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    assert!(profile.join("Missing.error.txt").exists());

    let notes_source = std::fs::read_to_string(out.path().join("1001/notes/page_source.html"))?;
    assert!(notes_source.contains("SOAP note for 1001"));

    session.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome installation"]
async fn test_login_with_chrome() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let config = config_for(&server.url());

    let session = launch().await?;
    let credentials = Credentials {
        username: "therapist".to_string(),
        password: "s3cret".to_string(),
    };
    ensure_authenticated(&session, &config, Some(&credentials)).await?;

    // The form submits back to the home page
    let source = session.page_source().await?;
    assert!(source.contains("Home"));

    session.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome installation"]
async fn test_frame_context_with_chrome() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let session = launch().await?;

    session
        .navigate(&format!("{}/patients/7/notes", server.url()))
        .await?;
    let frame = Selector::Css("iframe#chart".to_string());
    let soap = Selector::Css("#soap".to_string());

    // Not visible from the top-level document
    assert!(session.find_element(&soap).await?.is_none());

    let frame_element = wait_for_presence(&session, &frame, Duration::from_secs(2)).await?;
    session.switch_to_frame(&frame_element).await?;
    let element = wait_for_presence(&session, &soap, Duration::from_secs(2)).await?;
    let png = session.screenshot_element(&element).await?;
    assert!(!png.is_empty());

    session.switch_to_default_content().await?;
    assert!(session.find_element(&soap).await?.is_none());

    session.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome installation"]
async fn test_cross_origin_frame_with_chrome() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let session = launch().await?;

    session
        .navigate(&format!(
            "{}/patients/7/remote-notes?frame_origin={}",
            server.url(),
            server.cross_site_url()
        ))
        .await?;
    let frame = Selector::Css("iframe#chart".to_string());
    let soap = Selector::Css("#soap".to_string());

    let mut entered = false;
    for _ in 0..20 {
        if session.switch_to_frame_when_available(&frame).await? {
            entered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(entered, "cross-origin frame never became available");

    let element = wait_for_presence(&session, &soap, Duration::from_secs(2)).await?;
    session.highlight(&element).await?;
    let png = session.screenshot_element(&element).await?;
    assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);

    let source = session.page_source().await?;
    assert!(source.contains("SOAP note for 7"));

    session.switch_to_default_content().await?;
    assert!(session.find_element(&soap).await?.is_none());

    session.close().await?;
    Ok(())
}
