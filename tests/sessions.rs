//! Sessions across requests sharing one engine session cookie.

use spark_bridge::{HandlerError, Request, Response};

mod common;

#[tokio::test]
async fn session_identity_survives_requests_until_invalidated() {
    let bridge = common::bridge();
    bridge
        .get("/session/id", |req: &mut Request, _: &mut Response| {
            let session = req.session();
            let first = session.id();
            assert_eq!(session.id(), first);
            Ok::<_, HandlerError>(first)
        })
        .unwrap();
    bridge
        .post("/session/invalidate", |req: &mut Request, _: &mut Response| {
            req.session().invalidate();
            Ok::<_, HandlerError>(())
        })
        .unwrap();
    let base = common::base_url(&bridge);
    let client = common::client();

    let res = client.get(format!("{}/session/id", base)).send().await.unwrap();
    let cookie = common::cookie_pair(&res, "JSESSIONID").expect("session cookie");
    let id = res.text().await.unwrap();

    let res = client
        .get(format!("{}/session/id", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert!(common::cookie_pair(&res, "JSESSIONID").is_none());
    assert_eq!(res.text().await.unwrap(), id);

    client
        .post(format!("{}/session/invalidate", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();

    let res = client
        .get(format!("{}/session/id", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_ne!(res.text().await.unwrap(), id);

    bridge.stop();
}

#[tokio::test]
async fn session_attributes_and_defaults() {
    let bridge = common::bridge();
    bridge
        .post("/visit", |req: &mut Request, _: &mut Response| {
            let visits = req.session_attribute::<u32>("visits").unwrap_or(0) + 1;
            req.set_session_attribute("visits", visits);
            Ok::<_, HandlerError>(visits.to_string())
        })
        .unwrap();
    bridge
        .get("/session/info", |req: &mut Request, _: &mut Response| {
            let session = req.session();
            Ok::<_, HandlerError>(serde_json::json!({
                "new": session.is_new(),
                "max_inactive": session.max_inactive_interval(),
                "attributes": session.attributes(),
            }))
        })
        .unwrap();
    let base = common::base_url(&bridge);
    let client = common::client();

    let res = client.post(format!("{}/visit", base)).send().await.unwrap();
    let cookie = common::cookie_pair(&res, "JSESSIONID").unwrap();
    assert_eq!(res.text().await.unwrap(), "1");

    let res = client
        .post(format!("{}/visit", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "2");

    let info: serde_json::Value = client
        .get(format!("{}/session/info", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["new"], true);
    assert_eq!(info["max_inactive"], 1800);
    assert_eq!(info["attributes"], serde_json::json!(["visits"]));

    assert_eq!(bridge.sessions().len(), 1);
    bridge.stop();
}

#[tokio::test]
async fn invalidated_sessions_leave_the_store() {
    let bridge = common::bridge();
    bridge
        .get("/once", |req: &mut Request, _: &mut Response| {
            let session = req.session();
            session.set_attribute("seen", true);
            session.invalidate();
            Ok::<_, HandlerError>(())
        })
        .unwrap();
    let base = common::base_url(&bridge);
    let client = common::client();

    for _ in 0..50 {
        let res = client.get(format!("{}/once", base)).send().await.unwrap();
        assert!(res.status().is_success());
        assert!(common::cookie_pair(&res, "JSESSIONID").is_none());
    }
    assert!(bridge.sessions().is_empty());

    bridge.stop();
}

#[tokio::test]
async fn idle_sessions_are_evicted() {
    let mut config = common::test_config();
    config.session.idle_timeout_secs = 1;
    let bridge = spark_bridge::Bridge::with_config(config);
    bridge
        .get("/touch", |req: &mut Request, _: &mut Response| {
            req.set_session_attribute("touched", true);
            Ok::<_, HandlerError>(())
        })
        .unwrap();
    let base = common::base_url(&bridge);

    common::client().get(format!("{}/touch", base)).send().await.unwrap();
    assert_eq!(bridge.sessions().len(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(3_000)).await;
    assert!(bridge.sessions().is_empty());

    bridge.stop();
}
