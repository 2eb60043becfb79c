//! Multipart uploads through the legacy part accessors.

use std::io::Read;

use reqwest::multipart::{Form, Part as FormPart};
use reqwest::StatusCode;
use spark_bridge::http::{MultipartConfig, MULTIPART_CONFIG_ATTRIBUTE};
use spark_bridge::{HandlerError, Request, Response};

mod common;

fn upload_form() -> Form {
    Form::new()
        .text("title", "holiday")
        .part(
            "avatar",
            FormPart::bytes(b"PNGDATA".to_vec())
                .file_name("me.png")
                .mime_str("image/png")
                .unwrap(),
        )
        .part(
            "resume",
            FormPart::bytes(b"%PDF-1.4".to_vec())
                .file_name("cv.pdf")
                .mime_str("application/pdf")
                .unwrap(),
        )
}

#[tokio::test]
async fn get_parts_lists_files_only() {
    let bridge = common::bridge();
    bridge
        .post("/upload", |req: &mut Request, _: &mut Response| {
            let parts: Vec<_> = req
                .get_parts()
                .iter()
                .map(|part| -> Result<serde_json::Value, std::io::Error> {
                    let mut content = String::new();
                    part.input_stream().read_to_string(&mut content)?;
                    Ok(serde_json::json!({
                        "name": part.name(),
                        "file": part.submitted_file_name(),
                        "size": part.size(),
                        "type": part.content_type(),
                        "content": content,
                    }))
                })
                .collect::<Result<_, std::io::Error>>()?;
            Ok::<_, HandlerError>(serde_json::json!({
                "multipart": req.is_multipart(),
                "count": req.get_parts_count(),
                "title": req.form_param("title"),
                "parts": parts,
                "missing": req.get_part("title").is_none(),
            }))
        })
        .unwrap();
    let base = common::base_url(&bridge);

    let body: serde_json::Value = common::client()
        .post(format!("{}/upload", base))
        .multipart(upload_form())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["multipart"], true);
    assert_eq!(body["count"], 2);
    assert_eq!(body["title"], "holiday");
    assert_eq!(body["missing"], true);
    let parts = body["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["name"], "avatar");
    assert_eq!(parts[0]["file"], "me.png");
    assert_eq!(parts[0]["size"], 7);
    assert_eq!(parts[0]["type"], "image/png");
    assert_eq!(parts[0]["content"], "PNGDATA");
    assert_eq!(parts[1]["file"], "cv.pdf");

    bridge.stop();
}

#[tokio::test]
async fn raw_request_accepts_legacy_multipart_config() {
    let bridge = common::bridge();
    bridge
        .post("/legacy-upload", |req: &mut Request, _: &mut Response| {
            let mut raw = req.raw();
            raw.set_attribute(
                MULTIPART_CONFIG_ATTRIBUTE,
                MultipartConfig::new("/tmp").with_limits(1, 1, 0),
            );
            let part = raw.get_part("avatar").ok_or("no avatar")?;
            let answer = format!(
                "{}:{}:{}",
                part.submitted_file_name().unwrap_or("-"),
                part.size(),
                raw.get_parts().len()
            );
            let location = req.multipart_config().map(|c| c.location).unwrap_or_default();
            Ok::<_, HandlerError>(format!("{}:{}", answer, location))
        })
        .unwrap();
    let base = common::base_url(&bridge);

    let res = common::client()
        .post(format!("{}/legacy-upload", base))
        .multipart(upload_form())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "me.png:7:2:/tmp");

    bridge.stop();
}

#[tokio::test]
async fn engine_limit_rejects_large_files() {
    let mut config = common::test_config();
    config.limits.max_file_size = Some(4);
    let bridge = spark_bridge::Bridge::with_config(config);
    bridge
        .post("/upload", |_: &mut Request, _: &mut Response| Ok::<_, HandlerError>("accepted"))
        .unwrap();
    let base = common::base_url(&bridge);

    let res = common::client()
        .post(format!("{}/upload", base))
        .multipart(upload_form())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    bridge.stop();
}
