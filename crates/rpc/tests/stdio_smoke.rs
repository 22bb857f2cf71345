#![forbid(unsafe_code)]

mod support;

use serde_json::json;
use support::*;

#[test]
fn stdio_round_trip_serves_crud_and_jobs() {
    let mut server = Server::start("stdio_round_trip");

    let response = server.request(granted(
        "createPost",
        json!({ "values": { "title": "hello", "views": 1 } }),
    ));
    assert_eq!(response["result"]["title"], json!("hello"));

    let response = server.request(granted(
        "listPosts",
        json!({ "where": { "title": { "startsWith": "he" } } }),
    ));
    assert_eq!(response["result"]["count"], json!(1));

    let response = server.request(granted("ping", json!({})));
    assert_eq!(response["result"], json!({}));

    let response = server.request(granted("noSuchMethod", json!({})));
    assert_eq!(
        response["error"]["code"],
        json!("METHOD_NOT_FOUND"),
        "unexpected response: {response}"
    );
}

#[test]
fn stdio_survives_malformed_lines() {
    let mut server = Server::start("stdio_malformed");

    let response = server.request_raw("this is not json");
    assert_eq!(response["error"]["code"], json!("INVALID_INPUT"));

    // The loop keeps serving after a bad line.
    let response = server.request(granted("ping", json!({})));
    assert_eq!(response["result"], json!({}));
}
