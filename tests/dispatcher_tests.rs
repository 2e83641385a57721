//! Tests for the request dispatch pipeline: scenario coverage for
//! matching, parameter extraction, body limits, decode errors, panic
//! recovery, fall-through, and cookie round-trips.

use gantry::{
    Body, Dispatcher, HandlerFn, HandlerResult, JsonCodec, MultiMap, PathPattern, RawRequest,
    RawResponse, Route, Router, SetCookie,
};
use http::Method;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing_util::TestTracing;

fn route(index: usize, verb: &str, prefix: &str, suffix: &str, handler: HandlerFn) -> Route {
    route_with_context(index, verb, prefix, suffix, handler, None)
}

fn route_with_context(
    index: usize,
    verb: &str,
    prefix: &str,
    suffix: &str,
    handler: HandlerFn,
    context: Option<Arc<dyn std::any::Any + Send + Sync>>,
) -> Route {
    let verb = match verb {
        "*" => None,
        v => Some(v.parse::<Method>().expect("verb")),
    };
    Route {
        verb,
        pattern: PathPattern::parse(prefix, suffix).expect("pattern"),
        handler,
        context,
        index,
        is_default: false,
    }
}

fn default_route(handler: HandlerFn) -> Route {
    Route {
        verb: None,
        pattern: PathPattern::parse("", "").expect("pattern"),
        handler,
        context: None,
        index: usize::MAX,
        is_default: true,
    }
}

fn dispatcher(routes: Vec<Route>, default: Option<Route>) -> Dispatcher {
    dispatcher_with(routes, default, MultiMap::for_headers(), 1024 * 1024)
}

fn dispatcher_with(
    routes: Vec<Route>,
    default: Option<Route>,
    default_headers: MultiMap,
    max_body_size: usize,
) -> Dispatcher {
    Dispatcher::new(
        Arc::new(Router::new(routes, default)),
        default_headers,
        max_body_size,
        Arc::new(JsonCodec),
    )
}

fn raw(method: &str, path: &str) -> RawRequest {
    RawRequest {
        method: method.to_string(),
        path: path.to_string(),
        headers: Vec::new(),
        body: Vec::new(),
        client_addr: None,
    }
}

fn body_str(response: &RawResponse) -> String {
    String::from_utf8_lossy(&response.body).to_string()
}

fn header<'a>(response: &'a RawResponse, name: &str) -> Option<&'a str> {
    response
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[test]
fn test_scenario_hello_world() {
    let _tracing = TestTracing::init();
    let d = dispatcher(
        vec![route(
            0,
            "GET",
            "/test",
            "",
            Arc::new(|_req, resp, _ctx| {
                resp.status = 200;
                resp.set_body("Hello World!");
                HandlerResult::Continue
            }),
        )],
        None,
    );
    let response = d.dispatch(raw("GET", "/test"));
    assert_eq!(response.status, 200);
    assert_eq!(body_str(&response), "Hello World!");
    assert_eq!(header(&response, "content-type"), Some("text/plain"));
}

#[test]
fn test_scenario_wildcard_binding_reaches_handler() {
    let _tracing = TestTracing::init();
    let echo_foo: HandlerFn = Arc::new(|req, resp, _ctx| {
        resp.set_body(req.get_url_param("foo").unwrap_or("missing").to_string());
        HandlerResult::Continue
    });
    let d = dispatcher(
        vec![
            route(0, "GET", "/test", "/:foo", Arc::clone(&echo_foo)),
            route(1, "POST", "/test", "/:foo", echo_foo),
        ],
        None,
    );
    let response = d.dispatch(raw("GET", "/test/alice"));
    assert_eq!(response.status, 200);
    assert_eq!(body_str(&response), "alice");
}

#[test]
fn test_query_params_and_bindings_share_one_map() {
    let d = dispatcher(
        vec![route(
            0,
            "GET",
            "/test",
            "/:foo",
            Arc::new(|req, resp, _ctx| {
                let pairs: Vec<String> = req
                    .url_params
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                resp.set_body(pairs.join("&"));
                HandlerResult::Continue
            }),
        )],
        None,
    );
    let response = d.dispatch(raw("GET", "/test/alice?x=1&x=2"));
    // query pairs come first, wildcard bindings are appended
    assert_eq!(body_str(&response), "x=1&x=2&foo=alice");
}

#[test]
fn test_scenario_default_handler_answers_unmatched() {
    let _tracing = TestTracing::init();
    let d = dispatcher(
        vec![],
        Some(default_route(Arc::new(|_req, resp, _ctx| {
            resp.status = 404;
            resp.set_body("Page not found, do what you want");
            HandlerResult::Continue
        }))),
    );
    let response = d.dispatch(raw("GET", "/nope/nothing/here"));
    assert_eq!(response.status, 404);
    assert_eq!(body_str(&response), "Page not found, do what you want");
}

#[test]
fn test_unmatched_without_default_is_404() {
    let d = dispatcher(vec![], None);
    let response = d.dispatch(raw("GET", "/missing"));
    assert_eq!(response.status, 404);
    let body: serde_json::Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["path"], "/missing");
}

#[test]
fn test_scenario_malformed_structured_body_sets_error_flag() {
    let _tracing = TestTracing::init();
    let d = dispatcher(
        vec![route(
            0,
            "PUT",
            "/testjson",
            "",
            Arc::new(|req, resp, _ctx| {
                assert!(req.json_body.is_none());
                let err = req.body_error.as_deref().unwrap_or("none");
                resp.status = 200;
                resp.set_json(json!({ "title": "Error parsing request", "message": err }));
                HandlerResult::Continue
            }),
        )],
        None,
    );
    let mut request = raw("PUT", "/testjson");
    request.headers.push(("Content-Type".into(), "application/json".into()));
    request.body = b"{ this is not json".to_vec();
    let response = d.dispatch(request);
    assert_eq!(response.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&response.body).expect("json");
    assert_eq!(body["title"], "Error parsing request");
    assert_ne!(body["message"], "none");
}

#[test]
fn test_well_formed_structured_body_is_decoded() {
    let d = dispatcher(
        vec![route(
            0,
            "PUT",
            "/testjson",
            "",
            Arc::new(|req, resp, _ctx| {
                resp.set_json(json!({ "request": req.json_body.clone().unwrap_or_default() }));
                HandlerResult::Continue
            }),
        )],
        None,
    );
    let mut request = raw("PUT", "/testjson");
    request.headers.push(("content-type".into(), "application/json; charset=utf-8".into()));
    request.body = br#"{"name":"fluffy"}"#.to_vec();
    let response = d.dispatch(request);
    let body: serde_json::Value = serde_json::from_slice(&response.body).expect("json");
    assert_eq!(body["request"]["name"], "fluffy");
}

#[test]
fn test_body_size_boundary() {
    let counter = Arc::new(AtomicUsize::new(0));
    let d = dispatcher_with(
        vec![route_with_context(
            0,
            "POST",
            "/upload",
            "",
            Arc::new(|_req, resp, ctx| {
                let counter = ctx
                    .and_then(|c| c.downcast_ref::<AtomicUsize>())
                    .expect("counter context");
                counter.fetch_add(1, Ordering::SeqCst);
                resp.set_body("ok");
                HandlerResult::Continue
            }),
            Some(Arc::clone(&counter) as Arc<dyn std::any::Any + Send + Sync>),
        )],
        None,
        MultiMap::for_headers(),
        8,
    );

    // exactly at the limit: accepted, handler runs
    let mut at_limit = raw("POST", "/upload");
    at_limit.body = vec![b'x'; 8];
    let response = d.dispatch(at_limit);
    assert_eq!(response.status, 200);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // one byte over: rejected, handler not invoked
    let mut over_limit = raw("POST", "/upload");
    over_limit.body = vec![b'x'; 9];
    let response = d.dispatch(over_limit);
    assert_eq!(response.status, 413);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_handler_panic_becomes_500_and_loop_survives() {
    let _tracing = TestTracing::init();
    let d = dispatcher(
        vec![
            route(
                0,
                "GET",
                "/boom",
                "",
                Arc::new(|_req, _resp, _ctx| panic!("handler exploded")),
            ),
            route(
                1,
                "GET",
                "/fine",
                "",
                Arc::new(|_req, resp, _ctx| {
                    resp.set_body("still serving");
                    HandlerResult::Continue
                }),
            ),
        ],
        None,
    );
    let response = d.dispatch(raw("GET", "/boom"));
    assert_eq!(response.status, 500);
    let body: serde_json::Value = serde_json::from_slice(&response.body).expect("json");
    assert_eq!(body["error"], "handler panicked");

    // the dispatcher is untouched by the panic
    let response = d.dispatch(raw("GET", "/fine"));
    assert_eq!(response.status, 200);
    assert_eq!(body_str(&response), "still serving");
}

#[test]
fn test_handler_error_result_still_serializes_response() {
    let d = dispatcher(
        vec![route(
            0,
            "GET",
            "/fails",
            "",
            Arc::new(|_req, resp, _ctx| {
                resp.status = 502;
                resp.set_body("upstream broken");
                HandlerResult::Error
            }),
        )],
        None,
    );
    let response = d.dispatch(raw("GET", "/fails"));
    assert_eq!(response.status, 502);
    assert_eq!(body_str(&response), "upstream broken");
}

#[test]
fn test_fallthrough_tries_next_best_route() {
    let _tracing = TestTracing::init();
    let d = dispatcher(
        vec![
            route(
                0,
                "GET",
                "/files",
                "/special",
                Arc::new(|_req, _resp, _ctx| HandlerResult::Fallthrough),
            ),
            route(
                1,
                "GET",
                "/files",
                "/:name",
                Arc::new(|req, resp, _ctx| {
                    resp.set_body(format!(
                        "generic:{}",
                        req.get_url_param("name").unwrap_or("?")
                    ));
                    HandlerResult::Continue
                }),
            ),
        ],
        None,
    );
    // the literal wins first, yields, and the wildcard picks it up
    let response = d.dispatch(raw("GET", "/files/special"));
    assert_eq!(response.status, 200);
    assert_eq!(body_str(&response), "generic:special");
}

#[test]
fn test_fallthrough_exhaustion_is_bounded() {
    let d = dispatcher(
        vec![route(
            0,
            "GET",
            "/loop",
            "",
            Arc::new(|_req, _resp, _ctx| HandlerResult::Fallthrough),
        )],
        None,
    );
    let response = d.dispatch(raw("GET", "/loop"));
    assert_eq!(response.status, 404);
}

#[test]
fn test_fallthrough_from_default_route_ends_in_404() {
    let d = dispatcher(
        vec![],
        Some(default_route(Arc::new(|_req, _resp, _ctx| {
            HandlerResult::Fallthrough
        }))),
    );
    let response = d.dispatch(raw("GET", "/whatever"));
    assert_eq!(response.status, 404);
}

#[test]
fn test_cookie_round_trip() {
    let d = dispatcher(
        vec![
            route(
                0,
                "GET",
                "/set",
                "",
                Arc::new(|_req, resp, _ctx| {
                    let mut cookie = SetCookie::new("sid", "abc123");
                    cookie.path = Some("/".to_string());
                    cookie.max_age = Some(3600);
                    cookie.http_only = true;
                    resp.add_cookie(cookie);
                    resp.set_body("set");
                    HandlerResult::Continue
                }),
            ),
            route(
                1,
                "GET",
                "/read",
                "",
                Arc::new(|req, resp, _ctx| {
                    resp.set_body(req.get_cookie("sid").unwrap_or("missing").to_string());
                    HandlerResult::Continue
                }),
            ),
        ],
        None,
    );

    let response = d.dispatch(raw("GET", "/set"));
    let set_cookie = header(&response, "set-cookie").expect("set-cookie emitted");
    assert_eq!(set_cookie, "sid=abc123; Max-Age=3600; Path=/; HttpOnly");

    // a client re-sending the pair gets decoded back to an equal value
    let pair = set_cookie.split(';').next().expect("pair");
    let mut request = raw("GET", "/read");
    request.headers.push(("Cookie".into(), pair.to_string()));
    let response = d.dispatch(request);
    assert_eq!(body_str(&response), "abc123");
}

#[test]
fn test_default_headers_overlay_every_response() {
    let mut defaults = MultiMap::for_headers();
    defaults.put("Access-Control-Allow-Origin", "*");
    let d = dispatcher_with(
        vec![route(
            0,
            "GET",
            "/test",
            "",
            Arc::new(|_req, resp, _ctx| {
                resp.set_body("ok");
                HandlerResult::Continue
            }),
        )],
        None,
        defaults,
        1024,
    );
    let response = d.dispatch(raw("GET", "/test"));
    assert_eq!(header(&response, "access-control-allow-origin"), Some("*"));
    // dispatcher-generated responses carry them too
    let response = d.dispatch(raw("GET", "/missing"));
    assert_eq!(response.status, 404);
    assert_eq!(header(&response, "access-control-allow-origin"), Some("*"));
}

#[test]
fn test_form_body_populates_post_fields() {
    let d = dispatcher(
        vec![route(
            0,
            "POST",
            "/form",
            "",
            Arc::new(|req, resp, _ctx| {
                assert!(req.json_body.is_none());
                resp.set_body(format!(
                    "{}+{}",
                    req.get_post_field("name").unwrap_or("?"),
                    req.get_post_field("tag").unwrap_or("?"),
                ));
                HandlerResult::Continue
            }),
        )],
        None,
    );
    let mut request = raw("POST", "/form");
    request
        .headers
        .push(("Content-Type".into(), "application/x-www-form-urlencoded".into()));
    request.body = b"name=alice&tag=admin".to_vec();
    let response = d.dispatch(request);
    assert_eq!(body_str(&response), "alice+admin");
}

#[test]
fn test_structured_response_body_uses_codec_content_type() {
    let d = dispatcher(
        vec![route(
            0,
            "GET",
            "/json",
            "",
            Arc::new(|_req, resp, _ctx| {
                resp.set_json(json!({ "ok": true }));
                HandlerResult::Continue
            }),
        )],
        None,
    );
    let response = d.dispatch(raw("GET", "/json"));
    assert_eq!(header(&response, "content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&response.body).expect("json");
    assert_eq!(body, json!({ "ok": true }));
}

#[test]
fn test_body_setters_are_mutually_exclusive() {
    let d = dispatcher(
        vec![route(
            0,
            "GET",
            "/both",
            "",
            Arc::new(|_req, resp, _ctx| {
                resp.set_json(json!({ "discarded": true }));
                resp.set_body("last one wins");
                assert!(matches!(resp.body, Body::Bytes(_)));
                HandlerResult::Continue
            }),
        )],
        None,
    );
    let response = d.dispatch(raw("GET", "/both"));
    assert_eq!(body_str(&response), "last one wins");
    assert_eq!(header(&response, "content-type"), Some("text/plain"));
}

#[test]
fn test_trailing_slash_and_encoding_normalize_before_matching() {
    let d = dispatcher(
        vec![route(
            0,
            "GET",
            "/test",
            "/:foo",
            Arc::new(|req, resp, _ctx| {
                resp.set_body(req.get_url_param("foo").unwrap_or("?").to_string());
                HandlerResult::Continue
            }),
        )],
        None,
    );
    let response = d.dispatch(raw("GET", "/test/alice/"));
    assert_eq!(body_str(&response), "alice");
    let response = d.dispatch(raw("GET", "/test/a%20b"));
    assert_eq!(body_str(&response), "a b");
}
