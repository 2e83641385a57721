//! Demo server exercising the main features available to a callback:
//! wildcard routes, URL/header/cookie/form maps, JSON bodies, response
//! cookies, per-route context values, a default 404 handler, and the
//! plain/TLS bind modes.
//!
//! ```bash
//! cargo run --example simple_server
//! cargo run --example simple_server -- --key key.pem --cert cert.pem
//! ```

use anyhow::Context as _;
use clap::Parser;
use gantry::{HandlerResult, Instance, MultiMap, Request, Response, SetCookie};
use serde_json::json;
use std::any::Any;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(about = "Demo HTTP(S) server")]
struct Args {
    /// Port to bind
    #[arg(long, default_value_t = 8537)]
    port: u16,
    /// PEM private key file; serves HTTPS together with --cert
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
    /// PEM certificate chain file
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,
}

/// Render a map as one formatted line per entry; the caller joins them.
fn describe_map(map: &MultiMap) -> Vec<String> {
    map.iter()
        .map(|(k, v)| format!("key is {k}, value is {v}"))
        .collect()
}

/// Puts "Hello World!" in the response.
fn hello(_req: &Request, resp: &mut Response, _ctx: Option<&dyn Any>) -> HandlerResult {
    resp.status = 200;
    resp.set_body("Hello World!");
    HandlerResult::Continue
}

/// Leaves the seeded empty 200 response untouched.
fn empty(_req: &Request, _resp: &mut Response, _ctx: Option<&dyn Any>) -> HandlerResult {
    HandlerResult::Continue
}

/// Echoes the form fields sent by the client.
fn post_fields(req: &Request, resp: &mut Response, _ctx: Option<&dyn Any>) -> HandlerResult {
    resp.set_body(format!(
        "Hello World!\n{}",
        describe_map(&req.post_fields).join("\n")
    ));
    HandlerResult::Continue
}

/// Dumps everything the callback can observe about the request.
fn inspect(req: &Request, resp: &mut Response, ctx: Option<&dyn Any>) -> HandlerResult {
    let user_data = ctx
        .and_then(|c| c.downcast_ref::<&'static str>())
        .copied()
        .unwrap_or("(none)");
    let client = req
        .client_addr
        .map(|a| a.to_string())
        .unwrap_or_else(|| "(unknown)".to_string());
    let json_body = req
        .json_body
        .as_ref()
        .map(|v| serde_json::to_string_pretty(v).unwrap_or_default())
        .unwrap_or_default();
    resp.set_body(format!(
        "Hello World!\n\n  method is {}\n  url is {}\n\n  parameters from the url are \n{}\n\n  \
         cookies are \n{}\n\n  headers are \n{}\n\n  post parameters are \n{}\n\n  json body \
         parameters are \n{}\n\n  user data is {}\n\nclient address is {}\n\n",
        req.method,
        req.raw_path,
        describe_map(&req.url_params).join("\n"),
        describe_map(&req.cookies).join("\n"),
        describe_map(&req.headers).join("\n"),
        describe_map(&req.post_fields).join("\n"),
        json_body,
        user_data,
        client,
    ));
    HandlerResult::Continue
}

/// Answers with a JSON document echoing the request body, or the parse
/// error when the body was malformed.
fn json_echo(req: &Request, resp: &mut Response, _ctx: Option<&dyn Any>) -> HandlerResult {
    let mut payload = json!({
        "message": "Hello World!",
        "method": req.method.as_str(),
        "url": req.raw_path,
    });
    if let Some(err) = &req.body_error {
        payload["request"] = json!({ "title": "Error parsing request", "message": err });
    } else if let Some(body) = &req.json_body {
        payload["request"] = body.clone();
    }
    resp.set_json(payload);
    HandlerResult::Continue
}

/// Sets cookies from the wildcard bindings; the counter cookie increments
/// every time the client reloads this URL.
fn cookie_counter(req: &Request, resp: &mut Response, _ctx: Option<&dyn Any>) -> HandlerResult {
    let lang = req.get_url_param("lang").unwrap_or("").to_string();
    let extra = req.get_url_param("extra").unwrap_or("").to_string();
    let counter = req
        .get_cookie("counter")
        .and_then(|c| c.parse::<i64>().ok())
        .map_or(0, |c| c + 1);
    resp.add_cookie(SetCookie::new("lang", lang));
    resp.add_cookie(SetCookie::new("extra", extra));
    resp.add_cookie(SetCookie::new("counter", counter.to_string()));
    resp.set_body("Cookies set");
    HandlerResult::Continue
}

/// Invoked when no endpoint matches.
fn not_found(_req: &Request, resp: &mut Response, _ctx: Option<&dyn Any>) -> HandlerResult {
    resp.status = 404;
    resp.set_body("Page not found, do what you want");
    HandlerResult::Continue
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    let args = Args::parse();

    let mut instance = Instance::new(args.port);
    instance.set_default_header("Access-Control-Allow-Origin", "*");
    // maximum body size sent by the client is 1 KiB
    instance.set_max_body_size(1024);

    instance.add_endpoint("GET", "/test", "", hello, None)?;
    instance.add_endpoint("GET", "/test", "/empty", empty, None)?;
    instance.add_endpoint("GET", "/test", "/multiple/:a/:b/:c", inspect, None)?;
    instance.add_endpoint("POST", "/test", "", post_fields, None)?;
    for (verb, user_data) in [
        ("GET", "user data 1"),
        ("POST", "user data 2"),
        ("PUT", "user data 3"),
        ("DELETE", "user data 4"),
    ] {
        instance.add_endpoint(
            verb,
            "/test",
            "/:foo",
            inspect,
            Some(std::sync::Arc::new(user_data)),
        )?;
    }
    instance.add_endpoint("PUT", "/testjson", "", json_echo, None)?;
    instance.add_endpoint("GET", "/testcookie", "/:lang/:extra", cookie_counter, None)?;
    instance.set_default_endpoint(not_found, None)?;

    let result = match (&args.key, &args.cert) {
        (Some(key_path), Some(cert_path)) => {
            let key_pem = std::fs::read(key_path)
                .with_context(|| format!("reading {}", key_path.display()))?;
            let cert_pem = std::fs::read(cert_path)
                .with_context(|| format!("reading {}", cert_path.display()))?;
            instance.start_secure(&key_pem, &cert_pem)
        }
        _ => instance.start(),
    };
    if let Err(e) = result {
        error!(error = %e, "Failed to start");
        anyhow::bail!(e);
    }
    info!(addr = ?instance.addr(), "Serving; press <enter> to quit");

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    instance.stop()?;
    info!("Stopped");
    Ok(())
}
