//! End-to-end tests over a listening server
//!
//! Starts a [`Server`] on a free port with the handoff disabled and talks
//! raw HTTP/1.1 to it: health check, broker mount, form parameters, views,
//! static content under the context path, the protected area, and graceful
//! stop.

use frontline::echo::register_builtin;
use frontline::{CommandCatalog, CommandContext, DispatchError, RunningServer, Scope, Server};
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;

mod common;
use common::fixtures::web_content;
use common::http::{get, get_with_headers, parse_response, post_form, send_request_with_timeout};
use common::test_server::{free_port, setup_may_runtime};

struct TestServer {
    running: RunningServer,
    _web: TempDir,
}

impl TestServer {
    fn start() -> Self {
        setup_may_runtime();
        let web = web_content();
        let mut catalog = CommandCatalog::new();
        register_builtin(&mut catalog, "shop.commands");
        catalog
            .register("shop.commands.HelloCommand", || {
                |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                    let name = ctx.param("name").unwrap_or("world").to_string();
                    ctx.set_variable("name", name);
                    ctx.forward_to_view("hello")
                }
            })
            .register("shop.commands.RememberCommand", || {
                |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                    ctx.set_scoped_variable(Scope::Session, "remembered", true);
                    Ok(())
                }
            })
            .register("shop.commands.SlowCommand", || {
                |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                    may::coroutine::sleep(Duration::from_millis(300));
                    ctx.write("done");
                    Ok(())
                }
            });

        let running = Server::new("shop.commands")
            .port(free_port())
            .bind_host("127.0.0.1")
            .context("shop")
            .web_content(web.path())
            .catalog(catalog)
            .without_handoff()
            .start()
            .unwrap();
        Self { running, _web: web }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.running.stop(Duration::from_millis(100));
    }
}

#[test]
fn test_health_endpoint() {
    let srv = TestServer::start();
    let res = get(srv.running.addr(), "/health");
    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(res.body, r#"{"status":"ok"}"#);
}

#[test]
fn test_echo_under_context_mount() {
    let srv = TestServer::start();
    let res = get(srv.running.addr(), "/shop/cmd/echo/tail?q=x%20y");
    assert_eq!(res.status, 200);
    let v: Value = serde_json::from_str(&res.body).unwrap();
    assert_eq!(v["verb"], "echo");
    assert_eq!(v["path_info"], "/echo/tail");
    assert_eq!(v["params"]["q"], "x y");
}

#[test]
fn test_form_parameters_reach_command() {
    let srv = TestServer::start();
    let res = post_form(srv.running.addr(), "/shop/cmd/echo?a=query", "a=form&b=2");
    assert_eq!(res.status, 200);
    let v: Value = serde_json::from_str(&res.body).unwrap();
    assert_eq!(v["method"], "POST");
    assert_eq!(v["params"]["a"], "query");
    assert_eq!(v["params"]["b"], "2");
}

#[test]
fn test_view_rendering_and_not_found() {
    let srv = TestServer::start();
    let res = get(srv.running.addr(), "/shop/cmd/hello?name=ada");
    assert_eq!(res.status, 200);
    assert_eq!(res.body, "<p>Hello ada</p>");

    assert_eq!(get(srv.running.addr(), "/shop/cmd/unknown").status, 404);
}

#[test]
fn test_static_content_and_protected_area() {
    let srv = TestServer::start();
    let addr = srv.running.addr();

    let res = get(addr, "/shop/");
    assert_eq!(res.status, 200);
    assert_eq!(res.body, "<h1>home</h1>");

    let res = get(addr, "/shop/style.css");
    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-type"), Some("text/css"));

    assert_eq!(get(addr, "/shop/WEB-INF/secret.txt").status, 404);
    assert_eq!(get(addr, "/shop/WEB-INF/views/hello.html").status, 404);
    assert_eq!(get(addr, "/shop/./WEB-INF/views/hello.html").status, 404);
    assert_eq!(get(addr, "/shop//WEB-INF/secret.txt").status, 404);
    assert_eq!(get(addr, "/shop/web-inf/secret.txt").status, 404);
    assert_eq!(get(addr, "/style.css").status, 404);
    assert_eq!(get(addr, "/shop/missing.txt").status, 404);
}

#[test]
fn test_session_cookie_is_scoped_to_context() {
    let srv = TestServer::start();
    let addr = srv.running.addr();

    let res = get(addr, "/shop/cmd/remember");
    assert_eq!(res.status, 200);
    let cookie = res.header("set-cookie").unwrap();
    assert!(cookie.starts_with("FRONTLINE_SESSION="));
    assert!(cookie.contains("Path=/shop"));
    assert!(cookie.contains("HttpOnly"));

    let res = get_with_headers(addr, "/shop/cmd/echo", &[("Cookie", "FRONTLINE_SESSION=stale")]);
    assert_eq!(res.status, 200);
    assert!(res.header("set-cookie").is_none());
}

#[test]
fn test_graceful_stop_waits_for_in_flight_request() {
    let srv = TestServer::start();
    let addr = srv.running.addr();

    let slow = std::thread::spawn(move || {
        let req = "GET /shop/cmd/slow HTTP/1.1\r\nHost: localhost\r\n\r\n";
        parse_response(&send_request_with_timeout(addr, req, Duration::from_secs(2)))
    });
    std::thread::sleep(Duration::from_millis(100));

    let abandoned = srv.running.stop(Duration::from_secs(2));
    assert_eq!(abandoned, 0);
    assert!(srv.running.is_stopped());

    let res = slow.join().unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(res.body, "done");
}
