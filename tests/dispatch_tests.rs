//! Broker-level dispatch tests
//!
//! Requests are handed straight to [`CommandBroker::dispatch`], without a
//! listening socket, to cover resolution tiers, forwards, views, redirects,
//! scoped variables and the authentication gate.

use frontline::server::ParsedRequest;
use frontline::{
    hash_credentials, AppConfig, BrokerBuilder, Command, CommandBroker, CommandCatalog,
    CommandContext, DispatchError, Identifier, Scope,
};
use serde_json::{json, Value};
use std::sync::Arc;

mod common;
use common::fixtures::web_content;

/// Writes a fixed body.
struct Text(&'static str);

impl Command for Text {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), DispatchError> {
        ctx.write(self.0);
        Ok(())
    }
}

fn text(body: &'static str) -> impl Fn() -> Text + Send + Sync + 'static {
    move || Text(body)
}

fn demo_catalog() -> CommandCatalog {
    let mut catalog = CommandCatalog::new();
    catalog
        .register("app.commands.PingCommand", text("convention"))
        .register("app.mapped.Pong", text("mapped"))
        .register("app.commands.order.CreateCommand", text("order created"))
        .register_verb("hi", "app.commands.greet.Greeter", text("marker"))
        .register("app.commands.HelloCommand", || {
            |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                let name = ctx.param("name").unwrap_or("world").to_string();
                ctx.set_variable("name", name);
                ctx.forward_to_view("hello")
            }
        })
        .register("app.commands.RelayCommand", || {
            |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                ctx.set_variable("relayed", true);
                ctx.forward("/cmd/inspect?extra=1")
            }
        })
        .register("app.commands.InspectCommand", || {
            |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                let body = json!({
                    "verb": ctx.verb(),
                    "path_info": ctx.path_info(),
                    "extra": ctx.param("extra"),
                    "relayed": ctx.variable("relayed"),
                });
                ctx.write_json(&body)
            }
        })
        .register("app.commands.LoopCommand", || {
            |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                ctx.forward_to_command("loop")
            }
        })
        .register("app.commands.GhostCommand", || {
            |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                ctx.forward_to_view("ghost")
            }
        })
        .register("app.commands.LeaveCommand", || {
            |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                ctx.redirect_to_view("hello", &[("name", "a b")])
            }
        })
        .register("app.commands.TeapotCommand", || {
            |_ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                Err(DispatchError::status(418, "short and stout"))
            }
        })
        .register("app.commands.CountCommand", || {
            |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
                let visits = ctx
                    .scoped_variable(Scope::Session, "visits")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0)
                    + 1;
                ctx.set_scoped_variable(Scope::Session, "visits", visits);
                ctx.set_scoped_variable(Scope::Application, "last", visits);
                let found = ctx.find_scoped_variable("visits");
                ctx.write_json(&json!({ "visits": found }))
            }
        });
    catalog
}

fn broker(web: &std::path::Path) -> CommandBroker {
    let mut cfg = AppConfig::with_namespace("app.commands");
    cfg.command_mappings
        .insert("ping".into(), "app.mapped.Pong".into());
    cfg.web_content = web.to_path_buf();
    BrokerBuilder::new(cfg)
        .catalog(demo_catalog())
        .build()
        .unwrap()
}

fn body(res: &frontline::HandlerResponse) -> String {
    String::from_utf8_lossy(&res.body).to_string()
}

#[test]
fn test_resolution_tiers() {
    let web = web_content();
    let b = broker(web.path());

    let res = b.dispatch(ParsedRequest::get("/cmd/ping"));
    assert_eq!(res.status, 200);
    assert_eq!(body(&res), "mapped");

    assert_eq!(body(&b.dispatch(ParsedRequest::get("/cmd/hi"))), "marker");
    assert_eq!(
        body(&b.dispatch(ParsedRequest::get("/cmd/order.create/42"))),
        "order created"
    );
}

#[test]
fn test_unknown_and_invalid_verbs_are_not_found() {
    let web = web_content();
    let b = broker(web.path());
    assert_eq!(b.dispatch(ParsedRequest::get("/cmd/nothing")).status, 404);
    assert_eq!(b.dispatch(ParsedRequest::get("/cmd/../etc")).status, 404);
    assert_eq!(b.dispatch(ParsedRequest::get("/cmd/")).status, 404);
}

#[test]
fn test_mapping_to_unregistered_command_is_fatal() {
    let web = web_content();
    let mut cfg = AppConfig::with_namespace("app.commands");
    cfg.command_mappings
        .insert("ping".into(), "app.missing.Command".into());
    cfg.web_content = web.path().to_path_buf();
    let b = BrokerBuilder::new(cfg)
        .catalog(demo_catalog())
        .build()
        .unwrap();
    assert_eq!(b.dispatch(ParsedRequest::get("/cmd/ping")).status, 500);
}

#[test]
fn test_forward_to_view_renders_request_variables() {
    let web = web_content();
    let b = broker(web.path());
    let res = b.dispatch(ParsedRequest::get("/cmd/hello?name=ada"));
    assert_eq!(res.status, 200);
    assert_eq!(body(&res), "<p>Hello ada</p>");
    assert_eq!(res.get_header("content-type"), Some("text/html; charset=utf-8"));
}

#[test]
fn test_missing_view_is_not_found() {
    let web = web_content();
    let b = broker(web.path());
    assert_eq!(b.dispatch(ParsedRequest::get("/cmd/ghost")).status, 404);
}

#[test]
fn test_forward_within_broker_keeps_request_state() {
    let web = web_content();
    let b = broker(web.path());
    let res = b.dispatch(ParsedRequest::get("/cmd/relay"));
    assert_eq!(res.status, 200);
    let v: Value = serde_json::from_slice(&res.body).unwrap();
    assert_eq!(v["verb"], "inspect");
    assert_eq!(v["path_info"], "/inspect");
    assert_eq!(v["extra"], "1");
    assert_eq!(v["relayed"], true);
}

#[test]
fn test_forward_loop_is_cut_off() {
    let web = web_content();
    let b = broker(web.path());
    assert_eq!(b.dispatch(ParsedRequest::get("/cmd/loop")).status, 500);
}

#[test]
fn test_redirect_to_view_and_handler_status() {
    let web = web_content();
    let b = broker(web.path());

    let res = b.dispatch(ParsedRequest::get("/cmd/leave"));
    assert_eq!(res.status, 302);
    assert_eq!(
        res.get_header("location"),
        Some("/WEB-INF/views/hello.html?name=a+b")
    );

    let res = b.dispatch(ParsedRequest::get("/cmd/teapot"));
    assert_eq!(res.status, 418);
    assert_eq!(body(&res), "short and stout");
}

#[test]
fn test_session_scope_follows_cookie() {
    let web = web_content();
    let b = broker(web.path());

    let first = b.dispatch(ParsedRequest::get("/cmd/count"));
    let cookie = first.get_header("set-cookie").unwrap().to_string();
    let id = cookie
        .split(';')
        .next()
        .and_then(|kv| kv.split_once('='))
        .map(|(_, v)| v.to_string())
        .unwrap();
    assert_eq!(
        serde_json::from_slice::<Value>(&first.body).unwrap()["visits"],
        1
    );

    let mut again = ParsedRequest::get("/cmd/count");
    again.cookies.insert("FRONTLINE_SESSION".into(), id);
    let second = b.dispatch(again);
    assert!(second.get_header("set-cookie").is_none());
    assert_eq!(
        serde_json::from_slice::<Value>(&second.body).unwrap()["visits"],
        2
    );
    assert_eq!(
        b.application().application_variable("last"),
        Some(json!(2))
    );
}

struct Ann;

impl Identifier for Ann {
    fn identify(&self, login: &str, hashed: &str) -> Option<Value> {
        (login == "ann" && hashed == hash_credentials("ann", "secret")).then(|| json!("ann"))
    }
}

#[test]
fn test_auth_gate_login_flow() {
    let web = web_content();
    let mut cfg = AppConfig::with_namespace("app.commands");
    cfg.web_content = web.path().to_path_buf();
    cfg.entry_point = "/login.html".into();
    let b = BrokerBuilder::new(cfg)
        .catalog(demo_catalog())
        .identifier(Arc::new(Ann))
        .build()
        .unwrap();

    let refused = b.dispatch(ParsedRequest::get("/cmd/order.create"));
    assert_eq!(refused.status, 302);
    assert_eq!(refused.get_header("location"), Some("/login.html"));

    let wrong = b.dispatch(ParsedRequest::get(
        "/cmd/order.create?login=ann&password=guess",
    ));
    assert_eq!(wrong.get_header("location"), Some("/login.html"));

    let login = b.dispatch(ParsedRequest::get(
        "/cmd/order.create?login=ann&password=secret",
    ));
    assert_eq!(login.status, 302);
    assert_eq!(login.get_header("location"), Some("/cmd/order.create"));
    let id = login
        .get_header("set-cookie")
        .and_then(|c| c.split(';').next())
        .and_then(|kv| kv.split_once('='))
        .map(|(_, v)| v.to_string())
        .unwrap();

    let mut authed = ParsedRequest::get("/cmd/order.create");
    authed.cookies.insert("FRONTLINE_SESSION".into(), id);
    let res = b.dispatch(authed);
    assert_eq!(res.status, 200);
    assert_eq!(body(&res), "order created");
}
