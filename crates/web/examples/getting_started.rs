use std::time::Duration;

use kumo_web::middleware::{Gzip, Logger, Recovery};
use kumo_web::{handler_fn, App, Config, Context};
use serde::Serialize;

#[derive(Serialize)]
struct User {
    id: i64,
    name: String,
}

async fn index(ctx: &mut Context) {
    let _ = ctx.text("hello from kumo\n");
}

async fn get_user(ctx: &mut Context) {
    match ctx.int("id") {
        Ok(id) => {
            let user = User { id, name: format!("user-{id}") };
            if let Err(e) = ctx.json(&user) {
                eprintln!("json write failed: {e}");
                ctx.fail();
            }
        }
        Err(_) => ctx.not_found(),
    }
}

async fn slow(ctx: &mut Context) {
    tokio::time::sleep(Duration::from_secs(5)).await;
    let _ = ctx.text("finally\n");
}

#[tokio::main]
async fn main() {
    let config = Config { timeout: Some(Duration::from_secs(2)), ..Config::default() };
    let mut app = App::new(config);

    app.middleware(kumo_web::handlers![Logger, Recovery]);
    app.get("/", handler_fn(index));
    // answers 503 after the two second deadline
    app.get("/slow", handler_fn(slow));

    let mut api = app.module("api", Gzip);
    api.get("/users/{id}", handler_fn(get_user));

    if let Err(e) = app.run("127.0.0.1:3000").await {
        eprintln!("server error: {e}");
    }
}
