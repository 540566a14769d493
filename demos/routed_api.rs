//! Typed routing and CORS, wired through [`Router`] instead of a bare
//! [`Handler`]. Registration order matters: more specific routes must come
//! before more general ones, since the router dispatches to the first
//! candidate whose method, path and query-parameter bindings all succeed.

use tokio::net::TcpListener;
use warden_web::{Context, CorsFilter, CorsOptions, Method, Responded, Router, Server};

async fn on_hello_arg(ctx: &mut Context, name: String, nick_name: Option<String>, age: u32) -> Responded {
    let nick_name = nick_name.unwrap_or_else(|| name.clone());
    ctx.ok(format!("Hello, {name} ({nick_name}), age {age}!"))
}

async fn on_hello_path(ctx: &mut Context, name: String) -> Responded {
    ctx.ok(format!("Hello, {name}!"))
}

async fn on_hello(ctx: &mut Context) -> Responded {
    ctx.ok("Hello, world!")
}

#[tokio::main]
async fn main() {
    let cors = CorsFilter::new(CorsOptions {
        allow_any_origins: true,
        allow_methods: vec![Method::Get, Method::Post, Method::Options],
        allow_any_headers: true,
        max_age: 3600,
        ..Default::default()
    });

    let router = Router::new()
        .filter(cors)
        // Most specific first: a route with both `name` and `age` wins
        // over the bare path or the single-placeholder route below.
        .route(
            "/hello?name&nick_name&age",
            &[Method::Get, Method::Post],
            on_hello_arg,
        )
        .route("/hello/{name}", &[Method::Get, Method::Post], on_hello_path)
        .route("/hello", &[Method::Get, Method::Post], on_hello);

    Server::builder()
        .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
        .handler(router)
        .build()
        .launch()
        .await;
}
