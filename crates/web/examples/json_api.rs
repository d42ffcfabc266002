use apify::sign::{CachePolicy, CachedSecretStore, SignConfig, SignGuard, StaticSecretStore};
use apify::{AccessLog, ApiError, ApiMap, ApiStream, Chain, HttpInfo, JsonWriter, Server, Timestamp, apify, schema_rpc};
use http::{HeaderValue, header};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct EchoParams {
    #[serde(rename = "foo")]
    foo: i32,
    #[serde(rename = "bar", default)]
    bar: String,
    #[serde(rename = "at", default)]
    at: Option<Timestamp>,
}

#[derive(Serialize)]
struct Echoed {
    #[serde(rename = "Got")]
    got: String,
    at: Option<Timestamp>,
}

async fn echo(p: EchoParams) -> Result<Echoed, ApiError> {
    Ok(Echoed { got: format!("{}/{}", p.foo, p.bar), at: p.at })
}

#[derive(Deserialize)]
struct Sum {
    xs: Vec<i64>,
}

async fn sum(p: Sum, info: HttpInfo) -> Result<i64, ApiError> {
    if p.xs.is_empty() {
        return Err(ApiError::new(1, "xs is empty", None).with_status(400));
    }
    info.sink.insert_header(header::SET_COOKIE, HeaderValue::from_static("last=sum")).await;
    Ok(p.xs.iter().sum())
}

async fn countdown() -> Result<ApiStream, ApiError> {
    Ok(ApiStream::new((0..5).rev()))
}

#[tokio::main]
async fn main() {
    let secrets = CachedSecretStore::new(StaticSecretStore::new().with_secret("demo", "demo-secret"), CachePolicy::default());
    let signed_echo = Chain::builder()
        .try_stage(SignGuard::try_new(secrets, SignConfig { expire_seconds: 60 }))
        .stage(AccessLog::default())
        .stage(schema_rpc(echo))
        .stage(JsonWriter)
        .build();

    let apis = ApiMap::new()
        .api("/api/echo", Chain::json(AccessLog::default(), schema_rpc(echo)))
        .api("/api/signed/echo", signed_echo)
        .api("/api/sum", apify(sum))
        .api("/api/countdown", apify(countdown));

    Server::builder().handler(apis).address("127.0.0.1:8080").build().unwrap().start().await;
}
