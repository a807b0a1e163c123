//! HTTPS endpoint the API server posts admission reviews to

use std::convert::Infallible;
use std::sync::Arc;

use kube::api::DynamicObject;
use kube::core::admission::AdmissionReview;
use tracing::info;
use warp::path::FullPath;
use warp::{Filter, Rejection};

use crate::admission;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::lookup::RbacLookup;

/// Largest review body accepted, matching the API server's request limit
const MAX_BODY_BYTES: u64 = 3 * 1024 * 1024;

/// Route answering `POST <path>` with the reviewed `AdmissionReview`
pub fn validation_route<L>(
    dispatcher: Arc<Dispatcher<L>>,
    path: &str,
) -> impl Filter<Extract = (warp::reply::Json,), Error = Rejection> + Clone + use<L>
where
    L: RbacLookup + Send + Sync + 'static,
{
    let path: Arc<str> = Arc::from(path);

    warp::post()
        .and(warp::path::full())
        .and_then(move |full: FullPath| {
            let path = path.clone();
            async move {
                if full.as_str() == &*path {
                    Ok(())
                } else {
                    Err(warp::reject::not_found())
                }
            }
        })
        .untuple_one()
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and_then(move |body: AdmissionReview<DynamicObject>| {
            let dispatcher = dispatcher.clone();
            async move {
                let review = admission::review(&dispatcher, body).await;
                Ok::<_, Infallible>(warp::reply::json(&review))
            }
        })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down admission server");
}

/// Serves the admission route over TLS until interrupted
pub async fn serve<L>(config: &Config, dispatcher: Arc<Dispatcher<L>>) -> Result<()>
where
    L: RbacLookup + Send + Sync + 'static,
{
    for (key, path) in [("tlsCertPath", &config.tls_cert_path), ("tlsKeyPath", &config.tls_key_path)] {
        if !path.is_file() {
            return Err(Error::Config {
                key,
                reason: format!("{} is not a readable file", path.display()),
            });
        }
    }

    let health = warp::get().and(warp::path!("healthz")).map(|| "ok");
    let routes = validation_route(dispatcher, &config.path)
        .or(health)
        .with(warp::trace::request());

    let (addr, server) = warp::serve(routes)
        .tls()
        .cert_path(&config.tls_cert_path)
        .key_path(&config.tls_key_path)
        .bind_with_graceful_shutdown(config.listen_addr, shutdown_signal());

    info!(%addr, path = %config.path, "serving admission webhook");
    server.await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use warp::http::StatusCode;

    use super::*;
    use crate::lookup::MemoryLookup;
    use crate::test_support::*;

    const PATH: &str = "/v1/webhook/validation";

    fn route() -> impl Filter<Extract = (warp::reply::Json,), Error = Rejection> + Clone {
        let lookup = MemoryLookup::new()
            .with_global_role(global_role("pod-reader", vec![rule(&["get"], &[""], &["pods"])]))
            .with_global_role(global_role("pod-admin", vec![rule(&["*"], &[""], &["pods"])]))
            .with_cluster_role(cluster_role("reader", vec![rule(&["get"], &[""], &["pods"])]))
            .with_cluster_role_binding(cluster_role_binding("alice", "reader", vec![user("alice")]));
        validation_route(Arc::new(Dispatcher::<MemoryLookup>::new(lookup)), PATH)
    }

    fn review(kind: Value, operation: &str, role: &str) -> Value {
        let object = json!({
            "apiVersion": "management.cattle.io/v3",
            "kind": "GlobalRoleBinding",
            "metadata": { "name": "grb-1" },
            "globalRoleName": role
        });
        let (new, old) = if operation == "DELETE" {
            (Value::Null, object)
        } else {
            (object, Value::Null)
        };

        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": kind,
                "resource": { "group": "management.cattle.io", "version": "v3", "resource": "globalrolebindings" },
                "operation": operation,
                "userInfo": { "username": "alice", "groups": ["system:authenticated"] },
                "object": new,
                "oldObject": old
            }
        })
    }

    fn grb_kind() -> Value {
        json!({ "group": "management.cattle.io", "version": "v3", "kind": "GlobalRoleBinding" })
    }

    async fn post(body: &Value) -> (StatusCode, Value) {
        let res = warp::test::request()
            .method("POST")
            .path(PATH)
            .json(body)
            .reply(&route())
            .await;
        let status = res.status();
        (status, serde_json::from_slice(res.body()).unwrap())
    }

    #[tokio::test]
    async fn allows_held_grants() {
        let (status, body) = post(&review(grb_kind(), "CREATE", "pod-reader")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "AdmissionReview");
        assert_eq!(body["response"]["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(body["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn denies_escalations() {
        let (_, body) = post(&review(grb_kind(), "CREATE", "pod-admin")).await;
        assert_eq!(body["response"]["allowed"], false);

        let response = body["response"].to_string();
        assert!(response.contains("not currently held"), "{response}");
    }

    #[tokio::test]
    async fn denies_escalating_deletes() {
        let (_, body) = post(&review(grb_kind(), "DELETE", "pod-admin")).await;
        assert_eq!(body["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn denies_unknown_kinds() {
        let kind = json!({ "group": "", "version": "v1", "kind": "ConfigMap" });
        let (_, body) = post(&review(kind, "CREATE", "pod-reader")).await;
        assert_eq!(body["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn denies_reviews_without_request() {
        let (status, body) = post(&json!({ "apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn rejects_other_paths_and_methods() {
        let filter = route();

        let wrong_path = warp::test::request()
            .method("POST")
            .path("/validate")
            .json(&review(grb_kind(), "CREATE", "pod-reader"))
            .matches(&filter)
            .await;
        assert!(!wrong_path);

        let wrong_method = warp::test::request().method("GET").path(PATH).matches(&filter).await;
        assert!(!wrong_method);
    }

    #[tokio::test]
    async fn route_outlives_its_path_argument() {
        let path = String::from(PATH);
        let filter = validation_route(Arc::new(Dispatcher::<MemoryLookup>::new(MemoryLookup::new())), &path);
        drop(path);

        let res = warp::test::request()
            .method("POST")
            .path(PATH)
            .json(&review(grb_kind(), "CREATE", "pod-reader"))
            .reply(&filter)
            .await;
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn serve_requires_certificates() {
        let config = Config {
            tls_cert_path: "/nonexistent/tls.crt".into(),
            ..Config::default()
        };
        let dispatcher = Arc::new(Dispatcher::<MemoryLookup>::new(MemoryLookup::new()));

        let err = serve(&config, dispatcher).await.unwrap_err();
        assert!(matches!(err, Error::Config { key: "tlsCertPath", .. }), "{err}");
    }
}
