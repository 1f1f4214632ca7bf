//! End-to-end tests over a real socket.

use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn test_healthcheck_is_public() {
    let server = common::spawn_server(common::unlimited_config()).await;

    let res = server.client.get(server.url("/v1/healthcheck")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "development");

    server.stop().await;
}

#[tokio::test]
async fn test_full_movie_lifecycle() {
    let server = common::spawn_server(common::unlimited_config()).await;
    let (user, token) = server.activated_user("writer@example.com").await;
    server.grant(user, "movies:write");

    let res = server
        .client
        .post(server.url("/v1/movies"))
        .bearer_auth(&token)
        .json(&json!({ "title": "Casablanca", "year": 1942, "runtime": "102 mins", "genres": ["drama"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let location = res.headers()["location"].to_str().unwrap().to_string();
    let body: Value = res.json().await.unwrap();
    let id = body["movie"]["id"].as_i64().unwrap();
    assert_eq!(location, format!("/v1/movies/{id}"));
    assert_eq!(body["movie"]["version"], 1);

    let res = server
        .client
        .get(server.url(&location))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["vary"], "Authorization");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["movie"]["runtime"], "102 mins");

    let res = server
        .client
        .patch(server.url(&location))
        .bearer_auth(&token)
        .json(&json!({ "year": 1943 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["movie"]["version"], 2);
    assert_eq!(body["movie"]["year"], 1943);
    assert_eq!(body["movie"]["title"], "Casablanca");

    let res = server
        .client
        .put(server.url(&location))
        .bearer_auth(&token)
        .header("X-Expected-Version", "2")
        .json(&json!({ "title": "Casablanca (Restored)" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["movie"]["version"], 3);
    assert_eq!(body["movie"]["year"], 1943);

    let delete = || server.client.delete(server.url(&location)).bearer_auth(&token).send();
    assert_eq!(delete().await.unwrap().status(), 200);
    assert_eq!(delete().await.unwrap().status(), 404);

    server.stop().await;
}

#[tokio::test]
async fn test_list_movies_filters_sorts_and_pages() {
    let server = common::spawn_server(common::unlimited_config()).await;
    let (user, token) = server.activated_user("curator@example.com").await;
    server.grant(user, "movies:write");

    let moana = server
        .create_movie(&token, json!({ "title": "Moana", "year": 2016, "genres": ["animation", "adventure"] }))
        .await;
    let heat = server
        .create_movie(&token, json!({ "title": "Heat", "year": 1995, "genres": ["crime"] }))
        .await;
    let up = server
        .create_movie(&token, json!({ "title": "Up", "year": 2009, "genres": ["animation"] }))
        .await;

    let list = |query: &'static str| {
        server
            .client
            .get(server.url(&format!("/v1/movies{query}")))
            .bearer_auth(&token)
            .send()
    };
    let ids = |body: &Value| -> Vec<i64> {
        body["movies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_i64().unwrap())
            .collect()
    };

    let res = list("").await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(ids(&body), vec![moana, heat, up]);
    assert_eq!(body["metadata"]["total_records"], 3);
    assert_eq!(body["metadata"]["page_size"], 20);

    let body: Value = list("?genres=animation&sort=-year").await.unwrap().json().await.unwrap();
    assert_eq!(ids(&body), vec![moana, up]);

    let body: Value = list("?title=heat").await.unwrap().json().await.unwrap();
    assert_eq!(ids(&body), vec![heat]);

    let body: Value = list("?sort=title&page=2&page_size=2").await.unwrap().json().await.unwrap();
    assert_eq!(ids(&body), vec![up]);
    assert_eq!(body["metadata"]["current_page"], 2);
    assert_eq!(body["metadata"]["last_page"], 2);

    let body: Value = list("?title=nothing+matches").await.unwrap().json().await.unwrap();
    assert_eq!(body["movies"], json!([]));
    assert_eq!(body["metadata"], json!({}));

    let res = list("?page=0&page_size=500&sort=rating").await.unwrap();
    assert_eq!(res.status(), 422);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["page"], "must be greater than zero");
    assert_eq!(body["error"]["page_size"], "must be a maximum of 100");
    assert!(body["error"]["sort"].as_str().unwrap().starts_with("must be one of"));

    let res = server.client.get(server.url("/v1/movies")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    server.stop().await;
}

#[tokio::test]
async fn test_user_account_management() {
    let server = common::spawn_server(common::unlimited_config()).await;
    let (ada, ada_token) = server.activated_user("ada@example.com").await;
    let (grace, grace_token) = server.activated_user("grace@example.com").await;
    let account = format!("/v1/users/{}", ada.0);

    let res = server
        .client
        .get(server.url(&account))
        .bearer_auth(&grace_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert!(body["user"].get("password_hash").is_none());

    let res = server
        .client
        .get(server.url("/v1/users/9999"))
        .bearer_auth(&grace_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    // Only the owner may change an account.
    let res = server
        .client
        .patch(server.url(&account))
        .bearer_auth(&grace_token)
        .json(&json!({ "name": "Not Ada" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    // PUT replaces the whole account.
    let res = server
        .client
        .put(server.url(&account))
        .bearer_auth(&ada_token)
        .json(&json!({ "name": "Ada Lovelace" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);

    let res = server
        .client
        .patch(server.url(&account))
        .bearer_auth(&ada_token)
        .json(&json!({ "name": "Ada Lovelace", "password": "analytical-engine" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["name"], "Ada Lovelace");
    // Activation was version 2.
    assert_eq!(body["user"]["version"], 3);

    server.login_with("ada@example.com", "analytical-engine").await;
    let res = server
        .client
        .post(server.url("/v1/tokens/authentication"))
        .json(&json!({ "email": "ada@example.com", "password": "pa55word" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = server
        .client
        .patch(server.url(&account))
        .bearer_auth(&ada_token)
        .header("X-Expected-Version", "2")
        .json(&json!({ "name": "Countess" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 409);

    let res = server
        .client
        .patch(server.url(&account))
        .bearer_auth(&ada_token)
        .json(&json!({ "email": "grace@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"]["email"].is_string());

    let res = server
        .client
        .delete(server.url(&account))
        .bearer_auth(&ada_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    // The deleted account's token no longer authenticates.
    let res = server
        .client
        .get(server.url(&format!("/v1/users/{}", grace.0)))
        .bearer_auth(&ada_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    server.stop().await;
}

#[tokio::test]
async fn test_unactivated_user_may_view_but_not_edit() {
    let server = common::spawn_server(common::unlimited_config()).await;
    let (id, _) = server.register("pending@example.com").await;
    let token = server.login("pending@example.com").await;
    let account = format!("/v1/users/{}", id.0);

    let res = server
        .client
        .get(server.url(&account))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = server
        .client
        .patch(server.url(&account))
        .bearer_auth(&token)
        .json(&json!({ "name": "Eager" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let res = server.client.get(server.url(&account)).send().await.unwrap();
    assert_eq!(res.status(), 401);

    server.stop().await;
}

#[tokio::test]
async fn test_stale_expected_version_conflicts() {
    let server = common::spawn_server(common::unlimited_config()).await;
    let (user, token) = server.activated_user("editor@example.com").await;
    server.grant(user, "movies:write");

    let res = server
        .client
        .post(server.url("/v1/movies"))
        .bearer_auth(&token)
        .json(&json!({ "title": "Alien" }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let path = format!("/v1/movies/{}", body["movie"]["id"]);

    let patch = |version: &'static str, title: &'static str| {
        server
            .client
            .patch(server.url(&path))
            .bearer_auth(&token)
            .header("X-Expected-Version", version)
            .json(&json!({ "title": title }))
            .send()
    };

    assert_eq!(patch("1", "Aliens").await.unwrap().status(), 200);

    let res = patch("1", "Alien 3").await.unwrap();
    assert_eq!(res.status(), 409);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("edit conflict"));

    let res = server.client.get(server.url(&path)).bearer_auth(&token).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["movie"]["title"], "Aliens");
    assert_eq!(body["movie"]["version"], 2);

    server.stop().await;
}

#[tokio::test]
async fn test_gate_stages_over_http() {
    let server = common::spawn_server(common::unlimited_config()).await;

    // Anonymous on a permission-gated route.
    let res = server.client.get(server.url("/v1/movies/1")).send().await.unwrap();
    assert_eq!(res.status(), 401);
    assert_eq!(res.headers()["www-authenticate"], "Bearer");

    // Registered but never activated.
    server.register("idle@example.com").await;
    let token = server.login("idle@example.com").await;
    let res = server
        .client
        .get(server.url("/v1/movies/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("activated"));

    // Activated with the default movies:read only.
    let (_, token) = server.activated_user("reader@example.com").await;
    let res = server
        .client
        .get(server.url("/v1/movies/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = server
        .client
        .post(server.url("/v1/movies"))
        .bearer_auth(&token)
        .json(&json!({ "title": "Heat" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("permissions"));

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_and_unknown_tokens() {
    let server = common::spawn_server(common::unlimited_config()).await;

    for header in ["Bearer short", "Basic dXNlcjpwYXNz", "Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ"] {
        let res = server
            .client
            .get(server.url("/v1/healthcheck"))
            .header("Authorization", header)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401, "header {header:?}");
        assert_eq!(res.headers()["www-authenticate"], "Bearer");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_activation_token_is_single_use() {
    let server = common::spawn_server(common::unlimited_config()).await;
    let (_, activation) = server.register("once@example.com").await;

    let activate = || {
        server
            .client
            .put(server.url("/v1/users/activated"))
            .json(&json!({ "token": activation }))
            .send()
    };

    let res = activate().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["activated"], true);
    assert_eq!(body["user"]["version"], 2);
    assert!(body["user"].get("password_hash").is_none());

    let res = activate().await.unwrap();
    assert_eq!(res.status(), 422);

    // An activation token never authenticates.
    let res = server
        .client
        .get(server.url("/v1/healthcheck"))
        .bearer_auth(&activation)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    server.stop().await;
}

#[tokio::test]
async fn test_registration_and_login_failures() {
    let server = common::spawn_server(common::unlimited_config()).await;
    server.register("dup@example.com").await;

    let res = server
        .client
        .post(server.url("/v1/users"))
        .json(&json!({ "name": "Again", "email": "dup@example.com", "password": "pa55word" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"]["email"].is_string());

    let res = server
        .client
        .post(server.url("/v1/tokens/authentication"))
        .json(&json!({ "email": "dup@example.com", "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = server
        .client
        .post(server.url("/v1/tokens/authentication"))
        .json(&json!({ "email": "nobody@example.com", "password": "pa55word" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = server
        .client
        .post(server.url("/v1/users"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_route_and_method() {
    let server = common::spawn_server(common::unlimited_config()).await;

    let res = server.client.get(server.url("/v1/nope")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "the requested resource could not be found");

    let res = server.client.delete(server.url("/v1/healthcheck")).send().await.unwrap();
    assert_eq!(res.status(), 405);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "the DELETE method is not supported for this resource");

    server.stop().await;
}

#[tokio::test]
async fn test_rate_limit_burst_over_socket() {
    let mut config = common::unlimited_config();
    config.rate_limit.enabled = true;
    config.rate_limit.burst = 4;
    config.rate_limit.requests_per_second = 0.01;
    let server = common::spawn_server(config).await;

    let mut statuses = Vec::new();
    for _ in 0..6 {
        let res = server.client.get(server.url("/v1/healthcheck")).send().await.unwrap();
        statuses.push(res.status().as_u16());
    }
    assert_eq!(statuses, [200, 200, 200, 200, 429, 429]);
    assert_eq!(server.backends.users.len(), 0);

    server.stop().await;
}
